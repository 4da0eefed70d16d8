// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pixel formats and planar to interleaved conversion

/// Texel counts at or above this are interleaved on the rayon pool
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 64 * 1024;

/// Component precision of generated pixel data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    Byte,
    Float,
}

/// Host pixel formats dynamic textures are created with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    A8,
    Rgba8,
    R32F,
    Rgba32F,
}

impl PixelFormat {
    /// Format for a supported channel count and precision
    pub fn for_layout(precision: Precision, channels: u32) -> Option<PixelFormat> {
        match (precision, channels) {
            (Precision::Byte, 1) => Some(PixelFormat::A8),
            (Precision::Byte, 3 | 4) => Some(PixelFormat::Rgba8),
            (Precision::Float, 1) => Some(PixelFormat::R32F),
            (Precision::Float, 3 | 4) => Some(PixelFormat::Rgba32F),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            PixelFormat::A8 | PixelFormat::R32F => 1,
            PixelFormat::Rgba8 | PixelFormat::Rgba32F => 4,
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            PixelFormat::A8 | PixelFormat::Rgba8 => Precision::Byte,
            PixelFormat::R32F | PixelFormat::Rgba32F => Precision::Float,
        }
    }

    pub fn bytes_per_texel(self) -> usize {
        match self.precision() {
            Precision::Byte => self.channels(),
            Precision::Float => self.channels() * 4,
        }
    }
}

/// Borrowed planar pixel data, one contiguous plane per channel
#[derive(Clone, Copy, Debug)]
pub enum PixelData<'a> {
    Byte(&'a [u8]),
    Float(&'a [f32]),
}

impl PixelData<'_> {
    pub fn precision(&self) -> Precision {
        match self {
            PixelData::Byte(_) => Precision::Byte,
            PixelData::Float(_) => Precision::Float,
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        match self {
            PixelData::Byte(data) => data.len(),
            PixelData::Float(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interleaved pixels in a host format
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    Byte(Vec<u8>),
    Float(Vec<f32>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Byte(data) => data.len(),
            PixelBuffer::Float(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PixelBuffer::Byte(data) => Some(data),
            PixelBuffer::Float(_) => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            PixelBuffer::Float(data) => Some(data),
            PixelBuffer::Byte(_) => None,
        }
    }
}

/// Convert planar `data` into the host format for its layout.
///
/// Three channel data gains an opaque alpha channel.
///
/// # Panics
///
/// Panics on an unsupported channel count or when `data` holds fewer than
/// `width * height * channels` components.
pub fn interleave(data: PixelData<'_>, width: u32, height: u32, channels: u32) -> (PixelFormat, PixelBuffer) {
    let Some(format) = PixelFormat::for_layout(data.precision(), channels) else {
        panic!(
            "unsupported pixel layout: {channels} channel {:?}",
            data.precision()
        );
    };
    let pixels = width as usize * height as usize;
    let channels = channels as usize;
    assert!(
        data.len() >= pixels * channels,
        "pixel buffer holds {} components, {width}x{height}x{channels} needs {}",
        data.len(),
        pixels * channels
    );

    let buffer = match data {
        PixelData::Byte(planes) => PixelBuffer::Byte(interleave_planes(planes, pixels, channels, u8::MAX)),
        PixelData::Float(planes) => PixelBuffer::Float(interleave_planes(planes, pixels, channels, 1.0)),
    };
    (format, buffer)
}

fn interleave_planes<T: Copy + Send + Sync>(planes: &[T], pixels: usize, channels: usize, opaque: T) -> Vec<T> {
    let stride = if channels == 1 { 1 } else { 4 };
    let mut out = vec![opaque; pixels * stride];
    for_each_texel(&mut out, stride, |index, texel| {
        for (c, slot) in texel.iter_mut().take(channels).enumerate() {
            *slot = planes[c * pixels + index];
        }
    });
    out
}

#[cfg(feature = "parallel")]
fn for_each_texel<T, F>(out: &mut [T], stride: usize, fill: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    use rayon::prelude::*;

    if out.len() / stride >= PARALLEL_THRESHOLD {
        out.par_chunks_mut(stride)
            .enumerate()
            .for_each(|(index, texel)| fill(index, texel));
    } else {
        out.chunks_mut(stride)
            .enumerate()
            .for_each(|(index, texel)| fill(index, texel));
    }
}

#[cfg(not(feature = "parallel"))]
fn for_each_texel<T, F>(out: &mut [T], stride: usize, fill: F)
where
    F: Fn(usize, &mut [T]),
{
    out.chunks_mut(stride)
        .enumerate()
        .for_each(|(index, texel)| fill(index, texel));
}
