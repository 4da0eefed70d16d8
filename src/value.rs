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

//! Bindable value kinds.
//!
//! Everything that flows between a parameter collection and a host object is
//! one of eight [`ValueType`]s. [`Value`] carries a typed literal of one of
//! them; the math types use `glam` underneath.

use std::fmt;

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::ids::AssetId;

/// Closed set of value kinds a binding can carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Integer,
    Float,
    Bool,
    String,
    Colour,
    Vector,
    Frame,
    Texture,
}

impl ValueType {
    pub const ALL: [ValueType; 8] = [
        ValueType::Integer,
        ValueType::Float,
        ValueType::Bool,
        ValueType::String,
        ValueType::Colour,
        ValueType::Vector,
        ValueType::Frame,
        ValueType::Texture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Integer => "Integer",
            ValueType::Float => "Float",
            ValueType::Bool => "Bool",
            ValueType::String => "String",
            ValueType::Colour => "Colour",
            ValueType::Vector => "Vector",
            ValueType::Frame => "Frame",
            ValueType::Texture => "Texture",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear RGBA colour
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Colour {
    pub const BLACK: Colour = Colour::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Colour = Colour::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour from the components of a vector
    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z, 1.0)
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    /// Quantise to 8-bit sRGB, alpha stays linear
    pub fn to_srgb8(self) -> [u8; 4] {
        fn encode(c: f32) -> f32 {
            let c = c.clamp(0.0, 1.0);
            if c <= 0.003_130_8 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        }
        let q = |c: f32| (c * 255.0).round() as u8;
        [
            q(encode(self.r)),
            q(encode(self.g)),
            q(encode(self.b)),
            q(self.a.clamp(0.0, 1.0)),
        ]
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Oriented box: an origin corner, an extent along each axis, and the axes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Vec3,
    pub size: Vec3,
    pub orientation: Mat3,
}

impl Frame {
    /// Unit frame at the origin
    pub const IDENTITY: Frame = Frame {
        origin: Vec3::ZERO,
        size: Vec3::ONE,
        orientation: Mat3::IDENTITY,
    };

    pub fn new(origin: Vec3, size: Vec3) -> Self {
        Self {
            origin,
            size,
            orientation: Mat3::IDENTITY,
        }
    }

    /// Axis-aligned frame covering `centre +/- extent`
    pub fn from_centre_extent(centre: Vec3, extent: Vec3) -> Self {
        Self::new(centre - extent, extent * 2.0)
    }

    pub fn centre(&self) -> Vec3 {
        self.origin + self.orientation * (self.size * 0.5)
    }

    /// Identity orientation scaled by `scale`
    pub fn from_scale(scale: Vec3) -> Self {
        Self::new(Vec3::ZERO, scale)
    }

    /// Origin becomes the translation, size the scale
    pub fn to_transform(&self) -> Transform {
        let x = self.orientation.x_axis.normalize_or_zero();
        let y = self.orientation.y_axis.normalize_or_zero();
        let z = self.orientation.z_axis.normalize_or_zero();
        let rotation = if x == Vec3::ZERO || y == Vec3::ZERO || z == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_mat3(&Mat3::from_cols(x, y, z))
        };
        Transform {
            translation: self.origin,
            rotation,
            scale: self.size,
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Translation, rotation and scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Self::IDENTITY
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.to_matrix().transform_point3(point)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Where a texture value comes from
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureRef {
    /// Authored host asset path
    Asset(String),
    /// Resolved or dynamically generated asset id
    Id(AssetId),
}

/// A typed literal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Colour(Colour),
    Vector(Vec3),
    Frame(Frame),
    Texture(Option<TextureRef>),
}

impl Value {
    /// Zero value used whenever nothing better is available
    pub fn zero(value_type: ValueType) -> Value {
        match value_type {
            ValueType::Integer => Value::Integer(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Bool => Value::Bool(false),
            ValueType::String => Value::String(String::new()),
            ValueType::Colour => Value::Colour(Colour::BLACK),
            ValueType::Vector => Value::Vector(Vec3::ZERO),
            ValueType::Frame => Value::Frame(Frame::IDENTITY),
            ValueType::Texture => Value::Texture(None),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Colour(_) => ValueType::Colour,
            Value::Vector(_) => ValueType::Vector,
            Value::Frame(_) => ValueType::Frame,
            Value::Texture(_) => ValueType::Texture,
        }
    }

    /// Convert to `want` using the fixed coercion table.
    ///
    /// Supported pairs besides identity: Colour <-> Vector (alpha 1),
    /// Frame -> Vector (frame size), Vector -> Frame (identity scaled by the
    /// vector) and Integer -> Float. Returns `None` for anything else.
    pub fn coerce(&self, want: ValueType) -> Option<Value> {
        if self.value_type() == want {
            return Some(self.clone());
        }
        match (self, want) {
            (Value::Colour(c), ValueType::Vector) => Some(Value::Vector(c.to_vec3())),
            (Value::Vector(v), ValueType::Colour) => Some(Value::Colour(Colour::from_vec3(*v))),
            (Value::Frame(f), ValueType::Vector) => Some(Value::Vector(f.size)),
            (Value::Vector(v), ValueType::Frame) => Some(Value::Frame(Frame::from_scale(*v))),
            (Value::Integer(i), ValueType::Float) => Some(Value::Float(*i as f32)),
            _ => None,
        }
    }

    /// Short human readable form, used in logs and descriptions
    pub fn describe(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => format!("\"{s}\""),
            Value::Colour(c) => format!("({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Value::Vector(v) => format!("({}, {}, {})", v.x, v.y, v.z),
            Value::Frame(f) => format!(
                "frame@({}, {}, {}) size ({}, {}, {})",
                f.origin.x, f.origin.y, f.origin.z, f.size.x, f.size.y, f.size.z
            ),
            Value::Texture(None) => "none".to_string(),
            Value::Texture(Some(TextureRef::Asset(path))) => path.clone(),
            Value::Texture(Some(TextureRef::Id(id))) => format!("texture #{}", id.get()),
        }
    }
}
