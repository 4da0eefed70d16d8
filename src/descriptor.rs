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

//! Resource descriptors: `segment('.'segment)*('#'N)?`

use std::fmt;

use smallvec::SmallVec;

use crate::error::{BindError, Result};

/// Separator between path segments
pub const SEGMENT_SEPARATOR: char = '.';

/// Prefix of the 1-based variant number
pub const VARIANT_SEPARATOR: char = '#';

/// Parsed resource descriptor
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    segments: SmallVec<[String; 4]>,
    variant: Option<u32>,
}

impl Descriptor {
    /// Parse and validate a descriptor string
    pub fn parse(text: &str) -> Result<Self> {
        let (path, variant) = match text.split_once(VARIANT_SEPARATOR) {
            Some((path, number)) => {
                let variant = number
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0 && number.bytes().all(|b| b.is_ascii_digit()))
                    .ok_or_else(|| {
                        BindError::InvalidDescriptor(format!(
                            "{text}: variant must be a positive integer"
                        ))
                    })?;
                (path, Some(variant))
            }
            None => (text, None),
        };

        let segments: SmallVec<[String; 4]> =
            path.split(SEGMENT_SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(BindError::InvalidDescriptor(format!("{text}: empty segment")));
        }

        Ok(Self { segments, variant })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// 1-based variant number, if any
    pub fn variant(&self) -> Option<u32> {
        self.variant
    }

    /// Descriptor text without the variant suffix
    pub fn base_path(&self) -> String {
        self.segments.join(".")
    }

    pub fn with_variant(mut self, variant: Option<u32>) -> Self {
        self.variant = variant;
        self
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_path())?;
        if let Some(n) = self.variant {
            write!(f, "{VARIANT_SEPARATOR}{n}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Descriptor {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
