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

//! Material parameter bindings.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::entry::{AssetEntry, ExpectedParameter};
use crate::error::BindError;
use crate::ids::AssetId;
use crate::parameters::{AccessScope, ParameterCollection};
use crate::setup::ApplyReport;
use crate::value::{TextureRef, Value, ValueType};
use crate::value_source::{ParameterContext, ValueSource};

/// First id handed to expected texture parameters
pub const FIRST_TEXTURE_ID: u32 = 1_000_000;

/// Host material instance parameters can be written to
pub trait MaterialInstance {
    fn set_scalar(&mut self, name: &str, value: f32);

    fn set_vector(&mut self, name: &str, value: Vec4);

    fn set_texture(&mut self, name: &str, texture: Option<&TextureRef>);
}

/// Binds one named material parameter to a value source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialBinding {
    pub parameter: String,
    pub value: ValueSource,
}

impl MaterialBinding {
    pub fn new(parameter: impl Into<String>, value: ValueSource) -> Self {
        Self {
            parameter: parameter.into(),
            value,
        }
    }
}

/// Material asset with parameter bindings and expected textures
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub base: AssetEntry,
    #[serde(default)]
    pub textures: Vec<ExpectedParameter>,
    #[serde(default)]
    pub bindings: Vec<MaterialBinding>,
}

impl MaterialEntry {
    /// Context resolving against this material's parameters and the
    /// texture ids supplied for its expected textures
    pub fn context<'a>(&'a self, texture_ids: &'a [AssetId]) -> ParameterContext<'a> {
        ParameterContext::new(&self.base.parameters).with_textures(&self.textures, texture_ids)
    }

    /// Give every texture with id `0` a fresh id above `first_id`
    pub fn normalize_textures(&mut self, first_id: u32) {
        let mut next = self
            .textures
            .iter()
            .map(|t| t.id + 1)
            .max()
            .unwrap_or(first_id)
            .max(first_id);
        for texture in self.textures.iter_mut().filter(|t| t.id == 0) {
            texture.id = next;
            texture.kind = ValueType::Texture;
            next += 1;
        }
    }

    /// Write every binding to `material`
    pub fn apply(
        &self,
        material: &mut dyn MaterialInstance,
        params: &dyn ParameterCollection,
        texture_ids: &[AssetId],
    ) -> ApplyReport {
        let ctx = self.context(texture_ids);
        let _access = AccessScope::new(params);
        let mut report = ApplyReport::default();

        for (index, binding) in self.bindings.iter().enumerate() {
            let want = binding.value.value_type();
            let result = match want {
                ValueType::Float | ValueType::Colour | ValueType::Texture => {
                    binding.value.resolve(want, params, &ctx)
                }
                other => Err(BindError::HostRejected(format!(
                    "materials cannot take {other} parameters"
                ))),
            };
            match result {
                Ok(Value::Float(v)) => material.set_scalar(&binding.parameter, v),
                Ok(Value::Colour(c)) => material.set_vector(&binding.parameter, c.to_vec4()),
                Ok(Value::Texture(t)) => material.set_texture(&binding.parameter, t.as_ref()),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(parameter = %binding.parameter, error = %err, "material binding failed");
                    report.failed.push((index, err));
                    continue;
                }
            }
            report.applied += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterList;
    use crate::value::Colour;

    #[derive(Default)]
    struct RecordingMaterial {
        writes: Vec<String>,
    }

    impl MaterialInstance for RecordingMaterial {
        fn set_scalar(&mut self, name: &str, value: f32) {
            self.writes.push(format!("{name}={value}"));
        }

        fn set_vector(&mut self, name: &str, value: Vec4) {
            self.writes.push(format!("{name}={:?}", value.to_array()));
        }

        fn set_texture(&mut self, name: &str, texture: Option<&TextureRef>) {
            self.writes.push(format!("{name}={texture:?}"));
        }
    }

    #[test]
    fn test_texture_ids_assigned_above_first() {
        let mut material = MaterialEntry::default();
        material.textures = vec![
            ExpectedParameter::new(0, ValueType::Texture, "Albedo"),
            ExpectedParameter::new(1_000_004, ValueType::Texture, "Mask"),
            ExpectedParameter::new(0, ValueType::Texture, "Normal"),
        ];
        material.normalize_textures(FIRST_TEXTURE_ID);
        let ids: Vec<u32> = material.textures.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1_000_005, 1_000_004, 1_000_006]);
    }

    #[test]
    fn test_apply_bindings() {
        let mut material = MaterialEntry::default();
        material.base.parameters = vec![ExpectedParameter::new(1, ValueType::Float, "Rough")];
        material.textures = vec![ExpectedParameter::new(FIRST_TEXTURE_ID, ValueType::Texture, "Albedo")];
        material.bindings = vec![
            MaterialBinding::new("Roughness", ValueSource::parameter(ValueType::Float, 1)),
            MaterialBinding::new("Base", ValueSource::constant(Value::Colour(Colour::WHITE))),
            MaterialBinding::new(
                "AlbedoMap",
                ValueSource::parameter(ValueType::Texture, FIRST_TEXTURE_ID),
            ),
            MaterialBinding::new("Flag", ValueSource::constant(Value::Bool(true))),
        ];

        let params = ParameterList::new().with(1, Value::Float(0.25));
        let textures = [AssetId::from_raw(12)];
        let mut target = RecordingMaterial::default();
        let report = material.apply(&mut target, &params, &textures);

        assert_eq!(report.applied, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            target.writes,
            vec![
                "Roughness=0.25".to_string(),
                "Base=[1.0, 1.0, 1.0, 1.0]".to_string(),
                format!("AlbedoMap={:?}", Some(&TextureRef::Id(AssetId::from_raw(12)))),
            ]
        );
    }
}
