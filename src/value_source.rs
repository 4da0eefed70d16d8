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

//! Configurable values: a literal constant or a reference into the incoming
//! parameter collection.
//!
//! All type coercion happens here, so setting a property and passing a
//! method argument behave identically.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entry::ExpectedParameter;
use crate::error::{BindError, Result};
use crate::ids::AssetId;
use crate::parameters::ParameterCollection;
use crate::value::{Colour, Frame, TextureRef, Value, ValueType};

/// Which half of a [`ValueSource`] is active
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Constant,
    Parameter,
}

/// Declared parameters a value source is resolved against.
///
/// Texture parameters are indexed after the regular ones; when a texture
/// index falls past the regular parameters it is looked up in `texture_ids`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParameterContext<'a> {
    pub parameters: &'a [ExpectedParameter],
    pub textures: &'a [ExpectedParameter],
    pub texture_ids: &'a [AssetId],
}

impl<'a> ParameterContext<'a> {
    pub fn new(parameters: &'a [ExpectedParameter]) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    pub fn with_textures(
        mut self,
        textures: &'a [ExpectedParameter],
        texture_ids: &'a [AssetId],
    ) -> Self {
        self.textures = textures;
        self.texture_ids = texture_ids;
        self
    }

    /// Combined index and declaration of parameter `id`
    pub fn find(&self, id: u32) -> Option<(usize, &'a ExpectedParameter)> {
        self.parameters
            .iter()
            .chain(self.textures.iter())
            .enumerate()
            .find(|(_, p)| p.id == id)
    }

    /// Live value for the declared parameter at combined `index`
    fn live_value(&self, params: &dyn ParameterCollection, index: usize) -> Option<Value> {
        let regular = self.parameters.len();
        if index >= regular {
            let id = self.texture_ids.get(index - regular)?;
            return Some(Value::Texture(Some(TextureRef::Id(*id))));
        }
        params.value(index)
    }
}

/// A constant or a parameter reference, with the constant always kept
///
/// Switching `source` never discards the authored constant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueSource {
    source: SourceKind,
    value_type: ValueType,
    #[serde(default)]
    constant: Option<Value>,
    #[serde(default)]
    parameter: u32,
}

impl ValueSource {
    /// Constant source holding the zero value of `value_type`
    pub fn new(value_type: ValueType) -> Self {
        Self::constant(Value::zero(value_type))
    }

    pub fn constant(value: Value) -> Self {
        Self {
            source: SourceKind::Constant,
            value_type: value.value_type(),
            constant: Some(value),
            parameter: 0,
        }
    }

    pub fn parameter(value_type: ValueType, id: u32) -> Self {
        Self {
            source: SourceKind::Parameter,
            value_type,
            constant: Some(Value::zero(value_type)),
            parameter: id,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn constant_value(&self) -> Option<&Value> {
        self.constant.as_ref()
    }

    pub fn parameter_id(&self) -> u32 {
        self.parameter
    }

    /// Change the active type, keeping any existing constant
    pub fn set_type(&mut self, value_type: ValueType) {
        if self.value_type != value_type || self.constant.is_none() {
            self.value_type = value_type;
            self.ensure_constant();
        }
    }

    /// Bind to parameter `id` and make the parameter half active
    pub fn set_parameter(&mut self, id: u32) {
        self.ensure_constant();
        self.parameter = id;
        self.source = SourceKind::Parameter;
    }

    /// Store a literal and make the constant half active
    pub fn set_constant(&mut self, value: Value) {
        self.value_type = value.value_type();
        self.constant = Some(value);
        self.source = SourceKind::Constant;
    }

    /// Reset to the zero constant of `value_type`
    pub fn set_default(&mut self, value_type: ValueType) {
        self.set_constant(Value::zero(value_type));
    }

    /// Flip the active half without touching either payload
    pub fn set_source(&mut self, source: SourceKind) {
        self.ensure_constant();
        self.source = source;
    }

    fn ensure_constant(&mut self) {
        if self.constant.is_none() {
            self.constant = Some(Value::zero(self.value_type));
        }
    }

    /// Resolve as `want`.
    ///
    /// Fails when a referenced parameter is not declared by the context or
    /// when no coercion exists from the available type. A parameter that is
    /// declared but absent or mistyped in the live collection yields the zero
    /// value, as does a parameter id of `0`.
    pub fn resolve(
        &self,
        want: ValueType,
        params: &dyn ParameterCollection,
        ctx: &ParameterContext<'_>,
    ) -> Result<Value> {
        match self.source {
            SourceKind::Constant => {
                let value = self
                    .constant
                    .clone()
                    .unwrap_or_else(|| Value::zero(self.value_type));
                let from = value.value_type();
                value
                    .coerce(want)
                    .ok_or(BindError::NoCoercion { from, to: want })
            }
            SourceKind::Parameter => {
                if self.parameter == 0 {
                    return Ok(Value::zero(want));
                }
                let (index, expected) = ctx
                    .find(self.parameter)
                    .ok_or(BindError::UnknownParameter(self.parameter))?;
                if !can_coerce(expected.kind, want) {
                    return Err(BindError::NoCoercion {
                        from: expected.kind,
                        to: want,
                    });
                }
                let live = ctx
                    .live_value(params, index)
                    .filter(|v| v.value_type() == expected.kind)
                    .and_then(|v| v.coerce(want));
                Ok(live.unwrap_or_else(|| Value::zero(want)))
            }
        }
    }

    /// Editor facing summary of what this source will produce
    pub fn describe(&self, ctx: Option<&ParameterContext<'_>>) -> String {
        match self.source {
            SourceKind::Constant => match &self.constant {
                Some(value) => value.describe(),
                None => "unset".to_string(),
            },
            SourceKind::Parameter => {
                let declared = ctx.and_then(|c| c.find(self.parameter));
                match declared {
                    Some((_, p)) => format!("parameter {} ({})", p.id, p.name),
                    None if self.parameter == 0 => "default".to_string(),
                    None => format!("missing parameter {}", self.parameter),
                }
            }
        }
    }

    /// Rewrite a parameter reference, used by legacy upgrade
    pub(crate) fn remap_parameter(&mut self, id: u32) {
        self.parameter = id;
    }
}

/// Whether a value of type `from` can be coerced to `to`
pub fn can_coerce(from: ValueType, to: ValueType) -> bool {
    Value::zero(from).coerce(to).is_some()
}

macro_rules! lenient_resolve {
    ($($fn_name:ident => $variant:ident : $ty:ty = $zero:expr),* $(,)?) => {
        impl ValueSource {
            $(
                /// Resolve, falling back to the zero value with a warning
                pub fn $fn_name(
                    &self,
                    params: &dyn ParameterCollection,
                    ctx: &ParameterContext<'_>,
                ) -> $ty {
                    match self.resolve(ValueType::$variant, params, ctx) {
                        Ok(Value::$variant(v)) => v,
                        Ok(_) => $zero,
                        Err(err) => {
                            tracing::warn!(error = %err, "value source fell back to default");
                            $zero
                        }
                    }
                }
            )*
        }
    };
}

lenient_resolve! {
    resolve_integer => Integer: i32 = 0,
    resolve_float => Float: f32 = 0.0,
    resolve_bool => Bool: bool = false,
    resolve_string => String: String = String::new(),
    resolve_colour => Colour: Colour = Colour::BLACK,
    resolve_vector => Vector: Vec3 = Vec3::ZERO,
    resolve_frame => Frame: Frame = Frame::IDENTITY,
    resolve_texture => Texture: Option<TextureRef> = None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterList;

    fn declared() -> Vec<ExpectedParameter> {
        vec![
            ExpectedParameter::new(1, ValueType::Integer, "Count"),
            ExpectedParameter::new(2, ValueType::Vector, "Tint"),
            ExpectedParameter::new(3, ValueType::Frame, "Placement"),
            ExpectedParameter::new(4, ValueType::Bool, "Lit"),
        ]
    }

    fn live() -> ParameterList {
        ParameterList::new()
            .with(1, Value::Integer(12))
            .with(2, Value::Vector(Vec3::new(0.1, 0.2, 0.3)))
            .with(3, Value::Frame(Frame::new(Vec3::ZERO, Vec3::new(4.0, 5.0, 6.0))))
            .with(4, Value::Bool(true))
    }

    #[test]
    fn test_constant_ignores_collection() {
        let source = ValueSource::constant(Value::String("Lamp".into()));
        let params = live();
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        assert_eq!(source.resolve_string(&params, &ctx), "Lamp");
    }

    #[test]
    fn test_parameter_resolves_by_id() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let params = live();
        let source = ValueSource::parameter(ValueType::Integer, 1);
        assert_eq!(source.resolve_integer(&params, &ctx), 12);
    }

    #[test]
    fn test_parameter_coercions() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let params = live();

        let tint = ValueSource::parameter(ValueType::Colour, 2);
        assert_eq!(
            tint.resolve_colour(&params, &ctx),
            Colour::new(0.1, 0.2, 0.3, 1.0)
        );

        let size = ValueSource::parameter(ValueType::Vector, 3);
        assert_eq!(size.resolve_vector(&params, &ctx), Vec3::new(4.0, 5.0, 6.0));

        let scale = ValueSource::parameter(ValueType::Frame, 2);
        assert_eq!(
            scale.resolve_frame(&params, &ctx).size,
            Vec3::new(0.1, 0.2, 0.3)
        );
    }

    #[test]
    fn test_missing_rule_is_an_error() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let params = live();
        let source = ValueSource::parameter(ValueType::Colour, 4);
        assert_eq!(
            source.resolve(ValueType::Colour, &params, &ctx),
            Err(BindError::NoCoercion {
                from: ValueType::Bool,
                to: ValueType::Colour
            })
        );
        assert_eq!(source.resolve_colour(&params, &ctx), Colour::BLACK);
    }

    #[test]
    fn test_dangling_and_unbound_parameters() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let params = live();

        let dangling = ValueSource::parameter(ValueType::Integer, 99);
        assert_eq!(
            dangling.resolve(ValueType::Integer, &params, &ctx),
            Err(BindError::UnknownParameter(99))
        );

        let unbound = ValueSource::parameter(ValueType::Float, 0);
        assert_eq!(
            unbound.resolve(ValueType::Float, &params, &ctx),
            Ok(Value::Float(0.0))
        );
    }

    #[test]
    fn test_short_collection_yields_zero() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let params = ParameterList::new().with(1, Value::Integer(3));
        let source = ValueSource::parameter(ValueType::Bool, 4);
        assert_eq!(
            source.resolve(ValueType::Bool, &params, &ctx),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn test_textures_indexed_after_regular_parameters() {
        let decl = declared();
        let textures = vec![
            ExpectedParameter::new(1_000_000, ValueType::Texture, "Albedo"),
            ExpectedParameter::new(1_000_001, ValueType::Texture, "Normal"),
        ];
        let ids = [AssetId::from_raw(40), AssetId::from_raw(41)];
        let ctx = ParameterContext::new(&decl).with_textures(&textures, &ids);
        let params = live();

        let normal = ValueSource::parameter(ValueType::Texture, 1_000_001);
        assert_eq!(
            normal.resolve_texture(&params, &ctx),
            Some(TextureRef::Id(AssetId::from_raw(41)))
        );
        assert_eq!(ctx.find(1_000_000).map(|(i, _)| i), Some(4));
    }

    #[test]
    fn test_set_type_twice_preserves_constant() {
        let mut source = ValueSource::constant(Value::Integer(5));
        source.set_type(ValueType::Integer);
        let before = source.clone();
        source.set_type(ValueType::Integer);
        assert_eq!(source, before);
        assert_eq!(source.constant_value(), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_switching_source_keeps_constant() {
        let mut source = ValueSource::constant(Value::Float(2.5));
        source.set_parameter(7);
        assert_eq!(source.source(), SourceKind::Parameter);
        assert_eq!(source.constant_value(), Some(&Value::Float(2.5)));
        source.set_source(SourceKind::Constant);
        assert_eq!(source.parameter_id(), 7);
        assert_eq!(source.constant_value(), Some(&Value::Float(2.5)));
    }

    #[test]
    fn test_deserialized_without_constant_gets_one() {
        let mut source: ValueSource =
            serde_json::from_str(r#"{"source":"Parameter","value_type":"Colour","parameter":3}"#)
                .unwrap();
        assert_eq!(source.constant_value(), None);
        source.set_type(ValueType::Colour);
        assert_eq!(source.constant_value(), Some(&Value::Colour(Colour::BLACK)));
    }

    #[test]
    fn test_describe() {
        let decl = declared();
        let ctx = ParameterContext::new(&decl);
        let source = ValueSource::parameter(ValueType::Integer, 1);
        assert_eq!(source.describe(Some(&ctx)), "parameter 1 (Count)");
        assert_eq!(
            ValueSource::constant(Value::Bool(true)).describe(None),
            "true"
        );
    }
}
