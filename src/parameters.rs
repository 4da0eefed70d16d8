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

//! Parameter collections supplied by the generation engine.
//!
//! A collection is an ordered bag of typed values, each with a stable numeric
//! id and an optional name. Readers bracket their reads with
//! [`ParameterCollection::begin_access`] / [`ParameterCollection::end_access`];
//! [`AccessScope`] does that for you.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;

use crate::ids::AssetId;
use crate::value::{Colour, Frame, TextureRef, Value, ValueType};

/// Kind of a stored parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Integer,
    Float,
    Bool,
    String,
    Colour,
    Vector,
    Frame,
    Texture,
    List,
}

impl ParameterKind {
    /// Value type this kind carries, lists have none
    pub fn value_type(self) -> Option<ValueType> {
        match self {
            ParameterKind::Integer => Some(ValueType::Integer),
            ParameterKind::Float => Some(ValueType::Float),
            ParameterKind::Bool => Some(ValueType::Bool),
            ParameterKind::String => Some(ValueType::String),
            ParameterKind::Colour => Some(ValueType::Colour),
            ParameterKind::Vector => Some(ValueType::Vector),
            ParameterKind::Frame => Some(ValueType::Frame),
            ParameterKind::Texture => Some(ValueType::Texture),
            ParameterKind::List => None,
        }
    }
}

/// Read access to an engine supplied parameter bag
pub trait ParameterCollection: Send + Sync {
    /// Start a read pass, returns the number of parameters
    fn begin_access(&self) -> usize;

    /// Finish a read pass
    fn end_access(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self, index: usize) -> Option<ParameterKind>;

    fn id(&self, index: usize) -> Option<u32>;

    fn name(&self, index: usize) -> Option<&str>;

    /// Value at `index`, `None` for lists and out of range
    fn value(&self, index: usize) -> Option<Value>;

    /// Nested list at `index`
    fn list(&self, index: usize) -> Option<&dyn ParameterCollection>;

    fn find_index(&self, id: u32) -> Option<usize> {
        (0..self.len()).find(|&i| self.id(i) == Some(id))
    }

    fn integer(&self, index: usize) -> Option<i32> {
        match self.value(index)? {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }

    fn float(&self, index: usize) -> Option<f32> {
        match self.value(index)? {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    fn bool(&self, index: usize) -> Option<bool> {
        match self.value(index)? {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn string(&self, index: usize) -> Option<String> {
        match self.value(index)? {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    fn colour(&self, index: usize) -> Option<Colour> {
        match self.value(index)? {
            Value::Colour(v) => Some(v),
            _ => None,
        }
    }

    fn vector(&self, index: usize) -> Option<Vec3> {
        match self.value(index)? {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    fn frame(&self, index: usize) -> Option<Frame> {
        match self.value(index)? {
            Value::Frame(v) => Some(v),
            _ => None,
        }
    }

    fn texture(&self, index: usize) -> Option<TextureRef> {
        match self.value(index)? {
            Value::Texture(v) => v,
            _ => None,
        }
    }

    fn find_value(&self, id: u32) -> Option<Value> {
        self.value(self.find_index(id)?)
    }
}

/// RAII guard for [`ParameterCollection::begin_access`]
pub struct AccessScope<'a> {
    params: &'a dyn ParameterCollection,
    len: usize,
}

impl<'a> AccessScope<'a> {
    pub fn new(params: &'a dyn ParameterCollection) -> Self {
        let len = params.begin_access();
        Self { params, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn params(&self) -> &'a dyn ParameterCollection {
        self.params
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        self.params.end_access();
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ParameterData {
    Value(Value),
    List(ParameterList),
}

#[derive(Debug, Clone, PartialEq)]
struct Parameter {
    id: u32,
    name: Option<String>,
    data: ParameterData,
}

/// In-memory parameter collection
#[derive(Debug, Default)]
pub struct ParameterList {
    parameters: Vec<Parameter>,
    readers: AtomicUsize,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value
    pub fn push(&mut self, id: u32, value: Value) -> &mut Self {
        self.parameters.push(Parameter {
            id,
            name: None,
            data: ParameterData::Value(value),
        });
        self
    }

    /// Append a named value
    pub fn push_named(&mut self, id: u32, name: impl Into<String>, value: Value) -> &mut Self {
        self.parameters.push(Parameter {
            id,
            name: Some(name.into()),
            data: ParameterData::Value(value),
        });
        self
    }

    /// Append a nested list
    pub fn push_list(&mut self, id: u32, list: ParameterList) -> &mut Self {
        self.parameters.push(Parameter {
            id,
            name: None,
            data: ParameterData::List(list),
        });
        self
    }

    pub fn with(mut self, id: u32, value: Value) -> Self {
        self.push(id, value);
        self
    }

    pub fn with_texture(mut self, id: u32, texture: AssetId) -> Self {
        self.push(id, Value::Texture(Some(TextureRef::Id(texture))));
        self
    }

    /// Overwrite the value at `index`, returns false if out of range
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.parameters.get_mut(index) {
            Some(p) => {
                p.data = ParameterData::Value(value);
                true
            }
            None => false,
        }
    }

    /// Number of open read passes
    pub fn readers(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }
}

impl Clone for ParameterList {
    fn clone(&self) -> Self {
        Self {
            parameters: self.parameters.clone(),
            readers: AtomicUsize::new(0),
        }
    }
}

impl PartialEq for ParameterList {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
    }
}

impl ParameterCollection for ParameterList {
    fn begin_access(&self) -> usize {
        self.readers.fetch_add(1, Ordering::AcqRel);
        self.parameters.len()
    }

    fn end_access(&self) {
        let prev = self.readers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "end_access without begin_access");
    }

    fn len(&self) -> usize {
        self.parameters.len()
    }

    fn kind(&self, index: usize) -> Option<ParameterKind> {
        let p = self.parameters.get(index)?;
        Some(match &p.data {
            ParameterData::List(_) => ParameterKind::List,
            ParameterData::Value(v) => match v.value_type() {
                ValueType::Integer => ParameterKind::Integer,
                ValueType::Float => ParameterKind::Float,
                ValueType::Bool => ParameterKind::Bool,
                ValueType::String => ParameterKind::String,
                ValueType::Colour => ParameterKind::Colour,
                ValueType::Vector => ParameterKind::Vector,
                ValueType::Frame => ParameterKind::Frame,
                ValueType::Texture => ParameterKind::Texture,
            },
        })
    }

    fn id(&self, index: usize) -> Option<u32> {
        self.parameters.get(index).map(|p| p.id)
    }

    fn name(&self, index: usize) -> Option<&str> {
        self.parameters.get(index)?.name.as_deref()
    }

    fn value(&self, index: usize) -> Option<Value> {
        match &self.parameters.get(index)?.data {
            ParameterData::Value(v) => Some(v.clone()),
            ParameterData::List(_) => None,
        }
    }

    fn list(&self, index: usize) -> Option<&dyn ParameterCollection> {
        match &self.parameters.get(index)?.data {
            ParameterData::List(list) => Some(list),
            ParameterData::Value(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterList {
        let mut nested = ParameterList::new();
        nested.push(1, Value::Integer(7));

        let mut list = ParameterList::new();
        list.push_named(1, "Count", Value::Integer(3))
            .push(2, Value::Float(0.5))
            .push(5, Value::Vector(Vec3::new(1.0, 2.0, 3.0)))
            .push_list(9, nested);
        list
    }

    #[test]
    fn test_typed_accessors() {
        let list = sample();
        assert_eq!(list.integer(0), Some(3));
        assert_eq!(list.float(0), None);
        assert_eq!(list.float(1), Some(0.5));
        assert_eq!(list.vector(2), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(list.name(0), Some("Count"));
        assert_eq!(list.name(1), None);
        assert_eq!(list.kind(3), Some(ParameterKind::List));
        assert_eq!(list.value(3), None);
        assert_eq!(list.list(3).and_then(|l| l.integer(0)), Some(7));
    }

    #[test]
    fn test_find_by_id() {
        let list = sample();
        assert_eq!(list.find_index(5), Some(2));
        assert_eq!(list.find_index(4), None);
        assert_eq!(list.find_value(2), Some(Value::Float(0.5)));
    }

    #[test]
    fn test_access_scope_balances() {
        let list = sample();
        {
            let scope = AccessScope::new(&list);
            assert_eq!(scope.len(), 4);
            assert_eq!(list.readers(), 1);
            let _inner = AccessScope::new(&list);
            assert_eq!(list.readers(), 2);
        }
        assert_eq!(list.readers(), 0);
    }
}
