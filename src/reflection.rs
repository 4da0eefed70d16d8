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

//! Runtime reflection surface of host scriptable objects.
//!
//! A host type describes itself once with a [`TypeInfo`]: its reflected
//! fields (with getter/setter closures), its reflected methods (with an
//! invoker closure), and an optional parent type. Setup actions drive
//! objects purely through this surface.
//!
//! Parent types are modelled by composition: a field or method declared on a
//! parent is reached through [`Scriptable::as_type_mut`], which returns the
//! embedded base object.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::error::{BindError, Result};
use crate::value::{Colour, TextureRef, Transform, Value, ValueType};

bitflags! {
    /// Reflected field flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        const EDITOR_ONLY = 1 << 0;
        const DEPRECATED = 1 << 1;
        const CONST = 1 << 2;
        const TRANSIENT = 1 << 3;
    }
}

bitflags! {
    /// Reflected method flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const PUBLIC = 1 << 0;
        const PROTECTED = 1 << 1;
        const PRIVATE = 1 << 2;
        const STATIC = 1 << 3;
        const EVENT = 1 << 4;
        const DELEGATE = 1 << 5;
        const MULTICAST_DELEGATE = 1 << 6;
        const EDITOR_ONLY = 1 << 7;
        const CONST = 1 << 8;
    }
}

bitflags! {
    /// Reflected method parameter flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u32 {
        const OUT = 1 << 0;
        const RETURN = 1 << 1;
        const REFERENCE = 1 << 2;
    }
}

/// Enumeration backing a byte field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumInfo {
    pub name: String,
    pub variants: Vec<String>,
    /// Last variant is a `MAX` style count marker, not a real value
    pub trailing_sentinel: bool,
}

impl EnumInfo {
    pub fn new<S: Into<String>>(name: impl Into<String>, variants: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
            trailing_sentinel: false,
        }
    }

    pub fn with_sentinel(mut self) -> Self {
        self.trailing_sentinel = true;
        self
    }

    /// Number of selectable values
    pub fn valid_count(&self) -> usize {
        if self.trailing_sentinel {
            self.variants.len().saturating_sub(1)
        } else {
            self.variants.len()
        }
    }

    /// Clamp an ordinal into the selectable range
    pub fn clamp_index(&self, index: i32) -> u8 {
        let last = self.valid_count().saturating_sub(1) as i32;
        index.clamp(0, last.max(0)) as u8
    }

    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.variants[..self.valid_count()]
            .iter()
            .position(|v| v == name)
            .map(|i| i as u8)
    }
}

/// Declared storage type of a reflected field or parameter
#[derive(Clone, Debug, PartialEq)]
pub enum HostKind {
    Int32,
    UInt32,
    Float,
    Double,
    Bool,
    Str,
    Name,
    Text,
    LinearColour,
    /// 8-bit sRGB colour
    Colour8,
    Vector,
    Transform,
    Texture,
    /// Byte, optionally backed by an enumeration
    Byte(Option<Arc<EnumInfo>>),
    /// Reference to another reflected object type
    Object(TypeId),
    /// Anything reflection cannot bind (arrays, maps, delegates, ...)
    Unsupported(&'static str),
}

impl HostKind {
    /// Bindable value type for this storage, `None` if not bindable
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            HostKind::Int32 | HostKind::UInt32 | HostKind::Byte(_) => Some(ValueType::Integer),
            HostKind::Float | HostKind::Double => Some(ValueType::Float),
            HostKind::Bool => Some(ValueType::Bool),
            HostKind::Str | HostKind::Name | HostKind::Text => Some(ValueType::String),
            HostKind::LinearColour | HostKind::Colour8 => Some(ValueType::Colour),
            HostKind::Vector => Some(ValueType::Vector),
            HostKind::Transform => Some(ValueType::Frame),
            HostKind::Texture => Some(ValueType::Texture),
            HostKind::Object(_) | HostKind::Unsupported(_) => None,
        }
    }

    pub fn enum_info(&self) -> Option<&Arc<EnumInfo>> {
        match self {
            HostKind::Byte(info) => info.as_ref(),
            _ => None,
        }
    }

    /// Whether a default slot owns heap storage that needs explicit teardown
    pub fn owns_storage(&self) -> bool {
        matches!(
            self,
            HostKind::Str | HostKind::Name | HostKind::Text | HostKind::Texture
        )
    }
}

/// A value in host storage form
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Name(String),
    Text(String),
    LinearColour(Colour),
    Colour8([u8; 4]),
    Vector(Vec3),
    Transform(Transform),
    Texture(Option<TextureRef>),
    Byte(u8),
    /// The object a method is being invoked on
    Target,
    /// Empty object reference
    Null,
}

impl HostValue {
    /// Zeroed or default-constructed slot for `kind`
    pub fn default_for(kind: &HostKind) -> HostValue {
        match kind {
            HostKind::Int32 => HostValue::I32(0),
            HostKind::UInt32 => HostValue::U32(0),
            HostKind::Float => HostValue::F32(0.0),
            HostKind::Double => HostValue::F64(0.0),
            HostKind::Bool => HostValue::Bool(false),
            HostKind::Str => HostValue::Str(String::new()),
            HostKind::Name => HostValue::Name(String::new()),
            HostKind::Text => HostValue::Text(String::new()),
            HostKind::LinearColour => HostValue::LinearColour(Colour::new(0.0, 0.0, 0.0, 0.0)),
            HostKind::Colour8 => HostValue::Colour8([0; 4]),
            HostKind::Vector => HostValue::Vector(Vec3::ZERO),
            HostKind::Transform => HostValue::Transform(Transform::IDENTITY),
            HostKind::Texture => HostValue::Texture(None),
            HostKind::Byte(_) => HostValue::Byte(0),
            HostKind::Object(_) | HostKind::Unsupported(_) => HostValue::Null,
        }
    }

    /// Convert a resolved value into storage form for `kind`.
    ///
    /// `value` must already be of `kind.value_type()`, enum bytes excepted
    /// (those also take a string naming the variant).
    pub fn from_value(kind: &HostKind, value: Value) -> Result<HostValue> {
        let converted = match (kind, value) {
            (HostKind::Int32, Value::Integer(v)) => HostValue::I32(v),
            (HostKind::UInt32, Value::Integer(v)) => HostValue::U32(v.max(0) as u32),
            (HostKind::Float, Value::Float(v)) => HostValue::F32(v),
            (HostKind::Double, Value::Float(v)) => HostValue::F64(v as f64),
            (HostKind::Bool, Value::Bool(v)) => HostValue::Bool(v),
            (HostKind::Str, Value::String(v)) => HostValue::Str(v),
            (HostKind::Name, Value::String(v)) => HostValue::Name(v),
            (HostKind::Text, Value::String(v)) => HostValue::Text(v),
            (HostKind::LinearColour, Value::Colour(c)) => HostValue::LinearColour(c),
            (HostKind::Colour8, Value::Colour(c)) => HostValue::Colour8(c.to_srgb8()),
            (HostKind::Vector, Value::Vector(v)) => HostValue::Vector(v),
            (HostKind::Transform, Value::Frame(f)) => HostValue::Transform(f.to_transform()),
            (HostKind::Texture, Value::Texture(t)) => HostValue::Texture(t),
            (HostKind::Byte(None), Value::Integer(v)) => HostValue::Byte(v.clamp(0, 255) as u8),
            (HostKind::Byte(Some(info)), Value::Integer(v)) => HostValue::Byte(info.clamp_index(v)),
            (HostKind::Byte(Some(info)), Value::String(name)) => match info.index_of(&name) {
                Some(index) => HostValue::Byte(index),
                None => {
                    return Err(BindError::HostRejected(format!(
                        "'{name}' is not a value of {}",
                        info.name
                    )))
                }
            },
            (kind, value) => {
                return Err(BindError::HostRejected(format!(
                    "{} cannot be stored as {kind:?}",
                    value.value_type()
                )))
            }
        };
        Ok(converted)
    }
}

type Getter = Arc<dyn Fn(&dyn Any) -> Option<HostValue> + Send + Sync>;
type Setter = Arc<dyn Fn(&mut dyn Any, HostValue) -> bool + Send + Sync>;
type Invoker = Arc<dyn Fn(&mut dyn Any, &mut [HostValue]) + Send + Sync>;

/// Reflected field
#[derive(Clone)]
pub struct FieldInfo {
    pub name: String,
    pub kind: HostKind,
    pub flags: FieldFlags,
    pub owner: TypeId,
    getter: Getter,
    setter: Setter,
}

impl FieldInfo {
    pub fn get(&self, object: &dyn Any) -> Option<HostValue> {
        (self.getter)(object)
    }

    /// Write through the setter, false if the object or value was rejected
    pub fn set(&self, object: &mut dyn Any, value: HostValue) -> bool {
        (self.setter)(object, value)
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Reflected method parameter
#[derive(Clone, Debug, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub kind: HostKind,
    pub flags: ParamFlags,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, kind: HostKind) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: ParamFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Reflected method
#[derive(Clone)]
pub struct MethodInfo {
    pub name: String,
    pub flags: MethodFlags,
    pub params: Vec<ParamInfo>,
    pub owner: TypeId,
    invoker: Invoker,
}

impl MethodInfo {
    /// Call with a fully populated parameter frame
    pub fn invoke(&self, object: &mut dyn Any, frame: &mut [HostValue]) {
        (self.invoker)(object, frame)
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("params", &self.params)
            .finish()
    }
}

/// Reflected description of one host type
pub struct TypeInfo {
    pub name: String,
    pub type_id: TypeId,
    pub parent: Option<Arc<TypeInfo>>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    factory: Option<Arc<dyn Fn() -> Box<dyn Scriptable> + Send + Sync>>,
}

impl TypeInfo {
    pub fn builder<T: Any + Send>(name: impl Into<String>) -> TypeInfoBuilder<T> {
        TypeInfoBuilder {
            info: TypeInfo {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                parent: None,
                fields: Vec::new(),
                methods: Vec::new(),
                factory: None,
            },
            _marker: std::marker::PhantomData,
        }
    }

    /// True if this type is `type_id` or derives from it
    pub fn is_a(&self, type_id: TypeId) -> bool {
        let mut current = Some(self);
        while let Some(info) = current {
            if info.type_id == type_id {
                return true;
            }
            current = info.parent.as_deref();
        }
        false
    }

    /// This type followed by its ancestors
    pub fn lineage(&self) -> impl Iterator<Item = &TypeInfo> {
        std::iter::successors(Some(self), |info| info.parent.as_deref())
    }

    /// Name of `type_id` within this lineage
    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.lineage()
            .find(|info| info.type_id == type_id)
            .map(|info| info.name.as_str())
    }

    /// New default instance, if the type registered a constructor
    pub fn instantiate(&self) -> Option<Box<dyn Scriptable>> {
        self.factory.as_ref().map(|f| f())
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| &p.name))
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Builds a [`TypeInfo`] with typed accessor closures
pub struct TypeInfoBuilder<T> {
    info: TypeInfo,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Send> TypeInfoBuilder<T> {
    pub fn extends(mut self, parent: Arc<TypeInfo>) -> Self {
        self.info.parent = Some(parent);
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: HostKind,
        get: impl Fn(&T) -> HostValue + Send + Sync + 'static,
        set: impl Fn(&mut T, HostValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.info.fields.push(FieldInfo {
            name: name.into(),
            kind,
            flags: FieldFlags::empty(),
            owner: TypeId::of::<T>(),
            getter: Arc::new(move |object: &dyn Any| object.downcast_ref::<T>().map(&get)),
            setter: Arc::new(move |object: &mut dyn Any, value: HostValue| match object.downcast_mut::<T>() {
                Some(object) => set(object, value),
                None => false,
            }),
        });
        self
    }

    /// Set flags on the most recently added field
    pub fn field_flags(mut self, flags: FieldFlags) -> Self {
        if let Some(field) = self.info.fields.last_mut() {
            field.flags = flags;
        }
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        flags: MethodFlags,
        params: Vec<ParamInfo>,
        invoke: impl Fn(&mut T, &mut [HostValue]) + Send + Sync + 'static,
    ) -> Self {
        self.info.methods.push(MethodInfo {
            name: name.into(),
            flags,
            params,
            owner: TypeId::of::<T>(),
            invoker: Arc::new(move |object: &mut dyn Any, frame: &mut [HostValue]| {
                if let Some(object) = object.downcast_mut::<T>() {
                    invoke(object, frame);
                }
            }),
        });
        self
    }

    pub fn build(self) -> Arc<TypeInfo> {
        Arc::new(self.info)
    }
}

impl<T: Scriptable + Default> TypeInfoBuilder<T> {
    /// Register `T::default` as the template constructor
    pub fn constructible(mut self) -> Self {
        self.info.factory = Some(Arc::new(|| Box::new(T::default()) as Box<dyn Scriptable>));
        self
    }
}

/// Host object driven through reflection
pub trait Scriptable: Any + Send {
    fn type_info(&self) -> Arc<TypeInfo>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The part of this object that is of type `type_id`.
    ///
    /// Types embedding a base object override this to return the base.
    fn as_type_mut(&mut self, type_id: TypeId) -> Option<&mut dyn Any> {
        if self.as_any().type_id() == type_id {
            Some(self.as_any_mut())
        } else {
            None
        }
    }
}

/// Implement [`Scriptable`] for a type whose reflection info comes from a function
#[macro_export]
macro_rules! impl_scriptable {
    ($t:ty, $info:expr) => {
        impl $crate::reflection::Scriptable for $t {
            fn type_info(&self) -> std::sync::Arc<$crate::reflection::TypeInfo> {
                ($info)()
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

/// Registry for reflected host types, by name and by type id
#[derive(Default)]
pub struct TypeRegistry {
    by_name: FxHashMap<String, Arc<TypeInfo>>,
    by_id: FxHashMap<TypeId, Arc<TypeInfo>>,
}

impl TypeRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and its ancestors
    pub fn register(&mut self, info: Arc<TypeInfo>) {
        if let Some(parent) = &info.parent {
            if !self.by_id.contains_key(&parent.type_id) {
                self.register(parent.clone());
            }
        }
        self.by_id.insert(info.type_id, info.clone());
        self.by_name.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeInfo>> {
        self.by_name.get(name)
    }

    pub fn get_by_id(&self, type_id: TypeId) -> Option<&Arc<TypeInfo>> {
        self.by_id.get(&type_id)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
