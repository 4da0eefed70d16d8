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

//! Per-type cache of bindable properties and methods.
//!
//! Discovery walks a [`TypeInfo`] and its ancestors once; the result is
//! memoized by type id and shared as `Arc<TypeCapabilities>`.

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::reflection::{
    FieldFlags, FieldInfo, HostKind, MethodFlags, MethodInfo, ParamFlags, TypeInfo,
};
use crate::value::ValueType;

const EXCLUDED_FIELD_FLAGS: FieldFlags = FieldFlags::EDITOR_ONLY
    .union(FieldFlags::DEPRECATED)
    .union(FieldFlags::CONST);

const EXCLUDED_METHOD_FLAGS: MethodFlags = MethodFlags::EVENT
    .union(MethodFlags::STATIC)
    .union(MethodFlags::DELEGATE)
    .union(MethodFlags::MULTICAST_DELEGATE)
    .union(MethodFlags::PRIVATE)
    .union(MethodFlags::PROTECTED)
    .union(MethodFlags::EDITOR_ONLY)
    .union(MethodFlags::CONST);

/// A bindable property
#[derive(Debug)]
pub struct PropertyCapability {
    pub name: String,
    pub value_type: ValueType,
    pub kind: HostKind,
    pub owner: TypeId,
    pub owner_name: String,
    field: FieldInfo,
}

impl PropertyCapability {
    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    /// Whether this is a byte field backed by an enumeration
    pub fn is_enum(&self) -> bool {
        self.kind.enum_info().is_some()
    }
}

/// One parameter slot of a bindable method
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentCapability {
    pub name: String,
    pub kind: HostKind,
    /// `None` only for the leading self slot
    pub value_type: Option<ValueType>,
    pub binds_target: bool,
}

/// A bindable method
#[derive(Debug)]
pub struct MethodCapability {
    pub name: String,
    pub owner: TypeId,
    pub owner_name: String,
    pub params: Vec<ArgumentCapability>,
    method: MethodInfo,
}

impl MethodCapability {
    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    /// Parameters filled from value sources, in positional order
    pub fn arguments(&self) -> impl Iterator<Item = &ArgumentCapability> {
        self.params.iter().filter(|p| !p.binds_target)
    }
}

/// Bindable surface of one type
#[derive(Debug)]
pub struct TypeCapabilities {
    pub type_name: String,
    pub type_id: TypeId,
    pub properties: Vec<Arc<PropertyCapability>>,
    pub methods: Vec<Arc<MethodCapability>>,
}

impl TypeCapabilities {
    /// Discover the bindable surface of `info`
    pub fn discover(info: &TypeInfo) -> Self {
        let mut properties: Vec<Arc<PropertyCapability>> = Vec::new();
        let mut methods: Vec<Arc<MethodCapability>> = Vec::new();

        for ty in info.lineage() {
            for field in &ty.fields {
                if properties.iter().any(|p| p.name == field.name) {
                    continue;
                }
                if let Some(property) = bindable_property(ty, field) {
                    properties.push(Arc::new(property));
                }
            }
            for method in &ty.methods {
                if methods.iter().any(|m| m.name == method.name) {
                    continue;
                }
                if let Some(capability) = bindable_method(ty, method) {
                    methods.push(Arc::new(capability));
                }
            }
        }

        properties.sort_by(|a, b| a.name.cmp(&b.name));
        methods.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            type_name: info.name.clone(),
            type_id: info.type_id,
            properties,
            methods,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Arc<PropertyCapability>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodCapability>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

fn bindable_property(owner: &TypeInfo, field: &FieldInfo) -> Option<PropertyCapability> {
    if field.flags.intersects(EXCLUDED_FIELD_FLAGS) {
        return None;
    }
    let value_type = field.kind.value_type()?;
    Some(PropertyCapability {
        name: field.name.clone(),
        value_type,
        kind: field.kind.clone(),
        owner: owner.type_id,
        owner_name: owner.name.clone(),
        field: field.clone(),
    })
}

/// Every parameter must be bindable, otherwise the whole method is dropped
fn bindable_method(owner: &TypeInfo, method: &MethodInfo) -> Option<MethodCapability> {
    if method.flags.intersects(EXCLUDED_METHOD_FLAGS) {
        return None;
    }

    let mut params = Vec::with_capacity(method.params.len());
    for (index, param) in method.params.iter().enumerate() {
        if param.flags.intersects(ParamFlags::OUT | ParamFlags::RETURN) {
            return None;
        }
        let binds_target = match param.kind {
            HostKind::Object(type_id) => index == 0 && owner.is_a(type_id),
            _ => false,
        };
        let value_type = param.kind.value_type();
        if value_type.is_none() && !binds_target {
            return None;
        }
        params.push(ArgumentCapability {
            name: param.name.clone(),
            kind: param.kind.clone(),
            value_type,
            binds_target,
        });
    }

    Some(MethodCapability {
        name: method.name.clone(),
        owner: owner.type_id,
        owner_name: owner.name.clone(),
        params,
        method: method.clone(),
    })
}

/// Memoized capability tables keyed by type id
#[derive(Default)]
pub struct CapabilityCache {
    entries: RwLock<FxHashMap<TypeId, Arc<TypeCapabilities>>>,
    discoveries: AtomicUsize,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities of `info`, discovered on first request
    pub fn get(&self, info: &TypeInfo) -> Arc<TypeCapabilities> {
        if let Some(found) = self.entries.read().get(&info.type_id) {
            return found.clone();
        }

        let mut entries = self.entries.write();
        entries
            .entry(info.type_id)
            .or_insert_with(|| {
                self.discoveries.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(type_name = %info.name, "discovering bindable capabilities");
                Arc::new(TypeCapabilities::discover(info))
            })
            .clone()
    }

    /// Number of discovery passes run so far
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{HostValue, ParamInfo};

    #[derive(Default)]
    struct Base {
        tag: String,
    }

    #[derive(Default)]
    struct Light {
        base: Base,
        intensity: f32,
    }

    fn base_info() -> Arc<TypeInfo> {
        TypeInfo::builder::<Base>("Base")
            .field(
                "Tag",
                HostKind::Name,
                |b| HostValue::Name(b.tag.clone()),
                |_, _| false,
            )
            .build()
    }

    fn light_info() -> Arc<TypeInfo> {
        let noop = |_: &mut Light, _: &mut [HostValue]| {};
        TypeInfo::builder::<Light>("Light")
            .extends(base_info())
            .field(
                "Intensity",
                HostKind::Float,
                |l| HostValue::F32(l.intensity),
                |_, _| false,
            )
            .field(
                "Cached",
                HostKind::Float,
                |l| HostValue::F32(l.intensity),
                |_, _| false,
            )
            .field_flags(FieldFlags::EDITOR_ONLY)
            .field(
                "Children",
                HostKind::Unsupported("array"),
                |_| HostValue::Null,
                |_, _| false,
            )
            .method("Toggle", MethodFlags::PUBLIC, vec![], noop)
            .method(
                "Attach",
                MethodFlags::PUBLIC,
                vec![
                    ParamInfo::new("Self", HostKind::Object(TypeId::of::<Light>())),
                    ParamInfo::new("Radius", HostKind::Float),
                ],
                noop,
            )
            .method(
                "Blend",
                MethodFlags::PUBLIC,
                vec![
                    ParamInfo::new("Weight", HostKind::Float),
                    ParamInfo::new("Curve", HostKind::Unsupported("curve")),
                ],
                noop,
            )
            .method(
                "Measure",
                MethodFlags::PUBLIC,
                vec![ParamInfo::new("Out", HostKind::Float).with_flags(ParamFlags::OUT)],
                noop,
            )
            .method("Internal", MethodFlags::PRIVATE, vec![], noop)
            .method("OnHit", MethodFlags::PUBLIC | MethodFlags::EVENT, vec![], noop)
            .method("Describe", MethodFlags::PUBLIC | MethodFlags::CONST, vec![], noop)
            .build()
    }

    #[test]
    fn test_properties_filtered_and_sorted() {
        let caps = TypeCapabilities::discover(&light_info());
        let names: Vec<_> = caps.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Intensity", "Tag"]);
        let tag = caps.property("Tag").unwrap();
        assert_eq!(tag.owner, TypeId::of::<Base>());
        assert_eq!(tag.value_type, ValueType::String);
    }

    #[test]
    fn test_methods_with_any_unbindable_parameter_are_excluded() {
        let caps = TypeCapabilities::discover(&light_info());
        let names: Vec<_> = caps.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Attach", "Toggle"]);

        let attach = caps.method("Attach").unwrap();
        assert!(attach.params[0].binds_target);
        let args: Vec<_> = attach.arguments().map(|a| a.name.as_str()).collect();
        assert_eq!(args, vec!["Radius"]);
    }

    #[test]
    fn test_cache_discovers_once_per_type() {
        let cache = CapabilityCache::new();
        let info = light_info();
        let first = cache.get(&info);
        let second = cache.get(&info);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.discoveries(), 1);

        cache.get(&base_info());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.discoveries(), 2);
    }
}
