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

//! Authored resource lists.
//!
//! A list owns two trees: the `Resources` tree searched by descriptors and
//! the `References` tree holding [`ListReference`] entries to other lists.
//! Nodes live in a slotmap and are shared as `Arc<ResourceEntry>`, so the
//! resolver can hold on to entries while the list is edited copy-on-write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::capability::CapabilityCache;
use crate::descriptor::{Descriptor, SEGMENT_SEPARATOR, VARIANT_SEPARATOR};
use crate::entry::{EntryKind, ListReference, ResourceEntry, VariantsEntry};
use crate::error::{BindError, Result};
use crate::reflection::TypeRegistry;

slotmap::new_key_type! {
    /// Key of a node within one [`ResourceList`]
    pub struct EntryKey;
}

/// Name of the references root
pub const REFERENCES_ROOT_NAME: &str = "References";

/// Tree of resource entries
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceList {
    name: String,
    entries: SlotMap<EntryKey, Arc<ResourceEntry>>,
    resources: EntryKey,
    references: EntryKey,
}

impl ResourceList {
    /// Create a list whose resources root is named after the list
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut entries = SlotMap::with_key();
        let resources = entries.insert(Arc::new(ResourceEntry::folder(name.clone())));
        let references = entries.insert(Arc::new(ResourceEntry::folder(REFERENCES_ROOT_NAME)));
        Self {
            name,
            entries,
            resources,
            references,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root of the searchable tree
    pub fn resources(&self) -> EntryKey {
        self.resources
    }

    /// Root of the list reference tree
    pub fn references_root(&self) -> EntryKey {
        self.references
    }

    /// Number of nodes, both roots included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: EntryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: EntryKey) -> Option<&ResourceEntry> {
        self.entries.get(key).map(|e| e.as_ref())
    }

    /// Shared handle to a node
    pub fn get_shared(&self, key: EntryKey) -> Option<&Arc<ResourceEntry>> {
        self.entries.get(key)
    }

    /// Mutable access to a node's payload.
    ///
    /// Structure and names are edited through [`add`](Self::add),
    /// [`remove`](Self::remove), [`rename`](Self::rename) and
    /// [`reparent`](Self::reparent).
    pub fn get_mut(&mut self, key: EntryKey) -> Option<&mut EntryKind> {
        self.entries
            .get_mut(key)
            .map(|e| &mut Arc::make_mut(e).kind)
    }

    pub fn children(&self, key: EntryKey) -> &[EntryKey] {
        self.entries
            .get(key)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryKey, &ResourceEntry)> {
        self.entries.iter().map(|(k, e)| (k, e.as_ref()))
    }

    /// Append `entry` as the last child of `parent`
    pub fn add(&mut self, parent: EntryKey, entry: ResourceEntry) -> Result<EntryKey> {
        if !self.entries.contains_key(parent) {
            return Err(BindError::EntryNotFound);
        }
        validate_name(&entry.name)?;
        self.check_placement(parent, &entry.kind)?;

        let mut entry = entry;
        entry.children.clear();
        let key = self.entries.insert(Arc::new(entry));
        self.attach(parent, key, None);
        Ok(key)
    }

    /// Insert `entry` at `index` among the children of `parent`
    pub fn insert(&mut self, parent: EntryKey, index: usize, entry: ResourceEntry) -> Result<EntryKey> {
        let key = self.add(parent, entry)?;
        self.detach(key);
        self.attach(parent, key, Some(index));
        Ok(key)
    }

    /// Remove `key` and its whole subtree
    pub fn remove(&mut self, key: EntryKey) -> Result<ResourceEntry> {
        if key == self.resources || key == self.references {
            return Err(BindError::InvalidEdit("cannot remove a root entry".to_string()));
        }
        if !self.entries.contains_key(key) {
            return Err(BindError::EntryNotFound);
        }
        self.detach(key);

        let mut stack = vec![key];
        let mut removed = None;
        while let Some(next) = stack.pop() {
            if let Some(entry) = self.entries.remove(next) {
                stack.extend(entry.children.iter().copied());
                if next == key {
                    removed = Some(Arc::unwrap_or_clone(entry));
                }
            }
        }
        removed.ok_or(BindError::EntryNotFound)
    }

    pub fn rename(&mut self, key: EntryKey, name: impl Into<String>) -> Result<()> {
        if key == self.references {
            return Err(BindError::InvalidEdit(
                "the references root cannot be renamed".to_string(),
            ));
        }
        let name = name.into();
        validate_name(&name)?;
        let entry = self.entries.get_mut(key).ok_or(BindError::EntryNotFound)?;
        Arc::make_mut(entry).name = name;
        Ok(())
    }

    /// Move `key` under `new_parent`, appended last
    pub fn reparent(&mut self, key: EntryKey, new_parent: EntryKey) -> Result<()> {
        if key == self.resources || key == self.references {
            return Err(BindError::InvalidEdit("cannot move a root entry".to_string()));
        }
        let kind_ok = match (self.entries.get(key), self.entries.contains_key(new_parent)) {
            (Some(entry), true) => self.check_placement(new_parent, &entry.kind),
            _ => Err(BindError::EntryNotFound),
        };
        kind_ok?;
        if key == new_parent || self.is_ancestor(key, new_parent) {
            return Err(BindError::InvalidEdit(
                "an entry cannot be moved below itself".to_string(),
            ));
        }
        self.detach(key);
        self.attach(new_parent, key, None);
        Ok(())
    }

    /// Parent of `key`, searching the resources tree first
    pub fn find_parent(&self, key: EntryKey) -> Option<EntryKey> {
        [self.resources, self.references]
            .into_iter()
            .find_map(|root| self.parent_below(root, key))
    }

    /// Variants group `key` is a direct child of
    pub fn variant_group(&self, key: EntryKey) -> Option<(EntryKey, &VariantsEntry)> {
        let parent = self.find_parent(key)?;
        match &self.entries.get(parent)?.kind {
            EntryKind::Variants(v) => Some((parent, v)),
            _ => None,
        }
    }

    /// Dot separated names from the tree root down to `key`
    pub fn build_descriptor(&self, key: EntryKey) -> Option<String> {
        let root = [self.resources, self.references]
            .into_iter()
            .find(|root| *root == key || self.is_ancestor(*root, key))?;

        let mut names = vec![self.entries.get(key)?.name.as_str()];
        let mut current = key;
        while current != root {
            current = self.parent_below(root, current)?;
            names.push(self.entries.get(current)?.name.as_str());
        }
        names.reverse();
        Some(names.join(&SEGMENT_SEPARATOR.to_string()))
    }

    /// Node matched by descriptor text, the variant suffix is ignored
    pub fn find(&self, descriptor: &str) -> Option<EntryKey> {
        let path = descriptor
            .split_once(VARIANT_SEPARATOR)
            .map_or(descriptor, |(path, _)| path);
        let segments: Vec<&str> = path.split(SEGMENT_SEPARATOR).collect();
        self.search(self.resources, &segments)
    }

    /// Node matched by a parsed descriptor
    pub fn find_descriptor(&self, descriptor: &Descriptor) -> Option<EntryKey> {
        let segments: Vec<&str> = descriptor.segments().iter().map(String::as_str).collect();
        self.search(self.resources, &segments)
    }

    /// Depth first match of `segments` starting at `key`, first match wins
    fn search(&self, key: EntryKey, segments: &[&str]) -> Option<EntryKey> {
        let (first, rest) = segments.split_first()?;
        let entry = self.entries.get(key)?;
        if entry.name != *first {
            return None;
        }
        if rest.is_empty() {
            return Some(key);
        }
        entry
            .children
            .iter()
            .find_map(|child| self.search(*child, rest))
    }

    /// Names of the lists referenced by this one, in order
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.children(self.references)
            .iter()
            .filter_map(|key| match &self.entries.get(*key)?.kind {
                EntryKind::ListReference(ListReference { list }) => Some(list.as_str()),
                _ => None,
            })
    }

    /// Assign missing expected parameter and texture ids.
    ///
    /// Returns the number of entries that changed.
    pub fn normalize(&mut self, first_texture_id: u32) -> usize {
        let stale: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| needs_normalize(&e.kind))
            .map(|(k, _)| k)
            .collect();

        for key in &stale {
            if let Some(entry) = self.entries.get_mut(*key) {
                let kind = &mut Arc::make_mut(entry).kind;
                let placeable = kind.is_placeable();
                if let Some(asset) = kind.asset_mut() {
                    asset.normalize_parameters(placeable);
                }
                if let EntryKind::Material(material) = kind {
                    material.normalize_textures(first_texture_id);
                }
            }
        }
        stale.len()
    }

    /// Migrate component entries still using index based parameter references
    pub fn upgrade_legacy(&mut self) -> usize {
        let legacy: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(&e.kind, EntryKind::Component(c) if c.legacy_parameter_indices))
            .map(|(k, _)| k)
            .collect();

        let mut remapped = 0;
        for key in legacy {
            if let Some(entry) = self.entries.get_mut(key) {
                if let EntryKind::Component(component) = &mut Arc::make_mut(entry).kind {
                    remapped += component.upgrade_legacy();
                }
            }
        }
        if remapped > 0 {
            tracing::info!(list = %self.name, remapped, "upgraded legacy parameter references");
        }
        remapped
    }

    /// Bind every component's setup actions to its template type
    pub fn init_metadata(
        &mut self,
        registry: &TypeRegistry,
        cache: &CapabilityCache,
    ) -> Vec<(EntryKey, BindError)> {
        let components: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.kind, EntryKind::Component(_)))
            .map(|(k, _)| k)
            .collect();

        let mut failures = Vec::new();
        for key in components {
            let Some(entry) = self.entries.get_mut(key) else {
                continue;
            };
            let entry = Arc::make_mut(entry);
            if let EntryKind::Component(component) = &mut entry.kind {
                match component.init_metadata(registry, cache) {
                    Ok(action_failures) => {
                        failures.extend(action_failures.into_iter().map(|(_, err)| (key, err)));
                    }
                    Err(err) => {
                        tracing::warn!(entry = %entry.name, error = %err, "component template unavailable");
                        failures.push((key, err));
                    }
                }
            }
        }
        failures
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let list: ResourceList = serde_json::from_str(json)?;
        if !list.entries.contains_key(list.resources) || !list.entries.contains_key(list.references) {
            return Err(BindError::SerializationError(format!(
                "resource list '{}' is missing a root entry",
                list.name
            )));
        }
        Ok(list)
    }

    fn check_placement(&self, parent: EntryKey, kind: &EntryKind) -> Result<()> {
        let under_references = parent == self.references || self.is_ancestor(self.references, parent);
        let is_reference = matches!(kind, EntryKind::ListReference(_));
        if under_references != is_reference {
            return Err(BindError::InvalidEdit(format!(
                "{} entries cannot be placed {} the references root",
                kind.label(),
                if under_references { "under" } else { "outside" }
            )));
        }
        Ok(())
    }

    fn attach(&mut self, parent: EntryKey, key: EntryKey, index: Option<usize>) {
        if let Some(parent) = self.entries.get_mut(parent) {
            let children = &mut Arc::make_mut(parent).children;
            match index {
                Some(i) => children.insert(i.min(children.len()), key),
                None => children.push(key),
            }
        }
    }

    fn detach(&mut self, key: EntryKey) {
        if let Some(parent) = self.find_parent(key) {
            if let Some(parent) = self.entries.get_mut(parent) {
                Arc::make_mut(parent).children.retain(|c| *c != key);
            }
        }
    }

    fn parent_below(&self, root: EntryKey, key: EntryKey) -> Option<EntryKey> {
        let entry = self.entries.get(root)?;
        if entry.children.contains(&key) {
            return Some(root);
        }
        entry
            .children
            .iter()
            .find_map(|child| self.parent_below(*child, key))
    }

    fn is_ancestor(&self, ancestor: EntryKey, key: EntryKey) -> bool {
        self.parent_below(ancestor, key).is_some()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([SEGMENT_SEPARATOR, VARIANT_SEPARATOR]) {
        return Err(BindError::InvalidEdit(format!(
            "'{name}' is not a valid entry name"
        )));
    }
    Ok(())
}

fn needs_normalize(kind: &EntryKind) -> bool {
    let parameters = kind.asset().is_some_and(|asset| {
        asset.parameters.iter().any(|p| p.id == 0)
            || (kind.is_placeable() && asset.parameters.is_empty())
    });
    let textures = match kind {
        EntryKind::Material(m) => m.textures.iter().any(|t| t.id == 0),
        _ => false,
    };
    parameters || textures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Asset3dEntry, AssetEntry, ComponentEntry, ExpectedParameter};
    use crate::material::{MaterialEntry, FIRST_TEXTURE_ID};
    use crate::value::ValueType;

    fn furniture() -> (ResourceList, EntryKey, EntryKey) {
        let mut list = ResourceList::new("Furniture");
        let root = list.resources();
        let chair = list
            .add(root, ResourceEntry::new("Chair", EntryKind::Variants(VariantsEntry::default())))
            .unwrap();
        for name in ["Oak", "Pine", "Steel"] {
            list.add(
                chair,
                ResourceEntry::new(name, EntryKind::Asset3d(Asset3dEntry::new(AssetEntry::new(name)))),
            )
            .unwrap();
        }
        let table = list
            .add(root, ResourceEntry::new("Table", EntryKind::Asset(AssetEntry::new("/Game/Table"))))
            .unwrap();
        (list, chair, table)
    }

    #[test]
    fn test_find_matches_root_name_then_children() {
        let (list, chair, table) = furniture();
        assert_eq!(list.find("Furniture"), Some(list.resources()));
        assert_eq!(list.find("Furniture.Chair"), Some(chair));
        assert_eq!(list.find("Furniture.Chair#3"), Some(chair));
        assert_eq!(list.find("Furniture.Table"), Some(table));
        assert_eq!(list.find("Furniture.Chair.Pine"), Some(list.children(chair)[1]));
        assert_eq!(list.find("furniture.chair"), None);
        assert_eq!(list.find("Chair"), None);
        assert_eq!(list.find("Furniture.Sofa"), None);
    }

    #[test]
    fn test_search_backtracks_over_same_named_siblings() {
        let mut list = ResourceList::new("Props");
        let root = list.resources();
        list.add(root, ResourceEntry::folder("Lights")).unwrap();
        let second = list.add(root, ResourceEntry::folder("Lights")).unwrap();
        let lamp = list
            .add(second, ResourceEntry::new("Lamp", EntryKind::Asset(AssetEntry::new("/Game/Lamp"))))
            .unwrap();
        assert_eq!(list.find("Props.Lights.Lamp"), Some(lamp));
    }

    #[test]
    fn test_build_descriptor_round_trips_through_find() {
        let (list, chair, _) = furniture();
        let steel = list.children(chair)[2];
        let descriptor = list.build_descriptor(steel).unwrap();
        assert_eq!(descriptor, "Furniture.Chair.Steel");
        assert_eq!(list.find(&descriptor), Some(steel));
        assert_eq!(list.find_parent(steel), Some(chair));
        assert!(list.variant_group(steel).is_some());
        assert!(list.variant_group(chair).is_none());
    }

    #[test]
    fn test_structural_edits() {
        let (mut list, chair, table) = furniture();
        let refs = list.references_root();

        assert!(matches!(list.remove(list.resources()), Err(BindError::InvalidEdit(_))));
        assert!(matches!(list.rename(refs, "Other"), Err(BindError::InvalidEdit(_))));
        assert!(matches!(list.rename(table, "A.B"), Err(BindError::InvalidEdit(_))));
        assert!(matches!(
            list.add(refs, ResourceEntry::folder("Stray")),
            Err(BindError::InvalidEdit(_))
        ));
        assert!(matches!(list.reparent(chair, list.children(chair)[0]), Err(BindError::InvalidEdit(_))));

        let before = list.len();
        let removed = list.remove(chair).unwrap();
        assert_eq!(removed.name, "Chair");
        assert_eq!(list.len(), before - 4);
        assert_eq!(list.children(list.resources()), [table]);

        list.rename(table, "Desk").unwrap();
        assert_eq!(list.find("Furniture.Desk"), Some(table));
    }

    #[test]
    fn test_references_in_order() {
        let mut list = ResourceList::new("Main");
        let refs = list.references_root();
        for name in ["Shared", "Nature"] {
            list.add(
                refs,
                ResourceEntry::new(name, EntryKind::ListReference(ListReference { list: name.to_string() })),
            )
            .unwrap();
        }
        assert_eq!(list.references().collect::<Vec<_>>(), vec!["Shared", "Nature"]);
    }

    #[test]
    fn test_normalize_assigns_ids() {
        let (mut list, chair, table) = furniture();
        let mut material = MaterialEntry::default();
        material.textures.push(ExpectedParameter::new(0, ValueType::Texture, "Albedo"));
        let mat = list
            .add(list.resources(), ResourceEntry::new("Paint", EntryKind::Material(material)))
            .unwrap();

        assert_eq!(list.normalize(FIRST_TEXTURE_ID), 4);
        let oak = list.children(chair)[0];
        let params = &list.get(oak).unwrap().kind.asset().unwrap().parameters;
        assert_eq!(params[0].id, 1);
        assert_eq!(params[0].kind, ValueType::Frame);
        assert!(list.get(table).unwrap().kind.asset().unwrap().parameters.is_empty());
        match &list.get(mat).unwrap().kind {
            EntryKind::Material(m) => assert_eq!(m.textures[0].id, FIRST_TEXTURE_ID),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(list.normalize(FIRST_TEXTURE_ID), 0);
    }

    #[test]
    fn test_edits_do_not_touch_shared_snapshots() {
        let (mut list, _, table) = furniture();
        let snapshot = list.get_shared(table).unwrap().clone();
        list.rename(table, "Desk").unwrap();
        assert_eq!(snapshot.name, "Table");
        assert_eq!(list.get(table).unwrap().name, "Desk");
    }

    #[test]
    fn test_json_round_trip() {
        let (mut list, chair, _) = furniture();
        let lamp = list
            .add(list.resources(), ResourceEntry::new("Lamp", EntryKind::Component(ComponentEntry::new("Lamp"))))
            .unwrap();
        let json = list.to_json().unwrap();
        let back = ResourceList::from_json(&json).unwrap();
        assert_eq!(back.name(), "Furniture");
        assert_eq!(back.len(), list.len());
        assert_eq!(back.find("Furniture.Chair"), Some(chair));
        assert_eq!(back.find("Furniture.Lamp"), Some(lamp));
        assert_eq!(back.children(chair).len(), 3);
    }
}
