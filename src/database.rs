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

//! Descriptor resolution and the asset id cache.
//!
//! [`AssetDatabase`] turns descriptors such as `"Furniture.Chair#2"` into
//! [`AssetId`]s. The fast path is a map lookup by descriptor text; on a miss
//! the resource lists are searched depth first from the root list, following
//! list references with a per-pass visited set. Variants groups get one
//! contiguous id range per cache generation. Anything that fails to resolve
//! maps to a shared sentinel id and is recorded for [`AssetDatabase::missing`].
//!
//! Every structural change calls [`AssetDatabase::invalidate`], which clears
//! the caches, bumps the cache version and emits [`AssetEvent::Invalidated`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::capability::CapabilityCache;
use crate::config::DatabaseConfig;
use crate::descriptor::Descriptor;
use crate::dynamic::{DynamicAssets, HostTexture, TextureFactory, TickReport};
use crate::entry::{AssetEntry, EntryKind, PlacementFixup, ResourceEntry};
use crate::error::{BindError, Result};
use crate::events::{AssetEvent, EventHub};
use crate::ids::{AssetId, IdAllocator};
use crate::parameters::ParameterCollection;
use crate::reflection::{Scriptable, TypeRegistry};
use crate::resource_list::{EntryKey, ResourceList};
use crate::setup::ApplyReport;
use crate::texture::PixelData;
use crate::value::Frame;

/// Callbacks the generation engine makes into the host.
///
/// Every method is safe to call from generation worker threads and never
/// fails; unresolvable descriptors degrade to the sentinel id.
pub trait AssetHost: Send + Sync {
    fn asset_id(&self, descriptor: &str) -> AssetId;

    fn asset_bounds(&self, descriptor: &str) -> Option<Frame>;

    fn asset_variants(&self, descriptor: &str) -> usize;

    fn check_asset_valid(&self, descriptor: &str) -> bool;

    fn add_dynamic_asset(&self) -> AssetId;

    fn set_dynamic_texture(&self, id: AssetId, data: PixelData<'_>, width: u32, height: u32, channels: u32);

    fn remove_dynamic_asset(&self, id: AssetId);
}

/// Cache statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Searches through the resource lists
    pub tree_walks: u64,
    pub variant_ranges: u64,
    pub unresolved: u64,
    pub invalidations: u64,
}

/// Cached result of resolving one descriptor
#[derive(Clone, Debug)]
pub struct ResolvedAsset {
    pub descriptor: String,
    /// Owning list, empty for the sentinel
    pub list: String,
    pub key: EntryKey,
    pub entry: Arc<ResourceEntry>,
    /// Variants group the entry belongs to
    pub group: Option<Arc<ResourceEntry>>,
    pub variant: Option<u32>,
    missing: bool,
}

impl ResolvedAsset {
    /// Stand-in for every descriptor that failed to resolve
    pub fn is_missing(&self) -> bool {
        self.missing
    }

    pub fn asset(&self) -> Option<&AssetEntry> {
        self.entry.kind.asset()
    }

    pub fn group_fixup(&self) -> Option<&PlacementFixup> {
        match self.group.as_deref().map(|g| &g.kind) {
            Some(EntryKind::Variants(v)) => Some(&v.fixup),
            _ => None,
        }
    }

    /// Bounds as a frame, for entries with spatial extent
    pub fn bounds(&self) -> Option<Frame> {
        let spatial = self.entry.kind.spatial()?;
        Some(spatial.bounds(self.group_fixup()).to_frame())
    }

    /// Size of the variants group this entry is, or belongs to
    pub fn variant_count(&self) -> usize {
        if self.entry.is_variants() {
            return self.entry.children.len();
        }
        self.group.as_ref().map_or(0, |g| g.children.len())
    }
}

/// Where a texture id's pixels come from
#[derive(Clone)]
pub enum TextureSource {
    /// Generated at runtime
    Dynamic(Arc<dyn HostTexture>),
    /// Authored host asset
    Static(String),
    /// Unknown id, the host should use its placeholder
    Fallback,
}

impl std::fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureSource::Dynamic(t) => write!(f, "Dynamic({}x{} {:?})", t.width(), t.height(), t.format()),
            TextureSource::Static(path) => f.debug_tuple("Static").field(path).finish(),
            TextureSource::Fallback => f.write_str("Fallback"),
        }
    }
}

#[derive(Clone)]
struct Located {
    list: String,
    key: EntryKey,
    entry: Arc<ResourceEntry>,
    group: Option<Arc<ResourceEntry>>,
}

#[derive(Clone, Copy, Debug)]
struct VariantRange {
    first: AssetId,
    count: u32,
    version: u64,
}

struct ResolverState {
    lists: AHashMap<String, ResourceList>,
    root: Option<String>,
    ids: AHashMap<String, AssetId>,
    entries: AHashMap<AssetId, Arc<ResolvedAsset>>,
    located: AHashMap<String, Located>,
    variant_ranges: AHashMap<(String, EntryKey), VariantRange>,
    bad: Option<AssetId>,
    missing: Vec<String>,
    missing_seen: AHashSet<String>,
    version: u64,
    stats: CacheStats,
}

impl ResolverState {
    fn clear(&mut self) {
        self.ids.clear();
        self.entries.clear();
        self.located.clear();
        self.variant_ranges.clear();
        self.bad = None;
        self.missing.clear();
        self.missing_seen.clear();
        self.version += 1;
        self.stats.invalidations += 1;
    }

    /// Find the node a descriptor's base path names
    fn locate(&mut self, descriptor: &Descriptor) -> std::result::Result<Located, String> {
        let base = descriptor.base_path();
        if let Some(found) = self.located.get(&base) {
            return Ok(found.clone());
        }

        let root = self.root.clone().ok_or_else(|| "no root resource list".to_string())?;
        self.stats.tree_walks += 1;
        let mut visited = AHashSet::new();
        let (list_name, key) = search_lists(&self.lists, &root, descriptor, &mut visited)
            .ok_or_else(|| "no matching entry".to_string())?;

        let list = self
            .lists
            .get(&list_name)
            .ok_or_else(|| format!("list '{list_name}' vanished"))?;
        let entry = list
            .get_shared(key)
            .cloned()
            .ok_or_else(|| "entry vanished".to_string())?;
        let group = list
            .variant_group(key)
            .and_then(|(group_key, _)| list.get_shared(group_key).cloned());

        let located = Located {
            list: list_name,
            key,
            entry,
            group,
        };
        self.located.insert(base, located.clone());
        Ok(located)
    }

    /// Resolve a descriptor that missed the id cache
    fn lookup(&mut self, text: &str, ids: &IdAllocator) -> std::result::Result<AssetId, String> {
        let descriptor = Descriptor::parse(text).map_err(|e| e.to_string())?;
        let located = self.locate(&descriptor)?;

        let Some(number) = descriptor.variant() else {
            let id = ids.allocate();
            let resolved = ResolvedAsset {
                descriptor: text.to_string(),
                list: located.list,
                key: located.key,
                entry: located.entry,
                group: located.group,
                variant: None,
                missing: false,
            };
            self.ids.insert(text.to_string(), id);
            self.entries.insert(id, Arc::new(resolved));
            return Ok(id);
        };

        if !located.entry.is_variants() {
            return Err(format!("'{}' is not a variants group", located.entry.name));
        }
        let count = located.entry.children.len() as u32;
        if number > count {
            return Err(format!("variant {number} of {count}"));
        }

        let first = self.variant_range(&located, count, ids, &descriptor);
        let id = first.offset(number - 1);
        self.ids.insert(text.to_string(), id);
        Ok(id)
    }

    /// Id range of a variants group, allocated on first use in this generation.
    ///
    /// Every variant is registered when the range is allocated, so later
    /// variant descriptors take the fast path.
    fn variant_range(
        &mut self,
        group: &Located,
        count: u32,
        ids: &IdAllocator,
        descriptor: &Descriptor,
    ) -> AssetId {
        let range_key = (group.list.clone(), group.key);
        if let Some(range) = self.variant_ranges.get(&range_key) {
            if range.version == self.version && range.count == count {
                return range.first;
            }
        }

        let first = ids.allocate_range(count);
        self.variant_ranges.insert(
            range_key,
            VariantRange {
                first,
                count,
                version: self.version,
            },
        );
        self.stats.variant_ranges += 1;
        tracing::debug!(group = %group.entry.name, first = %first, count, "allocated variant range");

        let list = self.lists.get(&group.list);
        for (index, child_key) in group.entry.children.iter().enumerate() {
            let Some(child) = list.and_then(|l| l.get_shared(*child_key)) else {
                continue;
            };
            let number = index as u32 + 1;
            let text = descriptor.clone().with_variant(Some(number)).to_string();
            let id = first.offset(index as u32);
            let resolved = ResolvedAsset {
                descriptor: text.clone(),
                list: group.list.clone(),
                key: *child_key,
                entry: child.clone(),
                group: Some(group.entry.clone()),
                variant: Some(number),
                missing: false,
            };
            self.ids.insert(text, id);
            self.entries.insert(id, Arc::new(resolved));
        }
        first
    }
}

/// Depth first search of `list_name`, then of the lists it references
fn search_lists(
    lists: &AHashMap<String, ResourceList>,
    list_name: &str,
    descriptor: &Descriptor,
    visited: &mut AHashSet<String>,
) -> Option<(String, EntryKey)> {
    visited.insert(list_name.to_string());
    let Some(list) = lists.get(list_name) else {
        tracing::warn!(list = list_name, "referenced resource list is not loaded");
        return None;
    };
    if let Some(key) = list.find_descriptor(descriptor) {
        return Some((list_name.to_string(), key));
    }
    for reference in list.references() {
        if visited.contains(reference) {
            continue;
        }
        if let Some(found) = search_lists(lists, reference, descriptor, visited) {
            return Some(found);
        }
    }
    None
}

/// Resolver cache plus the dynamic assets sharing its id space
pub struct AssetDatabase {
    config: DatabaseConfig,
    ids: Arc<IdAllocator>,
    events: Arc<EventHub>,
    state: Mutex<ResolverState>,
    version: AtomicU64,
    sentinel: Arc<ResourceEntry>,
    dynamic: DynamicAssets,
}

impl AssetDatabase {
    /// Create a database owned by the calling thread
    pub fn new(config: DatabaseConfig, factory: Arc<dyn TextureFactory>) -> Self {
        let ids = Arc::new(IdAllocator::new());
        let events = Arc::new(EventHub::new());
        let dynamic = DynamicAssets::new(ids.clone(), factory, events.clone());
        let sentinel = Arc::new(ResourceEntry::folder(config.missing_resource_name.clone()));
        let state = ResolverState {
            lists: AHashMap::new(),
            root: config.root_list.clone(),
            ids: AHashMap::new(),
            entries: AHashMap::new(),
            located: AHashMap::new(),
            variant_ranges: AHashMap::new(),
            bad: None,
            missing: Vec::new(),
            missing_seen: AHashSet::new(),
            version: 1,
            stats: CacheStats::default(),
        };
        Self {
            config,
            ids,
            events,
            state: Mutex::new(state),
            version: AtomicU64::new(1),
            sentinel,
            dynamic,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Make `list` the root of every search and start a new cache generation
    pub fn set_root(&self, list: impl Into<String>) {
        self.state.lock().root = Some(list.into());
        self.invalidate();
    }

    pub fn root(&self) -> Option<String> {
        self.state.lock().root.clone()
    }

    /// Add or replace a list, returning the replaced one
    pub fn insert_list(&self, mut list: ResourceList) -> Option<ResourceList> {
        list.normalize(self.config.first_texture_id);
        let previous = self.state.lock().lists.insert(list.name().to_string(), list);
        self.invalidate();
        previous
    }

    pub fn remove_list(&self, name: &str) -> Option<ResourceList> {
        let removed = self.state.lock().lists.remove(name);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    /// Edit a list in place, then invalidate
    pub fn edit_list<R>(&self, name: &str, edit: impl FnOnce(&mut ResourceList) -> R) -> Result<R> {
        let result = {
            let mut state = self.state.lock();
            let list = state
                .lists
                .get_mut(name)
                .ok_or_else(|| BindError::ListNotFound(name.to_string()))?;
            let result = edit(list);
            list.normalize(self.config.first_texture_id);
            result
        };
        self.invalidate();
        Ok(result)
    }

    /// Copy of a list
    pub fn list(&self, name: &str) -> Option<ResourceList> {
        self.state.lock().lists.get(name).cloned()
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().lists.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind the setup actions of every component to its template type
    pub fn init_metadata(
        &self,
        registry: &TypeRegistry,
        cache: &CapabilityCache,
    ) -> Vec<(String, EntryKey, BindError)> {
        let failures = {
            let mut state = self.state.lock();
            let mut failures = Vec::new();
            for (name, list) in state.lists.iter_mut() {
                failures.extend(
                    list.init_metadata(registry, cache)
                        .into_iter()
                        .map(|(key, err)| (name.clone(), key, err)),
                );
            }
            failures
        };
        self.invalidate();
        failures
    }

    /// Migrate legacy index based parameter references in every list
    pub fn upgrade_legacy(&self) -> usize {
        let remapped: usize = self
            .state
            .lock()
            .lists
            .values_mut()
            .map(ResourceList::upgrade_legacy)
            .sum();
        if remapped > 0 {
            self.invalidate();
        }
        remapped
    }

    /// Resolve a descriptor to its cached id
    pub fn resolve(&self, descriptor: &str) -> AssetId {
        self.resolve_entry(descriptor).0
    }

    /// Resolve and return the cached entry with the id
    pub fn resolve_entry(&self, descriptor: &str) -> (AssetId, Arc<ResolvedAsset>) {
        let mut state = self.state.lock();
        if let Some(id) = state.ids.get(descriptor).copied() {
            if let Some(resolved) = state.entries.get(&id).cloned() {
                state.stats.hits += 1;
                return (id, resolved);
            }
        }
        state.stats.misses += 1;

        #[cfg(feature = "profiling")]
        let _span = info_span!("resolve_slow_path", descriptor).entered();

        let failure = match state.lookup(descriptor, &self.ids) {
            Ok(id) => match state.entries.get(&id).cloned() {
                Some(resolved) => return (id, resolved),
                None => "variant has no entry".to_string(),
            },
            Err(reason) => reason,
        };

        let bad = *state.bad.get_or_insert_with(|| self.ids.allocate());
        let sentinel = state
            .entries
            .entry(bad)
            .or_insert_with(|| {
                Arc::new(ResolvedAsset {
                    descriptor: self.config.missing_resource_name.clone(),
                    list: String::new(),
                    key: EntryKey::default(),
                    entry: self.sentinel.clone(),
                    group: None,
                    variant: None,
                    missing: true,
                })
            })
            .clone();
        state.ids.insert(descriptor.to_string(), bad);
        state.stats.unresolved += 1;
        if self.config.record_missing && state.missing_seen.insert(descriptor.to_string()) {
            state.missing.push(descriptor.to_string());
        }
        tracing::warn!(descriptor, reason = %failure, "unresolved resource descriptor");
        (bad, sentinel)
    }

    /// Cached entry for an id handed out by [`resolve`](Self::resolve)
    pub fn entry(&self, id: AssetId) -> Option<Arc<ResolvedAsset>> {
        self.state.lock().entries.get(&id).cloned()
    }

    /// Whether `id` is this generation's sentinel
    pub fn is_bad(&self, id: AssetId) -> bool {
        id.is_valid() && self.state.lock().bad == Some(id)
    }

    pub fn get_bounds(&self, descriptor: &str) -> Option<Frame> {
        let (_, resolved) = self.resolve_entry(descriptor);
        if resolved.is_missing() {
            return None;
        }
        resolved.bounds()
    }

    pub fn get_variant_count(&self, descriptor: &str) -> usize {
        let (_, resolved) = self.resolve_entry(descriptor);
        resolved.variant_count()
    }

    pub fn check_valid(&self, descriptor: &str) -> bool {
        !self.resolve_entry(descriptor).1.is_missing()
    }

    /// Drop every cached lookup and start a new cache generation
    pub fn invalidate(&self) {
        let version = {
            let mut state = self.state.lock();
            state.clear();
            self.version.store(state.version, Ordering::Release);
            state.version
        };
        tracing::debug!(version, "asset cache invalidated");
        self.events.emit(AssetEvent::Invalidated { version });
    }

    pub fn cache_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    /// Unresolved descriptors in first-seen order
    pub fn missing(&self) -> Vec<String> {
        self.state.lock().missing.clone()
    }

    /// Unresolved descriptors, clearing the record
    pub fn take_missing(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.missing_seen.clear();
        std::mem::take(&mut state.missing)
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn subscribe(&self) -> crossbeam::channel::Receiver<AssetEvent> {
        self.events.subscribe()
    }

    pub fn id_allocator(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    pub fn dynamic(&self) -> &DynamicAssets {
        &self.dynamic
    }

    /// Owning thread housekeeping
    pub fn tick(&self) -> TickReport {
        self.dynamic.tick()
    }

    pub fn texture(&self, id: AssetId) -> TextureSource {
        if let Some(texture) = self.dynamic.texture(id) {
            return TextureSource::Dynamic(texture);
        }
        match self.entry(id) {
            Some(resolved) if !resolved.is_missing() => match &resolved.entry.kind {
                EntryKind::Asset(AssetEntry { asset: Some(path), .. }) => TextureSource::Static(path.clone()),
                _ => TextureSource::Fallback,
            },
            _ => TextureSource::Fallback,
        }
    }

    /// Create and configure the template of a resolved component entry
    pub fn instantiate_component(
        &self,
        id: AssetId,
        registry: &TypeRegistry,
        params: &dyn ParameterCollection,
    ) -> Result<(Box<dyn Scriptable>, ApplyReport)> {
        let resolved = self.entry(id).ok_or(BindError::EntryNotFound)?;
        match &resolved.entry.kind {
            EntryKind::Component(component) => component.instantiate(registry, params),
            _ => Err(BindError::EntryNotFound),
        }
    }
}

impl AssetHost for AssetDatabase {
    fn asset_id(&self, descriptor: &str) -> AssetId {
        self.resolve(descriptor)
    }

    fn asset_bounds(&self, descriptor: &str) -> Option<Frame> {
        self.get_bounds(descriptor)
    }

    fn asset_variants(&self, descriptor: &str) -> usize {
        self.get_variant_count(descriptor)
    }

    fn check_asset_valid(&self, descriptor: &str) -> bool {
        self.check_valid(descriptor)
    }

    fn add_dynamic_asset(&self) -> AssetId {
        self.dynamic.add()
    }

    fn set_dynamic_texture(&self, id: AssetId, data: PixelData<'_>, width: u32, height: u32, channels: u32) {
        self.dynamic.set_texture(id, data, width, height, channels);
    }

    fn remove_dynamic_asset(&self, id: AssetId) {
        self.dynamic.remove(id);
    }
}
