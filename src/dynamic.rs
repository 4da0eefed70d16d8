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

//! Procedurally generated textures.
//!
//! Worker threads call [`DynamicAssets::set_texture`]; textures that already
//! exist with a matching size and format are updated in place, anything else
//! is queued and created by [`DynamicAssets::tick`] on the owning thread.
//! Removal is two phase: [`DynamicAssets::remove`] only marks an id retired
//! and the next `tick` releases it, unless a `set_texture` for the same id
//! cancelled the retirement first.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use ahash::{AHashMap, AHashSet};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::events::{AssetEvent, EventHub};
use crate::ids::{AssetId, IdAllocator};
use crate::texture::{interleave, PixelBuffer, PixelData, PixelFormat};

/// Host texture object owned by the dynamic asset manager
pub trait HostTexture: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn format(&self) -> PixelFormat;

    /// Replace the contents, callable from any thread
    fn update(&self, pixels: &PixelBuffer);
}

/// Creates and releases host textures, only called from the owning thread
pub trait TextureFactory: Send + Sync {
    fn create(&self, descriptor: &TextureDescriptor) -> Arc<dyn HostTexture>;

    fn release(&self, _id: AssetId, _texture: Arc<dyn HostTexture>) {}
}

/// Self-contained creation request
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDescriptor {
    pub id: AssetId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: PixelBuffer,
}

/// What one [`DynamicAssets::tick`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub purged: usize,
}

/// Dynamic texture registry sharing the id space of the resolver
pub struct DynamicAssets {
    ids: Arc<IdAllocator>,
    factory: Arc<dyn TextureFactory>,
    events: Arc<EventHub>,
    owner: ThreadId,
    textures: Mutex<AHashMap<AssetId, Arc<dyn HostTexture>>>,
    retired: Mutex<AHashSet<AssetId>>,
    pending_tx: Sender<TextureDescriptor>,
    pending_rx: Receiver<TextureDescriptor>,
}

impl DynamicAssets {
    /// Create a manager owned by the calling thread
    pub fn new(ids: Arc<IdAllocator>, factory: Arc<dyn TextureFactory>, events: Arc<EventHub>) -> Self {
        let (pending_tx, pending_rx) = channel::unbounded();
        Self {
            ids,
            factory,
            events,
            owner: thread::current().id(),
            textures: Mutex::new(AHashMap::new()),
            retired: Mutex::new(AHashSet::new()),
            pending_tx,
            pending_rx,
        }
    }

    /// Make the calling thread the owning thread
    pub fn bind_to_current_thread(&mut self) {
        self.owner = thread::current().id();
    }

    /// Allocate an id for a new dynamic asset
    pub fn add(&self) -> AssetId {
        self.ids.allocate()
    }

    /// Supply pixels for `id`.
    ///
    /// # Panics
    ///
    /// Panics on an unsupported layout or a buffer shorter than
    /// `width * height * channels`.
    pub fn set_texture(&self, id: AssetId, data: PixelData<'_>, width: u32, height: u32, channels: u32) {
        let (format, pixels) = interleave(data, width, height, channels);

        let textures = self.textures.lock();
        if self.retired.lock().remove(&id) {
            tracing::debug!(%id, "retirement cancelled by new pixels");
        }

        if let Some(existing) = textures.get(&id) {
            if existing.width() == width && existing.height() == height && existing.format() == format {
                existing.update(&pixels);
                return;
            }
        }
        drop(textures);

        let request = TextureDescriptor {
            id,
            width,
            height,
            format,
            pixels,
        };
        // the receiver lives as long as self
        let _ = self.pending_tx.send(request);
    }

    /// Mark `id` for release on the next tick
    pub fn remove(&self, id: AssetId) {
        self.retired.lock().insert(id);
    }

    /// Create queued textures, then release retired ones.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread other than the owning thread.
    pub fn tick(&self) -> TickReport {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "dynamic assets ticked off the owning thread"
        );
        #[cfg(feature = "profiling")]
        let _span = info_span!("dynamic_assets_tick").entered();

        let mut report = TickReport::default();
        let mut events = Vec::new();

        for request in self.pending_rx.try_iter() {
            let texture = self.factory.create(&request);
            let replaced = self.textures.lock().insert(request.id, texture);
            if let Some(old) = replaced {
                self.factory.release(request.id, old);
            }
            tracing::debug!(id = %request.id, width = request.width, height = request.height, "dynamic texture created");
            report.created += 1;
            events.push(AssetEvent::TextureCreated { id: request.id });
        }

        let purged: Vec<(AssetId, Option<Arc<dyn HostTexture>>)> = {
            let mut textures = self.textures.lock();
            let mut retired = self.retired.lock();
            retired.drain().map(|id| (id, textures.remove(&id))).collect()
        };
        for (id, texture) in purged {
            if let Some(texture) = texture {
                self.factory.release(id, texture);
                report.purged += 1;
                tracing::debug!(%id, "dynamic texture released");
            }
            events.push(AssetEvent::TextureRetired { id });
        }

        for event in events {
            self.events.emit(event);
        }
        report
    }

    pub fn texture(&self, id: AssetId) -> Option<Arc<dyn HostTexture>> {
        self.textures.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.textures.lock().contains_key(&id)
    }

    /// Number of created textures
    pub fn len(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.lock().is_empty()
    }

    /// Creation requests waiting for the next tick
    pub fn pending_creations(&self) -> usize {
        self.pending_rx.len()
    }

    pub fn is_retired(&self, id: AssetId) -> bool {
        self.retired.lock().contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTexture {
        width: u32,
        height: u32,
        format: PixelFormat,
        updates: AtomicUsize,
    }

    impl HostTexture for FakeTexture {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn format(&self) -> PixelFormat {
            self.format
        }

        fn update(&self, _pixels: &PixelBuffer) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        released: AtomicUsize,
    }

    impl TextureFactory for CountingFactory {
        fn create(&self, d: &TextureDescriptor) -> Arc<dyn HostTexture> {
            self.created.fetch_add(1, Ordering::Relaxed);
            Arc::new(FakeTexture {
                width: d.width,
                height: d.height,
                format: d.format,
                updates: AtomicUsize::new(0),
            })
        }

        fn release(&self, _id: AssetId, _texture: Arc<dyn HostTexture>) {
            self.released.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn manager() -> (DynamicAssets, Arc<CountingFactory>, Arc<EventHub>) {
        let factory = Arc::new(CountingFactory::default());
        let events = Arc::new(EventHub::new());
        let assets = DynamicAssets::new(Arc::new(IdAllocator::new()), factory.clone(), events.clone());
        (assets, factory, events)
    }

    #[test]
    fn test_creation_deferred_until_tick() {
        let (assets, factory, events) = manager();
        let rx = events.subscribe();
        let id = assets.add();
        assets.set_texture(id, PixelData::Byte(&[0; 16]), 2, 2, 4);
        assert_eq!(assets.pending_creations(), 1);
        assert!(assets.texture(id).is_none());

        assert_eq!(assets.tick(), TickReport { created: 1, purged: 0 });
        assert_eq!(factory.created.load(Ordering::Relaxed), 1);
        assert_eq!(assets.texture(id).map(|t| t.format()), Some(PixelFormat::Rgba8));
        assert_eq!(rx.try_recv(), Ok(AssetEvent::TextureCreated { id }));
    }

    #[test]
    fn test_matching_update_applies_in_place() {
        let (assets, factory, _) = manager();
        let id = assets.add();
        assets.set_texture(id, PixelData::Float(&[0.0; 4]), 2, 2, 1);
        assets.tick();

        let worker = {
            let pixels = vec![1.0f32; 4];
            let assets = &assets;
            thread::scope(|s| s.spawn(move || assets.set_texture(id, PixelData::Float(&pixels), 2, 2, 1)).join())
        };
        assert!(worker.is_ok());
        assert_eq!(assets.pending_creations(), 0);
        assert_eq!(factory.created.load(Ordering::Relaxed), 1);

        assets.set_texture(id, PixelData::Float(&[0.0; 16]), 4, 4, 1);
        assert_eq!(assets.pending_creations(), 1);
        assets.tick();
        assert_eq!(factory.created.load(Ordering::Relaxed), 2);
        assert_eq!(factory.released.load(Ordering::Relaxed), 1);
        assert_eq!(assets.texture(id).map(|t| t.width()), Some(4));
    }

    #[test]
    fn test_retire_then_reset_survives_purge() {
        let (assets, factory, _) = manager();
        let id = assets.add();
        assets.set_texture(id, PixelData::Byte(&[0; 4]), 2, 2, 1);
        assets.tick();

        assets.remove(id);
        assert!(assets.is_retired(id));
        assets.set_texture(id, PixelData::Byte(&[9; 4]), 2, 2, 1);
        assert!(!assets.is_retired(id));

        assert_eq!(assets.tick().purged, 0);
        assert!(assets.contains(id));
        assert_eq!(factory.released.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_retired_texture_released_on_tick() {
        let (assets, factory, events) = manager();
        let rx = events.subscribe();
        let id = assets.add();
        assets.set_texture(id, PixelData::Byte(&[0; 4]), 2, 2, 1);
        assets.tick();
        let _ = rx.try_recv();

        assets.remove(id);
        assert!(assets.contains(id));
        assert_eq!(assets.tick().purged, 1);
        assert!(assets.is_empty());
        assert_eq!(factory.released.load(Ordering::Relaxed), 1);
        assert_eq!(rx.try_recv(), Ok(AssetEvent::TextureRetired { id }));
    }

    #[test]
    fn test_tick_off_owner_thread_panics() {
        let (assets, _, _) = manager();
        let outcome = thread::scope(|s| s.spawn(|| assets.tick()).join());
        assert!(outcome.is_err());
    }
}
