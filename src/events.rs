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

//! Notifications for observers such as editor panels.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::ids::AssetId;

/// Events emitted by the database and the dynamic asset manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetEvent {
    /// Caches were cleared, previously resolved ids are stale
    Invalidated { version: u64 },
    /// A queued dynamic texture now exists on the host
    TextureCreated { id: AssetId },
    /// A retired dynamic texture was released
    TextureRetired { id: AssetId },
}

/// Fan-out of [`AssetEvent`]s to any number of channel subscribers
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<AssetEvent>>>,
}

impl EventHub {
    /// Create new hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> Receiver<AssetEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send to every subscriber, dropping the disconnected ones
    pub fn emit(&self, event: AssetEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
