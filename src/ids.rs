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

//! Asset identifiers

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Process-unique asset identifier, `0` is reserved for "unresolved"
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AssetId(u32);

impl AssetId {
    pub const INVALID: AssetId = AssetId(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Id `offset` places after this one
    pub const fn offset(self, offset: u32) -> AssetId {
        AssetId(self.0 + offset)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Single counter shared by resolved entries and dynamic assets.
///
/// Never rewound: a new cache generation keeps counting from where the last
/// one stopped, so ids handed out before an invalidation can't be confused
/// with ids handed out after it.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate one id
    pub fn allocate(&self) -> AssetId {
        AssetId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate `count` contiguous ids and return the first
    pub fn allocate_range(&self, count: u32) -> AssetId {
        AssetId(self.next.fetch_add(count, Ordering::Relaxed))
    }

    /// Next id that would be handed out
    pub fn peek(&self) -> AssetId {
        AssetId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_start_at_one() {
        let ids = IdAllocator::new();
        let first = ids.allocate();
        assert!(first.is_valid());
        assert_eq!(first.get(), 1);
        assert_eq!(ids.allocate().get(), 2);
    }

    #[test]
    fn test_range_is_contiguous() {
        let ids = IdAllocator::new();
        ids.allocate();
        let first = ids.allocate_range(3);
        assert_eq!(first.get(), 2);
        assert_eq!(ids.peek().get(), 5);
        assert_eq!(first.offset(2).get(), 4);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..250).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<AssetId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
