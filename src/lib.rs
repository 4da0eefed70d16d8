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


//! Asset Binder - resource resolution and parameter binding
//!
//! Turns descriptors such as `"Furniture.Chair#2"` into stable asset ids,
//! binds generation parameters to scriptable host objects through setup
//! actions, and manages procedurally generated textures.
//!
//! ```
//! use std::sync::Arc;
//! use asset_binder::prelude::*;
//!
//! # struct NoTextures;
//! # impl TextureFactory for NoTextures {
//! #     fn create(&self, _: &TextureDescriptor) -> Arc<dyn HostTexture> { unimplemented!() }
//! # }
//! let mut list = ResourceList::new("Props");
//! let root = list.resources();
//! list.add(root, ResourceEntry::new("Crate", EntryKind::Asset(AssetEntry::new("/Game/Crate")))).unwrap();
//!
//! let db = AssetDatabase::new(DatabaseConfig::default(), Arc::new(NoTextures));
//! db.insert_list(list);
//! db.set_root("Props");
//! assert!(db.check_valid("Props.Crate"));
//! ```

pub mod capability;
pub mod config;
pub mod database;
pub mod descriptor;
pub mod dynamic;
pub mod entry;
pub mod error;
pub mod events;
pub mod ids;
#[cfg(feature = "profiling")]
pub mod logging;
pub mod material;
pub mod parameters;
pub mod prelude;
pub mod reflection;
pub mod resource_list;
pub mod setup;
pub mod texture;
pub mod value;
pub mod value_source;

pub use config::DatabaseConfig;
pub use database::{AssetDatabase, AssetHost};
pub use error::{BindError, Result};
pub use ids::AssetId;
