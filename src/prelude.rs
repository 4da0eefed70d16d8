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


//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use asset_binder::prelude::*;
//! ```

pub use crate::capability::{CapabilityCache, TypeCapabilities};
pub use crate::config::{BinderConfig, DatabaseConfig, LoggingConfig};
pub use crate::database::{AssetDatabase, AssetHost, CacheStats, ResolvedAsset, TextureSource};
pub use crate::descriptor::Descriptor;
pub use crate::dynamic::{DynamicAssets, HostTexture, TextureDescriptor, TextureFactory, TickReport};
pub use crate::entry::{
    Asset3dEntry, AssetEntry, Bounds, BoundsSpec, ComponentEntry, EntryKind, ExpectedParameter,
    ListReference, PlacementFixup, ResourceEntry, VariantsEntry,
};
pub use crate::error::{BindError, Result};
pub use crate::events::{AssetEvent, EventHub};
pub use crate::ids::{AssetId, IdAllocator};
pub use crate::material::{MaterialEntry, MaterialInstance};
pub use crate::parameters::{ParameterCollection, ParameterList};
pub use crate::reflection::{HostKind, HostValue, Scriptable, TypeInfo, TypeRegistry};
pub use crate::resource_list::{EntryKey, ResourceList};
pub use crate::setup::{ApplyReport, SetupAction, SetupActionList};
pub use crate::texture::{PixelBuffer, PixelData, PixelFormat};
pub use crate::value::{Colour, Frame, Transform, Value, ValueType};
pub use crate::value_source::ValueSource;
