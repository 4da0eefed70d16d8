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

//! JSON configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};
use crate::material::FIRST_TEXTURE_ID;

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// List searched first, `None` until a root is set
    pub root_list: Option<String>,
    /// Name reported for the shared bad-resource entry
    pub missing_resource_name: String,
    /// Record unresolved descriptors for [`missing`](crate::database::AssetDatabase::missing)
    pub record_missing: bool,
    pub first_texture_id: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root_list: None,
            missing_resource_name: "missing resource".to_string(),
            record_missing: true,
            first_texture_id: FIRST_TEXTURE_ID,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
    /// Daily rolling log files are written here when set
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "asset_binder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl BinderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BinderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| BindError::IoError(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.database.first_texture_id == 0 {
            return Err(BindError::SerializationError(
                "first_texture_id must be positive".to_string(),
            ));
        }
        if self.database.missing_resource_name.is_empty() {
            return Err(BindError::SerializationError(
                "missing_resource_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
