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

//! Global log subscriber setup
//!
//! Library code only emits `tracing` events; hosts that want them printed
//! call [`init_logging`] once at startup:
//!
//! ```no_run
//! use asset_binder::config::LoggingConfig;
//!
//! let _guard = asset_binder::logging::init_logging(&LoggingConfig::default()).unwrap();
//! ```

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{BindError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.filter`. The returned guard
/// flushes the file writer when dropped and must be kept alive.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| BindError::LoggingInit(e.to_string()))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(if config.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    });

    let guard = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_writer(writer).with_ansi(false);
            layers.push(if config.json {
                file.json().boxed()
            } else {
                file.boxed()
            });
            Some(guard)
        }
        None => None,
    };

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| BindError::LoggingInit(e.to_string()))?;
    Ok(guard)
}
