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

//! Error types

use std::fmt;

use crate::value::ValueType;

/// Binding and resolution error type
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// Resource list not registered with the database
    ListNotFound(String),

    /// Entry key does not belong to the list
    EntryNotFound,

    /// Descriptor failed to parse
    InvalidDescriptor(String),

    /// Structural edit rejected (removing a root, self-parenting, ...)
    InvalidEdit(String),

    /// Host type name not present in the type registry
    TypeNotFound(String),

    /// Property not found among the bindable properties of a type
    PropertyNotFound(String),

    /// Method not found among the bindable methods of a type
    MethodNotFound(String),

    /// Setup action used before its capability handle was resolved
    MetadataNotInitialised(String),

    /// Target object is not derived from the type a capability was cached for
    TargetTypeMismatch { expected: String, actual: String },

    /// Value source references a parameter id the context does not declare
    UnknownParameter(u32),

    /// No coercion rule from the available type to the requested one
    NoCoercion { from: ValueType, to: ValueType },

    /// Host rejected a property write or argument conversion
    HostRejected(String),

    /// Serialization error
    SerializationError(String),

    /// IO error (file operations, etc.)
    IoError(String),

    /// A global log subscriber was already installed
    LoggingInit(String),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::ListNotFound(name) => write!(f, "Resource list not found: {name}"),
            BindError::EntryNotFound => write!(f, "Entry not found"),
            BindError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {msg}"),
            BindError::InvalidEdit(msg) => write!(f, "Invalid edit: {msg}"),
            BindError::TypeNotFound(name) => write!(f, "Type not registered: {name}"),
            BindError::PropertyNotFound(name) => write!(f, "Bindable property not found: {name}"),
            BindError::MethodNotFound(name) => write!(f, "Bindable method not found: {name}"),
            BindError::MetadataNotInitialised(name) => {
                write!(f, "Setup action '{name}' has no resolved metadata")
            }
            BindError::TargetTypeMismatch { expected, actual } => {
                write!(f, "Target type mismatch: expected {expected}, got {actual}")
            }
            BindError::UnknownParameter(id) => write!(f, "Unknown parameter id: {id}"),
            BindError::NoCoercion { from, to } => {
                write!(f, "No coercion from {from} to {to}")
            }
            BindError::HostRejected(msg) => write!(f, "Host rejected value: {msg}"),
            BindError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            BindError::IoError(msg) => write!(f, "IO error: {msg}"),
            BindError::LoggingInit(msg) => write!(f, "Logging init failed: {msg}"),
        }
    }
}

impl std::error::Error for BindError {}

impl From<std::io::Error> for BindError {
    fn from(err: std::io::Error) -> Self {
        BindError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for BindError {
    fn from(err: serde_json::Error) -> Self {
        BindError::SerializationError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = BindError::NoCoercion {
            from: ValueType::Bool,
            to: ValueType::Colour,
        };
        assert_eq!(err.to_string(), "No coercion from Bool to Colour");

        let err = BindError::UnknownParameter(42);
        assert_eq!(err.to_string(), "Unknown parameter id: 42");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("nope");
        let err: BindError = parse.unwrap_err().into();
        assert!(matches!(err, BindError::SerializationError(_)));
    }
}
