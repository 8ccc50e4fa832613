//! Error types for hhd-settings
//!
//! This module defines the error taxonomy of the settings engine. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! - [`SchemaError`]: registration-time problems with a plugin's schema.
//!   Fatal to that plugin's namespace only.
//! - [`ValidationError`]: a single rejected value on a client write.
//! - [`ValidationWarning`]: a rejected value found while merging a document.
//!   Never fatal; the offending leaf keeps its default.
//! - [`SettingsError`]: the crate-level error returned by the public API.

use std::fmt;

use thiserror::Error;

/// Problems detected while validating a schema at registration time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Another plugin already owns this namespace.
    #[error("Namespace '{0}' is already registered")]
    DuplicateNamespace(String),

    /// A node's default is not a member of its declared domain.
    #[error("Invalid default at '{path}': {reason}")]
    InvalidDefault { path: String, reason: String },

    /// A container declares no children.
    #[error("Container at '{0}' has no children")]
    EmptyContainer(String),

    /// A mode declares no variants.
    #[error("Mode at '{0}' has no variants")]
    EmptyModeVariants(String),

    /// A namespace, child, or variant name is empty, reserved, or contains a
    /// path delimiter.
    #[error("Invalid name '{name}' at '{path}': {reason}")]
    InvalidName {
        path: String,
        name: String,
        reason: String,
    },
}

/// A value rejected by the per-node validation rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The value has the wrong JSON type for the node.
    #[error("Type mismatch at '{path}': expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// The value has the right type but is not in the node's domain.
    #[error("Value {value} at '{path}' is out of range: allowed {allowed}")]
    OutOfRange {
        path: String,
        value: String,
        allowed: String,
    },

    /// A mode was switched to a variant it does not declare.
    #[error("Unknown variant '{variant}' at '{path}': allowed {allowed}")]
    UnknownVariant {
        path: String,
        variant: String,
        allowed: String,
    },

    /// The written path does not exist in the unified schema.
    #[error("No setting at '{0}'")]
    UnknownPath(String),
}

impl ValidationError {
    /// The dotted path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::TypeMismatch { path, .. }
            | ValidationError::OutOfRange { path, .. }
            | ValidationError::UnknownVariant { path, .. } => path,
            ValidationError::UnknownPath(path) => path,
        }
    }
}

/// Category of a merge-time warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    TypeMismatch,
    OutOfRange,
    UnknownVariant,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WarningKind::TypeMismatch => "type mismatch",
            WarningKind::OutOfRange => "out of range",
            WarningKind::UnknownVariant => "unknown variant",
        };
        f.write_str(label)
    }
}

/// A non-fatal anomaly found while merging an override document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// Dotted path of the offending value.
    pub path: String,
    pub kind: WarningKind,
    /// Human-readable description, suitable for logs.
    pub message: String,
}

impl From<ValidationError> for ValidationWarning {
    fn from(err: ValidationError) -> Self {
        let kind = match &err {
            ValidationError::TypeMismatch { .. } | ValidationError::UnknownPath(_) => {
                WarningKind::TypeMismatch
            }
            ValidationError::OutOfRange { .. } => WarningKind::OutOfRange,
            ValidationError::UnknownVariant { .. } => WarningKind::UnknownVariant,
        };
        Self {
            path: err.path().to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.kind, self.message)
    }
}

/// The primary error type for hhd-settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Schema registration failures
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A client write was rejected; the active state is unchanged
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Daemon configuration errors (bad config file, missing directories, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing document could not be written; the write was aborted
    #[error("Persistence error: {0}")]
    Persist(String),

    /// The backing document exists but could not be parsed
    #[error("Document parse error: {0}")]
    Parse(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Resource not found (paths, namespaces, documents)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized `Result` type for hhd-settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
