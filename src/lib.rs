//! hhd-settings - Declarative schema and live state synchronization for the
//! handheld daemon
//!
//! Plugins declare their configuration as typed schema trees and register
//! them under a namespace. The engine merges the persisted state document
//! over the schema defaults, validates every value, keeps unknown keys for
//! plugins that are not loaded, and hot-reloads external edits. Clients read,
//! write and watch settings through [`Settings`].

pub mod config;
pub mod error;
pub mod merge;
pub mod path;
pub mod reconcile;
pub mod schema;
pub mod settings;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{
    Result, SchemaError, SettingsError, ValidationError, ValidationWarning, WarningKind,
};
pub use path::SettingPath;
pub use reconcile::{
    ApplyOutcome, ChangeEvent, DocumentWatcher, ReconcilePhase, Reconciler, ReconcilerOptions,
    Subscription, WatchFilter, WatchOptions,
};
pub use schema::{SchemaNode, SchemaRegistry, UnifiedSchema};
pub use settings::Settings;
pub use state::{PersistedDocument, Rgb, StateStore, StateValue};
pub use storage::{DocumentStore, MemoryStore, StateFile};
