//! Runtime state: values, immutable snapshots, and persisted documents.

pub mod document;
pub mod store;
pub mod value;

pub use document::{DocumentFormat, PersistedDocument, VERSION_KEY};
pub use store::StateStore;
pub use value::{ContainerState, ModeState, Rgb, StateValue, COLOR_CHANNELS};
