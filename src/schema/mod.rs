//! Declarative plugin schemas.
//!
//! Plugins declare their configuration as a tree of [`SchemaNode`]s, either
//! built in Rust or loaded from a definition file, and register it under a
//! namespace with the [`SchemaRegistry`]. The registry composes every
//! namespace into a [`UnifiedSchema`], which drives validation, defaults and
//! the state file description.

pub mod definition;
pub mod describe;
pub mod node;
pub mod registry;

pub use definition::{discover_schemas, load_definition, load_schemas_into, NodeDef, SchemaDefinition};
pub use describe::{profile_header, state_header, PROFILE_HEADER, STATE_HEADER};
pub use node::{NodeKind, NodeMeta, SchemaNode};
pub use registry::{validate_namespace, SchemaRegistry, UnifiedSchema};
