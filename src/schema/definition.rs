//! Schema definition files.
//!
//! Plugins that do not build their schema in Rust ship a definition file
//! (YAML or JSON) declaring one namespace:
//!
//! ```yaml
//! namespace: lgc
//! schema:
//!   type: container
//!   title: Legion Go Controllers
//!   children:
//!     xinput:
//!       type: mode
//!       title: Emulation Mode
//!       default: ds5e
//!       variants:
//!         disabled: {type: container, children: {noop: {type: bool, default: false}}}
//!         ds5e: {type: container, children: {led_support: {type: bool, default: true}}}
//!     gyro:
//!       type: bool
//!       title: Gyro
//!       tags: [motion]
//!       default: true
//! ```
//!
//! This module handles discovering definition files, parsing them into
//! [`SchemaNode`] trees, and registering them. Invalid files are logged and
//! skipped so one broken plugin never prevents the others from loading.

use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};
use tracing::{info, warn};

use crate::error::{Result, SchemaError, SettingsError};
use crate::path::SettingPath;
use crate::state::{DocumentFormat, Rgb, COLOR_CHANNELS};

use super::node::{NodeMeta, SchemaNode};
use super::registry::SchemaRegistry;

/// One plugin's definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDefinition {
    /// Namespace the plugin owns in the unified schema.
    pub namespace: String,
    /// Root node of the plugin's tree.
    pub schema: NodeDef,
}

/// Node type tag in definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Bool,
    Discrete,
    Multiple,
    Integer,
    Number,
    Color,
    Event,
    Container,
    Mode,
}

/// A node as written in a definition file, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDef {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Integer list for `discrete`, key-to-label mapping for `multiple`.
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub min: Option<Number>,
    #[serde(default)]
    pub max: Option<Number>,
    #[serde(default)]
    pub children: Ordered<NodeDef>,
    #[serde(default)]
    pub variants: Ordered<NodeDef>,
}

/// A mapping deserialized into a list so that document order is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered<T>(pub Vec<(String, T)>);

impl<T> Default for Ordered<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of names to nodes")
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Ordered::default())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_any(OrderedVisitor(PhantomData))
    }
}

impl NodeDef {
    /// Convert into a schema node. Only checks that the fields each node
    /// type needs are present and well-typed; domain checks happen at
    /// registration.
    pub fn into_node(self, path: &SettingPath) -> std::result::Result<SchemaNode, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidDefault {
            path: path.to_string(),
            reason,
        };
        let meta = NodeMeta {
            title: self.title,
            hint: self.hint,
            tags: self.tags.into_iter().collect(),
        };

        let node = match self.node_type {
            NodeType::Bool => match self.default {
                Some(Value::Bool(default)) => SchemaNode::boolean(default),
                other => return Err(invalid(format!("bool default must be true or false, got {}", show(&other)))),
            },
            NodeType::Discrete => {
                let options = match &self.options {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| item.as_i64().ok_or_else(|| invalid(format!("discrete option {} is not an integer", item))))
                        .collect::<std::result::Result<Vec<i64>, _>>()?,
                    other => return Err(invalid(format!("discrete options must be a list, got {}", show(other)))),
                };
                let default = self
                    .default
                    .as_ref()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| invalid(format!("discrete default must be an integer, got {}", show(&self.default))))?;
                SchemaNode::discrete(options, default)
            }
            NodeType::Multiple => {
                let options = match self.options {
                    Some(Value::Object(map)) => map
                        .into_iter()
                        .map(|(key, label)| {
                            let label = match label {
                                Value::String(s) => s,
                                other => other.to_string(),
                            };
                            (key, label)
                        })
                        .collect::<Vec<_>>(),
                    other => return Err(invalid(format!("multiple options must be a mapping, got {}", show(&other)))),
                };
                let default = match self.default {
                    Some(Value::String(s)) => s,
                    other => return Err(invalid(format!("multiple default must be an option key, got {}", show(&other)))),
                };
                SchemaNode::multiple(options, default)
            }
            NodeType::Integer => {
                let bound = |n: &Option<Number>, name: &str| match n {
                    None => Ok(None),
                    Some(n) => n
                        .as_i64()
                        .map(Some)
                        .ok_or_else(|| invalid(format!("integer {} {} is not an integer", name, n))),
                };
                let min = bound(&self.min, "min")?;
                let max = bound(&self.max, "max")?;
                let default = self
                    .default
                    .as_ref()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| invalid(format!("integer default must be an integer, got {}", show(&self.default))))?;
                SchemaNode::integer(min, max, default)
            }
            NodeType::Number => {
                let default = self
                    .default
                    .as_ref()
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid(format!("number default must be numeric, got {}", show(&self.default))))?;
                SchemaNode::number(
                    self.min.as_ref().and_then(Number::as_f64),
                    self.max.as_ref().and_then(Number::as_f64),
                    default,
                )
            }
            NodeType::Color => match &self.default {
                None => SchemaNode::color(Rgb::default()),
                Some(value) => SchemaNode::color(color_default(value).ok_or_else(|| {
                    invalid(format!("color default must map red, green and blue to 0-255, got {}", value))
                })?),
            },
            NodeType::Event => SchemaNode::event(),
            NodeType::Container => {
                let mut node = SchemaNode::container();
                for (name, child) in self.children.0 {
                    let child = child.into_node(&path.child(&name))?;
                    node = node.with_child(name, child);
                }
                node
            }
            NodeType::Mode => {
                let default = match self.default {
                    Some(Value::String(s)) => s,
                    other => return Err(invalid(format!("mode default must be a variant key, got {}", show(&other)))),
                };
                let mut node = SchemaNode::mode(default);
                for (key, variant) in self.variants.0 {
                    let variant = variant.into_node(&path.child("variants").child(&key))?;
                    node = node.with_variant(key, variant);
                }
                node
            }
        };

        Ok(SchemaNode { meta, ..node })
    }
}

fn color_default(value: &Value) -> Option<Rgb> {
    let map = value.as_object()?;
    let mut rgb = [0u8; 3];
    for (slot, name) in rgb.iter_mut().zip(COLOR_CHANNELS) {
        *slot = map.get(name)?.as_u64().and_then(|v| u8::try_from(v).ok())?;
    }
    let [red, green, blue] = rgb;
    Some(Rgb::new(red, green, blue))
}

fn show(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "nothing".to_string(),
    }
}

impl SchemaDefinition {
    /// Split into the namespace and its converted schema tree.
    pub fn into_parts(self) -> std::result::Result<(String, SchemaNode), SchemaError> {
        let path = SettingPath::from_segments([self.namespace.as_str()]);
        let node = self.schema.into_node(&path)?;
        Ok((self.namespace, node))
    }
}

fn is_definition_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml") | Some("json")
    )
}

/// Load a single definition file.
///
/// # Errors
/// - `SettingsError::Config` if the file cannot be read
/// - `SettingsError::Yaml` / `SettingsError::Json` if it is malformed
pub fn load_definition(path: &Path) -> Result<SchemaDefinition> {
    let content = fs::read_to_string(path).map_err(|e| {
        SettingsError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let definition = match DocumentFormat::from_path(path) {
        DocumentFormat::Json => serde_json::from_str(&content)?,
        DocumentFormat::Yaml => serde_yaml::from_str(&content)?,
    };
    Ok(definition)
}

/// Discover definition files across multiple directories.
///
/// Scans each directory (non-recursively) for `*.yml`, `*.yaml` and `*.json`
/// files, sorted by file name so load order is stable. Malformed files are
/// logged as warnings and skipped.
pub fn discover_schemas(dirs: &[PathBuf]) -> Result<Vec<SchemaDefinition>> {
    let mut definitions = Vec::new();

    for dir in dirs {
        if !dir.exists() {
            info!(dir = %dir.display(), "Schema directory does not exist, skipping");
            continue;
        }

        if !dir.is_dir() {
            warn!(path = %dir.display(), "Schema path is not a directory, skipping");
            continue;
        }

        let entries = fs::read_dir(dir).map_err(|e| {
            SettingsError::Config(format!(
                "Failed to read schema directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_definition_file(path))
            .collect();
        files.sort();

        for file in files {
            match load_definition(&file) {
                Ok(definition) => {
                    info!(
                        namespace = %definition.namespace,
                        file = %file.display(),
                        "Discovered schema definition"
                    );
                    definitions.push(definition);
                }
                Err(e) => {
                    warn!(
                        file = %file.display(),
                        error = %e,
                        "Failed to load schema definition, skipping"
                    );
                }
            }
        }
    }

    Ok(definitions)
}

/// Discover definitions and register each one. A definition failing with a
/// `SchemaError` is logged and skipped; the rest proceed. Returns the number
/// of namespaces registered.
pub fn load_schemas_into(registry: &mut SchemaRegistry, dirs: &[PathBuf]) -> Result<usize> {
    let mut registered = 0;
    for definition in discover_schemas(dirs)? {
        let namespace = definition.namespace.clone();
        let outcome = definition
            .into_parts()
            .and_then(|(namespace, node)| registry.register(&namespace, node));
        match outcome {
            Ok(()) => registered += 1,
            Err(e) => warn!(
                namespace = %namespace,
                error = %e,
                "Plugin schema rejected, namespace skipped"
            ),
        }
    }
    Ok(registered)
}
