//! Schema registry for hhd-settings
//!
//! This module provides the `SchemaRegistry` that composes every plugin's
//! schema tree into one namespaced [`UnifiedSchema`]. Each plugin owns exactly
//! one namespace; registering a namespace twice is an error, never a silent
//! overwrite.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::SchemaError;
use crate::path::{SettingPath, ACTIVE_SEGMENT, VARIANTS_SEGMENT};
use crate::state::{ContainerState, StateStore, VERSION_KEY};

use super::describe;
use super::node::{NodeKind, SchemaNode};

fn namespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").expect("valid regex"))
}

/// Validate a namespace name: 1-64 alphanumerics, `_` and `-`, not reserved.
pub fn validate_namespace(namespace: &str) -> Result<(), SchemaError> {
    let reason = if namespace == VERSION_KEY {
        Some("name is reserved for document metadata")
    } else if !namespace_regex().is_match(namespace) {
        Some("must be 1-64 alphanumeric characters, underscores and hyphens, starting with alphanumeric")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SchemaError::InvalidName {
            path: String::new(),
            name: namespace.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// A registry of plugin schemas keyed by namespace.
///
/// The registry is an explicit object handed to each plugin at
/// initialization, scoped to the daemon process and torn down with
/// [`SchemaRegistry::shutdown`].
///
/// # Example
///
/// ```rust
/// use hhd_settings::schema::{SchemaNode, SchemaRegistry};
///
/// let mut registry = SchemaRegistry::new();
/// registry
///     .register("lgc", SchemaNode::container().with_child("gyro", SchemaNode::boolean(true)))
///     .unwrap();
///
/// assert!(registry.register("lgc", SchemaNode::boolean(false)).is_err());
/// assert_eq!(registry.namespace_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    /// Namespaces in first-registered order.
    namespaces: Vec<(String, SchemaNode)>,
}

impl SchemaRegistry {
    /// Create a new empty schema registry.
    pub fn new() -> Self {
        Self {
            namespaces: Vec::new(),
        }
    }

    /// Register a plugin schema under `namespace`.
    ///
    /// Fails with `DuplicateNamespace` if the namespace is taken, or with
    /// the first structural error found in `schema`. On failure the
    /// registry is unchanged.
    pub fn register(&mut self, namespace: &str, schema: SchemaNode) -> Result<(), SchemaError> {
        if self.contains(namespace) {
            return Err(SchemaError::DuplicateNamespace(namespace.to_string()));
        }
        validate_namespace(namespace)?;
        schema.validate(SettingPath::from_segments([namespace]))?;

        info!(
            namespace = %namespace,
            kind = schema.type_name(),
            "Registered schema"
        );
        self.namespaces.push((namespace.to_string(), schema));
        Ok(())
    }

    /// Get a plugin's schema by namespace.
    pub fn get(&self, namespace: &str) -> Option<&SchemaNode> {
        self.namespaces
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, node)| node)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.get(namespace).is_some()
    }

    /// Registered namespaces in first-registered order.
    pub fn namespaces(&self) -> Vec<&str> {
        self.namespaces.iter().map(|(ns, _)| ns.as_str()).collect()
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    /// Snapshot the registered schemas as a unified schema.
    pub fn unified(&self) -> UnifiedSchema {
        UnifiedSchema {
            namespaces: self.namespaces.clone(),
        }
    }

    /// Tear the registry down at daemon shutdown.
    pub fn shutdown(&mut self) {
        if !self.namespaces.is_empty() {
            info!(namespaces = self.namespaces.len(), "Schema registry shut down");
        }
        self.namespaces.clear();
    }
}

impl Drop for SchemaRegistry {
    fn drop(&mut self) {
        if !self.namespaces.is_empty() {
            warn!(
                namespaces = self.namespaces.len(),
                "Schema registry dropped without shutdown"
            );
        }
    }
}

/// Every plugin's schema, namespaced. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedSchema {
    namespaces: Vec<(String, SchemaNode)>,
}

impl UnifiedSchema {
    /// Namespaces and their schemas in display order.
    pub fn entries(&self) -> &[(String, SchemaNode)] {
        &self.namespaces
    }

    pub fn namespace(&self, namespace: &str) -> Option<&SchemaNode> {
        self.namespaces
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// The state every path takes when no override is present.
    pub fn defaults(&self) -> StateStore {
        StateStore::new(ContainerState::new(
            self.namespaces
                .iter()
                .map(|(ns, node)| (ns.clone(), node.default_state()))
                .collect(),
        ))
    }

    /// Resolve the schema node addressed by `path`. A mode's `active` segment
    /// resolves to the mode node itself.
    pub fn node_at(&self, path: &SettingPath) -> Option<&SchemaNode> {
        self.resolve(path).map(|(node, _)| node)
    }

    /// The canonical spelling of `path`: shorthand variant keys inside modes
    /// are expanded to `variants.<key>`. The root path is its own canonical
    /// form. `None` if the path does not exist in the schema.
    pub fn canonical_path(&self, path: &SettingPath) -> Option<SettingPath> {
        if path.is_empty() {
            return Some(SettingPath::root());
        }
        self.resolve(path).map(|(_, canonical)| canonical)
    }

    fn resolve(&self, path: &SettingPath) -> Option<(&SchemaNode, SettingPath)> {
        let (namespace, rest) = path.segments().split_first()?;
        let mut node = self.namespace(namespace)?;
        let mut canonical = SettingPath::from_segments([namespace.as_str()]);
        let mut segments = rest.iter();
        while let Some(segment) = segments.next() {
            node = match &node.kind {
                NodeKind::Container { .. } => {
                    canonical = canonical.child(segment);
                    node.get_child(segment)?
                }
                NodeKind::Mode { .. } if segment == ACTIVE_SEGMENT => {
                    return segments
                        .next()
                        .is_none()
                        .then(|| (node, canonical.child(ACTIVE_SEGMENT)));
                }
                NodeKind::Mode { .. } => {
                    let key = if segment == VARIANTS_SEGMENT {
                        segments.next()?
                    } else {
                        segment
                    };
                    canonical = canonical.child(VARIANTS_SEGMENT).child(key);
                    node.get_variant(key)?
                }
                _ => return None,
            };
        }
        Some((node, canonical))
    }

    /// Tags of every leaf path, including tags inherited from ancestors.
    pub fn leaf_tags(&self) -> HashMap<SettingPath, BTreeSet<String>> {
        let mut out = HashMap::new();
        for (namespace, node) in &self.namespaces {
            collect_tags(
                node,
                &SettingPath::from_segments([namespace.as_str()]),
                &BTreeSet::new(),
                &mut out,
            );
        }
        out
    }

    /// Every leaf path whose node, or an ancestor, carries `tag`.
    pub fn paths_with_tag(&self, tag: &str) -> Vec<SettingPath> {
        let mut paths: Vec<SettingPath> = self
            .leaf_tags()
            .into_iter()
            .filter(|(_, tags)| tags.contains(tag))
            .map(|(path, _)| path)
            .collect();
        paths.sort();
        paths
    }

    /// Commented, tree-shaped description of every node.
    pub fn describe(&self) -> String {
        describe::describe(self)
    }

    /// Short fingerprint of the schema, recorded as `version` in saved
    /// documents.
    pub fn fingerprint(&self) -> String {
        describe::fingerprint(&self.describe())
    }
}

fn collect_tags(
    node: &SchemaNode,
    path: &SettingPath,
    inherited: &BTreeSet<String>,
    out: &mut HashMap<SettingPath, BTreeSet<String>>,
) {
    let mut tags = inherited.clone();
    tags.extend(node.meta.tags.iter().cloned());

    match &node.kind {
        NodeKind::Container { children } => {
            for (name, child) in children {
                collect_tags(child, &path.child(name), &tags, out);
            }
        }
        NodeKind::Mode { variants, .. } => {
            out.insert(path.child(ACTIVE_SEGMENT), tags.clone());
            let base = path.child(VARIANTS_SEGMENT);
            for (key, variant) in variants {
                collect_tags(variant, &base.child(key), &tags, out);
            }
        }
        _ => {
            out.insert(path.clone(), tags);
        }
    }
}
