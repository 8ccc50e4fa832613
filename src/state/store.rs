//! The state store: one immutable snapshot of every plugin's values.
//!
//! Stores are never mutated once published. Writers build a new candidate
//! (usually by cloning the active store) and the reconciler swaps it in.

use serde_json::{Map, Value};

use crate::path::SettingPath;

use super::document::{PersistedDocument, VERSION_KEY};
use super::value::{ContainerState, StateValue};

/// A complete state tree for a unified schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStore {
    root: ContainerState,
}

impl StateStore {
    pub fn new(root: ContainerState) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ContainerState {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut ContainerState {
        &mut self.root
    }

    /// Read the value at `path`. The root path yields the whole tree.
    pub fn get(&self, path: &SettingPath) -> Option<StateValue> {
        match path.segments().split_first() {
            None => Some(StateValue::Container(self.root.clone())),
            Some((namespace, rest)) => self.root.get(namespace)?.lookup(rest),
        }
    }

    /// Read the value at `path` in document form.
    pub fn get_json(&self, path: &SettingPath) -> Option<Value> {
        self.get(path).map(|v| v.to_json())
    }

    /// Every leaf under the root with its canonical path, in display order.
    pub fn leaves(&self) -> Vec<(SettingPath, StateValue)> {
        let mut out = Vec::new();
        let root = SettingPath::root();
        for (namespace, value) in &self.root.values {
            value.collect_leaves(&root.child(namespace), &mut out);
        }
        out
    }

    /// Serialize the full tree. `version` (when given) is written first,
    /// then every namespace in registration order, then unknown top-level
    /// keys (namespaces of plugins that are not loaded).
    pub fn to_document(&self, version: Option<&str>) -> PersistedDocument {
        let mut out = Map::new();
        if let Some(version) = version {
            out.insert(VERSION_KEY.to_string(), Value::String(version.to_string()));
        }
        for (namespace, value) in self.root.values.iter().filter(|(_, v)| v.is_persisted()) {
            out.insert(namespace.clone(), value.to_json());
        }
        for (key, value) in &self.root.unknown {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        PersistedDocument::new(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> StateStore {
        let mut root = ContainerState::new(vec![(
            "lgc".to_string(),
            StateValue::Container(ContainerState::new(vec![
                ("gyro".to_string(), StateValue::Bool(true)),
                ("tdp".to_string(), StateValue::Int(15)),
            ])),
        )]);
        root.unknown.insert("other_plugin".into(), json!({"x": 1}));
        StateStore::new(root)
    }

    #[test]
    fn test_get_paths() {
        let s = store();
        assert_eq!(s.get(&"lgc.tdp".into()), Some(StateValue::Int(15)));
        assert_eq!(s.get_json(&"lgc".into()), Some(json!({"gyro": true, "tdp": 15})));
        assert!(s.get(&"other_plugin".into()).is_none());
        assert!(s.get(&SettingPath::root()).is_some());
    }

    #[test]
    fn test_leaves() {
        let leaves = store().leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0.to_string(), "lgc.gyro");
    }

    #[test]
    fn test_to_document_order() {
        let doc = store().to_document(Some("deadbeef"));
        let rendered = serde_json::to_string(doc.root()).unwrap();
        assert_eq!(
            rendered,
            r#"{"version":"deadbeef","lgc":{"gyro":true,"tdp":15},"other_plugin":{"x":1}}"#
        );
    }
}
