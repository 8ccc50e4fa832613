//! The settings access surface.
//!
//! [`Settings`] is the handle plugins and UI bridges use to read, write and
//! watch state. It is cheap to clone; every clone shares one reconciler.
//!
//! # Example
//!
//! ```rust
//! use hhd_settings::schema::{SchemaNode, SchemaRegistry};
//! use hhd_settings::Settings;
//! use serde_json::json;
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register("lgc", SchemaNode::container().with_child("gyro", SchemaNode::boolean(true)))
//!     .unwrap();
//! let settings = Settings::in_memory(registry.unified());
//! registry.shutdown();
//!
//! settings.set("lgc.gyro", json!(false)).unwrap();
//! assert_eq!(settings.get_json("lgc/gyro").unwrap(), json!(false));
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::{Result, SettingsError, ValidationWarning};
use crate::merge;
use crate::path::SettingPath;
use crate::reconcile::{
    ApplyOutcome, DocumentWatcher, Reconciler, ReconcilerOptions, Subscription, WatchFilter,
    WatchOptions,
};
use crate::schema::{profile_header, state_header, UnifiedSchema};
use crate::state::{PersistedDocument, StateStore, StateValue};
use crate::storage::{DocumentStore, MemoryStore, StateFile};

/// Shared handle to the live settings.
#[derive(Clone)]
pub struct Settings {
    reconciler: Arc<Reconciler>,
}

impl Settings {
    /// Open settings backed by `store`. Returns the warnings from merging the
    /// stored document.
    pub fn open(
        schema: UnifiedSchema,
        store: Box<dyn DocumentStore>,
        options: ReconcilerOptions,
    ) -> (Self, Vec<ValidationWarning>) {
        let (reconciler, warnings) = Reconciler::open(Arc::new(schema), store, options);
        (
            Self {
                reconciler: Arc::new(reconciler),
            },
            warnings,
        )
    }

    /// Open settings backed by a state file, written with a commented schema
    /// description.
    pub fn open_file(
        schema: UnifiedSchema,
        path: impl Into<PathBuf>,
        options: ReconcilerOptions,
    ) -> (Self, Vec<ValidationWarning>) {
        let file = StateFile::new(path).with_header(state_header(&schema));
        Self::open(schema, Box::new(file), options)
    }

    /// Settings kept only in memory.
    pub fn in_memory(schema: UnifiedSchema) -> Self {
        Self::open(
            schema,
            Box::new(MemoryStore::new()),
            ReconcilerOptions::default(),
        )
        .0
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn schema(&self) -> &Arc<UnifiedSchema> {
        self.reconciler.schema()
    }

    /// The whole active state. Stays valid after later changes.
    pub fn snapshot(&self) -> Arc<StateStore> {
        self.reconciler.snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.reconciler.revision()
    }

    /// Read the value at `path`.
    pub fn get(&self, path: impl Into<SettingPath>) -> Result<StateValue> {
        let path = path.into();
        self.snapshot()
            .get(&path)
            .ok_or_else(|| SettingsError::NotFound(path.to_string()))
    }

    /// Read the value at `path` in document form.
    pub fn get_json(&self, path: impl Into<SettingPath>) -> Result<Value> {
        self.get(path).map(|value| value.to_json())
    }

    /// Validate and apply a single write. On any error the active state and
    /// the stored document are unchanged.
    pub fn set(&self, path: impl Into<SettingPath>, value: Value) -> Result<ApplyOutcome> {
        let path = path.into();
        let outcome = self.reconciler.write_with(|schema, current| {
            let next = merge::write_path(schema, current, &path, &value)?;
            Ok((next, Vec::new()))
        })?;
        info!(path = %path, changed = outcome.changed.len(), "Setting written");
        Ok(outcome)
    }

    /// Overlay a partial document onto the current state. Invalid values are
    /// skipped with warnings and unknown keys ignored.
    pub fn apply_document(&self, document: &Value) -> Result<ApplyOutcome> {
        self.reconciler
            .write_with(|schema, current| Ok(merge::apply_profile(schema, current, document)))
    }

    /// Load a profile file (YAML, or JSON by extension) and apply it.
    pub fn apply_profile(&self, path: &Path) -> Result<ApplyOutcome> {
        let document = PersistedDocument::read_from(path)?
            .ok_or_else(|| SettingsError::NotFound(path.display().to_string()))?;
        let outcome = self.apply_document(document.root())?;
        info!(
            profile = %path.display(),
            changed = outcome.changed.len(),
            warnings = outcome.warnings.len(),
            "Profile applied"
        );
        Ok(outcome)
    }

    /// Write the state under `prefix` as a profile document that
    /// [`Settings::apply_profile`] accepts. Shorthand variant paths are
    /// nested under their canonical `variants.<key>` form.
    pub fn save_profile(&self, path: &Path, prefix: impl Into<SettingPath>) -> Result<()> {
        let prefix = prefix.into();
        let canonical = self
            .schema()
            .canonical_path(&prefix)
            .ok_or_else(|| SettingsError::NotFound(prefix.to_string()))?;

        let snapshot = self.snapshot();
        let root = if canonical.is_empty() {
            snapshot.to_document(None).into_value()
        } else {
            let value = snapshot
                .get_json(&canonical)
                .ok_or_else(|| SettingsError::NotFound(canonical.to_string()))?;
            canonical
                .segments()
                .iter()
                .rev()
                .fold(value, |inner, segment| {
                    let mut map = serde_json::Map::new();
                    map.insert(segment.clone(), inner);
                    Value::Object(map)
                })
        };

        StateFile::new(path)
            .with_header(profile_header(self.schema()))
            .save(&PersistedDocument::new(root))?;
        info!(profile = %path.display(), prefix = %canonical, "Profile saved");
        Ok(())
    }

    /// Subscribe to leaf changes at or under `prefix`. Shorthand variant
    /// paths match the same leaves as their canonical form.
    pub fn watch(&self, prefix: impl Into<SettingPath>) -> Subscription {
        let prefix = prefix.into();
        let prefix = self.schema().canonical_path(&prefix).unwrap_or(prefix);
        self.reconciler.subscribe(WatchFilter::Prefix(prefix))
    }

    /// Subscribe to changes of leaves tagged `tag` (directly or through an
    /// ancestor).
    pub fn watch_tag(&self, tag: impl Into<String>) -> Subscription {
        self.reconciler.subscribe(WatchFilter::Tag(tag.into()))
    }

    /// Re-read the backing document now.
    pub fn reload(&self) -> Result<ApplyOutcome> {
        self.reconciler.reload()
    }

    /// Reload automatically whenever the file at `path` changes. Must be
    /// called from within a tokio runtime.
    pub fn watch_document(&self, path: impl Into<PathBuf>, options: WatchOptions) -> DocumentWatcher {
        DocumentWatcher::spawn(Arc::clone(&self.reconciler), path.into(), options)
    }
}
