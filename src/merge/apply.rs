//! Recursive application of an override value onto a state subtree.
//!
//! The same walk serves document merges, profile application and client
//! writes; [`MergeMode`] decides what happens to invalid values and unknown
//! keys.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ValidationError, ValidationWarning};
use crate::path::{SettingPath, ACTIVE_SEGMENT, VARIANTS_SEGMENT};
use crate::schema::{NodeKind, SchemaNode};
use crate::state::{ModeState, StateValue};

use super::rules::{is_reset_marker, json_type, validate_leaf, Leaf};

/// How the applier treats problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Persisted documents: invalid values warn and keep the base value,
    /// unknown keys are preserved.
    Document,
    /// Profiles: invalid values warn, reset markers and unknown keys are
    /// skipped.
    Profile,
    /// Client writes: the first problem is an error.
    Strict,
}

pub(crate) struct Applier {
    mode: MergeMode,
    warnings: Vec<ValidationWarning>,
}

impl Applier {
    pub(crate) fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<ValidationWarning> {
        self.warnings
    }

    /// Record a problem. Only strict mode turns it into an error.
    pub(crate) fn report(&mut self, err: ValidationError) -> Result<(), ValidationError> {
        match self.mode {
            MergeMode::Strict => Err(err),
            MergeMode::Document | MergeMode::Profile => {
                self.warnings.push(err.into());
                Ok(())
            }
        }
    }

    /// Handle a key that the schema does not declare.
    pub(crate) fn unknown_key(
        &mut self,
        target: &mut Map<String, Value>,
        key: &str,
        value: &Value,
        path: &SettingPath,
    ) -> Result<(), ValidationError> {
        match self.mode {
            MergeMode::Document => {
                target.insert(key.to_string(), value.clone());
                Ok(())
            }
            MergeMode::Profile => {
                debug!(path = %path.child(key), "Ignoring unknown key in profile");
                Ok(())
            }
            MergeMode::Strict => Err(ValidationError::UnknownPath(path.child(key).to_string())),
        }
    }

    /// Apply `value` onto `state`, which must have been instantiated from
    /// `node`.
    pub(crate) fn apply(
        &mut self,
        node: &SchemaNode,
        state: &mut StateValue,
        value: &Value,
        path: &SettingPath,
    ) -> Result<(), ValidationError> {
        if node.is_leaf() {
            return match validate_leaf(node, value, path) {
                Ok(Leaf::Value(v)) => {
                    *state = v;
                    Ok(())
                }
                Ok(Leaf::Reset) => {
                    if self.mode != MergeMode::Profile && !matches!(node.kind, NodeKind::Event) {
                        *state = node.default_state();
                    }
                    Ok(())
                }
                Ok(Leaf::Trigger) => {
                    if self.mode == MergeMode::Document {
                        debug!(path = %path, "Ignoring event in persisted document");
                    } else {
                        let fired = state.as_event().unwrap_or(0);
                        *state = StateValue::Event(fired.wrapping_add(1));
                    }
                    Ok(())
                }
                Err(err) => self.report(err),
            };
        }

        if is_reset_marker(value) {
            if self.mode != MergeMode::Profile {
                *state = node.default_state();
            }
            return Ok(());
        }

        let Value::Object(map) = value else {
            return self.report(ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: "mapping".to_string(),
                actual: json_type(value).to_string(),
            });
        };

        if !shape_matches(node, state) {
            *state = node.default_state();
        }

        match (&node.kind, state) {
            (NodeKind::Container { .. }, StateValue::Container(container)) => {
                for (key, child_value) in map {
                    match (node.get_child(key), container.get_mut(key)) {
                        (Some(child), Some(child_state)) => {
                            self.apply(child, child_state, child_value, &path.child(key))?
                        }
                        _ => self.unknown_key(&mut container.unknown, key, child_value, path)?,
                    }
                }
                Ok(())
            }
            (NodeKind::Mode { .. }, StateValue::Mode(mode)) => {
                // Payloads first so that a document switching modes and editing
                // the new variant is order-independent.
                if let Some(variants) = map.get(VARIANTS_SEGMENT) {
                    self.apply_variants(node, mode, variants, path)?;
                }
                for (key, entry) in map {
                    match key.as_str() {
                        VARIANTS_SEGMENT => {}
                        ACTIVE_SEGMENT => self.apply_active(node, mode, entry, path)?,
                        _ => self.unknown_key(&mut mode.unknown, key, entry, path)?,
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply_variants(
        &mut self,
        node: &SchemaNode,
        mode: &mut ModeState,
        value: &Value,
        path: &SettingPath,
    ) -> Result<(), ValidationError> {
        let base = path.child(VARIANTS_SEGMENT);
        let Value::Object(map) = value else {
            if value.is_null() {
                return Ok(());
            }
            return self.report(ValidationError::TypeMismatch {
                path: base.to_string(),
                expected: "mapping".to_string(),
                actual: json_type(value).to_string(),
            });
        };

        for (key, payload) in map {
            match (node.get_variant(key), mode.variant_mut(key)) {
                (Some(variant), Some(state)) => {
                    self.apply(variant, state, payload, &base.child(key))?
                }
                _ => self.unknown_key(&mut mode.unknown_variants, key, payload, &base)?,
            }
        }
        Ok(())
    }

    /// Switch the active variant. Other variants' payloads are untouched.
    pub(crate) fn apply_active(
        &mut self,
        node: &SchemaNode,
        mode: &mut ModeState,
        value: &Value,
        path: &SettingPath,
    ) -> Result<(), ValidationError> {
        let NodeKind::Mode { default, .. } = &node.kind else {
            return Ok(());
        };
        let active_path = path.child(ACTIVE_SEGMENT);

        match value {
            Value::String(key) if node.get_variant(key).is_some() => {
                mode.active = key.clone();
                Ok(())
            }
            v if is_reset_marker(v) => {
                if self.mode != MergeMode::Profile {
                    mode.active = default.clone();
                }
                Ok(())
            }
            Value::String(key) => self.report(ValidationError::UnknownVariant {
                path: active_path.to_string(),
                variant: key.clone(),
                allowed: node.domain(),
            }),
            other => self.report(ValidationError::TypeMismatch {
                path: active_path.to_string(),
                expected: "string".to_string(),
                actual: json_type(other).to_string(),
            }),
        }
    }
}

fn shape_matches(node: &SchemaNode, state: &StateValue) -> bool {
    matches!(
        (&node.kind, state),
        (NodeKind::Container { .. }, StateValue::Container(_))
            | (NodeKind::Mode { .. }, StateValue::Mode(_))
    )
}
