//! Merging override documents into validated state.
//!
//! [`merge`] overlays a persisted document onto the schema defaults and
//! never fails: each invalid value is dropped in favour of the default and
//! reported as a [`ValidationWarning`], and keys the schema does not know are
//! carried through untouched so they survive the next save.
//!
//! [`apply_profile`] is the same walk over the *current* state, skipping
//! unknown keys and reset markers. [`write_path`] is the strict variant used for client writes.

mod apply;
pub mod rules;
mod write;

use serde_json::Value;
use tracing::warn;

use crate::error::{ValidationError, ValidationWarning};
use crate::path::SettingPath;
use crate::schema::UnifiedSchema;
use crate::state::{PersistedDocument, StateStore, VERSION_KEY};

pub use apply::MergeMode;
pub use rules::{is_reset_marker, validate_leaf, Leaf};
pub use write::write_path;

use apply::Applier;
use rules::json_type;

/// Merge `overrides` onto the defaults of `schema`.
///
/// Guarantees that every path in the schema has a value in the result.
pub fn merge(
    schema: &UnifiedSchema,
    overrides: &PersistedDocument,
) -> (StateStore, Vec<ValidationWarning>) {
    apply_lenient(schema, schema.defaults(), overrides.root(), MergeMode::Document)
}

/// Overlay a profile document onto `base`. Keys outside the schema and
/// reset markers are skipped; invalid values keep the base value and produce
/// a warning.
pub fn apply_profile(
    schema: &UnifiedSchema,
    base: &StateStore,
    profile: &Value,
) -> (StateStore, Vec<ValidationWarning>) {
    apply_lenient(schema, base.clone(), profile, MergeMode::Profile)
}

fn apply_lenient(
    schema: &UnifiedSchema,
    mut store: StateStore,
    document: &Value,
    mode: MergeMode,
) -> (StateStore, Vec<ValidationWarning>) {
    let mut applier = Applier::new(mode);
    let root = SettingPath::root();

    let map = match document {
        Value::Object(map) => map,
        Value::Null => return (store, Vec::new()),
        other => {
            let warning = ValidationWarning::from(ValidationError::TypeMismatch {
                path: String::new(),
                expected: "mapping".to_string(),
                actual: json_type(other).to_string(),
            });
            warn!(%warning, "Ignoring document with a non-mapping root");
            return (store, vec![warning]);
        }
    };

    for (namespace, value) in map {
        if namespace == VERSION_KEY {
            continue;
        }
        let outcome = match (schema.namespace(namespace), store.root_mut().get_mut(namespace)) {
            (Some(node), Some(state)) => applier.apply(node, state, value, &root.child(namespace)),
            _ => applier.unknown_key(&mut store.root_mut().unknown, namespace, value, &root),
        };
        // Lenient modes only ever warn.
        if let Err(err) = outcome {
            applier.report(err).ok();
        }
    }

    let warnings = applier.into_warnings();
    for warning in &warnings {
        warn!(
            path = %warning.path,
            kind = %warning.kind,
            "{}", warning.message
        );
    }
    (store, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningKind;
    use crate::schema::{SchemaNode, SchemaRegistry};
    use crate::state::{Rgb, StateValue};
    use serde_json::json;

    fn schema() -> UnifiedSchema {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                "lgc",
                SchemaNode::container()
                    .with_child(
                        "xinput",
                        SchemaNode::mode("ds5e")
                            .with_variant(
                                "ds5e",
                                SchemaNode::container()
                                    .with_child("led_support", SchemaNode::boolean(true)),
                            )
                            .with_variant(
                                "uinput",
                                SchemaNode::container()
                                    .with_child("paddles", SchemaNode::boolean(false))
                                    .with_child(
                                        "deadzone",
                                        SchemaNode::integer(Some(0), Some(30), 5),
                                    ),
                            ),
                    )
                    .with_child("gyro", SchemaNode::boolean(true))
                    .with_child("tdp", SchemaNode::discrete([5, 10, 15], 15))
                    .with_child("led", SchemaNode::color(Rgb::new(0, 0, 255)))
                    .with_child("reset", SchemaNode::event()),
            )
            .unwrap();
        let unified = registry.unified();
        registry.shutdown();
        unified
    }

    fn doc(value: Value) -> PersistedDocument {
        PersistedDocument::new(value)
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let schema = schema();
        let (store, warnings) = merge(&schema, &PersistedDocument::empty());
        assert!(warnings.is_empty());
        assert_eq!(store, schema.defaults());
    }

    #[test]
    fn test_valid_overrides_apply() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({"lgc": {"gyro": false, "xinput": {"active": "uinput"}}})),
        );
        assert!(warnings.is_empty());
        assert_eq!(store.get(&"lgc.gyro".into()), Some(StateValue::Bool(false)));
        assert_eq!(
            store.get(&"lgc.xinput.active".into()),
            Some(StateValue::Str("uinput".into()))
        );
    }

    #[test]
    fn test_invalid_leaf_falls_back_to_default() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({"lgc": {"tdp": 12, "gyro": "sideways"}})),
        );
        assert_eq!(store, schema.defaults());
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].path, "lgc.tdp");
        assert_eq!(warnings[0].kind, WarningKind::OutOfRange);
        assert_eq!(warnings[1].kind, WarningKind::TypeMismatch);
    }

    #[test]
    fn test_unknown_variant_falls_back_to_default() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({"lgc": {"xinput": {"active": "xbox"}}})),
        );
        assert_eq!(
            store.get(&"lgc.xinput.active".into()),
            Some(StateValue::Str("ds5e".into()))
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnknownVariant);
        assert_eq!(warnings[0].path, "lgc.xinput.active");
    }

    #[test]
    fn test_inactive_variant_payload_is_validated() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({
                "lgc": {
                    "xinput": {
                        "active": "ds5e",
                        "variants": {"uinput": {"deadzone": 99, "paddles": true}}
                    }
                }
            })),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "lgc.xinput.variants.uinput.deadzone");
        assert_eq!(warnings[0].kind, WarningKind::OutOfRange);
        assert_eq!(
            store.get(&"lgc.xinput.variants.uinput.deadzone".into()),
            Some(StateValue::Int(5))
        );
        // Valid siblings in the same inactive payload still apply.
        assert_eq!(
            store.get(&"lgc.xinput.variants.uinput.paddles".into()),
            Some(StateValue::Bool(true))
        );
        assert_eq!(
            store.get(&"lgc.xinput.active".into()),
            Some(StateValue::Str("ds5e".into()))
        );
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let schema = schema();
        let input = json!({
            "lgc": {
                "gyro": true,
                "future_knob": {"level": 3},
                "xinput": {
                    "active": "ds5e",
                    "variants": {"steam": {"x": 1}},
                    "note": "hi"
                }
            },
            "rog": {"fan": 50}
        });
        let (store, warnings) = merge(&schema, &doc(input));
        assert!(warnings.is_empty());

        let out = store.to_document(None).into_value();
        assert_eq!(out["lgc"]["future_knob"], json!({"level": 3}));
        assert_eq!(out["lgc"]["xinput"]["variants"]["steam"], json!({"x": 1}));
        assert_eq!(out["lgc"]["xinput"]["note"], json!("hi"));
        assert_eq!(out["rog"], json!({"fan": 50}));
    }

    #[test]
    fn test_color_round_trips_and_events_are_not_saved() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({"lgc": {"led": {"red": 255, "green": 128, "blue": 0}, "reset": true}})),
        );
        assert!(warnings.is_empty());
        assert_eq!(
            store.get(&"lgc.led".into()),
            Some(StateValue::Color(Rgb::new(255, 128, 0)))
        );
        // A saved document cannot fire an event.
        assert_eq!(store.get(&"lgc.reset".into()), Some(StateValue::Event(0)));

        let out = store.to_document(None).into_value();
        assert_eq!(out["lgc"]["led"], json!({"red": 255, "green": 128, "blue": 0}));
        assert!(out["lgc"].get("reset").is_none());

        let (reloaded, warnings) = merge(&schema, &doc(out));
        assert!(warnings.is_empty());
        assert_eq!(reloaded, store);
    }

    #[test]
    fn test_reset_markers_take_default_without_warning() {
        let schema = schema();
        let (store, warnings) = merge(
            &schema,
            &doc(json!({"lgc": {"tdp": "default", "gyro": null, "xinput": "unset"}})),
        );
        assert!(warnings.is_empty());
        assert_eq!(store, schema.defaults());
    }

    #[test]
    fn test_version_key_skipped() {
        let schema = schema();
        let (store, warnings) = merge(&schema, &doc(json!({"version": "abcd1234"})));
        assert!(warnings.is_empty());
        assert!(store.root().unknown.is_empty());
    }

    #[test]
    fn test_non_mapping_root() {
        let schema = schema();
        let (store, warnings) = merge(&schema, &doc(json!([1, 2, 3])));
        assert_eq!(store, schema.defaults());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_container_type_mismatch() {
        let schema = schema();
        let (store, warnings) = merge(&schema, &doc(json!({"lgc": 5})));
        assert_eq!(store, schema.defaults());
        assert_eq!(warnings[0].path, "lgc");
    }

    #[test]
    fn test_profile_overlays_current_state_and_ignores_unknown() {
        let schema = schema();
        let (base, _) = merge(&schema, &doc(json!({"lgc": {"tdp": 5}})));
        let (out, warnings) = apply_profile(
            &schema,
            &base,
            &json!({"lgc": {"gyro": false, "tdp": 12, "ghost": 1}, "rog": {}}),
        );
        assert_eq!(out.get(&"lgc.gyro".into()), Some(StateValue::Bool(false)));
        // Invalid value keeps the current one, not the default.
        assert_eq!(out.get(&"lgc.tdp".into()), Some(StateValue::Int(5)));
        assert_eq!(warnings.len(), 1);
        let rendered = out.to_document(None).into_value();
        assert!(rendered["lgc"].get("ghost").is_none());

        // Reset markers leave the current value alone.
        let (kept, warnings) = apply_profile(
            &schema,
            &out,
            &json!({"lgc": {"tdp": "unset", "gyro": null}}),
        );
        assert!(warnings.is_empty());
        assert_eq!(kept, out);
        assert!(rendered.get("rog").is_none());
    }
}
