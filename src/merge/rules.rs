//! Per-leaf validation rules.

use serde_json::Value;

use crate::error::ValidationError;
use crate::path::SettingPath;
use crate::schema::{NodeKind, SchemaNode};
use crate::state::{Rgb, StateValue, COLOR_CHANNELS};

/// String markers that mean "use the schema default" in a document.
const RESET_MARKERS: [&str; 2] = ["default", "unset"];

/// Outcome of validating one leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// A value in the node's domain.
    Value(StateValue),
    /// The document asked for the schema default.
    Reset,
    /// An event node was fired.
    Trigger,
}

/// `null`, `"default"` and `"unset"` reset a node to its default.
pub fn is_reset_marker(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => RESET_MARKERS.contains(&s.as_str()),
        _ => false,
    }
}

/// JSON type name used in mismatch messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Integral view of a number. Floats with no fractional part are accepted
/// since hand-edited YAML often writes `15.0`.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// Validate `value` against a leaf node.
pub fn validate_leaf(
    node: &SchemaNode,
    value: &Value,
    path: &SettingPath,
) -> Result<Leaf, ValidationError> {
    // A multiple may legitimately declare an option called `default`.
    if let (NodeKind::Multiple { options, .. }, Value::String(s)) = (&node.kind, value) {
        if options.iter().any(|(key, _)| key == s) {
            return Ok(Leaf::Value(StateValue::Str(s.clone())));
        }
    }
    if is_reset_marker(value) {
        return Ok(Leaf::Reset);
    }

    let mismatch = |expected: &str| ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: json_type(value).to_string(),
    };
    let out_of_range = |shown: String| ValidationError::OutOfRange {
        path: path.to_string(),
        value: shown,
        allowed: node.domain(),
    };

    match &node.kind {
        NodeKind::Bool { .. } => value
            .as_bool()
            .map(|b| Leaf::Value(StateValue::Bool(b)))
            .ok_or_else(|| mismatch("boolean")),
        NodeKind::Discrete { options, .. } => {
            let v = as_integer(value).ok_or_else(|| mismatch("integer"))?;
            if options.contains(&v) {
                Ok(Leaf::Value(StateValue::Int(v)))
            } else {
                Err(out_of_range(v.to_string()))
            }
        }
        NodeKind::Multiple { .. } => match value {
            Value::String(s) => Err(out_of_range(format!("'{}'", s))),
            _ => Err(mismatch("string")),
        },
        NodeKind::Integer { min, max, .. } => {
            let v = as_integer(value).ok_or_else(|| mismatch("integer"))?;
            if min.is_some_and(|lo| v < lo) || max.is_some_and(|hi| v > hi) {
                Err(out_of_range(v.to_string()))
            } else {
                Ok(Leaf::Value(StateValue::Int(v)))
            }
        }
        NodeKind::Number { min, max, .. } => {
            let v = value
                .as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| mismatch("number"))?;
            if min.is_some_and(|lo| v < lo) || max.is_some_and(|hi| v > hi) {
                Err(out_of_range(v.to_string()))
            } else {
                Ok(Leaf::Value(StateValue::Float(v)))
            }
        }
        NodeKind::Color { .. } => {
            let channels = value.as_object().ok_or_else(|| mismatch("mapping"))?;
            let mut rgb = [0u8; 3];
            for (slot, name) in rgb.iter_mut().zip(COLOR_CHANNELS) {
                let channel_path = path.child(name);
                let raw = channels.get(name).unwrap_or(&Value::Null);
                let v = as_integer(raw).ok_or_else(|| ValidationError::TypeMismatch {
                    path: channel_path.to_string(),
                    expected: "integer".to_string(),
                    actual: json_type(raw).to_string(),
                })?;
                *slot = u8::try_from(v).map_err(|_| ValidationError::OutOfRange {
                    path: channel_path.to_string(),
                    value: v.to_string(),
                    allowed: "[0, 255]".to_string(),
                })?;
            }
            let [red, green, blue] = rgb;
            Ok(Leaf::Value(StateValue::Color(Rgb::new(red, green, blue))))
        }
        NodeKind::Event => match value {
            Value::Bool(true) => Ok(Leaf::Trigger),
            Value::Bool(false) => Ok(Leaf::Reset),
            _ => Err(mismatch("boolean")),
        },
        NodeKind::Container { .. } | NodeKind::Mode { .. } => Err(mismatch(node.type_name())),
    }
}
