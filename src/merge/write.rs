//! Strict single-path writes.

use serde_json::Value;

use crate::error::ValidationError;
use crate::path::{SettingPath, ACTIVE_SEGMENT, VARIANTS_SEGMENT};
use crate::schema::{NodeKind, SchemaNode, UnifiedSchema};
use crate::state::{ModeState, StateStore, StateValue};

use super::apply::{Applier, MergeMode};

/// Where a write lands after resolving its path.
enum Target<'a> {
    /// A node's full value.
    Node(&'a SchemaNode, &'a mut StateValue),
    /// The discriminant of a mode.
    Active(&'a SchemaNode, &'a mut ModeState),
}

/// Build a candidate store with `value` written at `path`.
///
/// The base store is never modified. `path` may address a leaf, a whole
/// container or mode (with a mapping value), or a mode's `active` segment.
/// A mode's variant payload can be addressed as `variants.<key>` or simply
/// `<key>`. Writing `null` resets the addressed node to its default.
pub fn write_path(
    schema: &UnifiedSchema,
    base: &StateStore,
    path: &SettingPath,
    value: &Value,
) -> Result<StateStore, ValidationError> {
    let unknown = || ValidationError::UnknownPath(path.to_string());
    let (namespace, rest) = path.segments().split_first().ok_or_else(unknown)?;
    let root_node = schema.namespace(namespace).ok_or_else(unknown)?;

    let mut candidate = base.clone();
    let root_state = candidate
        .root_mut()
        .get_mut(namespace)
        .ok_or_else(unknown)?;

    let mut applier = Applier::new(MergeMode::Strict);
    let mut canonical = SettingPath::from_segments([namespace.as_str()]);
    match resolve(root_node, root_state, rest, &mut canonical).ok_or_else(unknown)? {
        Target::Node(node, state) => applier.apply(node, state, value, &canonical)?,
        Target::Active(node, mode) => applier.apply_active(node, mode, value, &canonical)?,
    }
    Ok(candidate)
}

/// Walk `segments` down from a namespace root, appending the canonical form
/// of each segment to `canonical`. For an `active` target, `canonical` ends
/// at the mode itself.
fn resolve<'a>(
    mut node: &'a SchemaNode,
    mut state: &'a mut StateValue,
    segments: &[String],
    canonical: &mut SettingPath,
) -> Option<Target<'a>> {
    let mut iter = segments.iter().peekable();
    while let Some(segment) = iter.next() {
        match (&node.kind, state) {
            (NodeKind::Container { .. }, StateValue::Container(container)) => {
                node = node.get_child(segment)?;
                state = container.get_mut(segment)?;
                *canonical = canonical.child(segment);
            }
            (NodeKind::Mode { .. }, StateValue::Mode(mode)) => {
                if segment == ACTIVE_SEGMENT {
                    return iter.peek().is_none().then_some(Target::Active(node, mode));
                }
                let key = if segment == VARIANTS_SEGMENT {
                    iter.next()?
                } else {
                    segment
                };
                node = node.get_variant(key)?;
                state = mode.variant_mut(key)?;
                *canonical = canonical.child(VARIANTS_SEGMENT).child(key);
            }
            _ => return None,
        }
    }
    Some(Target::Node(node, state))
}
