//! Leaf-level diff between two state stores.

use std::collections::HashMap;

use crate::path::SettingPath;
use crate::state::{StateStore, StateValue};

/// Every leaf whose value differs between `old` and `new`, with its new
/// value, in `new`'s display order. Changes to unknown keys are not
/// reported since no subscriber can address them.
///
/// An event leaf is reported only when it fired, i.e. its count grew. A
/// reload starts every count from zero again, which is not a change.
pub fn diff(old: &StateStore, new: &StateStore) -> Vec<(SettingPath, StateValue)> {
    let previous: HashMap<SettingPath, StateValue> = old.leaves().into_iter().collect();
    new.leaves()
        .into_iter()
        .filter(|(path, value)| changed(previous.get(path), value))
        .collect()
}

fn changed(old: Option<&StateValue>, new: &StateValue) -> bool {
    match (old, new) {
        (Some(StateValue::Event(before)), StateValue::Event(after)) => after > before,
        (old, new) => old != Some(new),
    }
}
