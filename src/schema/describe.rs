//! Human-readable schema descriptions.
//!
//! The state file is prefixed with a comment block describing every node so
//! that it can be edited by hand without a frontend. The same text is hashed
//! into the schema fingerprint.

use sha2::{Digest, Sha256};

use crate::path::{SettingPath, VARIANTS_SEGMENT};

use super::node::{NodeKind, SchemaNode};
use super::registry::UnifiedSchema;

/// Hints are wrapped at this many columns.
const HINT_WIDTH: usize = 80;

/// Preamble written above the schema description in the state file.
pub const STATE_HEADER: &str = "\
# Handheld Daemon State Config
#
# This file holds plugin configuration that is retained across reboots.
# You may edit it in lieu of using a frontend; changes are picked up live.
#
# Leaves set to `default` (or left empty) take the schema default.
# Keys not described below are kept as-is for plugins that are not loaded.
#
# This file and its comments are autogenerated. Your comments will be
# discarded on the next configuration change.
#
# - CONFIGURATION PARAMETERS
#";

/// Preamble written above the schema description in profile files.
pub const PROFILE_HEADER: &str = "\
# Handheld Daemon Profile Config
#
# This file holds the settings applied when the profile sharing its name is
# applied. Only the settings stated here change, once, at that moment; they
# may drift afterwards as the system state changes.
#
# Profiles can be stacked: keep e.g. a TDP-only profile and a controller
# profile and apply both for a given game.
#
# Leaves set to `unset` are skipped and act as a template for you to fill
# in. Keys not described below are ignored.
#
# This file and its comments are autogenerated. Your comments will be
# discarded when the profile is saved again.
#
# - CONFIGURATION PARAMETERS
#";

/// Describe every node of `schema`, one block per node, indented by depth.
pub fn describe(schema: &UnifiedSchema) -> String {
    let mut out = String::new();
    for (namespace, node) in schema.entries() {
        describe_node(
            node,
            &SettingPath::from_segments([namespace.as_str()]),
            0,
            &mut out,
        );
    }
    out
}

/// The state file preamble plus the schema description, as YAML comment
/// lines.
pub fn state_header(schema: &UnifiedSchema) -> String {
    commented(STATE_HEADER, schema)
}

/// The profile preamble plus the schema description.
pub fn profile_header(schema: &UnifiedSchema) -> String {
    commented(PROFILE_HEADER, schema)
}

fn commented(preamble: &str, schema: &UnifiedSchema) -> String {
    let mut out = String::from(preamble);
    out.push('\n');
    for line in describe(schema).lines() {
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

/// First 8 hex characters of the SHA-256 of `description`.
pub fn fingerprint(description: &str) -> String {
    let digest = Sha256::digest(description.as_bytes());
    hex::encode(digest)[..8].to_string()
}

fn describe_node(node: &SchemaNode, path: &SettingPath, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let body = format!("{}  ", indent);

    out.push_str(&format!("{}{}\n", indent, path));
    if !node.meta.title.is_empty() {
        out.push_str(&format!("{}*{}*\n", body, node.meta.title));
    }
    for line in wrap(&node.meta.hint, HINT_WIDTH) {
        out.push_str(&format!("{}{}\n", body, line));
    }

    match &node.kind {
        NodeKind::Container { .. } => {}
        NodeKind::Mode { .. } => out.push_str(&format!("{}- modes: {}\n", body, node.domain())),
        NodeKind::Integer { .. } | NodeKind::Number { .. } => {
            out.push_str(&format!("{}- {}: {}\n", body, node.type_name(), node.domain()))
        }
        NodeKind::Bool { .. } => out.push_str(&format!("{}- boolean: {}\n", body, node.domain())),
        NodeKind::Color { .. } | NodeKind::Event => {
            out.push_str(&format!("{}- {}: {}\n", body, node.type_name(), node.domain()))
        }
        NodeKind::Discrete { .. } | NodeKind::Multiple { .. } => {
            out.push_str(&format!("{}- options: {}\n", body, node.domain()))
        }
    }
    if let Some(default) = node.default_label() {
        out.push_str(&format!("{}- default: {}\n", body, default));
    }
    if !node.meta.tags.is_empty() {
        let tags: Vec<&str> = node.meta.tags.iter().map(String::as_str).collect();
        out.push_str(&format!("{}- tags: [{}]\n", body, tags.join(", ")));
    }

    match &node.kind {
        NodeKind::Container { children } => {
            for (name, child) in children {
                describe_node(child, &path.child(name), depth + 1, out);
            }
        }
        NodeKind::Mode { variants, .. } => {
            let base = path.child(VARIANTS_SEGMENT);
            for (key, variant) in variants {
                describe_node(variant, &base.child(key), depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Greedy word wrap.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
