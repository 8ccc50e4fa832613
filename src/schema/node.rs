//! Schema node types.
//!
//! A [`SchemaNode`] is one node of a plugin's declared configuration tree:
//! a leaf (`Bool`, `Discrete`, `Multiple`, `Integer`, `Number`, `Color`,
//! `Event`), a
//! `Container` of named children, or a `Mode` whose variants are mutually
//! exclusive. Nodes are built once at plugin load and never mutated after
//! registration.
//!
//! # Example
//!
//! ```rust
//! use hhd_settings::schema::SchemaNode;
//!
//! let lgc = SchemaNode::container()
//!     .with_title("Legion Go Controllers")
//!     .with_child(
//!         "xinput",
//!         SchemaNode::mode("ds5e")
//!             .with_title("Emulation Mode")
//!             .with_variant("disabled", SchemaNode::container().with_child("noop", SchemaNode::boolean(false)))
//!             .with_variant("ds5e", SchemaNode::container().with_child("led_support", SchemaNode::boolean(true)))
//!             .with_variant("uinput", SchemaNode::container().with_child("paddles", SchemaNode::boolean(false))),
//!     )
//!     .with_child("gyro", SchemaNode::boolean(true).with_tag("motion"));
//!
//! assert!(lgc.validate("lgc").is_ok());
//! ```

use std::collections::BTreeSet;

use crate::error::SchemaError;
use crate::path::{SettingPath, ACTIVE_SEGMENT, VARIANTS_SEGMENT};
use crate::state::{ContainerState, ModeState, Rgb, StateValue, COLOR_CHANNELS};

/// Display metadata shared by every node. Opaque to validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub title: String,
    pub hint: String,
    /// Cross-cutting labels used by consuming plugins for addressing.
    pub tags: BTreeSet<String>,
}

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Checkbox.
    Bool { default: bool },
    /// Ordered, fixed integer options (e.g. TDP steps).
    Discrete { options: Vec<i64>, default: i64 },
    /// Select one key out of `options`; values are display labels.
    Multiple {
        options: Vec<(String, String)>,
        default: String,
    },
    /// Integer with optional inclusive bounds.
    Integer {
        min: Option<i64>,
        max: Option<i64>,
        default: i64,
    },
    /// Float with optional inclusive bounds.
    Number {
        min: Option<f64>,
        max: Option<f64>,
        default: f64,
    },
    /// RGB color, each channel in `[0, 255]`.
    Color { default: Rgb },
    /// Button. Has no stored value; writing `true` fires it.
    Event,
    /// Named children in display order.
    Container { children: Vec<(String, SchemaNode)> },
    /// Discriminated union; exactly one variant is active.
    Mode {
        variants: Vec<(String, SchemaNode)>,
        default: String,
    },
}

/// One node of a declared configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub meta: NodeMeta,
    pub kind: NodeKind,
}

impl SchemaNode {
    fn from_kind(kind: NodeKind) -> Self {
        Self {
            meta: NodeMeta::default(),
            kind,
        }
    }

    pub fn boolean(default: bool) -> Self {
        Self::from_kind(NodeKind::Bool { default })
    }

    pub fn discrete(options: impl IntoIterator<Item = i64>, default: i64) -> Self {
        Self::from_kind(NodeKind::Discrete {
            options: options.into_iter().collect(),
            default,
        })
    }

    /// A select-one node. `options` pairs are `(key, label)`.
    pub fn multiple<K, L>(options: impl IntoIterator<Item = (K, L)>, default: impl Into<String>) -> Self
    where
        K: Into<String>,
        L: Into<String>,
    {
        Self::from_kind(NodeKind::Multiple {
            options: options
                .into_iter()
                .map(|(k, l)| (k.into(), l.into()))
                .collect(),
            default: default.into(),
        })
    }

    pub fn integer(min: Option<i64>, max: Option<i64>, default: i64) -> Self {
        Self::from_kind(NodeKind::Integer { min, max, default })
    }

    pub fn number(min: Option<f64>, max: Option<f64>, default: f64) -> Self {
        Self::from_kind(NodeKind::Number { min, max, default })
    }

    pub fn color(default: Rgb) -> Self {
        Self::from_kind(NodeKind::Color { default })
    }

    pub fn event() -> Self {
        Self::from_kind(NodeKind::Event)
    }

    /// An empty container; add children with [`SchemaNode::with_child`].
    pub fn container() -> Self {
        Self::from_kind(NodeKind::Container {
            children: Vec::new(),
        })
    }

    /// An empty mode defaulting to `default`; add variants with
    /// [`SchemaNode::with_variant`].
    pub fn mode(default: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Mode {
            variants: Vec::new(),
            default: default.into(),
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta.title = title.into();
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.meta.hint = hint.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.meta.tags.insert(tag.into());
        self
    }

    /// Append a child. Has no effect on non-container nodes.
    pub fn with_child(mut self, name: impl Into<String>, child: SchemaNode) -> Self {
        if let NodeKind::Container { children } = &mut self.kind {
            children.push((name.into(), child));
        } else {
            debug_assert!(false, "with_child called on a non-container node");
        }
        self
    }

    /// Append a variant. Has no effect on non-mode nodes.
    pub fn with_variant(mut self, key: impl Into<String>, variant: SchemaNode) -> Self {
        if let NodeKind::Mode { variants, .. } = &mut self.kind {
            variants.push((key.into(), variant));
        } else {
            debug_assert!(false, "with_variant called on a non-mode node");
        }
        self
    }

    /// Leaves are the smallest addressable unit of state.
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, NodeKind::Container { .. } | NodeKind::Mode { .. })
    }

    pub fn get_child(&self, name: &str) -> Option<&SchemaNode> {
        match &self.kind {
            NodeKind::Container { children } => {
                children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
            }
            _ => None,
        }
    }

    pub fn get_variant(&self, key: &str) -> Option<&SchemaNode> {
        match &self.kind {
            NodeKind::Mode { variants, .. } => {
                variants.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Short type label used in messages and descriptions.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Bool { .. } => "bool",
            NodeKind::Discrete { .. } => "discrete",
            NodeKind::Multiple { .. } => "multiple",
            NodeKind::Integer { .. } => "integer",
            NodeKind::Number { .. } => "number",
            NodeKind::Color { .. } => "color",
            NodeKind::Event => "event",
            NodeKind::Container { .. } => "container",
            NodeKind::Mode { .. } => "mode",
        }
    }

    /// Human-readable domain, e.g. `[5, 10, 15]` or `[0, +inf]`.
    pub fn domain(&self) -> String {
        match &self.kind {
            NodeKind::Bool { .. } => "[false, true]".to_string(),
            NodeKind::Discrete { options, .. } => format!(
                "[{}]",
                options
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            NodeKind::Multiple { options, .. } => format!(
                "[{}]",
                options
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            NodeKind::Integer { min, max, .. } => format!(
                "[{}, {}]",
                min.map_or("-inf".to_string(), |v| v.to_string()),
                max.map_or("+inf".to_string(), |v| v.to_string())
            ),
            NodeKind::Number { min, max, .. } => format!(
                "[{}, {}]",
                min.map_or("-inf".to_string(), |v| v.to_string()),
                max.map_or("+inf".to_string(), |v| v.to_string())
            ),
            NodeKind::Color { .. } => format!("{{{}}} in [0, 255]", COLOR_CHANNELS.join(", ")),
            NodeKind::Event => "[trigger]".to_string(),
            NodeKind::Container { children } => format!(
                "{{{}}}",
                children
                    .iter()
                    .map(|(n, _)| n.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            NodeKind::Mode { variants, .. } => format!(
                "[{}]",
                variants
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// The default rendered for descriptions, if the node has one of its own.
    pub fn default_label(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Bool { default } => Some(default.to_string()),
            NodeKind::Discrete { default, .. } => Some(default.to_string()),
            NodeKind::Multiple { default, .. } => Some(default.clone()),
            NodeKind::Integer { default, .. } => Some(default.to_string()),
            NodeKind::Number { default, .. } => Some(default.to_string()),
            NodeKind::Color { default } => Some(format!(
                "{{red: {}, green: {}, blue: {}}}",
                default.red, default.green, default.blue
            )),
            NodeKind::Mode { default, .. } => Some(default.clone()),
            NodeKind::Container { .. } | NodeKind::Event => None,
        }
    }

    /// Instantiate the default state for this node. Containers take the
    /// defaults of every child; modes take the default variant as active and
    /// instantiate every variant's payload.
    pub fn default_state(&self) -> StateValue {
        match &self.kind {
            NodeKind::Bool { default } => StateValue::Bool(*default),
            NodeKind::Discrete { default, .. } => StateValue::Int(*default),
            NodeKind::Multiple { default, .. } => StateValue::Str(default.clone()),
            NodeKind::Integer { default, .. } => StateValue::Int(*default),
            NodeKind::Number { default, .. } => StateValue::Float(*default),
            NodeKind::Color { default } => StateValue::Color(*default),
            NodeKind::Event => StateValue::Event(0),
            NodeKind::Container { children } => StateValue::Container(ContainerState::new(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.default_state()))
                    .collect(),
            )),
            NodeKind::Mode { variants, default } => StateValue::Mode(ModeState::new(
                default.clone(),
                variants
                    .iter()
                    .map(|(key, variant)| (key.clone(), variant.default_state()))
                    .collect(),
            )),
        }
    }

    /// Check this tree for structural errors. `path` is the namespace (or any
    /// prefix) used to label errors.
    pub fn validate(&self, path: impl Into<SettingPath>) -> Result<(), SchemaError> {
        self.validate_at(&path.into())
    }

    fn validate_at(&self, path: &SettingPath) -> Result<(), SchemaError> {
        let invalid_default = |reason: String| SchemaError::InvalidDefault {
            path: path.to_string(),
            reason,
        };

        match &self.kind {
            NodeKind::Bool { .. } | NodeKind::Color { .. } | NodeKind::Event => Ok(()),
            NodeKind::Discrete { options, default } => {
                if options.contains(default) {
                    Ok(())
                } else {
                    Err(invalid_default(format!(
                        "{} is not one of {}",
                        default,
                        self.domain()
                    )))
                }
            }
            NodeKind::Multiple { options, default } => {
                check_unique_names(path, options.iter().map(|(k, _)| k.as_str()), false)?;
                if options.iter().any(|(k, _)| k == default) {
                    Ok(())
                } else {
                    Err(invalid_default(format!(
                        "'{}' is not one of {}",
                        default,
                        self.domain()
                    )))
                }
            }
            NodeKind::Integer { min, max, default } => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(invalid_default(format!("min {} exceeds max {}", lo, hi)));
                    }
                }
                if min.is_some_and(|lo| *default < lo) || max.is_some_and(|hi| *default > hi) {
                    return Err(invalid_default(format!(
                        "{} is outside {}",
                        default,
                        self.domain()
                    )));
                }
                Ok(())
            }
            NodeKind::Number { min, max, default } => {
                if !default.is_finite() {
                    return Err(invalid_default(format!("{} is not finite", default)));
                }
                if let Some(bound) = min.iter().chain(max.iter()).find(|b| !b.is_finite()) {
                    return Err(invalid_default(format!("bound {} is not finite", bound)));
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(invalid_default(format!("min {} exceeds max {}", lo, hi)));
                    }
                }
                if min.is_some_and(|lo| *default < lo) || max.is_some_and(|hi| *default > hi) {
                    return Err(invalid_default(format!(
                        "{} is outside {}",
                        default,
                        self.domain()
                    )));
                }
                Ok(())
            }
            NodeKind::Container { children } => {
                if children.is_empty() {
                    return Err(SchemaError::EmptyContainer(path.to_string()));
                }
                check_unique_names(path, children.iter().map(|(n, _)| n.as_str()), false)?;
                for (name, child) in children {
                    child.validate_at(&path.child(name))?;
                }
                Ok(())
            }
            NodeKind::Mode { variants, default } => {
                if variants.is_empty() {
                    return Err(SchemaError::EmptyModeVariants(path.to_string()));
                }
                check_unique_names(path, variants.iter().map(|(k, _)| k.as_str()), true)?;
                if !variants.iter().any(|(k, _)| k == default) {
                    return Err(invalid_default(format!(
                        "variant '{}' is not one of {}",
                        default,
                        self.domain()
                    )));
                }
                for (key, variant) in variants {
                    variant.validate_at(&path.child(VARIANTS_SEGMENT).child(key))?;
                }
                Ok(())
            }
        }
    }
}

/// Names must be non-empty, free of path delimiters, and unique. Variant keys
/// additionally may not shadow the mode's own path segments.
fn check_unique_names<'a>(
    path: &SettingPath,
    names: impl Iterator<Item = &'a str>,
    is_variant: bool,
) -> Result<(), SchemaError> {
    let mut seen = BTreeSet::new();
    for name in names {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains(['.', '/']) {
            Some("name contains a path delimiter")
        } else if is_variant && (name == ACTIVE_SEGMENT || name == VARIANTS_SEGMENT) {
            Some("name is reserved")
        } else if !seen.insert(name) {
            Some("name is declared twice")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SchemaError::InvalidName {
                path: path.to_string(),
                name: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xinput() -> SchemaNode {
        SchemaNode::mode("ds5e")
            .with_variant(
                "disabled",
                SchemaNode::container().with_child("noop", SchemaNode::boolean(false)),
            )
            .with_variant(
                "ds5e",
                SchemaNode::container().with_child("led_support", SchemaNode::boolean(true)),
            )
            .with_variant(
                "uinput",
                SchemaNode::container().with_child("paddles", SchemaNode::boolean(false)),
            )
    }

    #[test]
    fn test_valid_tree() {
        let node = SchemaNode::container()
            .with_child("xinput", xinput())
            .with_child("tdp", SchemaNode::discrete([5, 10, 15], 10))
            .with_child(
                "profile",
                SchemaNode::multiple([("quiet", "Quiet"), ("perf", "Performance")], "quiet"),
            )
            .with_child("volume", SchemaNode::integer(Some(0), Some(100), 50))
            .with_child("sens", SchemaNode::number(Some(0.1), None, 1.0));
        assert!(node.validate("lgc").is_ok());
    }

    #[test]
    fn test_discrete_default_not_in_options() {
        let node = SchemaNode::container().with_child("tdp", SchemaNode::discrete([5, 10], 12));
        let err = node.validate("lgc").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { ref path, .. } if path == "lgc.tdp"));
    }

    #[test]
    fn test_multiple_default_not_in_options() {
        let node = SchemaNode::multiple([("a", "A")], "b");
        assert!(matches!(
            node.validate("x"),
            Err(SchemaError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn test_empty_container_and_mode() {
        assert_eq!(
            SchemaNode::container().validate("lgc"),
            Err(SchemaError::EmptyContainer("lgc".into()))
        );
        assert_eq!(
            SchemaNode::mode("a").validate("lgc.m"),
            Err(SchemaError::EmptyModeVariants("lgc.m".into()))
        );
    }

    #[test]
    fn test_mode_default_must_be_declared() {
        let node = SchemaNode::mode("missing")
            .with_variant("a", SchemaNode::container().with_child("x", SchemaNode::boolean(true)));
        assert!(matches!(
            node.validate("lgc.m"),
            Err(SchemaError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn test_reserved_and_delimited_names() {
        let reserved = SchemaNode::mode("active").with_variant("active", SchemaNode::boolean(true));
        assert!(matches!(
            reserved.validate("ns"),
            Err(SchemaError::InvalidName { .. })
        ));

        let dotted = SchemaNode::container().with_child("a.b", SchemaNode::boolean(true));
        assert!(matches!(
            dotted.validate("ns"),
            Err(SchemaError::InvalidName { .. })
        ));

        let twice = SchemaNode::container()
            .with_child("a", SchemaNode::boolean(true))
            .with_child("a", SchemaNode::boolean(false));
        assert!(matches!(
            twice.validate("ns"),
            Err(SchemaError::InvalidName { ref reason, .. }) if reason.contains("twice")
        ));
    }

    #[test]
    fn test_bounds_checks() {
        assert!(SchemaNode::integer(Some(10), Some(0), 5).validate("x").is_err());
        assert!(SchemaNode::integer(Some(0), Some(10), 11).validate("x").is_err());
        assert!(SchemaNode::number(None, Some(1.0), 1.5).validate("x").is_err());
        assert!(SchemaNode::number(None, None, f64::NAN).validate("x").is_err());
        assert!(matches!(
            SchemaNode::number(Some(f64::NAN), Some(1.0), 0.5).validate("x"),
            Err(SchemaError::InvalidDefault { ref reason, .. }) if reason.contains("not finite")
        ));
        assert!(SchemaNode::number(None, Some(f64::NAN), 0.5).validate("x").is_err());
        assert!(SchemaNode::number(Some(f64::NEG_INFINITY), None, 0.5).validate("x").is_err());
        assert!(SchemaNode::integer(None, None, -4).validate("x").is_ok());
    }

    #[test]
    fn test_nested_error_path_uses_variants_segment() {
        let node = SchemaNode::mode("a").with_variant(
            "a",
            SchemaNode::container().with_child("tdp", SchemaNode::discrete([1], 2)),
        );
        let err = node.validate("ns.m").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { ref path, .. } if path == "ns.m.variants.a.tdp"));
    }

    #[test]
    fn test_default_state_retains_all_variants() {
        let state = xinput().default_state();
        let StateValue::Mode(mode) = state else {
            panic!("expected mode state");
        };
        assert_eq!(mode.active, "ds5e");
        assert_eq!(mode.variants.len(), 3);
        assert!(mode.variant("uinput").is_some());
    }

    #[test]
    fn test_color_and_event_nodes() {
        let led = SchemaNode::color(Rgb::new(255, 0, 64));
        assert!(led.is_leaf());
        assert_eq!(led.type_name(), "color");
        assert_eq!(led.domain(), "{red, green, blue} in [0, 255]");
        assert_eq!(
            led.default_label().as_deref(),
            Some("{red: 255, green: 0, blue: 64}")
        );
        assert_eq!(led.default_state(), StateValue::Color(Rgb::new(255, 0, 64)));

        let reset = SchemaNode::event();
        assert!(reset.is_leaf());
        assert_eq!(reset.default_label(), None);
        assert_eq!(reset.default_state(), StateValue::Event(0));

        let node = SchemaNode::container()
            .with_child("led", led)
            .with_child("reset", reset);
        assert!(node.validate("lgc").is_ok());
    }

    #[test]
    fn test_domain_labels() {
        assert_eq!(SchemaNode::discrete([5, 10], 5).domain(), "[5, 10]");
        assert_eq!(SchemaNode::integer(Some(0), None, 0).domain(), "[0, +inf]");
        assert_eq!(xinput().domain(), "[disabled, ds5e, uinput]");
        assert!(SchemaNode::boolean(true).is_leaf());
        assert!(!xinput().is_leaf());
    }
}
