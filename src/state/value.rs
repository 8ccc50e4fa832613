//! Concrete state values.
//!
//! A [`StateValue`] tree mirrors the shape of the schema it was instantiated
//! from. Containers and modes keep their entries in schema display order and
//! carry a side-channel of unknown keys so that documents written by a newer
//! schema survive being read by an older one.
//!
//! Event leaves are triggers, not settings: their state counts how often they
//! fired and is never written to a document.

use serde_json::{Map, Number, Value};

use crate::path::{SettingPath, ACTIVE_SEGMENT, VARIANTS_SEGMENT};

/// A concrete value for one schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Bool(bool),
    /// Discrete and integer leaves.
    Int(i64),
    /// Number leaves.
    Float(f64),
    /// Multiple (select-one) leaves and mode discriminants.
    Str(String),
    Color(Rgb),
    /// Event leaves: how many times the event fired in this process.
    Event(u64),
    Container(ContainerState),
    Mode(ModeState),
}

/// Channel names of a color in document form.
pub const COLOR_CHANNELS: [&str; 3] = ["red", "green", "blue"];

/// An RGB color, stored as `{red, green, blue}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (name, channel) in COLOR_CHANNELS.iter().zip(self.channels()) {
            out.insert(name.to_string(), Value::Number(Number::from(channel)));
        }
        Value::Object(out)
    }
}

/// State of a container node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerState {
    /// Child values in schema display order.
    pub values: Vec<(String, StateValue)>,
    /// Keys found in a document with no matching child, kept verbatim.
    pub unknown: Map<String, Value>,
}

/// State of a mode node. Every variant's payload is retained, active or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeState {
    pub active: String,
    /// Variant payloads in schema display order.
    pub variants: Vec<(String, StateValue)>,
    /// Payloads under `variants` for variants this schema does not declare.
    pub unknown_variants: Map<String, Value>,
    /// Other unrecognised keys of the mode object.
    pub unknown: Map<String, Value>,
}

impl ContainerState {
    pub fn new(values: Vec<(String, StateValue)>) -> Self {
        Self {
            values,
            unknown: Map::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StateValue> {
        self.values
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (name, value) in self.values.iter().filter(|(_, v)| v.is_persisted()) {
            out.insert(name.clone(), value.to_json());
        }
        for (key, value) in &self.unknown {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(out)
    }
}

impl ModeState {
    pub fn new(active: String, variants: Vec<(String, StateValue)>) -> Self {
        Self {
            active,
            variants,
            unknown_variants: Map::new(),
            unknown: Map::new(),
        }
    }

    pub fn variant(&self, key: &str) -> Option<&StateValue> {
        self.variants.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn variant_mut(&mut self, key: &str) -> Option<&mut StateValue> {
        self.variants
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Payload of the currently active variant.
    pub fn active_payload(&self) -> Option<&StateValue> {
        self.variant(&self.active)
    }

    pub fn to_json(&self) -> Value {
        let mut variants = Map::new();
        for (key, value) in self.variants.iter().filter(|(_, v)| v.is_persisted()) {
            variants.insert(key.clone(), value.to_json());
        }
        for (key, value) in &self.unknown_variants {
            variants.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let mut out = Map::new();
        out.insert(ACTIVE_SEGMENT.to_string(), Value::String(self.active.clone()));
        out.insert(VARIANTS_SEGMENT.to_string(), Value::Object(variants));
        for (key, value) in &self.unknown {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(out)
    }
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Float(f) => Some(*f),
            StateValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgb> {
        match self {
            StateValue::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// How many times an event leaf has fired.
    pub fn as_event(&self) -> Option<u64> {
        match self {
            StateValue::Event(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerState> {
        match self {
            StateValue::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<&ModeState> {
        match self {
            StateValue::Mode(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, StateValue::Container(_) | StateValue::Mode(_))
    }

    /// Whether the value belongs in a saved document. Events do not.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, StateValue::Event(_))
    }

    /// Serialize into the document shape: containers become mappings, modes
    /// become `{active, variants}`, colors become `{red, green, blue}` and
    /// other leaves become native scalars. Event leaves are left out of
    /// containers and render as `null` on their own.
    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Int(i) => Value::Number(Number::from(*i)),
            // Number leaves only ever hold finite values.
            StateValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StateValue::Str(s) => Value::String(s.clone()),
            StateValue::Color(c) => c.to_json(),
            StateValue::Event(_) => Value::Null,
            StateValue::Container(c) => c.to_json(),
            StateValue::Mode(m) => m.to_json(),
        }
    }

    /// Resolve a relative path within this value. Inside a mode, `active`
    /// yields the discriminant, `variants.<key>` a payload, and a bare
    /// declared variant key is shorthand for `variants.<key>`.
    pub fn lookup(&self, segments: &[String]) -> Option<StateValue> {
        let Some((head, rest)) = segments.split_first() else {
            return Some(self.clone());
        };

        match self {
            StateValue::Container(c) => c.get(head)?.lookup(rest),
            StateValue::Mode(m) => {
                if head == ACTIVE_SEGMENT {
                    rest.is_empty().then(|| StateValue::Str(m.active.clone()))
                } else if head == VARIANTS_SEGMENT {
                    let (key, rest) = rest.split_first()?;
                    m.variant(key)?.lookup(rest)
                } else {
                    m.variant(head)?.lookup(rest)
                }
            }
            _ => None,
        }
    }

    /// Flatten into `(canonical path, leaf value)` pairs in display order.
    /// A mode contributes its discriminant at `<mode>.active` followed by
    /// every variant's leaves under `<mode>.variants.<key>`.
    pub fn collect_leaves(&self, path: &SettingPath, out: &mut Vec<(SettingPath, StateValue)>) {
        match self {
            StateValue::Container(c) => {
                for (name, value) in &c.values {
                    value.collect_leaves(&path.child(name), out);
                }
            }
            StateValue::Mode(m) => {
                out.push((path.child(ACTIVE_SEGMENT), StateValue::Str(m.active.clone())));
                let variants = path.child(VARIANTS_SEGMENT);
                for (key, value) in &m.variants {
                    value.collect_leaves(&variants.child(key), out);
                }
            }
            leaf => out.push((path.clone(), leaf.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StateValue {
        StateValue::Container(ContainerState::new(vec![
            (
                "xinput".to_string(),
                StateValue::Mode(ModeState::new(
                    "ds5e".to_string(),
                    vec![
                        (
                            "ds5e".to_string(),
                            StateValue::Container(ContainerState::new(vec![(
                                "led".to_string(),
                                StateValue::Bool(true),
                            )])),
                        ),
                        (
                            "uinput".to_string(),
                            StateValue::Container(ContainerState::new(vec![(
                                "paddles".to_string(),
                                StateValue::Bool(false),
                            )])),
                        ),
                    ],
                )),
            ),
            ("gyro".to_string(), StateValue::Bool(true)),
            ("sens".to_string(), StateValue::Float(1.5)),
        ]))
    }

    #[test]
    fn test_to_json_shape() {
        assert_eq!(
            sample().to_json(),
            json!({
                "xinput": {
                    "active": "ds5e",
                    "variants": {
                        "ds5e": {"led": true},
                        "uinput": {"paddles": false}
                    }
                },
                "gyro": true,
                "sens": 1.5
            })
        );
    }

    #[test]
    fn test_to_json_keeps_unknown_after_known() {
        let mut c = ContainerState::new(vec![("a".into(), StateValue::Int(1))]);
        c.unknown.insert("z_future".into(), json!({"x": 1}));
        let rendered = serde_json::to_string(&c.to_json()).unwrap();
        assert_eq!(rendered, r#"{"a":1,"z_future":{"x":1}}"#);
    }

    #[test]
    fn test_lookup_paths() {
        let value = sample();
        let seg = |s: &str| SettingPath::parse(s).segments().to_vec();

        assert_eq!(value.lookup(&seg("gyro")), Some(StateValue::Bool(true)));
        assert_eq!(
            value.lookup(&seg("xinput.active")),
            Some(StateValue::Str("ds5e".into()))
        );
        assert_eq!(
            value.lookup(&seg("xinput.variants.uinput.paddles")),
            Some(StateValue::Bool(false))
        );
        assert_eq!(
            value.lookup(&seg("xinput.uinput.paddles")),
            Some(StateValue::Bool(false))
        );
        assert_eq!(value.lookup(&seg("xinput.active.more")), None);
        assert_eq!(value.lookup(&seg("gyro.nested")), None);
        assert_eq!(value.lookup(&seg("missing")), None);
    }

    #[test]
    fn test_collect_leaves_canonical_paths() {
        let mut leaves = Vec::new();
        sample().collect_leaves(&SettingPath::parse("lgc"), &mut leaves);
        let paths: Vec<String> = leaves.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "lgc.xinput.active",
                "lgc.xinput.variants.ds5e.led",
                "lgc.xinput.variants.uinput.paddles",
                "lgc.gyro",
                "lgc.sens",
            ]
        );
    }

    #[test]
    fn test_color_and_event_rendering() {
        let value = StateValue::Container(ContainerState::new(vec![
            ("led".to_string(), StateValue::Color(Rgb::new(255, 64, 0))),
            ("reset".to_string(), StateValue::Event(3)),
        ]));
        assert_eq!(
            value.to_json(),
            json!({"led": {"red": 255, "green": 64, "blue": 0}})
        );
        assert_eq!(StateValue::Event(1).to_json(), Value::Null);
        assert!(!StateValue::Event(0).is_persisted());

        // Events still count as leaves for change tracking.
        let mut leaves = Vec::new();
        value.collect_leaves(&SettingPath::parse("lgc"), &mut leaves);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[1].1, StateValue::Event(3));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(StateValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(StateValue::Str("x".into()).as_str(), Some("x"));
        assert!(StateValue::Bool(true).is_leaf());
        assert_eq!(
            StateValue::Color(Rgb::new(1, 2, 3)).as_color(),
            Some(Rgb::new(1, 2, 3))
        );
        assert!(sample().as_container().is_some());
        assert!(sample().as_mode().is_none());
    }
}
