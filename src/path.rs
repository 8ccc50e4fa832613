//! Setting paths.
//!
//! A [`SettingPath`] addresses a node in the unified schema and its state.
//! Paths are parsed from dot- or slash-delimited strings
//! (`lgc.xinput.active`, `lgc/xinput/active`) and always display dotted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Segment addressing the discriminant of a mode node.
pub const ACTIVE_SEGMENT: &str = "active";

/// Segment introducing a variant payload inside a mode node.
pub const VARIANTS_SEGMENT: &str = "variants";

/// An ordered sequence of path segments, rooted at the unified schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingPath {
    segments: Vec<String>,
}

impl SettingPath {
    /// The empty path, addressing the whole state tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dot- or slash-delimited path. Empty segments are dropped, so
    /// `"lgc..gyro"`, `"/lgc/gyro/"` and `"lgc.gyro"` are equal.
    pub fn parse(s: &str) -> Self {
        Self {
            segments: s
                .split(['.', '/'])
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first segment, i.e. the plugin namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Whether `prefix` is a segment-wise prefix of this path. The root path
    /// is a prefix of everything; `lgc` is a prefix of `lgc.gyro` but not of
    /// `lgcx.gyro`.
    pub fn starts_with(&self, prefix: &SettingPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self
                .segments
                .iter()
                .zip(prefix.segments.iter())
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for SettingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for SettingPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for SettingPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for SettingPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SettingPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
