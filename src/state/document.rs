//! Persisted documents.
//!
//! A [`PersistedDocument`] is an untrusted, serializable snapshot of a state
//! tree: the on-disk state file, a profile, or a client payload. It is kept
//! as a key-order-preserving `serde_json::Value` regardless of whether it was
//! read from YAML or JSON.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, SettingsError};

/// Top-level metadata key holding the schema fingerprint.
pub const VERSION_KEY: &str = "version";

/// On-disk encoding of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Yaml,
    Json,
}

impl DocumentFormat {
    /// `.json` files are JSON; everything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// An untrusted override document.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedDocument {
    root: Value,
}

impl Default for PersistedDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl PersistedDocument {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// A document with no overrides.
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// The schema fingerprint recorded by the last save, if any.
    pub fn version(&self) -> Option<&str> {
        self.root.get(VERSION_KEY).and_then(Value::as_str)
    }

    /// Parse a document. Blank input (or a YAML file holding only comments)
    /// is an empty document.
    pub fn parse(content: &str, format: DocumentFormat) -> Result<Self> {
        let blank = content.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(Self::empty());
        }
        let root: Value = match format {
            DocumentFormat::Yaml => serde_yaml::from_str(content)?,
            DocumentFormat::Json => serde_json::from_str(content)?,
        };
        if root.is_null() {
            return Ok(Self::empty());
        }
        Ok(Self { root })
    }

    /// Render the document. `header` lines are emitted verbatim before the
    /// YAML body; JSON has no comment syntax so the header is dropped.
    pub fn render(&self, format: DocumentFormat, header: Option<&str>) -> Result<String> {
        match format {
            DocumentFormat::Yaml => {
                let body = serde_yaml::to_string(&self.root)?;
                match header {
                    Some(header) if !header.is_empty() => {
                        let mut out = String::with_capacity(header.len() + body.len() + 1);
                        out.push_str(header);
                        if !header.ends_with('\n') {
                            out.push('\n');
                        }
                        out.push_str(&body);
                        Ok(out)
                    }
                    _ => Ok(body),
                }
            }
            DocumentFormat::Json => {
                let mut body = serde_json::to_string_pretty(&self.root)?;
                body.push('\n');
                Ok(body)
            }
        }
    }

    /// Read and parse a document from disk. Returns `None` if the file does
    /// not exist.
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SettingsError::Io(e)),
        };
        Self::parse(&content, DocumentFormat::from_path(path))
            .map(Some)
            .map_err(|e| SettingsError::Parse(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("state.yml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("state.JSON")),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("state")),
            DocumentFormat::Yaml
        );
    }

    #[test]
    fn test_parse_yaml_preserves_key_order() {
        let doc = PersistedDocument::parse("zeta: 1\nalpha: 2\nmid: 3\n", DocumentFormat::Yaml).unwrap();
        let keys: Vec<&String> = doc.root().as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_blank_and_comment_only() {
        assert_eq!(
            PersistedDocument::parse("   \n", DocumentFormat::Yaml).unwrap(),
            PersistedDocument::empty()
        );
        assert_eq!(
            PersistedDocument::parse("# only a comment\n", DocumentFormat::Yaml).unwrap(),
            PersistedDocument::empty()
        );
    }

    #[test]
    fn test_parse_invalid_yaml_is_error() {
        assert!(PersistedDocument::parse("lgc: [unclosed", DocumentFormat::Yaml).is_err());
        assert!(PersistedDocument::parse("{broken", DocumentFormat::Json).is_err());
    }

    #[test]
    fn test_render_yaml_with_header() {
        let doc = PersistedDocument::new(json!({"version": "abcd1234", "lgc": {"gyro": true}}));
        let out = doc.render(DocumentFormat::Yaml, Some("# header")).unwrap();
        assert!(out.starts_with("# header\n"));
        let back = PersistedDocument::parse(&out, DocumentFormat::Yaml).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.version(), Some("abcd1234"));
    }

    #[test]
    fn test_render_json_drops_header() {
        let doc = PersistedDocument::new(json!({"lgc": {"tdp": 15}}));
        let out = doc.render(DocumentFormat::Json, Some("# ignored")).unwrap();
        assert!(!out.contains('#'));
        assert_eq!(PersistedDocument::parse(&out, DocumentFormat::Json).unwrap(), doc);
    }

    #[test]
    fn test_read_from_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(PersistedDocument::read_from(&tmp.path().join("none.yml"))
            .unwrap()
            .is_none());
    }
}
