//! Backing storage for the persisted document.
//!
//! The reconciler only talks to a [`DocumentStore`]. [`StateFile`] is the
//! on-disk implementation used by the daemon; [`MemoryStore`] backs tests and
//! embedders that persist elsewhere.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Result, SettingsError};
use crate::state::{DocumentFormat, PersistedDocument};

/// Load and save the persisted document.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore: Send + Sync {
    /// Read the current document. `Ok(None)` means there is no document yet.
    fn load(&self) -> Result<Option<PersistedDocument>>;

    /// Replace the stored document.
    fn save(&self, document: &PersistedDocument) -> Result<()>;

    /// Where the document lives, for logs.
    fn describe(&self) -> String;
}

/// A document stored in a YAML or JSON file.
///
/// Saves go through a temporary file in the same directory and an atomic
/// rename, so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    format: DocumentFormat,
    header: Option<String>,
}

impl StateFile {
    /// Create a store at `path`. The format follows the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self {
            path,
            format,
            header: None,
        }
    }

    /// Comment block written above the document (YAML only).
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

impl DocumentStore for StateFile {
    fn load(&self) -> Result<Option<PersistedDocument>> {
        PersistedDocument::read_from(&self.path)
    }

    fn save(&self, document: &PersistedDocument) -> Result<()> {
        let rendered = document.render(self.format, self.header.as_deref())?;

        if fs::read_to_string(&self.path).is_ok_and(|existing| existing == rendered) {
            debug!(path = %self.path.display(), "State file unchanged, skipping write");
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            SettingsError::Persist(format!(
                "Failed to create state directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
            SettingsError::Persist(format!(
                "Failed to create temporary file in {}: {}",
                dir.display(),
                e
            ))
        })?;
        tmp.write_all(rendered.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SettingsError::Persist(format!("Failed to write state: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            SettingsError::Persist(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        debug!(path = %self.path.display(), bytes = rendered.len(), "State file written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-process document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<PersistedDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `document`.
    pub fn with_document(document: PersistedDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    /// The last saved document.
    pub fn current(&self) -> Option<PersistedDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the stored document without going through the reconciler,
    /// the way an external edit would.
    pub fn replace(&self, document: Option<PersistedDocument>) {
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = document;
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedDocument>> {
        Ok(self.current())
    }

    fn save(&self, document: &PersistedDocument) -> Result<()> {
        self.replace(Some(document.clone()));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
