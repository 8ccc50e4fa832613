//! One-shot commands operating on the state file.
//!
//! These edit the file through the same validated path the daemon uses; a
//! running daemon picks the result up through its file watcher.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use hhd_settings::config::Config;
use hhd_settings::merge;
use hhd_settings::state::PersistedDocument;

use super::{load_schema, open_settings, open_settings_read_only};

/// Parse a command-line value as YAML so `true`, `15` and `uinput` all work.
pub fn parse_value(raw: &str) -> Result<Value> {
    serde_yaml::from_str(raw).with_context(|| format!("Invalid value: {}", raw))
}

fn print_yaml(value: &Value) -> Result<()> {
    let rendered = serde_yaml::to_string(value)?;
    print!("{}", rendered);
    Ok(())
}

pub(crate) fn cmd_get(config: &Config, path: Option<String>) -> Result<()> {
    let settings = open_settings_read_only(config)?;
    let value = settings.get_json(path.as_deref().unwrap_or(""))?;
    print_yaml(&value)
}

pub(crate) fn cmd_set(config: &Config, path: String, raw: String) -> Result<()> {
    let settings = open_settings(config)?;
    let value = parse_value(&raw)?;
    let outcome = settings
        .set(path.as_str(), value)
        .with_context(|| format!("Failed to set {}", path))?;
    if outcome.is_noop() {
        println!("{} unchanged", path);
    } else {
        for changed in &outcome.changed {
            println!("{} = {}", changed, settings.get_json(changed.clone())?);
        }
    }
    Ok(())
}

pub(crate) fn cmd_describe(config: &Config) -> Result<()> {
    let schema = load_schema(config)?;
    print!("{}", schema.describe());
    Ok(())
}

pub(crate) fn cmd_schema_hash(config: &Config) -> Result<()> {
    println!("{}", load_schema(config)?.fingerprint());
    Ok(())
}

/// Check a document against the schema without touching it.
pub(crate) fn cmd_validate(config: &Config, file: Option<PathBuf>) -> Result<()> {
    let schema = load_schema(config)?;
    let path = file.unwrap_or_else(|| config.state_file());
    let document = PersistedDocument::read_from(&path)?
        .with_context(|| format!("{} does not exist", path.display()))?;

    let (_, warnings) = merge::merge(&schema, &document);
    if warnings.is_empty() {
        println!("{}: ok", path.display());
        return Ok(());
    }
    for warning in &warnings {
        println!("{}", warning);
    }
    anyhow::bail!("{}: {} invalid value(s)", path.display(), warnings.len())
}

fn profile_path(config: &Config, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.extension().is_some() || candidate.components().count() > 1 {
        candidate.to_path_buf()
    } else {
        config.profile_dir().join(format!("{}.yml", name))
    }
}

pub(crate) fn cmd_profile_apply(config: &Config, name: String) -> Result<()> {
    let settings = open_settings(config)?;
    let path = profile_path(config, &name);
    let outcome = settings
        .apply_profile(&path)
        .with_context(|| format!("Failed to apply profile {}", path.display()))?;
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    println!(
        "Applied {} ({} setting(s) changed)",
        path.display(),
        outcome.changed.len()
    );
    Ok(())
}

pub(crate) fn cmd_profile_save(config: &Config, name: String, prefix: Option<String>) -> Result<()> {
    let settings = open_settings_read_only(config)?;
    let path = profile_path(config, &name);
    settings.save_profile(&path, prefix.as_deref().unwrap_or(""))?;
    println!("Saved {}", path.display());
    Ok(())
}
