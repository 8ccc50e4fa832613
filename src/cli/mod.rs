//! Command handlers for the hhd-settings binary.

pub(crate) mod daemon;
pub(crate) mod ops;

use anyhow::{Context, Result};
use tracing::info;

use hhd_settings::config::Config;
use hhd_settings::schema::{load_schemas_into, SchemaRegistry, UnifiedSchema};
use hhd_settings::{ReconcilerOptions, Settings};

/// Register every schema definition found in the configured directories.
pub(crate) fn load_schema(config: &Config) -> Result<UnifiedSchema> {
    let dirs = config.schema_dirs();
    let mut registry = SchemaRegistry::new();
    let count = load_schemas_into(&mut registry, &dirs)
        .with_context(|| format!("Failed to load schemas from {:?}", dirs))?;
    if count == 0 {
        registry.shutdown();
        anyhow::bail!(
            "No plugin schemas found in {:?}; add definition files or set HHD_SCHEMA_DIRS",
            dirs
        );
    }
    let schema = registry.unified();
    info!(namespaces = count, fingerprint = %schema.fingerprint(), "Schema ready");
    registry.shutdown();
    Ok(schema)
}

/// Open the configured state file, reporting merge warnings on stderr.
pub(crate) fn open_settings(config: &Config) -> Result<Settings> {
    open_settings_with(config, config.reconciler_options())
}

/// Open the state file for reading only; startup never rewrites it.
pub(crate) fn open_settings_read_only(config: &Config) -> Result<Settings> {
    let options = ReconcilerOptions {
        persist_on_open: false,
        ..config.reconciler_options()
    };
    open_settings_with(config, options)
}

fn open_settings_with(config: &Config, options: ReconcilerOptions) -> Result<Settings> {
    let schema = load_schema(config)?;
    let (settings, warnings) = Settings::open_file(schema, config.state_file(), options);
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(settings)
}
