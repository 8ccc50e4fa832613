//! Daemon command: keep the state live until interrupted.

use anyhow::Result;
use futures::StreamExt;
use tracing::{info, warn};

use hhd_settings::config::Config;

use super::open_settings;

pub(crate) async fn cmd_daemon(config: Config) -> Result<()> {
    let settings = open_settings(&config)?;
    let state_file = config.state_file();

    info!(
        state = %state_file.display(),
        revision = settings.revision(),
        "Settings daemon started"
    );

    let watcher = settings.watch_document(&state_file, config.watch_options());

    // Log every applied change; plugins subscribe the same way.
    let mut changes = settings.watch("");
    let logger = tokio::spawn(async move {
        while let Some(event) = changes.next().await {
            info!(
                path = %event.path,
                value = %event.value_json(),
                revision = event.revision,
                "Setting changed"
            );
        }
        warn!("Change log subscription closed");
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    watcher.stop();
    logger.abort();
    Ok(())
}
