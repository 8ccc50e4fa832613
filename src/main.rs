use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hhd_settings::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "hhd-settings")]
#[command(about = "Schema-driven settings engine for the handheld daemon", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the settings daemon, reloading the state file on change
    Daemon,
    /// Print a setting (or the whole state)
    Get {
        /// Dot- or slash-delimited path, e.g. lgc.xinput.active
        path: Option<String>,
    },
    /// Validate and write a setting
    Set {
        path: String,
        /// Value, parsed as YAML (true, 15, uinput, {active: ds5e})
        value: String,
    },
    /// Print the commented schema description
    Describe,
    /// Check a state document against the schema
    Validate {
        /// Document to check (defaults to the state file)
        file: Option<PathBuf>,
    },
    /// Apply or save profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Print the schema fingerprint recorded as `version`
    SchemaHash,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Overlay a profile onto the current state
    Apply { name: String },
    /// Save the current state as a profile
    Save {
        name: String,
        /// Only save settings under this path
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load().with_context(|| "Failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json || config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Some(Commands::Version) | None => {
            println!("hhd-settings {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Daemon) => cli::daemon::cmd_daemon(config).await?,
        Some(Commands::Get { path }) => cli::ops::cmd_get(&config, path)?,
        Some(Commands::Set { path, value }) => cli::ops::cmd_set(&config, path, value)?,
        Some(Commands::Describe) => cli::ops::cmd_describe(&config)?,
        Some(Commands::Validate { file }) => cli::ops::cmd_validate(&config, file)?,
        Some(Commands::Profile { action }) => match action {
            ProfileAction::Apply { name } => cli::ops::cmd_profile_apply(&config, name)?,
            ProfileAction::Save { name, prefix } => {
                cli::ops::cmd_profile_save(&config, name, prefix)?
            }
        },
        Some(Commands::SchemaHash) => cli::ops::cmd_schema_hash(&config)?,
    }

    Ok(())
}
