use clap::{Parser, Subcommand};
use duet::config::{self, ConfigResolution, MessagingConfig, DEFAULT_LOG_LEVEL};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

pub mod decode;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "duet")]
#[command(author = "Duet Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the Duet messaging client", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/duet/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report whether the client is configured, and what is missing
    Status,

    /// Decode a binary message snapshot and print it as JSON
    DecodeSnapshot {
        /// Snapshot bytes as hex (optional 0x prefix)
        #[arg(long)]
        hex: String,

        /// Conversation the snapshot belongs to
        #[arg(long)]
        conversation: String,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Status => status::execute(cli.config).await,
        Commands::DecodeSnapshot { hex, conversation } => decode::execute(&hex, &conversation),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// Where configuration comes from, in order of precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` flag, or the default file when it exists
    File(PathBuf),
    /// `DUET_*` variables and their fallbacks
    Environment,
}

/// Resolve configuration: an explicit `--config` file must load; otherwise
/// the default file is used when present, then the environment.
pub fn resolve(
    config_path: Option<&str>,
) -> Result<(ConfigSource, ConfigResolution), config::ConfigError> {
    let path = match config_path {
        Some(path) => Some(PathBuf::from(path)),
        None => Some(config::default_config_path()).filter(|p| p.exists()),
    };

    match path {
        Some(path) => {
            let loaded = MessagingConfig::load(&path)?;
            Ok((ConfigSource::File(path), ConfigResolution::Configured(loaded)))
        }
        None => Ok((ConfigSource::Environment, config::resolve_from_env())),
    }
}

fn configured_level(config_path: Option<&Path>) -> String {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path);
    MessagingConfig::load(&path)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config_path: Option<&str>) {
    let level = configured_level(config_path.map(Path::new));
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
