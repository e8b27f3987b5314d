//! Duet configuration.
//!
//! Configuration is an explicit value built once at process start and handed
//! to the client. It can come from a TOML file or from environment variables;
//! only [`resolve_from_env`] touches the process environment, and only the
//! binary calls it.
//!
//! Missing required values never raise: resolution yields
//! [`ConfigResolution::Unconfigured`] so callers can disable messaging.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::MessagingError;

/// Default Move module name holding the messaging entrypoints.
pub const DEFAULT_MODULE_NAME: &str = "messaging";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default attachment retention, in storage epochs.
pub const DEFAULT_RETENTION_EPOCHS: u32 = 1;

/// Environment variable names, primary first.
pub const PACKAGE_ID_VARS: [&str; 2] = ["DUET_PACKAGE_ID", "MESSAGING_PACKAGE_ID"];
pub const REGISTRY_ID_VARS: [&str; 2] = ["DUET_REGISTRY_ID", "MESSAGING_REGISTRY_ID"];
pub const NETWORK_VARS: [&str; 2] = ["DUET_NETWORK", "LEDGER_NETWORK"];
pub const SELF_ADDRESS_VARS: [&str; 2] = ["DUET_SELF_ADDRESS", "WALLET_ADDRESS"];
pub const MODULE_NAME_VAR: &str = "DUET_MODULE_NAME";
pub const POLICY_URL_VAR: &str = "DUET_POLICY_URL";
pub const BLOB_ENDPOINT_VAR: &str = "DUET_BLOB_ENDPOINT";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ConfigError> for MessagingError {
    fn from(err: ConfigError) -> Self {
        MessagingError::new(format!("Invalid configuration: {err}"))
            .with_context("kind", "config")
            .with_context("detail", err)
    }
}

/// Complete messaging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Ledger identifiers
    pub ledger: LedgerConfig,

    /// Policy service (optional, in-memory policies are test-only)
    #[serde(default)]
    pub policy: Option<PolicyServiceConfig>,

    /// Attachment store (optional, sends without attachments need none)
    #[serde(default)]
    pub blob: Option<BlobStoreConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// On-ledger identifiers and the caller's own address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Package holding the messaging module
    pub package_id: String,

    /// Module name inside the package
    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Shared conversation registry object
    pub registry_id: String,

    /// Network name (e.g. "testnet", "mainnet")
    pub network: String,

    /// Address whose signer submits transactions
    pub self_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyServiceConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    /// Publisher endpoint (proxy or direct)
    pub endpoint: String,

    /// Retention requested when an upload does not specify one
    #[serde(default = "default_retention")]
    pub default_retention: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_module_name() -> String {
    DEFAULT_MODULE_NAME.to_string()
}

fn default_retention() -> u32 {
    DEFAULT_RETENTION_EPOCHS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Fully qualified `package::module::name` target.
    pub fn target(&self, name: &str) -> String {
        format!("{}::{}::{}", self.package_id, self.module_name, name)
    }
}

impl MessagingConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Outcome of resolving configuration from variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigResolution {
    Configured(MessagingConfig),
    /// At least one required value is absent; names are the primary variables.
    Unconfigured { missing: Vec<&'static str> },
}

impl ConfigResolution {
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }

    pub fn configured(self) -> Option<MessagingConfig> {
        match self {
            Self::Configured(config) => Some(config),
            Self::Unconfigured { .. } => None,
        }
    }
}

/// Resolve configuration through a variable lookup.
///
/// Each required value is read from its primary name, then its fallback.
/// Blank values count as absent.
pub fn resolve_with<F>(lookup: F) -> ConfigResolution
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let first_of = |names: &[&'static str; 2]| names.iter().find_map(|name| read(name));

    let package_id = first_of(&PACKAGE_ID_VARS);
    let registry_id = first_of(&REGISTRY_ID_VARS);
    let network = first_of(&NETWORK_VARS);
    let self_address = first_of(&SELF_ADDRESS_VARS);

    let mut missing = Vec::new();
    for (value, names) in [
        (&package_id, PACKAGE_ID_VARS),
        (&registry_id, REGISTRY_ID_VARS),
        (&network, NETWORK_VARS),
        (&self_address, SELF_ADDRESS_VARS),
    ] {
        if value.is_none() {
            missing.push(names[0]);
        }
    }

    let (Some(package_id), Some(registry_id), Some(network), Some(self_address)) =
        (package_id, registry_id, network, self_address)
    else {
        return ConfigResolution::Unconfigured { missing };
    };

    ConfigResolution::Configured(MessagingConfig {
        ledger: LedgerConfig {
            package_id,
            module_name: read(MODULE_NAME_VAR).unwrap_or_else(default_module_name),
            registry_id,
            network,
            self_address,
        },
        policy: read(POLICY_URL_VAR).map(|base_url| PolicyServiceConfig { base_url }),
        blob: read(BLOB_ENDPOINT_VAR).map(|endpoint| BlobStoreConfig {
            endpoint,
            default_retention: DEFAULT_RETENTION_EPOCHS,
        }),
        logging: LoggingConfig::default(),
    })
}

/// Resolve configuration from the process environment.
pub fn resolve_from_env() -> ConfigResolution {
    resolve_with(|name| std::env::var(name).ok())
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("duet")
        .join("config.toml")
}
