//! Shared CLI core functionality
//!
//! Argument groups, output formatting, configuration loading and tracing
//! setup used by the `esp` binary. Kept apart from the binary so the
//! command handlers stay small and the pieces here can be tested without
//! spawning a process.

use alloy_primitives::Address;
use clap::Args;
use esp_core::EspError;
use esp_ethereum::MachineLimits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the node endpoint
pub const ENV_RPC_URL: &str = "ESP_RPC_URL";
/// Environment variable overriding the registry address
pub const ENV_REGISTRY: &str = "ESP_REGISTRY";
/// Environment variable overriding the pinned block
pub const ENV_BLOCK: &str = "ESP_BLOCK";

/// Common CLI arguments shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum OutputFormat {
    /// Indented JSON
    #[default]
    Pretty,
    /// Single-line JSON
    Json,
    /// TOML document
    Toml,
}

/// Common result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Common error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Esp(#[from] EspError),
}

/// Settings for commands that talk to a node
///
/// Values come from an optional config file and are then overridden by
/// `ESP_RPC_URL`, `ESP_REGISTRY` and `ESP_BLOCK` (a `.env` file in the
/// working directory is honored). Command line flags take precedence over
/// both; see [`EspConfig::merge_args`].
///
/// ```toml
/// rpc_url = "http://localhost:8545"
/// registry = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
/// block = 19000000
///
/// [limits]
/// max_depth = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EspConfig {
    pub rpc_url: Option<String>,
    pub registry: Option<Address>,
    pub block: Option<u64>,
    pub limits: MachineLimits,
}

impl EspConfig {
    /// Load from `path` if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        dotenv::dotenv().ok();
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a config file, choosing TOML or JSON by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> CliResult<Self> {
        let path = path.as_ref();
        let content = CliUtils::read_file(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| CliError::Configuration(e.to_string()))
            }
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(CliError::Configuration(format!(
                "unsupported config extension {:?}, expected toml or json",
                other.unwrap_or("")
            ))),
        }
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> CliResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc_url = Some(url);
        }
        if let Some(registry) = lookup(ENV_REGISTRY) {
            let address = registry.trim().parse::<Address>().map_err(|e| {
                CliError::Configuration(format!("{}: {}", ENV_REGISTRY, e))
            })?;
            self.registry = Some(address);
        }
        if let Some(block) = lookup(ENV_BLOCK) {
            let number = block.trim().parse::<u64>().map_err(|e| {
                CliError::Configuration(format!("{}: {}", ENV_BLOCK, e))
            })?;
            self.block = Some(number);
        }
        Ok(self)
    }

    /// Let explicit command line values win over file and environment
    pub fn merge_args(
        mut self,
        rpc_url: Option<String>,
        registry: Option<Address>,
        block: Option<u64>,
    ) -> Self {
        if rpc_url.is_some() {
            self.rpc_url = rpc_url;
        }
        if registry.is_some() {
            self.registry = registry;
        }
        if block.is_some() {
            self.block = block;
        }
        self
    }

    pub fn require_rpc_url(&self) -> CliResult<&str> {
        self.rpc_url.as_deref().ok_or_else(|| {
            CliError::Configuration(format!(
                "no RPC endpoint; pass --rpc, set {} or add rpc_url to the config",
                ENV_RPC_URL
            ))
        })
    }

    pub fn require_registry(&self) -> CliResult<Address> {
        self.registry.ok_or_else(|| {
            CliError::Configuration(format!(
                "no registry address; pass --registry, set {} or add registry to the config",
                ENV_REGISTRY
            ))
        })
    }
}

/// Install the global tracing subscriber, writing to stderr
#[cfg(feature = "std")]
pub fn init_tracing(verbose: bool) -> CliResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CliError::Configuration(e.to_string()))
}

/// Common CLI utilities
pub struct CliUtils;

impl CliUtils {
    /// Read a file and return its contents
    pub fn read_file<P: AsRef<Path>>(path: P) -> CliResult<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CliError::FileNotFound(path.to_string_lossy().to_string()));
        }

        fs::read_to_string(path).map_err(CliError::Io)
    }

    /// Write content to a file or stdout
    pub fn write_output(content: &str, output_path: Option<&str>) -> CliResult<()> {
        match output_path {
            Some(path) => {
                fs::write(path, content).map_err(CliError::Io)?;
                tracing::debug!("Output written to: {}", path);
            }
            None => {
                println!("{}", content.trim_end());
            }
        }
        Ok(())
    }

    /// Render a JSON value in the requested format
    pub fn format_json(value: &Value, format: &OutputFormat) -> CliResult<String> {
        match format {
            OutputFormat::Pretty => serde_json::to_string_pretty(value).map_err(CliError::Json),
            OutputFormat::Json => serde_json::to_string(value).map_err(CliError::Json),
            OutputFormat::Toml => match value {
                Value::Object(obj) => {
                    toml::to_string_pretty(obj).map_err(|e| CliError::InvalidArgument(e.to_string()))
                }
                // TOML documents must be tables
                other => {
                    let mut table = serde_json::Map::new();
                    table.insert("value".to_string(), other.clone());
                    toml::to_string_pretty(&table)
                        .map_err(|e| CliError::InvalidArgument(e.to_string()))
                }
            },
        }
    }
}
