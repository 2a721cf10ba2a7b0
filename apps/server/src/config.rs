//! Process configuration: bind address, logging, and the vault's
//! at-rest encryption key. Loaded from an optional config file plus
//! `FLOWRUNNER_`-prefixed environment overrides, then a handful of
//! `clap` flags for the common cases (mirrors the teacher's own
//! config/CLI split: `config` owns layered sources, `clap` owns the
//! handful of flags an operator actually types).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use flowrunner_log::LogFormat;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "flowrunner-server", about = "FlowRunner execution engine server")]
pub struct Cli {
    /// Path to an optional YAML/JSON config file.
    #[arg(long, env = "FLOWRUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen address (`host:port`).
    #[arg(long, env = "FLOWRUNNER_BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,

    /// Emit logs as newline-delimited JSON instead of pretty text.
    #[arg(long, env = "FLOWRUNNER_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Key material the in-memory secret vault derives its AES-256-GCM
    /// key from. A real deployment sources this from a KMS-unwrapped
    /// key, not a config file; accepted here as a string for the same
    /// reason the teacher's own config layer takes connection strings
    /// plainly and leaves their provenance to the deployment.
    #[serde(default = "default_vault_key")]
    pub vault_master_key: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("static default address always parses")
}

fn default_vault_key() -> String {
    "flowrunner-dev-insecure-default-key".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr(), vault_master_key: default_vault_key(), log_json: false }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ServerConfig {
    /// Layer an optional file over defaults, then `FLOWRUNNER_`
    /// environment variables, then explicit CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("vault_master_key", default_vault_key())?
            .set_default("log_json", false)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.clone()));
        }
        builder = builder.add_source(config::Environment::with_prefix("FLOWRUNNER").try_parsing(true));

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;

        if let Some(bind_addr) = cli.bind_addr {
            config.bind_addr = bind_addr;
        }
        if cli.log_json {
            config.log_json = true;
        }
        Ok(config)
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        if self.log_json { LogFormat::Json } else { LogFormat::Pretty }
    }
}
