//! Layered configuration: defaults, then the TOML file, then `APPRUNNER__*` variables.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::runner::RunnerConfig;
use crate::server::ServerOptions;

pub const APP_NAME: &str = "apprunner";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub grpc: GrpcConfig,
    pub admin: AdminConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    /// Address the contract is served on.
    pub listen: String,
    /// Optional Unix socket serving the same contract. Supports ~ and env vars.
    pub socket: Option<String>,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9190".to_string(),
            socket: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:9191".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Milliseconds between heartbeats on an event stream.
    pub heartbeat_interval_ms: u64,
    /// Capacity of each event broadcast channel.
    pub event_buffer: usize,
    /// Seconds a stopped application's log stays readable.
    pub log_retention_secs: u64,
    /// Directory holding application manifests.
    /// Defaults to `$XDG_DATA_HOME/apprunner/applications`.
    pub applications_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            event_buffer: crate::events::DEFAULT_EVENT_BUFFER,
            log_retention_secs: crate::runner::DEFAULT_LOG_RETENTION.as_secs(),
            applications_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from `config_file` (optional) and the environment.
    pub fn load(config_file: &Path) -> Result<Self> {
        let built = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("grpc.listen", "127.0.0.1:9190")?
            .set_default("admin.enabled", true)?
            .set_default("admin.listen", "127.0.0.1:9191")?
            .set_default("runtime.heartbeat_interval_ms", 5_000_i64)?
            .set_default(
                "runtime.event_buffer",
                crate::events::DEFAULT_EVENT_BUFFER as i64,
            )?
            .set_default(
                "runtime.log_retention_secs",
                crate::runner::DEFAULT_LOG_RETENTION.as_secs() as i64,
            )?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(env_prefix().as_str())
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("loading configuration from {}", config_file.display()))?;

        built
            .try_deserialize()
            .context("deserializing configuration")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.heartbeat_interval_ms.max(1))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            event_buffer: self.runtime.event_buffer,
            log_retention: Duration::from_secs(self.runtime.log_retention_secs),
        }
    }

    pub fn applications_dir(&self) -> Result<PathBuf> {
        match self.runtime.applications_dir {
            Some(ref dir) => expand_str_path(dir),
            None => Ok(default_data_dir()?.join("applications")),
        }
    }

    pub fn server_options(&self) -> Result<ServerOptions> {
        let grpc_listen: SocketAddr = self
            .grpc
            .listen
            .parse()
            .with_context(|| format!("invalid grpc.listen address {:?}", self.grpc.listen))?;

        let admin_listen = if self.admin.enabled {
            Some(
                self.admin
                    .listen
                    .parse()
                    .with_context(|| format!("invalid admin.listen address {:?}", self.admin.listen))?,
            )
        } else {
            None
        };

        let grpc_socket = self
            .grpc
            .socket
            .as_deref()
            .map(expand_str_path)
            .transpose()?;

        Ok(ServerOptions {
            grpc_listen,
            grpc_socket,
            admin_listen,
            heartbeat_interval: self.heartbeat_interval(),
        })
    }
}

/// Write the default configuration, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push('\n');
    buffer
}

/// Resolve the config file path, honouring an explicit override (file or directory).
pub fn resolve_config_file(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let config_file = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if config_file.parent().is_none() {
        return Err(anyhow!("invalid config file path: {config_file:?}"));
    }
    Ok(config_file)
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

/// `APPRUNNER`; variables look like `APPRUNNER__GRPC__LISTEN`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
