//! Gateway configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, TOML config file,
//! `NOVAGATE_*` environment variables. CLI flags sit above all of these
//! and are applied by the binary. A missing file at the default path is
//! fine; a missing file at an explicitly requested path is an error.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NovagateError, Result};
use crate::server::{ServerConfig, DEFAULT_ADDR};

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "novagate.toml";

const ENV_ADDR: &str = "NOVAGATE_ADDR";
const ENV_IDLE_TIMEOUT_SECS: &str = "NOVAGATE_IDLE_TIMEOUT_SECS";
const ENV_WRITE_TIMEOUT_SECS: &str = "NOVAGATE_WRITE_TIMEOUT_SECS";

/// Root of the gateway's file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// TCP listen address.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Idle timeout in seconds; zero disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Write timeout in seconds; zero disables.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            idle_timeout_secs: default_idle_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_idle_timeout_secs() -> u64 {
    5 * 60
}

fn default_write_timeout_secs() -> u64 {
    10
}

impl GatewayConfig {
    /// Load configuration from `path`, falling back to
    /// [`DEFAULT_CONFIG_PATH`], then apply `NOVAGATE_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)
                .map_err(|err| NovagateError::Config(format!("parse {}: {err}", path.display())))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
                GatewayConfig::default()
            }
            Err(err) => {
                return Err(NovagateError::Config(format!(
                    "read {}: {err}",
                    path.display()
                )))
            }
        };

        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string(ENV_ADDR)? {
            self.server.addr = addr;
        }
        if let Some(secs) = env_u64(ENV_IDLE_TIMEOUT_SECS)? {
            self.server.idle_timeout_secs = secs;
        }
        if let Some(secs) = env_u64(ENV_WRITE_TIMEOUT_SECS)? {
            self.server.write_timeout_secs = secs;
        }
        Ok(())
    }

    /// Resolve into the server's runtime configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_addr(self.server.addr.clone())
            .with_idle_timeout(Duration::from_secs(self.server.idle_timeout_secs))
            .with_write_timeout(Duration::from_secs(self.server.write_timeout_secs))
    }
}

fn env_string(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => {
            Err(NovagateError::Config(format!("env {key} is empty")))
        }
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(NovagateError::Config(format!("env {key}: {err}"))),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env_string(key)? {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|err| NovagateError::Config(format!("env {key} invalid: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.addr, DEFAULT_ADDR);
        assert_eq!(config.server.idle_timeout_secs, 300);
        assert_eq!(config.server.write_timeout_secs, 10);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            addr = "127.0.0.1:9100"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9100");
        assert_eq!(config.server.idle_timeout_secs, 300);
    }

    #[test]
    fn test_server_config_resolution() {
        let mut config = GatewayConfig::default();
        config.server.idle_timeout_secs = 0;
        config.server.write_timeout_secs = 3;

        let server_config = config.server_config();
        assert!(server_config.idle_timeout.is_zero());
        assert_eq!(server_config.write_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let result = GatewayConfig::load(Some(Path::new("/nonexistent/novagate.toml")));
        assert!(matches!(result, Err(NovagateError::Config(_))));
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = std::env::temp_dir().join(format!("novagate-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "server = \"not a table\"").unwrap();

        let result = GatewayConfig::load(Some(&path));
        assert!(matches!(result, Err(NovagateError::Config(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
