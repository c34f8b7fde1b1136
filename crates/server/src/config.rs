//! Configuration loading from deckhand.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use policy::Policy;
use runtime::{RegistryConfig, TurnConfig};
use serde::Deserialize;

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "deckhand.toml";

const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub turn: TurnSettings,

    #[serde(default)]
    pub log: LogConfig,

    /// Policy rules (allow/deny).
    #[serde(flatten)]
    pub policy: Policy,
}

/// HTTP listener and storage.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// SQLite database path. Defaults to the user data directory.
    pub database: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            database: None,
        }
    }
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Provider name (currently only "anthropic" supported).
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API key. Falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System prompt sent with every generation.
    pub system: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            system: None,
        }
    }
}

/// Session registry timings, in seconds.
#[derive(Debug, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl RegistrySettings {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnSettings {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl From<&TurnSettings> for TurnConfig {
    fn from(settings: &TurnSettings) -> Self {
        TurnConfig {
            max_tool_rounds: settings.max_tool_rounds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_idle_timeout() -> u64 {
    runtime::DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_sweep_interval() -> u64 {
    runtime::DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_connect_timeout() -> u64 {
    mcp::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_max_tool_rounds() -> usize {
    runtime::DEFAULT_MAX_TOOL_ROUNDS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if given, else `deckhand.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.provider != "anthropic" {
            return Err(ConfigError::UnsupportedProvider(
                self.backend.provider.clone(),
            ));
        }
        if self.registry.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "registry.sweep_interval_secs must be positive".into(),
            ));
        }
        self.policy.validate()?;
        Ok(())
    }

    /// API key from config, or from the environment.
    ///
    /// A missing key is not a startup error; chat requests fail instead.
    pub fn api_key(&self) -> Option<String> {
        self.backend
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unsupported backend provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:3000");
        assert!(config.server.database.is_none());
        assert_eq!(config.backend.model, "claude-sonnet-4-20250514");
        assert_eq!(config.backend.max_tokens, 4096);
        assert_eq!(config.registry.idle_timeout_secs, 1800);
        assert_eq!(config.registry.sweep_interval_secs, 300);
        assert_eq!(config.registry.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.turn.max_tool_rounds, 1);
        assert_eq!(config.log.level, "info");
        assert!(config.policy.allow.exec.contains(&"npx".to_string()));
    }

    #[test]
    fn full_config() {
        let config = Config::parse(
            r#"
            [server]
            addr = "0.0.0.0:8080"
            database = "/var/lib/deckhand/deckhand.db"

            [backend]
            model = "claude-3-5-haiku-latest"
            api_key = "sk-test"
            system = "Be brief."

            [registry]
            idle_timeout_secs = 60
            sweep_interval_secs = 10

            [turn]
            max_tool_rounds = 3

            [log]
            level = "debug"

            [allow]
            exec = ["node"]
            net_http = ["tools.internal"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(
            config.server.database.as_deref(),
            Some(Path::new("/var/lib/deckhand/deckhand.db"))
        );
        assert_eq!(config.api_key().as_deref(), Some("sk-test"));
        assert_eq!(config.backend.system.as_deref(), Some("Be brief."));
        assert_eq!(
            config.registry.registry_config(),
            RegistryConfig {
                idle_timeout: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(10),
            }
        );
        assert_eq!(TurnConfig::from(&config.turn).max_tool_rounds, 3);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.policy.allow.exec, vec!["node"]);
        assert_eq!(config.policy.allow.net_http, vec!["tools.internal"]);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = Config::parse("[backend]\nprovider = \"acme\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(p) if p == "acme"));
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let err = Config::parse("[registry]\nsweep_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            Config::parse("[server\naddr = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
