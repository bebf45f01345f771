/*
[INPUT]:  Optional YAML file, BINANCE_* environment variables
[OUTPUT]: Validated runner configuration and derived session settings
[POS]:    Configuration layer - process startup
[UPDATE]: When adding new configuration options
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use binance_stream_adapter::SessionConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment as EnvSource, File, FileFormat, Map};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "BINANCE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Top-level configuration for the stream runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Status server port
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Streams subscribed at startup (e.g. "btcusdt@trade")
    #[serde(default)]
    pub streams: Vec<String>,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Reconnect and heartbeat settings, in whole seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_heartbeat_window_secs")]
    pub heartbeat_window_secs: u64,
    #[serde(default = "default_liveness_grace_secs")]
    pub liveness_grace_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            heartbeat_window_secs: default_heartbeat_window_secs(),
            liveness_grace_secs: default_liveness_grace_secs(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ws_url() -> String {
    binance_stream_adapter::ws::DEFAULT_STREAM_URL.to_string()
}

fn default_api_url() -> String {
    binance_stream_adapter::http::DEFAULT_API_URL.to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_base_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_heartbeat_window_secs() -> u64 {
    30
}

fn default_liveness_grace_secs() -> u64 {
    5
}

impl AppConfig {
    /// Load defaults, then `path` (YAML) if given, then `BINANCE_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        Self::finish(builder, None)
    }

    /// Parse a YAML document without consulting the process environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_yaml_and_env(yaml, Map::new())
    }

    fn from_yaml_and_env(yaml: &str, env: Map<String, String>) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
        Self::finish(builder, Some(env))
    }

    fn finish(
        builder: ConfigBuilder<DefaultState>,
        env: Option<Map<String, String>>,
    ) -> Result<Self> {
        let env = EnvSource::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("streams")
            .source(env);

        let config: Self = builder
            .add_source(env)
            .build()
            .context("build configuration")?
            .try_deserialize()
            .context("deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.session_config()
            .validate()
            .context("invalid session settings")?;
        url::Url::parse(&self.api_url).context("invalid api_url")?;
        if self.api_key.is_some() != self.api_secret.is_some() {
            bail!("api_key and api_secret must be set together");
        }
        if self.streams.iter().any(|stream| stream.trim().is_empty()) {
            bail!("stream identifiers must not be empty");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        let session = &self.session;
        SessionConfig {
            url: self.ws_url.clone(),
            max_reconnect_attempts: session.max_reconnect_attempts,
            base_backoff: Duration::from_secs(session.base_backoff_secs),
            max_backoff: Duration::from_secs(session.max_backoff_secs),
            heartbeat_window: Duration::from_secs(session.heartbeat_window_secs),
            liveness_grace: Duration::from_secs(session.liveness_grace_secs),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}
