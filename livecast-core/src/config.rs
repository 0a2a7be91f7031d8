use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{PlaybackPolicy, MAX_RECONNECT_WINDOW_SECONDS};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub mux: MuxConfig,
    pub polling: PollingConfig,
    pub streams: StreamDefaults,
    pub logging: LoggingConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
        }
    }
}

/// Mux platform access
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub base_url: String,
    /// RTMP ingest endpoint shown next to the stream key
    pub rtmp_url: String,
    pub request_timeout_seconds: u64,
    pub list_page_limit: u32,
    pub max_list_pages: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            token_id: None,
            token_secret: None,
            base_url: livecast_mux::DEFAULT_BASE_URL.to_string(),
            rtmp_url: "rtmp://global-live.mux.com:5222/app/".to_string(),
            request_timeout_seconds: 30,
            list_page_limit: 25,
            max_list_pages: 4,
        }
    }
}

impl MuxConfig {
    /// Both halves of the access token, if present and non-empty
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.token_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self.token_secret.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((id, secret))
    }
}

impl std::fmt::Debug for MuxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxConfig")
            .field("token_id", &self.token_id)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("rtmp_url", &self.rtmp_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("list_page_limit", &self.list_page_limit)
            .field("max_list_pages", &self.max_list_pages)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Grid refresh period
    pub list_interval_seconds: u64,
    /// Detail page refresh period
    pub detail_interval_seconds: u64,
    /// Buffered poll cycles with status changes before slow listeners lag.
    /// Each cycle's transitions travel together, so this bounds cycles,
    /// not streams.
    pub event_capacity: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            list_interval_seconds: 30,
            detail_interval_seconds: 5,
            event_capacity: 64,
        }
    }
}

/// Defaults for streams created without explicit parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDefaults {
    pub playback_policy: PlaybackPolicy,
    pub reconnect_window_seconds: i64,
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            playback_policy: PlaybackPolicy::Public,
            reconnect_window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// "Coming soon" placeholders appended to the grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub enabled: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    ///
    /// `MUX_TOKEN_ID` / `MUX_TOKEN_SECRET` fill in credentials that neither
    /// the file nor `LIVECAST_MUX__*` provided.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // LIVECAST_SERVER__HTTP_PORT, LIVECAST_MUX__TOKEN_ID, ...
        builder = builder.add_source(
            Environment::with_prefix("LIVECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.mux.token_id.is_none() {
            self.mux.token_id = lookup("MUX_TOKEN_ID");
        }
        if self.mux.token_secret.is_none() {
            self.mux.token_secret = lookup("MUX_TOKEN_SECRET");
        }
    }

    /// Check for misconfigurations. Missing Mux credentials are deliberately
    /// not reported here; registry calls report them.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if self.polling.list_interval_seconds == 0 {
            errors.push("polling.list_interval_seconds must be at least 1".to_string());
        }
        if self.polling.detail_interval_seconds == 0 {
            errors.push("polling.detail_interval_seconds must be at least 1".to_string());
        }
        if self.polling.event_capacity == 0 {
            errors.push("polling.event_capacity must be at least 1".to_string());
        }
        if self.mux.request_timeout_seconds == 0 {
            errors.push("mux.request_timeout_seconds must be at least 1".to_string());
        }
        if self.mux.list_page_limit == 0 {
            errors.push("mux.list_page_limit must be at least 1".to_string());
        }
        if url::Url::parse(&self.mux.base_url).is_err() {
            errors.push(format!("mux.base_url is not a valid URL: {}", self.mux.base_url));
        }
        let window = self.streams.reconnect_window_seconds;
        if window <= 0 || window > i64::from(MAX_RECONNECT_WINDOW_SECONDS) {
            errors.push(format!(
                "streams.reconnect_window_seconds must be within 1..={MAX_RECONNECT_WINDOW_SECONDS}, got {window}"
            ));
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level is invalid: {}", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.list_interval_seconds, 30);
        assert_eq!(config.polling.detail_interval_seconds, 5);
        assert_eq!(config.streams.reconnect_window_seconds, 60);
        assert!(config.mux.credentials().is_none());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = Config::default();
        config.polling.detail_interval_seconds = 0;
        config.streams.reconnect_window_seconds = 0;
        config.logging.format = "xml".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let mut config = Config::default();
        config.mux.token_id = Some("id".to_string());
        config.mux.token_secret = Some("   ".to_string());
        assert!(config.mux.credentials().is_none());

        config.mux.token_secret = Some("secret".to_string());
        assert_eq!(config.mux.credentials(), Some(("id", "secret")));
    }

    #[test]
    fn test_legacy_env_fills_missing_credentials_only() {
        let mut config = Config::default();
        config.mux.token_id = Some("from-file".to_string());
        config.apply_legacy_env(|key| Some(format!("env-{key}")));

        assert_eq!(config.mux.token_id.as_deref(), Some("from-file"));
        assert_eq!(config.mux.token_secret.as_deref(), Some("env-MUX_TOKEN_SECRET"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = MuxConfig::default();
        config.token_secret = Some("hunter2".to_string());
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_http_address() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.http_port = 8080;
        assert_eq!(config.http_address(), "127.0.0.1:8080");
    }
}
