//! Configuration loading and persistence.

use super::ClientConfig;
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use crate::secret::SecretString;
use std::fs;
use std::path::Path;
use tracing::debug;

impl ClientConfig {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Load from `path` (or the default path), fall back to defaults when the
    /// file does not exist, then apply environment overrides and validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let loaded = match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        };

        let mut config = match loaded {
            Ok(config) => config,
            Err(ConfigError::NotFound(path)) => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `GATELINK_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(url) = env::get_var(env::vars::GATELINK_URL) {
            self.gateway.url = url;
        }
        if let Some(token) = env::get_var(env::vars::GATELINK_TOKEN) {
            self.gateway.token = Some(SecretString::new(token));
        }
        if let Some(http_url) = env::get_var(env::vars::GATELINK_HTTP_URL) {
            self.gateway.http_url = Some(http_url);
        }
        if let Some(timeout_ms) = env::get_u64(env::vars::GATELINK_TIMEOUT_MS) {
            self.requests.timeout_ms = timeout_ms;
        }
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to a JSON5-compatible string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5.
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Socket endpoint must be ws:// or wss://
        match url::Url::parse(&self.gateway.url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(format!(
                "Gateway url must use ws:// or wss://, got '{}://'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("Invalid gateway url '{}': {}", self.gateway.url, e)),
        }

        // 2. Fallback endpoint must be http:// or https://
        if let Some(http_url) = &self.gateway.http_url {
            match url::Url::parse(http_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(format!(
                    "Fallback http_url must use http:// or https://, got '{}://'",
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Invalid fallback http_url '{}': {}", http_url, e)),
            }
        }

        // 3. Empty tokens are almost always a templating mistake
        if self.gateway.token.as_ref().is_some_and(|t| t.is_empty()) {
            errors.push("Gateway token is set but empty".to_string());
        }

        // 4. Timeouts and backoff
        if self.requests.timeout_ms == 0 {
            errors.push("Request timeout must be greater than 0".to_string());
        }
        if self.reconnect.base_delay_ms == 0 {
            errors.push("Reconnect base_delay_ms must be greater than 0".to_string());
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            errors.push(format!(
                "Reconnect base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            ));
        }

        // 5. Session key
        if self.events.session_key.trim().is_empty() {
            errors.push("Default session key must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }
}

/// Builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: ClientConfig,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gateway WebSocket endpoint.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.url = url.into();
        self
    }

    /// Set the bearer credential.
    pub fn token(mut self, token: impl Into<SecretString>) -> Self {
        self.config.gateway.token = Some(token.into());
        self
    }

    /// Set the stateless fallback endpoint.
    pub fn http_url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.http_url = Some(url.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.requests.timeout_ms = timeout_ms;
        self
    }

    /// Set the reconnect backoff bounds.
    pub fn backoff_ms(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.config.reconnect.base_delay_ms = base_delay_ms;
        self.config.reconnect.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the default session key.
    pub fn session_key(mut self, key: impl Into<String>) -> Self {
        self.config.events.session_key = key.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
