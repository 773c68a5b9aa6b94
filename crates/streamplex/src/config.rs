//! Streaming and server configuration
//!
//! [`StreamingConfig`] controls queue capacities and the setup deadline used by
//! the multiplexer. [`ServerConfig`] wraps it for the demo HTTP server and is
//! loaded from a JSON environment file with environment variable overrides.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};

/// Default setup deadline for multiplexed producers
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the in-memory pipe between document writer and HTTP body
pub const DEFAULT_BODY_BUFFER_SIZE: usize = 16 * 1024;

/// Environment variable overriding [`ServerConfig::bind_addr`]
pub const ENV_BIND: &str = "STREAMPLEX_BIND";
/// Environment variable overriding [`StreamingConfig::buffer_size`]
pub const ENV_BUFFER_SIZE: &str = "STREAMPLEX_BUFFER_SIZE";
/// Environment variable overriding [`StreamingConfig::setup_timeout`], in milliseconds
pub const ENV_SETUP_TIMEOUT_MS: &str = "STREAMPLEX_SETUP_TIMEOUT_MS";

/// Queue and deadline settings for multiplexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Capacity of every queue. Zero requests the smallest possible buffer.
    pub buffer_size: usize,

    /// Upper bound on the setup phase; `None` waits indefinitely
    #[serde(rename = "setup_timeout_ms", with = "optional_millis")]
    pub setup_timeout: Option<Duration>,

    /// Capacity of the pipe feeding a streamed HTTP body
    pub body_buffer_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            setup_timeout: Some(DEFAULT_SETUP_TIMEOUT),
            body_buffer_size: DEFAULT_BODY_BUFFER_SIZE,
        }
    }
}

impl StreamingConfig {
    /// Set the queue capacity
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set or clear the setup deadline
    pub fn with_setup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.setup_timeout = timeout;
        self
    }

    /// Set the HTTP body pipe capacity
    pub fn with_body_buffer_size(mut self, size: usize) -> Self {
        self.body_buffer_size = size;
        self
    }

    /// Capacity handed to channel constructors
    ///
    /// Tokio channels cannot be zero-sized, so a zero buffer maps to one slot,
    /// the closest thing to a rendezvous channel.
    pub fn channel_capacity(&self) -> usize {
        self.buffer_size.max(1)
    }

    /// Check the settings for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.setup_timeout == Some(Duration::ZERO) {
            return Err(Error::config("setup_timeout must be greater than zero"));
        }
        if self.body_buffer_size == 0 {
            return Err(Error::config("body_buffer_size must be greater than zero"));
        }
        Ok(())
    }
}

/// Settings for the demo HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: SocketAddr,

    /// Streaming settings shared by all handlers
    pub streaming: StreamingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            streaming: StreamingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist,
    /// then apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// [`ServerConfig::load`] with overrides taken from `lookup` instead of the
    /// process environment
    pub fn load_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(lookup)?;
        config.streaming.validate()?;
        Ok(config)
    }

    /// Read the JSON file alone; a missing file yields the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                Error::config(format!("failed to parse {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_addr = bind
                .parse()
                .map_err(|e| Error::config(format!("{ENV_BIND}={bind}: {e}")))?;
        }
        if let Some(size) = lookup(ENV_BUFFER_SIZE) {
            self.streaming.buffer_size = size
                .parse()
                .map_err(|e| Error::config(format!("{ENV_BUFFER_SIZE}={size}: {e}")))?;
        }
        if let Some(ms) = lookup(ENV_SETUP_TIMEOUT_MS) {
            let ms: u64 = ms
                .parse()
                .map_err(|e| Error::config(format!("{ENV_SETUP_TIMEOUT_MS}={ms}: {e}")))?;
            // 0 disables the deadline
            self.streaming.setup_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(())
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_streaming_config() {
        let config = StreamingConfig::default();
        assert_eq!(config.buffer_size, 0);
        assert_eq!(config.channel_capacity(), 1);
        assert_eq!(config.setup_timeout, Some(DEFAULT_SETUP_TIMEOUT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = StreamingConfig::default()
            .with_buffer_size(8)
            .with_setup_timeout(None)
            .with_body_buffer_size(512);
        assert_eq!(config.channel_capacity(), 8);
        assert_eq!(config.setup_timeout, None);
        assert_eq!(config.body_buffer_size, 512);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = StreamingConfig::default().with_setup_timeout(Some(Duration::ZERO));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = StreamingConfig::default().with_body_buffer_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_with_millis() {
        let config: StreamingConfig =
            serde_json::from_str(r#"{"buffer_size": 4, "setup_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.buffer_size, 4);
        assert_eq!(config.setup_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.body_buffer_size, DEFAULT_BODY_BUFFER_SIZE);

        let config: StreamingConfig =
            serde_json::from_str(r#"{"setup_timeout_ms": null}"#).unwrap();
        assert_eq!(config.setup_timeout, None);
    }

    #[test]
    fn test_streaming_config_serde_roundtrip() {
        let config = StreamingConfig::default().with_buffer_size(3);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""setup_timeout_ms":30000"#));
        let back: StreamingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_BUFFER_SIZE, "16"),
            (ENV_SETUP_TIMEOUT_MS, "0"),
        ]);
        let mut config = ServerConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.streaming.buffer_size, 16);
        assert_eq!(config.streaming.setup_timeout, None);
    }

    #[test]
    fn test_apply_overrides_rejects_garbage() {
        let mut config = ServerConfig::default();
        let result = config.apply_overrides(|name| {
            (name == ENV_BUFFER_SIZE).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ServerConfig::load_with("/nonexistent/streamplex/env.json", |_| None).unwrap();
        assert_eq!(config.streaming.body_buffer_size, DEFAULT_BODY_BUFFER_SIZE);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("streamplex-env-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"bind_addr": "127.0.0.1:3030", "streaming": {"buffer_size": 2}}"#,
        )
        .unwrap();

        let config = ServerConfig::load_with(&path, |_| None).unwrap();
        let overridden = ServerConfig::load_with(&path, |name| {
            (name == ENV_BUFFER_SIZE).then(|| "9".to_string())
        })
        .unwrap();
        let raw = ServerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.bind_addr.port(), 3030);
        assert_eq!(config.streaming.buffer_size, 2);
        assert_eq!(overridden.streaming.buffer_size, 9);
        assert_eq!(overridden.bind_addr.port(), 3030);
        assert_eq!(raw, config);
    }

    #[test]
    fn test_load_rejects_invalid_override() {
        let result = ServerConfig::load_with("/nonexistent/streamplex/env.json", |name| {
            (name == ENV_BIND).then(|| "not an address".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
