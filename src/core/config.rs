use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub source: SourceConfig,
    pub links: LinksConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tuning of the chunked fetch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Upper bound of a single bounded fetch. Trades round trips against seek latency.
    pub chunk_size_bytes: u32,
    /// Extra attempts for a failed fetch before the stream is cut short. 0 disables retry.
    pub fetch_retry_attempts: u32,
    pub fetch_retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    /// Serve files under `source.root`, one sub-directory per container.
    Directory,
    /// Empty in-process catalog; useful for smoke tests of the HTTP surface.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub backend: SourceBackend,
    pub root: PathBuf,
}

/// Share-link generation (`GET /links/...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Externally reachable base URL of this service. Empty disables share links.
    pub public_base_url: String,
    /// Web player page that accepts `?src=<stream url>&name=<file name>`.
    pub player_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

/// Largest accepted `streaming.fetch_retry_backoff_ms`.
pub const MAX_FETCH_RETRY_BACKOFF_MS: u64 = 60_000;

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml (built-in defaults when absent)
    /// 2. config/{env}.toml (based on SEEKBRIDGE_ENV)
    /// 3. Environment variables (SEEKBRIDGE_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        let env_name =
            std::env::var("SEEKBRIDGE_ENV").unwrap_or_else(|_| "development".to_string());
        let mut config = Self::load_from_dir(Path::new("config"), &env_name)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Layers 1 and 2 only, reading from `dir`.
    pub fn load_from_dir(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let default_path = dir.join("default.toml");
        let mut config = match std::fs::read_to_string(&default_path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read {}: {}",
                    default_path.display(),
                    e
                ))
            }
        };

        // Layer 2: environment-specific overrides
        let env_path = dir.join(format!("{}.toml", env_name));
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_config: AppConfig = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path.display(), e))?;
            config = env_config;
        }

        Ok(config)
    }

    /// Layer 3: apply `SEEKBRIDGE_*` overrides read through `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("SEEKBRIDGE_SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("SEEKBRIDGE_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Some(v) = var("SEEKBRIDGE_STREAMING_CHUNK_SIZE_BYTES") {
            if let Ok(size) = v.parse() {
                self.streaming.chunk_size_bytes = size;
            }
        }
        if let Some(v) = var("SEEKBRIDGE_STREAMING_FETCH_RETRY_ATTEMPTS") {
            if let Ok(attempts) = v.parse() {
                self.streaming.fetch_retry_attempts = attempts;
            }
        }
        if let Some(v) = var("SEEKBRIDGE_SOURCE_BACKEND") {
            match v.as_str() {
                "directory" => self.source.backend = SourceBackend::Directory,
                "memory" => self.source.backend = SourceBackend::Memory,
                _ => {}
            }
        }
        if let Some(v) = var("SEEKBRIDGE_SOURCE_ROOT") {
            self.source.root = PathBuf::from(v);
        }
        if let Some(v) = var("SEEKBRIDGE_LINKS_PUBLIC_BASE_URL") {
            self.links.public_base_url = v;
        }
        if let Some(v) = var("SEEKBRIDGE_LINKS_PLAYER_URL") {
            self.links.player_url = v;
        }
        if let Some(v) = var("SEEKBRIDGE_OBSERVABILITY_LOG_LEVEL") {
            self.observability.log_level = v;
        }
        if let Some(v) = var("SEEKBRIDGE_OBSERVABILITY_LOG_FORMAT") {
            self.observability.log_format = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.streaming.chunk_size_bytes == 0 {
            anyhow::bail!("streaming.chunk_size_bytes must be greater than zero");
        }
        if self.streaming.fetch_retry_backoff_ms > MAX_FETCH_RETRY_BACKOFF_MS {
            anyhow::bail!(
                "streaming.fetch_retry_backoff_ms must be at most {}",
                MAX_FETCH_RETRY_BACKOFF_MS
            );
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 1024 * 1024,
            fetch_retry_attempts: 0,
            fetch_retry_backoff_ms: 100,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: SourceBackend::Directory,
            root: PathBuf::from("media"),
        }
    }
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            public_base_url: String::new(),
            player_url: "https://tickwala.blogspot.com".to_string(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_dir(dir.path(), "development").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.streaming.chunk_size_bytes, 1_048_576);
        assert_eq!(config.source.backend, SourceBackend::Directory);
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[streaming]\nchunk_size_bytes = 524288\n\n[source]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from_dir(dir.path(), "development").unwrap();
        assert_eq!(config.streaming.chunk_size_bytes, 524_288);
        assert_eq!(config.streaming.fetch_retry_backoff_ms, 100);
        assert_eq!(config.source.backend, SourceBackend::Memory);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_env_file_replaces_default_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), "[server]\nport = 9000\n").unwrap();
        std::fs::write(dir.path().join("staging.toml"), "[server]\nport = 9100\n").unwrap();

        let config = AppConfig::load_from_dir(dir.path(), "staging").unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), "[server\nport = 1").unwrap();
        assert!(AppConfig::load_from_dir(dir.path(), "development").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SEEKBRIDGE_SERVER_PORT", "7070"),
            ("SEEKBRIDGE_STREAMING_CHUNK_SIZE_BYTES", "4096"),
            ("SEEKBRIDGE_SOURCE_BACKEND", "memory"),
            ("SEEKBRIDGE_LINKS_PUBLIC_BASE_URL", "https://bridge.example"),
            ("SEEKBRIDGE_SERVER_HOST", "127.0.0.1"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.streaming.chunk_size_bytes, 4096);
        assert_eq!(config.source.backend, SourceBackend::Memory);
        assert_eq!(config.links.public_base_url, "https://bridge.example");
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| {
            (key == "SEEKBRIDGE_SERVER_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = AppConfig::default();
        config.streaming.chunk_size_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_retry_backoff_rejected() {
        let mut config = AppConfig::default();
        config.streaming.fetch_retry_backoff_ms = u64::MAX;
        assert!(config.validate().is_err());

        config.streaming.fetch_retry_backoff_ms = MAX_FETCH_RETRY_BACKOFF_MS;
        assert!(config.validate().is_ok());
    }
}
