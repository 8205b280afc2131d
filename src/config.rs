//! Client settings read from `~/.config/feedsync/config.toml`.
//!
//! Every key is optional. A missing or blank file runs with the defaults,
//! and keys this version does not know about are reported at `warn` level.
use crate::model::FeedSort;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level client configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL. HTTPS required except for localhost.
    pub api_url: String,

    /// City filter for feed queries. Without it the feed is never fetched.
    pub city_id: Option<i64>,

    /// Initial feed ordering.
    pub feed_sort: FeedSort,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Prefix for persisted keys. The moderator record lives at `<namespace>:mod`.
    pub storage_namespace: String,

    /// Identifier sent as the report creator.
    pub device_id: String,

    /// Discard completions older than the newest request for the same resource.
    /// Disabling restores last-callback-wins ordering.
    pub fence_completions: bool,

    /// Revert the optimistic vote patch when the vote request fails.
    pub rollback_failed_votes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.example.com".to_string(),
            city_id: None,
            feed_sort: FeedSort::Hot,
            request_timeout_secs: 20,
            storage_namespace: "feedsync".to_string(),
            device_id: "feedsync-cli".to_string(),
            fence_completions: true,
            rollback_failed_votes: true,
        }
    }
}

/// Keys accepted in the config file.
const KNOWN_KEYS: &[&str] = &[
    "api_url",
    "city_id",
    "feed_sort",
    "request_timeout_secs",
    "storage_namespace",
    "device_id",
    "fence_completions",
    "rollback_failed_votes",
];

/// Largest config file accepted, in bytes.
const MAX_CONFIG_BYTES: u64 = 1_048_576;

/// Read the config file, treating a missing file as absent.
fn read_config_file(path: &Path) -> Result<Option<String>, ConfigError> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size > MAX_CONFIG_BYTES {
        return Err(ConfigError::TooLarge(format!(
            "{} is {} bytes, limit is {}",
            path.display(),
            size,
            MAX_CONFIG_BYTES
        )));
    }

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        // Removed between the size check and the read
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn warn_unknown_keys(content: &str) {
    let Ok(table) = content.parse::<toml::Table>() else {
        return;
    };
    for key in table.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        tracing::warn!(key = %key, "Ignoring unrecognized config key");
    }
}

impl Config {
    /// Load and validate the config at `path`.
    ///
    /// A missing or whitespace-only file yields the defaults. Malformed TOML,
    /// oversized files and invalid values are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match read_config_file(path)? {
            Some(content) if !content.trim().is_empty() => content,
            _ => {
                tracing::debug!(path = %path.display(), "No config values found, using defaults");
                return Ok(Self::default());
            }
        };

        warn_unknown_keys(&content);
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            api_url = %config.api_url,
            city_id = ?config.city_id,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("api_url '{}': {}", self.api_url, e)))?;
        let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
        if url.scheme() != "https" && !is_localhost {
            return Err(ConfigError::Invalid(format!(
                "api_url '{}' must use HTTPS",
                self.api_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage_namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Preference key holding the serialized moderator record.
    pub fn moderator_key(&self) -> String {
        format!("{}:mod", self.storage_namespace)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.city_id, None);
        assert_eq!(config.feed_sort, FeedSort::Hot);
        assert_eq!(config.request_timeout_secs, 20);
        assert!(config.fence_completions);
        assert!(config.rollback_failed_votes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedsync_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.storage_namespace, "feedsync");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("feedsync_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "https://api.example.com");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("feedsync_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "city_id = 2\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.city_id, Some(2));
        assert_eq!(config.feed_sort, FeedSort::Hot); // default
        assert!(config.fence_completions); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feedsync_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
api_url = "http://localhost:8080"
city_id = 7
feed_sort = "new"
request_timeout_secs = 5
storage_namespace = "wappu"
device_id = "device-123"
fence_completions = false
rollback_failed_votes = false
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.city_id, Some(7));
        assert_eq!(config.feed_sort, FeedSort::New);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.moderator_key(), "wappu:mod");
        assert_eq!(config.device_id, "device-123");
        assert!(!config.fence_completions);
        assert!(!config.rollback_failed_votes);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let dir = std::env::temp_dir().join("feedsync_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "city_id = [unclosed\n").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = std::env::temp_dir().join("feedsync_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "city_id = 3\nthem = \"typo\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.city_id, Some(3));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = std::env::temp_dir().join("feedsync_config_test_oversized");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, " ".repeat(MAX_CONFIG_BYTES as usize + 1)).unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::TooLarge(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_plain_http_remote_rejected() {
        let config = Config {
            api_url: "http://api.example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
