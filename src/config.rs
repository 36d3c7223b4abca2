use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::Result;

fn serialize_millis<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// Engine configuration, usually read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Nested document endpoint (GET)
    pub snapshot_url: String,
    /// Upload endpoint (multipart POST)
    pub upload_url: String,
    /// Base of the delete endpoint, `DELETE {files_url}/{id}`
    pub files_url: String,
    /// Largest accepted file in bytes
    pub max_file_size: u64,
    /// Refetch requests closer together than this share one fetch
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub dedupe_interval: Duration,
    /// Size of the body chunks progress is counted on
    pub chunk_size: usize,
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_url: "http://localhost:3000/api/nested-data".to_string(),
            upload_url: "http://localhost:3000/api/nested-upload".to_string(),
            files_url: "http://localhost:3000/api/files".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            dedupe_interval: Duration::from_millis(1000),
            chunk_size: 64 * 1024,
            request_timeout: Duration::from_secs(300), // 5 分钟
        }
    }
}

impl SyncConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    /// Read `path` if given, otherwise fall back to the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = SyncConfig::from_toml(r#"
            snapshot_url = "https://files.example.com/api/nested-data"
            max_file_size = 10000000
            dedupe_interval = 250
        "#).unwrap();

        assert_eq!(config.snapshot_url, "https://files.example.com/api/nested-data");
        assert_eq!(config.max_file_size, 10_000_000);
        assert_eq!(config.dedupe_interval, Duration::from_millis(250));
        assert_eq!(config.upload_url, SyncConfig::default().upload_url);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_round_trip() {
        let config = SyncConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SyncConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SyncConfig::from_toml("max_file_size = \"big\"").is_err());
        assert!(SyncConfig::load_or_default(Some(Path::new("does-not-exist.toml"))).is_err());
    }
}
