//! Relay configuration.
//!
//! Values are resolved in layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. INI file (`~/.config/s3relay/config.ini` unless a path is given)
//! 3. Environment variables
//! 4. Explicit overrides (CLI flags), applied by the caller with the `with_*`
//!    setters
//!
//! A missing setting never fails; the default applies. Only malformed values
//! are errors.
//!
//! # INI layout
//!
//! ```ini
//! [source]
//! url = https://example.com/data.csv
//!
//! [destination]
//! bucket = my-bucket
//! file_name = data.csv
//! key = incoming/data.csv
//!
//! [transfer]
//! chunk_size = 1048576
//! part_size = 5242880
//! max_part_attempts = 3
//! timeout_secs = 300
//!
//! [s3]
//! region = eu-west-1
//! endpoint_url = http://localhost:9000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::relay::RelayRequest;
use crate::source::{DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_SECS};
use crate::storage::MIN_PART_SIZE;

/// Example source used when nothing is configured.
pub const DEFAULT_SOURCE_URL: &str =
    "https://data.wa.gov/api/views/f6w7-q2d2/rows.csv?accessType=DOWNLOAD";

/// Example bucket used when nothing is configured.
pub const DEFAULT_BUCKET: &str = "etl-s3-2";

/// Default file name the object key is derived from.
pub const DEFAULT_FILE_NAME: &str = "ev_dataset.csv";

/// Largest accepted `max_part_attempts`.
pub const MAX_PART_ATTEMPTS_LIMIT: u32 = 10;

/// Prefix of the derived object key.
pub const DEFAULT_KEY_PREFIX: &str = "source_folder";

pub const ENV_SOURCE_URL: &str = "FILE_URL";
pub const ENV_BUCKET: &str = "BUCKET_NAME";
pub const ENV_FILE_NAME: &str = "FILE_NAME";
pub const ENV_OBJECT_KEY: &str = "S3_PATH";
pub const ENV_CHUNK_SIZE: &str = "CHUNK_SIZE";
pub const ENV_PART_SIZE: &str = "PART_SIZE";
pub const ENV_MAX_PART_ATTEMPTS: &str = "MAX_PART_ATTEMPTS";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
pub const ENV_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";

/// Errors resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Part size below what the backend accepts for non-final parts.
    #[error("part size {size} is below the minimum of {min} bytes")]
    PartSizeTooSmall { size: usize, min: usize },

    /// The INI file exists but could not be read.
    #[error("failed to read config file {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },
}

/// Fully resolved relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// URL to download.
    pub source_url: String,
    /// Destination bucket.
    pub bucket: String,
    /// File name used to derive the object key.
    pub file_name: String,
    /// Explicit object key; derived from `file_name` when unset.
    pub object_key: Option<String>,
    /// Network read size in bytes.
    pub chunk_size: usize,
    /// Part size in bytes.
    pub part_size: usize,
    /// Tries per part.
    pub max_part_attempts: u32,
    /// AWS region override.
    pub region: Option<String>,
    /// Custom S3 endpoint.
    pub endpoint_url: Option<String>,
    /// Source timeout for connecting and for each body read.
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            object_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            part_size: MIN_PART_SIZE,
            max_part_attempts: 1,
            region: None,
            endpoint_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Default INI path: `<config dir>/s3relay/config.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("s3relay").join("config.ini"))
}

impl RelayConfig {
    /// Resolve defaults, the INI file, then the process environment.
    ///
    /// With `path = None` the default INI path is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`RelayConfig::load`] with an injectable environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(path) = path.filter(|p| p.exists()) {
            let ini = Ini::load_from_file(&path).map_err(|e| ConfigError::FileRead {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            config.apply_ini(&ini)?;
        }

        config.apply_lookup(lookup)?;
        Ok(config)
    }

    /// Resolve defaults and the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve defaults and an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        Ok(config)
    }

    /// Apply environment-style variables over the current values.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_SOURCE_URL) {
            self.source_url = url;
        }
        if let Some(bucket) = get(ENV_BUCKET) {
            self.bucket = bucket;
        }
        if let Some(file_name) = get(ENV_FILE_NAME) {
            self.file_name = file_name;
        }
        if let Some(key) = get(ENV_OBJECT_KEY) {
            self.object_key = Some(key);
        }
        if let Some(value) = get(ENV_CHUNK_SIZE) {
            self.chunk_size = parse_value(ENV_CHUNK_SIZE, &value)?;
        }
        if let Some(value) = get(ENV_PART_SIZE) {
            self.part_size = parse_value(ENV_PART_SIZE, &value)?;
        }
        if let Some(value) = get(ENV_MAX_PART_ATTEMPTS) {
            self.max_part_attempts = parse_value(ENV_MAX_PART_ATTEMPTS, &value)?;
        }
        if let Some(region) = get(ENV_REGION) {
            self.region = Some(region);
        }
        if let Some(endpoint) = get(ENV_ENDPOINT_URL) {
            self.endpoint_url = Some(endpoint);
        }
        if let Some(value) = get(ENV_TIMEOUT_SECS) {
            self.timeout = Duration::from_secs(parse_value(ENV_TIMEOUT_SECS, &value)?);
        }
        Ok(())
    }

    /// Apply values from a parsed INI document.
    pub fn apply_ini(&mut self, ini: &Ini) -> Result<(), ConfigError> {
        let get = |section: &str, key: &str| {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(url) = get("source", "url") {
            self.source_url = url;
        }
        if let Some(bucket) = get("destination", "bucket") {
            self.bucket = bucket;
        }
        if let Some(file_name) = get("destination", "file_name") {
            self.file_name = file_name;
        }
        if let Some(key) = get("destination", "key") {
            self.object_key = Some(key);
        }
        if let Some(value) = get("transfer", "chunk_size") {
            self.chunk_size = parse_value("transfer.chunk_size", &value)?;
        }
        if let Some(value) = get("transfer", "part_size") {
            self.part_size = parse_value("transfer.part_size", &value)?;
        }
        if let Some(value) = get("transfer", "max_part_attempts") {
            self.max_part_attempts = parse_value("transfer.max_part_attempts", &value)?;
        }
        if let Some(value) = get("transfer", "timeout_secs") {
            self.timeout = Duration::from_secs(parse_value("transfer.timeout_secs", &value)?);
        }
        if let Some(region) = get("s3", "region") {
            self.region = Some(region);
        }
        if let Some(endpoint) = get("s3", "endpoint_url") {
            self.endpoint_url = Some(endpoint);
        }
        Ok(())
    }

    /// The storage path: the explicit key, or `source_folder/<file_name>`.
    pub fn resolved_key(&self) -> String {
        self.object_key
            .clone()
            .unwrap_or_else(|| format!("{}/{}", DEFAULT_KEY_PREFIX, self.file_name))
    }

    /// Check values the backend would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size < MIN_PART_SIZE {
            return Err(ConfigError::PartSizeTooSmall {
                size: self.part_size,
                min: MIN_PART_SIZE,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(1..=MAX_PART_ATTEMPTS_LIMIT).contains(&self.max_part_attempts) {
            return Err(ConfigError::InvalidValue {
                key: "max_part_attempts".to_string(),
                value: self.max_part_attempts.to_string(),
                reason: format!("must be between 1 and {}", MAX_PART_ATTEMPTS_LIMIT),
            });
        }
        Ok(())
    }

    /// Build the relay request described by this configuration.
    pub fn to_request(&self) -> RelayRequest {
        RelayRequest {
            url: self.source_url.clone(),
            bucket: self.bucket.clone(),
            key: self.resolved_key(),
            part_size: self.part_size,
            max_part_attempts: self.max_part_attempts,
        }
    }

    /// Set the source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Set the destination bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the file name the key is derived from.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Set an explicit object key.
    pub fn with_object_key(mut self, key: impl Into<String>) -> Self {
        self.object_key = Some(key.into());
        self
    }

    /// Set the network read size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the part size.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the number of tries per part.
    pub fn with_max_part_attempts(mut self, attempts: u32) -> Self {
        self.max_part_attempts = attempts;
        self
    }

    /// Set the AWS region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set a custom S3 endpoint.
    pub fn with_endpoint_url(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self
    }

    /// Set the source timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[source]")?;
        writeln!(f, "  url = {}", self.source_url)?;
        writeln!(f, "[destination]")?;
        writeln!(f, "  bucket = {}", self.bucket)?;
        writeln!(f, "  file_name = {}", self.file_name)?;
        writeln!(f, "  key = {}", self.resolved_key())?;
        writeln!(f, "[transfer]")?;
        writeln!(f, "  chunk_size = {}", self.chunk_size)?;
        writeln!(f, "  part_size = {}", self.part_size)?;
        writeln!(f, "  max_part_attempts = {}", self.max_part_attempts)?;
        writeln!(f, "  timeout_secs = {}", self.timeout.as_secs())?;
        writeln!(f, "[s3]")?;
        writeln!(
            f,
            "  region = {}",
            self.region.as_deref().unwrap_or("(default chain)")
        )?;
        write!(
            f,
            "  endpoint_url = {}",
            self.endpoint_url.as_deref().unwrap_or("(not set)")
        )
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply_when_nothing_set() {
        let config = RelayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.resolved_key(), "source_folder/ev_dataset.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_derived_from_file_name() {
        let config = RelayConfig::from_lookup(lookup(&[(ENV_FILE_NAME, "cars.csv")])).unwrap();
        assert_eq!(config.resolved_key(), "source_folder/cars.csv");
    }

    #[test]
    fn test_explicit_key_wins_over_file_name() {
        let config = RelayConfig::from_lookup(lookup(&[
            (ENV_FILE_NAME, "cars.csv"),
            (ENV_OBJECT_KEY, "raw/2024/cars.csv"),
        ]))
        .unwrap();
        assert_eq!(config.resolved_key(), "raw/2024/cars.csv");
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = RelayConfig::from_lookup(lookup(&[(ENV_BUCKET, "  ")])).unwrap();
        assert_eq!(config.bucket, DEFAULT_BUCKET);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = RelayConfig::from_lookup(lookup(&[(ENV_PART_SIZE, "five")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_PART_SIZE));
    }

    #[test]
    fn test_part_size_below_minimum_fails_validation() {
        let config = RelayConfig::default().with_part_size(1024);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PartSizeTooSmall {
                size: 1024,
                min: MIN_PART_SIZE
            })
        );
    }

    #[test]
    fn test_part_attempts_are_bounded() {
        assert!(RelayConfig::default().with_max_part_attempts(0).validate().is_err());
        assert!(RelayConfig::default()
            .with_max_part_attempts(MAX_PART_ATTEMPTS_LIMIT)
            .validate()
            .is_ok());

        let config = RelayConfig::from_lookup(lookup(&[(ENV_MAX_PART_ATTEMPTS, "40")])).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "max_part_attempts"
        ));
    }

    #[test]
    fn test_ini_then_env_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[source]\nurl = https://ini.example.com/a.csv\n\n[destination]\nbucket = ini-bucket\n\n[transfer]\npart_size = 8388608"
        )
        .unwrap();

        let config = RelayConfig::load_with(
            Some(file.path()),
            lookup(&[(ENV_BUCKET, "env-bucket")]),
        )
        .unwrap();

        assert_eq!(config.source_url, "https://ini.example.com/a.csv");
        assert_eq!(config.bucket, "env-bucket");
        assert_eq!(config.part_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_missing_ini_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        let config = RelayConfig::load_with(Some(&path), |_| None).unwrap();
        assert_eq!(config.bucket, DEFAULT_BUCKET);
    }

    #[test]
    fn test_to_request() {
        let request = RelayConfig::default()
            .with_source_url("https://example.com/x.bin")
            .with_bucket("b")
            .with_object_key("k/x.bin")
            .with_max_part_attempts(3)
            .to_request();

        assert_eq!(request.url, "https://example.com/x.bin");
        assert_eq!(request.bucket, "b");
        assert_eq!(request.key, "k/x.bin");
        assert_eq!(request.part_size, MIN_PART_SIZE);
        assert_eq!(request.max_part_attempts, 3);
    }

    #[test]
    fn test_display_lists_resolved_key() {
        let display = RelayConfig::default().to_string();
        assert!(display.contains("key = source_folder/ev_dataset.csv"));
        assert!(display.contains("(default chain)"));
    }
}
