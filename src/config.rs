//! Configuration file parser for the feed service.
//!
//! Every feed's upstream location is required; timing knobs have defaults.
//! The whole file is validated once at startup so a missing key stops the
//! process before any feed is constructed. Unknown keys are accepted but
//! logged as warnings, since they are usually typos.
use crate::feed::{FetchPolicy, MAX_RETRIES};
use crate::util::join_path;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

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

    #[error("Missing required setting: {0}")]
    MissingKey(&'static str),

    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// Where one feed is fetched from. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub base_url: Url,
    pub path: String,
    /// `base_url` joined with `path`.
    pub url: Url,
}

/// The instant-launch feed also needs the prefix its item links point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantLaunchSource {
    pub source: FeedSource,
    pub launch_url_base: Url,
}

/// Fully validated service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub refresh_interval: Duration,
    pub fetch_policy: FetchPolicy,
    /// Items per feed when a request does not say otherwise.
    pub default_limit: usize,
    pub news: FeedSource,
    pub events: FeedSource,
    pub videos: FeedSource,
    pub instant_launches: InstantLaunchSource,
}

// ============================================================================
// Raw (file) Representation
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    refresh_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    fetch_retries: Option<u32>,
    default_limit: Option<usize>,
    news: Option<RawSource>,
    events: Option<RawSource>,
    videos: Option<RawSource>,
    instant_launches: Option<RawInstantLaunches>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSource {
    base_url: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInstantLaunches {
    base_url: Option<String>,
    path: Option<String>,
    launch_url_base: Option<String>,
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;
    pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
    pub const DEFAULT_FETCH_RETRIES: u32 = 2;
    pub const DEFAULT_LIMIT: usize = 10;
    pub const DEFAULT_INSTANT_LAUNCH_PATH: &'static str = "/instantlaunches/full";

    /// Load and validate configuration from a TOML file.
    ///
    /// Unlike optional settings files, this one must exist: the feed
    /// locations have no sensible defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_secs = config.refresh_interval.as_secs(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let raw: RawConfig = toml::from_str(content)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let refresh_secs = positive(
            "refresh_interval_secs",
            raw.refresh_interval_secs
                .unwrap_or(Self::DEFAULT_REFRESH_INTERVAL_SECS),
        )?;
        let timeout_secs = positive(
            "fetch_timeout_secs",
            raw.fetch_timeout_secs
                .unwrap_or(Self::DEFAULT_FETCH_TIMEOUT_SECS),
        )?;
        let fetch_retries = raw.fetch_retries.unwrap_or(Self::DEFAULT_FETCH_RETRIES);
        if fetch_retries > MAX_RETRIES {
            return Err(ConfigError::InvalidValue {
                key: "fetch_retries",
                reason: format!("must be at most {MAX_RETRIES}"),
            });
        }
        let default_limit = raw.default_limit.unwrap_or(Self::DEFAULT_LIMIT);
        if default_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "default_limit",
                reason: "must be greater than zero".to_string(),
            });
        }

        let news = source(
            raw.news.unwrap_or_default(),
            ("news.base_url", "news.path"),
        )?;
        let events = source(
            raw.events.unwrap_or_default(),
            ("events.base_url", "events.path"),
        )?;
        let videos = source(
            raw.videos.unwrap_or_default(),
            ("videos.base_url", "videos.path"),
        )?;

        let il = raw.instant_launches.unwrap_or_default();
        let il_source = source(
            RawSource {
                base_url: il.base_url,
                path: Some(
                    il.path
                        .unwrap_or_else(|| Self::DEFAULT_INSTANT_LAUNCH_PATH.to_string()),
                ),
            },
            ("instant_launches.base_url", "instant_launches.path"),
        )?;
        let launch_url_base = required_url(
            "instant_launches.launch_url_base",
            il.launch_url_base,
        )?;

        Ok(Self {
            refresh_interval: Duration::from_secs(refresh_secs),
            fetch_policy: FetchPolicy {
                timeout: Duration::from_secs(timeout_secs),
                max_retries: fetch_retries,
                ..FetchPolicy::default()
            },
            default_limit,
            news,
            events,
            videos,
            instant_launches: InstantLaunchSource {
                source: il_source,
                launch_url_base,
            },
        })
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    const TOP: [&str; 8] = [
        "refresh_interval_secs",
        "fetch_timeout_secs",
        "fetch_retries",
        "default_limit",
        "news",
        "events",
        "videos",
        "instant_launches",
    ];
    for (key, value) in raw {
        if !TOP.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        }
        if let toml::Value::Table(section) = value {
            let known: &[&str] = if key == "instant_launches" {
                &["base_url", "path", "launch_url_base"]
            } else {
                &["base_url", "path"]
            };
            for sub in section.keys() {
                if !known.contains(&sub.as_str()) {
                    tracing::warn!(key = %format!("{key}.{sub}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn required_url(key: &'static str, value: Option<String>) -> Result<Url, ConfigError> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingKey(key))?;
    let url = Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidValue {
            key,
            reason: format!("unsupported scheme {scheme} (only http/https allowed)"),
        }),
    }
}

fn source(
    raw: RawSource,
    (base_key, path_key): (&'static str, &'static str),
) -> Result<FeedSource, ConfigError> {
    let base_url = required_url(base_key, raw.base_url)?;
    let path = raw
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or(ConfigError::MissingKey(path_key))?;
    let url = join_path(&base_url, path.trim())
        .map_err(|source| ConfigError::InvalidUrl { key: path_key, source })?;

    Ok(FeedSource {
        base_url,
        path,
        url,
    })
}

// ============================================================================
// Tests
// ============================================================================
