use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::color::StrategyKind;
use crate::errors::{AppError, AppResult};
use crate::pipeline::SubmitMode;
use defaults::*;

/// Environment prefix for overrides, e.g. `WIKICOLOR_PIPELINE__WORKERS=50`
pub const ENV_PREFIX: &str = "WIKICOLOR_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
}

/// Upstream media listing and image transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Largest page the listing API accepts per request
    #[serde(default = "default_page_limit_max")]
    pub page_limit_max: usize,
    /// Total timeout for one listing or image request
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde::duration")]
    pub connect_timeout: Duration,
    /// Listing responses larger than this are rejected mid-download
    #[serde(default = "default_max_listing_bytes")]
    pub max_listing_bytes: usize,
    /// Overrides the `wikicolor/<version>` user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Worker pool sizing and backpressure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the shared work queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Behaviour when the work queue is full
    #[serde(default)]
    pub submit_mode: SubmitMode,
    /// Image bodies larger than this are rejected mid-download
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Images resolved when a request does not ask for a count
    #[serde(default = "default_max_images")]
    pub default_max_images: usize,
    /// Upper bound on the images a single request may ask for
    #[serde(default = "default_max_images_cap")]
    pub max_images_cap: usize,
    /// Per-session deadline, measured from the first submission
    #[serde(default = "default_session_deadline", with = "duration_serde::duration")]
    pub deadline: Duration,
    /// Longest deadline a request may ask for
    #[serde(default = "default_session_max_deadline", with = "duration_serde::duration")]
    pub max_deadline: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Periodic background session that keeps the cache warm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    #[serde(default = "default_prefetch_enabled")]
    pub enabled: bool,
    #[serde(default = "default_prefetch_max_images")]
    pub max_images: usize,
    #[serde(default = "default_prefetch_interval", with = "duration_serde::duration")]
    pub interval: Duration,
    #[serde(default = "default_prefetch_deadline", with = "duration_serde::duration")]
    pub deadline: Duration,
}

// Upstream defaults
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_page_limit_max() -> usize {
    DEFAULT_PAGE_LIMIT_MAX
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_max_listing_bytes() -> usize {
    DEFAULT_MAX_LISTING_BYTES
}

// Pipeline defaults
fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

// Session defaults
fn default_max_images() -> usize {
    DEFAULT_MAX_IMAGES
}

fn default_max_images_cap() -> usize {
    DEFAULT_MAX_IMAGES_CAP
}

fn default_session_deadline() -> Duration {
    DEFAULT_SESSION_DEADLINE
}

fn default_session_max_deadline() -> Duration {
    DEFAULT_SESSION_MAX_DEADLINE
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// Prefetch defaults
fn default_prefetch_enabled() -> bool {
    DEFAULT_PREFETCH_ENABLED
}

fn default_prefetch_max_images() -> usize {
    DEFAULT_PREFETCH_MAX_IMAGES
}

fn default_prefetch_interval() -> Duration {
    DEFAULT_PREFETCH_INTERVAL
}

fn default_prefetch_deadline() -> Duration {
    DEFAULT_PREFETCH_DEADLINE
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            page_limit_max: default_page_limit_max(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            max_listing_bytes: default_max_listing_bytes(),
            user_agent: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            submit_mode: SubmitMode::default(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_images: default_max_images(),
            max_images_cap: default_max_images_cap(),
            deadline: default_session_deadline(),
            max_deadline: default_session_max_deadline(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: default_prefetch_enabled(),
            max_images: default_prefetch_max_images(),
            interval: default_prefetch_interval(),
            deadline: default_prefetch_deadline(),
        }
    }
}

impl SessionConfig {
    /// Clamp a requested image count into `1..=max_images_cap`
    pub fn clamp_max_images(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_max_images)
            .clamp(1, self.max_images_cap.max(1))
    }

    /// Requested deadline, or the default, capped at `max_deadline`.
    /// A zero deadline counts as unset.
    pub fn clamp_deadline(&self, requested: Option<Duration>) -> Duration {
        requested
            .filter(|d| !d.is_zero())
            .unwrap_or(self.deadline)
            .min(self.max_deadline)
    }
}

impl Config {
    /// Load configuration from built-in defaults, an optional TOML file and
    /// `WIKICOLOR_` environment variables, in increasing priority.
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
            } else {
                info!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML, used to bootstrap a config file
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::internal(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        url::Url::parse(&self.upstream.api_url).map_err(|e| {
            AppError::configuration(format!(
                "upstream.api_url '{}' is not a valid URL: {e}",
                self.upstream.api_url
            ))
        })?;

        let non_zero = [
            ("upstream.page_limit_max", self.upstream.page_limit_max),
            ("pipeline.workers", self.pipeline.workers),
            ("pipeline.queue_capacity", self.pipeline.queue_capacity),
            ("upstream.max_listing_bytes", self.upstream.max_listing_bytes),
            ("pipeline.max_image_bytes", self.pipeline.max_image_bytes),
            ("cache.capacity", self.cache.capacity),
            ("session.max_images_cap", self.session.max_images_cap),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(AppError::configuration(format!(
                    "{field} must be greater than zero"
                )));
            }
        }

        if self.session.deadline.is_zero() {
            return Err(AppError::configuration(
                "session.deadline must be greater than zero",
            ));
        }
        if self.session.max_deadline < self.session.deadline {
            return Err(AppError::configuration(format!(
                "session.max_deadline ({}) is shorter than session.deadline ({})",
                humantime::format_duration(self.session.max_deadline),
                humantime::format_duration(self.session.deadline)
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.upstream.page_limit_max, 500);
        assert_eq!(config.session.deadline, Duration::from_secs(20));
        assert_eq!(config.pipeline.submit_mode, SubmitMode::Block);
    }

    #[test]
    fn test_load_merges_toml_file_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[pipeline]
workers = 4
submit_mode = "reject"

[cache]
capacity = 16

[color]
strategy = "dominant"

[session]
deadline = "2m"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.submit_mode, SubmitMode::Reject);
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.cache.capacity, 16);
        assert_eq!(config.color.strategy, StrategyKind::Dominant);
        assert_eq!(config.session.deadline, Duration::from_secs(120));
    }

    #[test]
    fn test_load_rejects_zero_workers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nworkers = 0").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("pipeline.workers"));
    }

    #[test]
    fn test_toml_round_trip_keeps_durations_readable() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains(r#"deadline = "20s""#));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.prefetch.interval, DEFAULT_PREFETCH_INTERVAL);
    }

    #[test]
    fn test_clamp_max_images() {
        let session = SessionConfig::default();
        assert_eq!(session.clamp_max_images(None), DEFAULT_MAX_IMAGES);
        assert_eq!(session.clamp_max_images(Some(0)), 1);
        assert_eq!(session.clamp_max_images(Some(5000)), DEFAULT_MAX_IMAGES_CAP);
    }

    #[test]
    fn test_clamp_deadline() {
        let session = SessionConfig::default();
        assert_eq!(session.clamp_deadline(None), DEFAULT_SESSION_DEADLINE);
        assert_eq!(session.clamp_deadline(Some(Duration::ZERO)), DEFAULT_SESSION_DEADLINE);
        assert_eq!(
            session.clamp_deadline(Some(Duration::from_secs(45))),
            Duration::from_secs(45)
        );
        assert_eq!(
            session.clamp_deadline(Some(Duration::from_secs(10 * 3600))),
            DEFAULT_SESSION_MAX_DEADLINE
        );
    }

    #[test]
    fn test_load_rejects_max_deadline_below_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\ndeadline = \"2m\"\nmax_deadline = \"1m\"").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("session.max_deadline"));
    }
}
