//! Configuration types for scrape-engine

use crate::error::{Error, Result};
use crate::types::{CookieSet, HttpMethod};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

/// Engine-wide configuration
///
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of tasks in Running state at once (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Capacity of the event broadcast channel (default: 1000)
    ///
    /// A subscriber that falls further behind than this receives `Lagged`.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// User-Agent sent when a task does not set its own
    #[serde(default = "default_user_agent")]
    pub default_user_agent: String,

    /// Backoff settings shared by all tasks
    #[serde(default)]
    pub retry: RetryConfig,

    /// How often shutdown re-checks the active set while draining (default: 50ms)
    #[serde(default = "default_poll_interval", with = "duration_millis")]
    pub shutdown_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            event_buffer: default_event_buffer(),
            default_user_agent: default_user_agent(),
            retry: RetryConfig::default(),
            shutdown_poll_interval: default_poll_interval(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(Error::config(
                "max_concurrent_tasks",
                "at least one concurrent task is required",
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer",
                "event buffer capacity must be greater than zero",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!(
                    "backoff multiplier must be >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
            ));
        }
        Ok(())
    }
}

/// Retry backoff configuration
///
/// The number of retries is per task ([`TaskOptions::max_retries`]); this only
/// shapes the delay between attempts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry (default: 500ms)
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Per-task request options (everything except the URL)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// HTTP method (default: GET)
    #[serde(default)]
    pub method: HttpMethod,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// User-Agent override (falls back to [`EngineConfig::default_user_agent`])
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Proxy URI with an `http` or `https` scheme, e.g. `http://127.0.0.1:8080`
    #[serde(default)]
    pub proxy: Option<String>,

    /// Per-attempt timeout (default: 10 seconds)
    #[serde(default = "default_task_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// Retries after the first attempt (default: 0)
    #[serde(default)]
    pub max_retries: u32,

    /// Request body
    #[serde(default)]
    pub body: Option<String>,

    /// Cookies attached to the request
    #[serde(default)]
    pub cookies: Option<CookieSet>,

    /// Redirect hops followed before giving up (default: 10)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::default(),
            headers: BTreeMap::new(),
            user_agent: None,
            proxy: None,
            timeout: default_task_timeout(),
            max_retries: 0,
            body: None,
            cookies: None,
            max_redirects: default_max_redirects(),
        }
    }
}

/// Complete configuration of one task: its target URL plus request options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Target URL (absolute, http or https)
    pub url: String,

    /// Request options
    #[serde(flatten)]
    pub options: TaskOptions,
}

impl TaskConfig {
    /// Create a config for `url` with the given options
    pub fn new(url: impl Into<String>, options: TaskOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    /// Check that the task can be executed as configured
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(
                "url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        if let Some(proxy) = &self.options.proxy {
            let parsed = url::Url::parse(proxy)
                .map_err(|e| Error::config("proxy", format!("invalid proxy URI: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::config(
                    "proxy",
                    format!("unsupported proxy scheme '{}'", parsed.scheme()),
                ));
            }
        }
        if self.options.timeout.is_zero() {
            return Err(Error::config("timeout", "timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_event_buffer() -> usize {
    1000
}

fn default_user_agent() -> String {
    format!("scrape-engine/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_redirects() -> usize {
    10
}

// Duration serialization helper (integer milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
