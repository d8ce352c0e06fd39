//! Configuration types for tms-provision
//!
//! All configuration is passed explicitly into the components that need it; nothing
//! here reads the environment or touches global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long and how often to poll a background job
///
/// Polling stops at whichever comes first: `max_attempts` status queries, or
/// `overall_timeout` of wall-clock time. With the defaults the delay between
/// attempts is a fixed `interval`; `backoff_multiplier > 1.0` grows it up to
/// `max_interval`, and `jitter` randomizes each delay between 1x and 2x.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollingPolicy {
    /// Maximum number of status queries (default: 5, must be >= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (default: 1 second, must be > 0)
    #[serde(default = "default_interval", with = "duration_ms_serde")]
    pub interval: Duration,

    /// Upper bound on total polling time (None = bounded by attempts only)
    #[serde(default, with = "optional_duration_ms_serde")]
    pub overall_timeout: Option<Duration>,

    /// Multiplier applied to the delay after each attempt (default: 1.0 = fixed interval)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap on the grown delay (default: 60 seconds)
    #[serde(default = "default_max_interval", with = "duration_ms_serde")]
    pub max_interval: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_interval(),
            overall_timeout: None,
            backoff_multiplier: default_backoff_multiplier(),
            max_interval: default_max_interval(),
            jitter: false,
        }
    }
}

impl PollingPolicy {
    /// Fixed-interval policy with the given attempt budget
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Self::default()
        }
    }

    /// Bound total polling time
    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("polling.max_attempts".to_string()),
            });
        }
        if self.interval.is_zero() {
            return Err(Error::Config {
                message: "interval must be greater than zero".to_string(),
                key: Some("polling.interval".to_string()),
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be a finite number >= 1.0, got {}",
                    self.backoff_multiplier
                ),
                key: Some("polling.backoff_multiplier".to_string()),
            });
        }
        if self.max_interval < self.interval {
            return Err(Error::Config {
                message: "max_interval must not be shorter than interval".to_string(),
                key: Some("polling.max_interval".to_string()),
            });
        }
        Ok(())
    }

    /// Delay to use after `delay`, applying backoff and the cap
    pub(crate) fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_interval, |grown| grown.min(self.max_interval))
    }
}

/// Connection settings for the translation service API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API base URL (default: "https://api.lokalise.com/api2")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token sent as `X-Api-Token`
    pub api_token: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Page size used when listing keys (default: 500)
    #[serde(default = "default_keys_page_limit")]
    pub keys_page_limit: u32,
}

impl ServiceConfig {
    /// Config for the default endpoint with the given token
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_token: api_token.into(),
            request_timeout: default_request_timeout(),
            keys_page_limit: default_keys_page_limit(),
        }
    }

    /// Point the client at another endpoint (mock servers, self-hosted gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url '{}': {}", self.base_url, e),
            key: Some("service.base_url".to_string()),
        })?;
        if self.api_token.trim().is_empty() {
            return Err(Error::Config {
                message: "api_token must not be empty".to_string(),
                key: Some("service.api_token".to_string()),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request_timeout must be greater than zero".to_string(),
                key: Some("service.request_timeout".to_string()),
            });
        }
        if self.keys_page_limit == 0 {
            return Err(Error::Config {
                message: "keys_page_limit must be at least 1".to_string(),
                key: Some("service.keys_page_limit".to_string()),
            });
        }
        Ok(())
    }
}

/// Bundle download settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single bundle download (default: 120 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Service API connection
    pub service: ServiceConfig,

    /// Background job polling
    #[serde(default)]
    pub polling: PollingPolicy,

    /// Bundle download
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Config with default polling and fetch settings
    pub fn new(service: ServiceConfig) -> Self {
        Self {
            service,
            polling: PollingPolicy::default(),
            fetch: FetchConfig::default(),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.service.validate()?;
        self.polling.validate()?;
        if self.fetch.timeout.is_zero() {
            return Err(Error::Config {
                message: "fetch timeout must be greater than zero".to_string(),
                key: Some("fetch.timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_base_url() -> String {
    "https://api.lokalise.com/api2".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_keys_page_limit() -> u32 {
    500
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(120)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
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

// Optional Duration serialization helper (milliseconds)
mod optional_duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
