use std::{fmt, net::SocketAddr, time::Duration};

use anyhow::Context;
use thiserror::Error;

pub const DEFAULT_PROVIDER_URL: &str = "https://connect.mailerlite.com/api";

const API_KEY_MIN_LEN: usize = 20;
const API_KEY_MAX_LEN: usize = 2048;

/// Why the provider credentials cannot be used.
///
/// Messages name the failing rule and the variable, never the value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("MAILERLITE_API_KEY is not set")]
    MissingApiKey,
    #[error("MAILERLITE_API_KEY still holds a placeholder value")]
    PlaceholderApiKey,
    #[error("MAILERLITE_API_KEY has length {len}, expected {min}..={max}")]
    ApiKeyLength { len: usize, min: usize, max: usize },
    #[error("MAILERLITE_GROUP_ID is not set")]
    MissingGroupId,
    #[error("MAILERLITE_GROUP_ID still holds a placeholder value")]
    PlaceholderGroupId,
    #[error("MAILERLITE_GROUP_ID must be numeric")]
    NonNumericGroupId,
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub group_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("group_id", &self.group_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Validates credentials up front so request handling only sees a usable config.
    pub fn new(
        api_key: &str,
        group_id: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        let group_id = group_id.trim();

        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if is_placeholder(api_key) {
            return Err(ConfigError::PlaceholderApiKey);
        }
        let len = api_key.chars().count();
        if !(API_KEY_MIN_LEN..=API_KEY_MAX_LEN).contains(&len) {
            return Err(ConfigError::ApiKeyLength {
                len,
                min: API_KEY_MIN_LEN,
                max: API_KEY_MAX_LEN,
            });
        }

        if group_id.is_empty() {
            return Err(ConfigError::MissingGroupId);
        }
        if is_placeholder(group_id) {
            return Err(ConfigError::PlaceholderGroupId);
        }
        if !group_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::NonNumericGroupId);
        }

        Ok(Self {
            api_key: api_key.to_string(),
            group_id: group_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("your")
        || lower.contains("placeholder")
        || lower.contains("changeme")
        || lower.contains("replace")
        || lower.contains("xxxx")
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    /// Period of the background sweep; `None` leaves eviction to denials only.
    pub sweep_interval: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 5,
            sweep_interval: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub allowed_origin: String,
    pub confirmation_path: String,
    pub rate_limit: RateLimitConfig,
    /// Kept as a result: a bad provider setup is reported per request, not at boot.
    pub provider: Result<ProviderConfig, ConfigError>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let addr: SocketAddr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        )
        .parse()
        .context("parse APP_HOST/APP_PORT")?;

        let timeout = Duration::from_secs(env_u64("PROVIDER_TIMEOUT_SECS", 10)?);
        let provider = ProviderConfig::new(
            &std::env::var("MAILERLITE_API_KEY").unwrap_or_default(),
            &std::env::var("MAILERLITE_GROUP_ID").unwrap_or_default(),
            &std::env::var("MAILERLITE_API_URL").unwrap_or_else(|_| DEFAULT_PROVIDER_URL.into()),
            timeout,
        );

        let sweep_secs = env_u64("RATE_LIMIT_SWEEP_SECS", 60)?;
        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(env_u64("RATE_LIMIT_WINDOW_SECS", 15 * 60)?),
            max_requests: env_u64("RATE_LIMIT_MAX_REQUESTS", 5)?
                .try_into()
                .context("RATE_LIMIT_MAX_REQUESTS out of range")?,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        };

        Ok(Self {
            addr,
            allowed_origin: std::env::var("ALLOWED_ORIGIN").unwrap_or_else(|_| "*".into()),
            confirmation_path: std::env::var("CONFIRMATION_PATH")
                .unwrap_or_else(|_| "/thank-you".into()),
            rate_limit,
            provider,
        })
    }
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}
