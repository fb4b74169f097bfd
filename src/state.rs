use std::sync::Arc;

use tracing::error;

use crate::config::{AppConfig, ConfigError, ProviderConfig};
use crate::provider::{MailerLiteClient, SubscriberProvider};
use crate::rate_limit::RateLimiter;

/// Provider handle, or the reason one could not be built.
#[derive(Clone)]
pub enum ProviderSlot {
    Ready(Arc<dyn SubscriberProvider>),
    Unavailable(ConfigError),
}

impl ProviderSlot {
    pub fn from_config(cfg: &Result<ProviderConfig, ConfigError>) -> anyhow::Result<Self> {
        match cfg {
            Ok(cfg) => Ok(Self::Ready(Arc::new(MailerLiteClient::new(cfg)?))),
            Err(e) => {
                error!(
                    error = %e,
                    "provider credentials invalid; signups will fail until MAILERLITE_API_KEY and MAILERLITE_GROUP_ID are fixed"
                );
                Ok(Self::Unavailable(e.clone()))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
    pub provider: ProviderSlot,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let limiter = Arc::new(RateLimiter::in_memory(&config.rate_limit));
        let provider = ProviderSlot::from_config(&config.provider)?;

        Ok(Self {
            config: Arc::new(config),
            limiter,
            provider,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        limiter: Arc<RateLimiter>,
        provider: ProviderSlot,
    ) -> Self {
        Self {
            config,
            limiter,
            provider,
        }
    }
}
