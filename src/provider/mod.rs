use async_trait::async_trait;
use thiserror::Error;

pub mod mailerlite;

pub use mailerlite::MailerLiteClient;

/// Payload handed to the provider after validation and sanitisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscriber {
    pub email: String,
    pub school: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberId(pub String);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider unreachable: {0}")]
    Connect(String),
    #[error("provider rate limited the request")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("subscriber already exists")]
    Duplicate,
    #[error("provider rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected provider response body: {0}")]
    UnexpectedBody(String),
    #[error("provider request failed: {0}")]
    Transport(String),
}

/// The email-marketing service that stores waitlist subscribers.
#[async_trait]
pub trait SubscriberProvider: Send + Sync {
    async fn create_subscriber(&self, sub: &NewSubscriber) -> Result<SubscriberId, ProviderError>;
}
