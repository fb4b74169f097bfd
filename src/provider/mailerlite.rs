use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NewSubscriber, ProviderError, SubscriberId, SubscriberProvider};
use crate::config::ProviderConfig;

const BODY_PREVIEW_LEN: usize = 200;

#[derive(Serialize)]
struct CreateSubscriberBody<'a> {
    email: &'a str,
    fields: SubscriberFields<'a>,
    groups: [&'a str; 1],
}

#[derive(Serialize)]
struct SubscriberFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    school: Option<&'a str>,
}

/// Current API wraps the record in `data`; the classic API returned it flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubscriberEnvelope {
    Nested { data: SubscriberRecord },
    Flat(SubscriberRecord),
}

#[derive(Debug, Deserialize)]
struct SubscriberRecord {
    id: IdValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Nested { error: ErrorDetail },
    Message { message: String },
    Plain { error: String },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl SubscriberEnvelope {
    fn into_id(self) -> SubscriberId {
        let record = match self {
            SubscriberEnvelope::Nested { data } => data,
            SubscriberEnvelope::Flat(record) => record,
        };
        match record.id {
            IdValue::Text(s) => SubscriberId(s),
            IdValue::Number(n) => SubscriberId(n.to_string()),
        }
    }
}

fn parse_subscriber(body: &str) -> Result<SubscriberId, ProviderError> {
    serde_json::from_str::<SubscriberEnvelope>(body)
        .map(SubscriberEnvelope::into_id)
        .map_err(|_| ProviderError::UnexpectedBody(preview(body)))
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope::Nested { error }) => error.message,
        Ok(ErrorEnvelope::Message { message }) => message,
        Ok(ErrorEnvelope::Plain { error }) => error,
        Err(_) => preview(body),
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_LEN).collect()
}

/// Maps a non-success provider response onto [`ProviderError`].
fn classify_failure(status: StatusCode, retry_after: Option<u64>, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited {
            retry_after_secs: retry_after,
        };
    }
    let duplicate_status = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    );
    if duplicate_status && body.to_lowercase().contains("already exists") {
        return ProviderError::Duplicate;
    }
    ProviderError::Rejected {
        status: status.as_u16(),
        message: error_message(body),
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Connect(e.to_string())
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[derive(Clone)]
pub struct MailerLiteClient {
    http: Client,
    endpoint: String,
    api_key: String,
    group_id: String,
}

impl MailerLiteClient {
    pub fn new(cfg: &ProviderConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("build provider http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/subscribers", cfg.base_url),
            api_key: cfg.api_key.clone(),
            group_id: cfg.group_id.clone(),
        })
    }
}

#[async_trait]
impl SubscriberProvider for MailerLiteClient {
    async fn create_subscriber(&self, sub: &NewSubscriber) -> Result<SubscriberId, ProviderError> {
        let body = CreateSubscriberBody {
            email: &sub.email,
            fields: SubscriberFields {
                school: sub.school.as_deref(),
            },
            groups: [self.group_id.as_str()],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await.map_err(transport_error)?;
        debug!(%status, "provider responded");

        if status.is_success() {
            parse_subscriber(&text)
        } else {
            Err(classify_failure(status, retry_after, &text))
        }
    }
}
