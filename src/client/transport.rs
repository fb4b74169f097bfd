use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::signup::{dto::SignupRequest, handlers::SIGNUP_PATH};

/// Loose view of any `/api/signup` response: `{ success?, error?, message?, subscriber_id? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignupResponseBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub subscriber_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: SignupResponseBody,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("signup endpoint unreachable: {0}")]
    Offline(String),
}

#[async_trait]
pub trait SignupTransport: Send + Sync {
    async fn post_signup(&self, req: &SignupRequest) -> Result<TransportResponse, TransportError>;
}

/// Posts to the signup endpoint of a running server.
#[derive(Clone)]
pub struct HttpSignupTransport {
    http: Client,
    endpoint: String,
}

impl HttpSignupTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .build()
            .context("build signup http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SIGNUP_PATH),
        })
    }
}

#[async_trait]
impl SignupTransport for HttpSignupTransport {
    async fn post_signup(&self, req: &SignupRequest) -> Result<TransportResponse, TransportError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::Offline(e.to_string()))?;

        let status = resp.status().as_u16();
        // gateways in front of the service may answer with non-JSON pages
        let body = resp.json::<SignupResponseBody>().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}
