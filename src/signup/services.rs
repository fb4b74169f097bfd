use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{
    dto::SignupRequest,
    error::SignupError,
    validation::{
        is_valid_email, normalize_email, redact_email, sanitize, scrub_emails, MAX_TEXT_LEN,
    },
};
use crate::{
    provider::{NewSubscriber, SubscriberId},
    state::{AppState, ProviderSlot},
};

/// Maps a body the JSON extractor refused onto the client-facing error.
pub fn body_rejection(rejection: JsonRejection) -> SignupError {
    match &rejection {
        JsonRejection::MissingJsonContentType(_) => {
            warn!("signup rejected: body is not JSON")
        }
        JsonRejection::JsonSyntaxError(_) | JsonRejection::JsonDataError(_) => {
            warn!(error = %rejection.body_text(), "signup rejected: unparseable JSON")
        }
        JsonRejection::BytesRejection(_) => {
            warn!(error = %rejection.body_text(), "signup rejected: body could not be read")
        }
        _ => warn!(error = %rejection.body_text(), "signup rejected: unreadable body"),
    }
    SignupError::InvalidContentType
}

/// Turns a parsed request into the provider payload, or the field error to report.
pub fn validate(req: SignupRequest) -> Result<NewSubscriber, SignupError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(SignupError::InvalidEmail);
    }

    let school = match req.school {
        Some(raw) if raw.chars().count() > MAX_TEXT_LEN => {
            return Err(SignupError::InvalidSchool);
        }
        Some(raw) => Some(sanitize(&raw)).filter(|s| !s.is_empty()),
        None => None,
    };

    Ok(NewSubscriber { email, school })
}

/// Everything after the rate-limit gate and JSON extraction: field checks,
/// config gate, provider call.
/// Logs exactly one line for whichever way the request ends.
pub async fn process_signup(state: &AppState, value: Value) -> Result<SubscriberId, SignupError> {
    let sub = SignupRequest::from_json(&value)
        .and_then(validate)
        .map_err(|e| {
            warn!(kind = %e.kind(), "signup rejected: validation failed");
            e
        })?;

    let provider = match &state.provider {
        ProviderSlot::Ready(p) => p.clone(),
        ProviderSlot::Unavailable(cfg_err) => {
            error!(
                error = %cfg_err,
                email = %redact_email(&sub.email),
                "signup failed: provider is not configured"
            );
            return Err(SignupError::MissingConfig);
        }
    };

    match provider.create_subscriber(&sub).await {
        Ok(id) => {
            info!(
                email = %redact_email(&sub.email),
                subscriber_id = %id.0,
                has_school = sub.school.is_some(),
                "subscriber created"
            );
            Ok(id)
        }
        Err(e) => {
            let detail = scrub_emails(&e.to_string());
            let mapped = SignupError::from(e);
            match &mapped {
                SignupError::DuplicateEmail | SignupError::RateLimited { .. } => warn!(
                    kind = %mapped.kind(),
                    email = %redact_email(&sub.email),
                    detail = %detail,
                    "signup refused by provider"
                ),
                _ => error!(
                    kind = %mapped.kind(),
                    email = %redact_email(&sub.email),
                    detail = %detail,
                    "signup failed at provider"
                ),
            }
            Err(mapped)
        }
    }
}
