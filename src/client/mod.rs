//! Form-side half of the signup flow.
//!
//! [`SubmissionController`] mirrors what the landing page form does: validate
//! locally, send one request at a time, turn the response into a message the
//! visitor can act on, report the outcome to analytics and move on to the
//! confirmation page after a successful signup.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::signup::{
    dto::SignupRequest,
    validation::{email_domain, is_valid_email, normalize_email, MAX_TEXT_LEN},
    ErrorKind,
};

pub mod analytics;
pub mod transport;

pub use analytics::{Analytics, TracingAnalytics};
pub use transport::{HttpSignupTransport, SignupTransport, TransportError, TransportResponse};

pub const OFFLINE_MESSAGE: &str = "You appear to be offline. Check your connection and try again.";
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

/// Where a visitor is sent after signing up.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Submitting,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Email(&'static str),
    School(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionState {
    pub email: String,
    pub school: String,
    pub phase: Phase,
    pub error: Option<String>,
    pub field_error: Option<FieldError>,
}

impl SubmissionState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Submitting
    }

    pub fn is_submitted(&self) -> bool {
        self.phase == Phase::Success
    }
}

impl Default for SubmissionState {
    fn default() -> Self {
        Self {
            email: String::new(),
            school: String::new(),
            phase: Phase::Idle,
            error: None,
            field_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A request from this form is still in flight; nothing was sent.
    AlreadySubmitting,
    AlreadySubmitted,
    Invalid(FieldError),
    Succeeded { subscriber_id: String },
    Failed { kind: Option<ErrorKind>, message: String },
}

/// Visitor-facing text for a failed response.
pub fn user_message(status: u16, kind: Option<ErrorKind>) -> &'static str {
    match kind {
        Some(ErrorKind::DuplicateEmail) => "This email is already on the waitlist.",
        Some(ErrorKind::RateLimited) => "Too many attempts. Please wait a few minutes and try again.",
        Some(ErrorKind::InvalidEmail) => "Please enter a valid email address.",
        Some(ErrorKind::InvalidSchool) => "School name must be 100 characters or fewer.",
        Some(ErrorKind::MissingConfig | ErrorKind::NetworkError | ErrorKind::ApiError) => {
            "Signup is temporarily unavailable. Please try again shortly."
        }
        _ if status == 429 => "Too many attempts. Please wait a few minutes and try again.",
        _ if status >= 500 => "Signup is temporarily unavailable. Please try again shortly.",
        _ => GENERIC_MESSAGE,
    }
}

fn parse_kind(code: Option<&str>) -> Option<ErrorKind> {
    code.and_then(|c| serde_json::from_value(serde_json::Value::String(c.to_string())).ok())
}

fn check_fields(email: &str, school: &str) -> Result<(), FieldError> {
    if email.is_empty() {
        return Err(FieldError::Email("Email is required."));
    }
    if !is_valid_email(email) {
        return Err(FieldError::Email("Please enter a valid email address."));
    }
    if school.chars().count() > MAX_TEXT_LEN {
        return Err(FieldError::School("School name must be 100 characters or fewer."));
    }
    Ok(())
}

pub struct SubmissionController {
    transport: Arc<dyn SignupTransport>,
    analytics: Arc<dyn Analytics>,
    navigator: Arc<dyn Navigator>,
    confirmation_path: String,
    state: Mutex<SubmissionState>,
}

impl SubmissionController {
    pub fn new(
        transport: Arc<dyn SignupTransport>,
        analytics: Arc<dyn Analytics>,
        navigator: Arc<dyn Navigator>,
        confirmation_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            analytics,
            navigator,
            confirmation_path: confirmation_path.into(),
            state: Mutex::new(SubmissionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SubmissionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().clone()
    }

    pub fn set_email(&self, email: impl Into<String>) {
        self.lock().email = email.into();
    }

    pub fn set_school(&self, school: impl Into<String>) {
        self.lock().school = school.into();
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let request = {
            let mut st = self.lock();
            match st.phase {
                Phase::Submitting => return SubmitOutcome::AlreadySubmitting,
                Phase::Success => return SubmitOutcome::AlreadySubmitted,
                _ => {}
            }

            st.phase = Phase::Validating;
            st.error = None;
            st.field_error = None;

            let email = normalize_email(&st.email);
            if let Err(field) = check_fields(&email, &st.school) {
                st.field_error = Some(field.clone());
                st.phase = Phase::Idle;
                return SubmitOutcome::Invalid(field);
            }

            st.phase = Phase::Submitting;
            let school = Some(st.school.trim().to_string()).filter(|s| !s.is_empty());
            SignupRequest { email, school }
        };

        let domain = email_domain(&request.email).to_string();
        let result = self.transport.post_signup(&request).await;

        let outcome = match result {
            Ok(TransportResponse { status, body }) if (200..300).contains(&status) && body.success => {
                let subscriber_id = body.subscriber_id.unwrap_or_default();
                self.analytics.track(
                    analytics::SIGNUP_COMPLETED,
                    analytics::completed_properties(&domain, request.school.is_some(), &subscriber_id),
                );
                SubmitOutcome::Succeeded { subscriber_id }
            }
            Ok(TransportResponse { status, body }) => {
                let kind = parse_kind(body.error.as_deref());
                let error_type = kind
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_else(|| format!("HTTP_{status}"));
                self.analytics.track(
                    analytics::SIGNUP_FAILED,
                    analytics::failed_properties(&error_type, &domain),
                );
                SubmitOutcome::Failed {
                    kind,
                    message: user_message(status, kind).to_string(),
                }
            }
            Err(e) => {
                debug!(error = %e, "signup request did not reach the server");
                self.analytics.track(
                    analytics::SIGNUP_FAILED,
                    analytics::failed_properties("OFFLINE", &domain),
                );
                SubmitOutcome::Failed {
                    kind: None,
                    message: OFFLINE_MESSAGE.to_string(),
                }
            }
        };

        {
            let mut st = self.lock();
            match &outcome {
                SubmitOutcome::Succeeded { .. } => st.phase = Phase::Success,
                SubmitOutcome::Failed { message, .. } => {
                    st.phase = Phase::Error;
                    st.error = Some(message.clone());
                }
                _ => {}
            }
        }

        if matches!(outcome, SubmitOutcome::Succeeded { .. }) {
            self.navigator.navigate(&self.confirmation_path);
        }
        outcome
    }
}
