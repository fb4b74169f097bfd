use serde_json::{json, Value};
use tracing::info;

pub const SIGNUP_COMPLETED: &str = "signup_completed";
pub const SIGNUP_FAILED: &str = "signup_failed";

/// Fire-and-forget event sink. Implementations must not block or fail the caller.
pub trait Analytics: Send + Sync {
    fn track(&self, event: &str, properties: Value);
}

/// Emits events as structured log lines under the `analytics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl Analytics for TracingAnalytics {
    fn track(&self, event: &str, properties: Value) {
        info!(target: "analytics", event, properties = %properties, "track");
    }
}

/// No raw address leaves the controller: only the domain.
pub fn completed_properties(email_domain: &str, has_school: bool, subscriber_id: &str) -> Value {
    json!({
        "email_domain": email_domain,
        "has_school": has_school,
        "subscriber_id": subscriber_id,
    })
}

pub fn failed_properties(error_type: &str, email_domain: &str) -> Value {
    json!({
        "error_type": error_type,
        "email_domain": email_domain,
    })
}
