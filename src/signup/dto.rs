use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SignupError;

/// Request body for `POST /api/signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
}

impl SignupRequest {
    /// Field-by-field extraction so a wrong type is reported against the field
    /// it belongs to rather than as an unreadable body.
    pub fn from_json(body: &Value) -> Result<Self, SignupError> {
        let obj = body.as_object().ok_or(SignupError::InvalidContentType)?;

        let email = obj
            .get("email")
            .and_then(Value::as_str)
            .ok_or(SignupError::InvalidEmail)?
            .to_string();

        let school = match obj.get("school") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(SignupError::InvalidSchool),
        };

        Ok(Self { email, school })
    }
}

/// 200 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupSuccess {
    pub success: bool,
    pub message: String,
    pub subscriber_id: String,
}

impl SignupSuccess {
    pub fn new(subscriber_id: String) -> Self {
        Self {
            success: true,
            message: "Successfully joined the waitlist!".into(),
            subscriber_id,
        }
    }
}
