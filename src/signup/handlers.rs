use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tracing::{instrument, warn};

use super::{
    dto::SignupSuccess,
    error::SignupError,
    services::{body_rejection, process_signup},
};
use crate::{rate_limit::ClientIp, state::AppState};

pub const SIGNUP_PATH: &str = "/api/signup";

pub fn signup_routes() -> Router<AppState> {
    Router::new().route(
        SIGNUP_PATH,
        post(signup).fallback(method_not_allowed),
    )
}

#[instrument(skip_all, fields(client_ip = %client_ip.0))]
pub async fn signup(
    State(state): State<AppState>,
    client_ip: ClientIp,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let decision = state.limiter.check_and_consume(&client_ip.0).await;

    let outcome = if !decision.allowed {
        warn!(reset_at = %decision.reset_at, "signup rate limited");
        Err(SignupError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        })
    } else {
        match payload {
            Ok(Json(value)) => process_signup(&state, value).await,
            Err(rejection) => Err(body_rejection(rejection)),
        }
    };

    let mut res = match outcome {
        Ok(id) => (StatusCode::OK, Json(SignupSuccess::new(id.0))).into_response(),
        Err(e) => e.into_response(),
    };
    decision.apply_headers(res.headers_mut());
    res
}

/// Any verb other than POST. `OPTIONS` never gets here: the CORS layer answers it.
/// Reports the caller's budget without spending any of it.
pub async fn method_not_allowed(State(state): State<AppState>, client_ip: ClientIp) -> Response {
    let decision = state.limiter.peek(&client_ip.0).await;
    let mut res = SignupError::MethodNotAllowed.into_response();
    decision.apply_headers(res.headers_mut());
    res
}
