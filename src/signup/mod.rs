use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub mod handlers;
pub mod services;
pub mod validation;

pub use error::{ErrorKind, SignupError};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::signup_routes())
}
