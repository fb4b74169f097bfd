//! Waitlist signup service: a rate-limited proxy that forwards signups to the
//! email-marketing provider, plus the client-side submission controller.

pub mod app;
pub mod client;
pub mod config;
pub mod provider;
pub mod rate_limit;
pub mod signup;
pub mod state;
