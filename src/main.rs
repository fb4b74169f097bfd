use std::sync::Arc;

use waitlist::{app, rate_limit::spawn_sweeper, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "waitlist=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init()?;
    tracing::info!(
        max_requests = app_state.limiter.limit(),
        window_secs = app_state.config.rate_limit.window.as_secs(),
        "signup rate limit configured"
    );

    if let Some(every) = app_state.config.rate_limit.sweep_interval {
        spawn_sweeper(Arc::clone(&app_state.limiter), every);
    }

    let addr = app_state.config.addr;
    let app = app::build_app(app_state);
    app::serve(app, addr).await
}
