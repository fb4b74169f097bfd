use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tower::ServiceExt;
use waitlist::{
    app::build_app,
    config::{AppConfig, ConfigError, ProviderConfig, RateLimitConfig},
    rate_limit::RateLimiter,
    state::{AppState, ProviderSlot},
};

const API_KEY: &str = "it-key-0123456789abcdefghijklmnop";
const GROUP_ID: &str = "987654";

fn app_with(provider: Result<ProviderConfig, ConfigError>, timeout_override: Option<Duration>) -> Router {
    let provider = provider.map(|mut cfg| {
        if let Some(t) = timeout_override {
            cfg.timeout = t;
        }
        cfg
    });
    let config = AppConfig {
        addr: "127.0.0.1:0".parse().expect("addr"),
        allowed_origin: "https://school.example".into(),
        confirmation_path: "/thank-you".into(),
        rate_limit: RateLimitConfig {
            sweep_interval: None,
            ..RateLimitConfig::default()
        },
        provider,
    };
    let limiter = Arc::new(RateLimiter::in_memory(&config.rate_limit));
    let slot = ProviderSlot::from_config(&config.provider).expect("provider slot");
    build_app(AppState::from_parts(Arc::new(config), limiter, slot))
}

fn app_for(server: &MockServer) -> Router {
    let cfg = ProviderConfig::new(API_KEY, GROUP_ID, &server.base_url(), Duration::from_secs(5))
        .expect("valid provider config");
    app_with(Ok(cfg), None)
}

fn signup(ip: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn new_subscriber_is_created() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/subscribers")
                .header("authorization", format!("Bearer {API_KEY}"))
                .json_body(json!({
                    "email": "new@user.com",
                    "fields": {},
                    "groups": [GROUP_ID],
                }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "123"}));
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup("10.0.0.1", json!({"email": "  New@User.com "})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-ratelimit-limit"], "5");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "4");
    assert!(res.headers().contains_key("x-ratelimit-reset"));

    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["subscriber_id"], "123");
    assert_eq!(body["message"], "Successfully joined the waitlist!");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn school_is_sanitised_before_forwarding() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers").json_body(json!({
                "email": "kid@school.edu",
                "fields": {"school": "Springfield High"},
                "groups": [GROUP_ID],
            }));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"data": {"id": 42}}));
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup(
            "10.0.0.2",
            json!({"email": "kid@school.edu", "school": "  <Springfield> High "}),
        ))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["subscriber_id"], "42");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn duplicate_email_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(400)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"message": "already exists"}}));
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup("10.0.0.3", json!({"email": "dup@user.com"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "DUPLICATE_EMAIL");
}

#[tokio::test]
async fn sixth_request_in_window_is_rate_limited() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "1"}));
        })
        .await;
    let app = app_for(&server);

    for i in 0..5 {
        let res = app
            .clone()
            .oneshot(signup("203.0.113.7", json!({"email": format!("u{i}@user.com")})))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK, "request {i}");
    }

    let res = app
        .clone()
        .oneshot(signup("203.0.113.7, 10.0.0.1", json!({"email": "u5@user.com"})))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = res.headers()[header::RETRY_AFTER]
        .to_str()
        .expect("ascii")
        .parse()
        .expect("seconds");
    assert!(retry > 0);
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(json_body(res).await["error"], "RATE_LIMITED");
    mock.assert_calls_async(5).await;

    let other = app
        .oneshot(signup("198.51.100.1", json!({"email": "other@user.com"})))
        .await
        .expect("response");
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_email_never_reaches_provider() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(200).json_body(json!({"id": "x"}));
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup("10.0.0.4", json!({"email": "bad-email"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "INVALID_EMAIL");
    mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn overlong_school_is_rejected() {
    let server = MockServer::start_async().await;
    let res = app_for(&server)
        .oneshot(signup(
            "10.0.0.5",
            json!({"email": "a@b.com", "school": "s".repeat(101)}),
        ))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "INVALID_SCHOOL");
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let server = MockServer::start_async().await;
    let app = app_for(&server);

    let form = Request::builder()
        .method("POST")
        .uri("/api/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("email=a%40b.com"))
        .expect("request");
    let res = app.clone().oneshot(form).await.expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["x-ratelimit-remaining"], "4");
    assert_eq!(json_body(res).await["error"], "INVALID_CONTENT_TYPE");

    let broken = Request::builder()
        .method("POST")
        .uri("/api/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .expect("request");
    let res = app.oneshot(broken).await.expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "INVALID_CONTENT_TYPE");
}

#[tokio::test]
async fn provider_timeout_is_a_network_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({"id": "late"}));
        })
        .await;
    let cfg = ProviderConfig::new(API_KEY, GROUP_ID, &server.base_url(), Duration::from_secs(5))
        .expect("valid provider config");

    let res = app_with(Ok(cfg), Some(Duration::from_millis(50)))
        .oneshot(signup("10.0.0.6", json!({"email": "slow@user.com"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(res).await["error"], "NETWORK_ERROR");
}

#[tokio::test]
async fn provider_throttling_passes_through() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(429).header("retry-after", "30").body("slow down");
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup("10.0.0.7", json!({"email": "a@b.com"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()[header::RETRY_AFTER], "30");
    assert_eq!(json_body(res).await["error"], "RATE_LIMITED");
}

#[tokio::test]
async fn unexpected_provider_body_is_an_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"subscriber": {"email": "a@b.com"}}));
        })
        .await;

    let res = app_for(&server)
        .oneshot(signup("10.0.0.8", json!({"email": "a@b.com"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(res).await["error"], "API_ERROR");
}

#[tokio::test]
async fn missing_credentials_fail_without_leaking() {
    let res = app_with(Err(ConfigError::PlaceholderApiKey), None)
        .oneshot(signup("10.0.0.9", json!({"email": "a@b.com"})))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(res).await;
    assert_eq!(body["error"], "MISSING_CONFIG");
    let text = body.to_string();
    assert!(!text.contains("MAILERLITE"));
    assert!(!text.to_lowercase().contains("placeholder"));
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let server = MockServer::start_async().await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/signup")
        .body(Body::empty())
        .expect("request");

    let res = app_for(&server).oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[header::ALLOW], "POST, OPTIONS");
    assert_eq!(json_body(res).await["error"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn wrong_method_reports_budget_without_spending_it() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/subscribers");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "7"}));
        })
        .await;
    let app = app_for(&server);

    let res = app
        .clone()
        .oneshot(signup("192.0.2.9", json!({"email": "first@user.com"})))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);

    let put = Request::builder()
        .method("PUT")
        .uri("/api/signup")
        .header("x-forwarded-for", "192.0.2.9")
        .body(Body::empty())
        .expect("request");
    let res = app.clone().oneshot(put).await.expect("response");
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["x-ratelimit-limit"], "5");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "4");
    assert!(res.headers().contains_key("x-ratelimit-reset"));

    let res = app
        .oneshot(signup("192.0.2.9", json!({"email": "second@user.com"})))
        .await
        .expect("response");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "3");
}

#[tokio::test]
async fn padded_school_over_limit_is_rejected() {
    let server = MockServer::start_async().await;
    let res = app_for(&server)
        .oneshot(signup(
            "10.0.0.10",
            json!({"email": "a@b.com", "school": format!("  {}  ", "s".repeat(100))}),
        ))
        .await
        .expect("response");

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "INVALID_SCHOOL");
}

#[tokio::test]
async fn preflight_is_answered_by_cors() {
    let server = MockServer::start_async().await;
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/signup")
        .header(header::ORIGIN, "https://school.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .expect("request");

    let res = app_for(&server).oneshot(req).await.expect("response");
    assert!(res.status().is_success());
    assert_eq!(
        res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://school.example"
    );
}

#[tokio::test]
async fn health_check() {
    let server = MockServer::start_async().await;
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let res = app_for(&server).oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
}
