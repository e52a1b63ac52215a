use super::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================
// IdentityError classification
// =============================================================

#[test]
fn status_429_is_rate_limited() {
    assert!(IdentityError::with_status(429, "slow down").is_rate_limited());
}

#[test]
fn marker_in_message_is_rate_limited() {
    assert!(IdentityError::new("request failed with status 429").is_rate_limited());
    assert!(IdentityError::new("HTTP status client error (429 Too Many Requests)").is_rate_limited());
}

#[test]
fn known_status_overrides_message_text() {
    assert!(!IdentityError::with_status(401, "user 14291 not found").is_rate_limited());
    assert!(!IdentityError::with_status(503, "upstream said Too Many Requests").is_rate_limited());
}

#[test]
fn bare_429_digits_in_message_are_not_a_marker() {
    let err = IdentityError::new("error sending request for url (http://127.0.0.1:4290/api/auth/me)");
    assert!(!err.is_rate_limited());
    assert!(!IdentityError::new("user 14291 not found").is_rate_limited());
}

#[test]
fn other_failures_are_not_rate_limited() {
    assert!(!IdentityError::with_status(401, "identity fetch failed: 401").is_rate_limited());
    assert!(!IdentityError::new("connection refused").is_rate_limited());
}

#[test]
fn user_record_optional_fields_default() {
    let user: UserRecord = serde_json::from_value(json!({ "id": "u1", "name": "Alice" })).unwrap();
    assert_eq!(user.email, None);
    assert_eq!(user.avatar_url, None);
}

// =============================================================
// HttpIdentityService
// =============================================================

#[test]
fn base_url_trailing_slash_trimmed() {
    let service = HttpIdentityService::new("http://localhost:3000/").unwrap();
    assert_eq!(service.base_url(), "http://localhost:3000");
}

#[tokio::test]
async fn fetch_current_user_parses_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "name": "Alice",
            "email": "alice@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    let user = service.fetch_current_user().await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));
}

#[tokio::test]
async fn fetch_current_user_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    let err = service.fetch_current_user().await.unwrap_err();
    assert_eq!(err.status, Some(429));
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn fetch_current_user_401_is_plain_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    let err = service.fetch_current_user().await.unwrap_err();
    assert_eq!(err.status, Some(401));
    assert!(!err.is_rate_limited());
    assert_eq!(err.message, "identity fetch failed: 401");
}

#[tokio::test]
async fn fetch_current_user_invalid_body_is_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    let err = service.fetch_current_user().await.unwrap_err();
    assert_eq!(err.status, None);
    assert!(!err.message.is_empty());
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn unreachable_server_is_transport_failure() {
    let service = HttpIdentityService::new("http://127.0.0.1:1").unwrap();
    let err = service.fetch_current_user().await.unwrap_err();
    assert_eq!(err.status, None);
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn logout_posts_to_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    service.logout().await.unwrap();
}

#[tokio::test]
async fn logout_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = HttpIdentityService::new(server.uri()).unwrap();
    let err = service.logout().await.unwrap_err();
    assert_eq!(err.status, Some(500));
}
