//! Integration tests for the HTTP access reviewer.

use dbaas_authz_core::access::http::RESOURCE_ACCESS_REVIEW_PATH;
use dbaas_authz_core::access::{review_or_empty, AccessReviewer, HttpAccessReviewer, ReviewAction};
use dbaas_authz_core::error::ErrorCode;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reviewer(server: &MockServer, token: Option<&str>) -> HttpAccessReviewer {
    HttpAccessReviewer::new(
        &server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_review_returns_deduplicated_access() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESOURCE_ACCESS_REVIEW_PATH))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": ["alice", "bob", "alice"],
            "groups": ["devs"],
            "evaluationError": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let access = reviewer(&server, Some("secret-token"))
        .review(&ReviewAction::list_inventories("inv-ns"))
        .await
        .unwrap();

    assert_eq!(access.users(), ["alice", "bob"]);
    assert_eq!(access.groups(), ["devs"]);
}

#[tokio::test]
async fn test_missing_lists_are_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESOURCE_ACCESS_REVIEW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "evaluationError": "partial"
        })))
        .mount(&server)
        .await;

    let access = reviewer(&server, None)
        .review(&ReviewAction::list_tenants())
        .await
        .unwrap();
    assert!(access.is_empty());
}

#[tokio::test]
async fn test_evaluation_error_keeps_partial_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESOURCE_ACCESS_REVIEW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": ["alice"],
            "groups": [],
            "evaluationError": "role binding references missing role"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let access = reviewer(&server, None)
        .review(&ReviewAction::list_tenants())
        .await
        .unwrap();
    assert_eq!(access.users(), ["alice"]);
    assert!(access.groups().is_empty());
}

#[tokio::test]
async fn test_forbidden_review_fails_and_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESOURCE_ACCESS_REVIEW_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let reviewer = reviewer(&server, None);
    let action = ReviewAction::create_secrets("inv-ns");

    let err = reviewer.review(&action).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccessReviewFailed);
    assert!(err.is_retryable());

    assert!(review_or_empty(&reviewer, &action).await.is_empty());
}
