//! Newsletter signup against the in-memory mailing list.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;
use sweetbox_integration_tests::{TestApp, compliance_rejection};
use sweetbox_landing::services::{RejectionKind, RemoteError};

#[tokio::test]
async fn test_new_visitor_is_subscribed_with_name_and_tags() {
    let app = TestApp::new();

    let resp = app
        .post(
            "/api/newsletter",
            &json!({
                "email": "a@b.com",
                "firstName": "Ana",
                "source": "hero_offer",
                "statusIfNew": "subscribed"
            }),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["email"], "a@b.com");
    assert_eq!(resp.body["status"], "subscribed");
    assert_eq!(resp.body["retriedAsPending"], false);
    assert!(resp.body.get("tagsWarning").is_none());

    let member = app.list.member("a@b.com").unwrap();
    assert_eq!(member.status, sweetbox_core::SubscriptionStatus::Subscribed);
    assert_eq!(member.merge_fields["FNAME"], "Ana");
    assert!(member.tags.contains("website-signup"));
    assert!(member.tags.contains("hero_offer"));
    assert!(member.tags.contains("promo-offer"));
}

#[tokio::test]
async fn test_repeated_signup_updates_the_same_member() {
    let app = TestApp::new();
    let body = json!({
        "email": "a@b.com",
        "firstName": "Ana",
        "source": "hero_offer",
        "statusIfNew": "subscribed"
    });

    let first = app.post("/api/newsletter", &body).await;
    let second = app.post("/api/newsletter", &body).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(app.list.member_count(), 1);
    assert_eq!(app.list.put_calls(), 2);
    assert_eq!(app.list.member("a@b.com").unwrap().merge_fields["FNAME"], "Ana");

    let puts = app.list.puts();
    assert_eq!(puts[0].0, puts[1].0);
}

#[tokio::test]
async fn test_email_case_maps_to_one_member() {
    let app = TestApp::new();

    app.post("/api/newsletter", &json!({"email": "Lena@Example.com"}))
        .await;
    app.post("/api/newsletter", &json!({"email": "lena@example.com"}))
        .await;

    assert_eq!(app.list.member_count(), 1);
}

#[tokio::test]
async fn test_invalid_email_is_rejected_without_remote_call() {
    let app = TestApp::new();

    let resp = app.post("/api/newsletter", &json!({"email": "bad"})).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(!resp.body["message"].as_str().unwrap().is_empty());
    assert_eq!(app.list.put_calls(), 0);
    assert_eq!(app.list.tag_calls(), 0);
}

#[tokio::test]
async fn test_missing_email_is_rejected_without_remote_call() {
    let app = TestApp::new();

    let resp = app.post("/api/newsletter", &json!({"firstName": "Ana"})).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.list.put_calls(), 0);
}

#[tokio::test]
async fn test_compliance_rejection_retries_once_as_pending() {
    let app = TestApp::new();
    app.list.fail_next_put(compliance_rejection());

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com", "firstName": "Ana"}))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["status"], "pending");
    assert_eq!(resp.body["retriedAsPending"], true);
    assert_eq!(app.list.put_calls(), 2);

    let puts = app.list.puts();
    assert_eq!(
        puts[1].1.status,
        Some(sweetbox_core::SubscriptionStatus::Pending)
    );
    assert_eq!(
        app.list.member("a@b.com").unwrap().status,
        sweetbox_core::SubscriptionStatus::Pending
    );
}

#[tokio::test]
async fn test_second_compliance_rejection_is_terminal() {
    let app = TestApp::new();
    app.list.fail_next_put(compliance_rejection());
    app.list.fail_next_put(compliance_rejection());

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["mc"], "compliance");
    assert_eq!(app.list.put_calls(), 2);
    assert_eq!(app.list.member_count(), 0);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let app = TestApp::new();
    app.list.fail_next_put(RemoteError {
        kind: RejectionKind::Unauthorized,
        status: Some(401),
        detail: "Your API key may be invalid, or you've attempted to access the wrong datacenter."
            .to_string(),
    });

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["mc"], "unauthorized");
    assert_eq!(resp.body["retryable"], false);
    assert!(!resp.body.to_string().contains("API key"));
    assert_eq!(app.list.put_calls(), 1);
}

#[tokio::test]
async fn test_timeout_is_reported_as_retryable() {
    let app = TestApp::new();
    app.list.fail_next_put(RemoteError::transport(
        RejectionKind::Timeout,
        "operation timed out",
    ));

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["mc"], "timeout");
    assert_eq!(resp.body["retryable"], true);
}

#[tokio::test]
async fn test_tag_failure_keeps_the_signup() {
    let app = TestApp::new();
    app.list.fail_next_tags(RemoteError {
        kind: RejectionKind::RateLimited,
        status: Some(429),
        detail: "Too Many Requests".to_string(),
    });

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com", "source": "giveaway"}))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body["tagsWarning"].is_string());
    let member = app.list.member("a@b.com").unwrap();
    assert!(member.tags.is_empty());
}

#[tokio::test]
async fn test_address_and_whatsapp_alias() {
    let app = TestApp::new();

    let resp = app
        .post(
            "/api/newsletter",
            &json!({
                "email": "a@b.com",
                "whatsapp": "+49 151 0000000",
                "street": "Hauptstr. 1",
                "city": "Berlin",
                "postalCode": "10115"
            }),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let member = app.list.member("a@b.com").unwrap();
    assert_eq!(
        member.merge_fields["ADDRESS"],
        json!({"addr1": "Hauptstr. 1", "city": "Berlin", "zip": "10115", "country": "DE"})
    );
    // PHONE is not in the default allow-list
    assert!(member.merge_fields.get("PHONE").is_none());
    assert!(member.tags.contains("address_provided"));
}

#[tokio::test]
async fn test_signup_sets_funnel_cookie() {
    let app = TestApp::new();

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;

    assert_eq!(resp.cookie("funnel_step").unwrap(), "funnel_step=email_capture");
}

#[tokio::test]
async fn test_unconfigured_list_is_server_error() {
    let app = TestApp::unconfigured();

    let resp = app
        .post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.body["message"], "Server configuration error");
}

#[tokio::test]
async fn test_unconfigured_still_validates_first() {
    let app = TestApp::unconfigured();

    let resp = app.post("/api/newsletter", &json!({"email": "bad"})).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_if_new_is_limited_to_opt_in_modes() {
    let app = TestApp::new();

    for status in ["unsubscribed", "cleaned", "transactional", "archived"] {
        let resp = app
            .post(
                "/api/newsletter",
                &json!({"email": "x@y.com", "statusIfNew": status}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "status {status}");
        assert!(resp.body["message"].as_str().unwrap().contains("statusIfNew"));
    }
    assert_eq!(app.list.put_calls(), 0);

    let resp = app
        .post(
            "/api/newsletter",
            &json!({"email": "x@y.com", "statusIfNew": "pending"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        app.list.member("x@y.com").unwrap().status,
        sweetbox_core::SubscriptionStatus::Pending
    );
}

#[tokio::test]
async fn test_malformed_body_is_json_bad_request() {
    let app = TestApp::new();

    for body in [r#"{"email": "a@b.com""#, r#"{"email": 123}"#] {
        let resp = app.post_raw("/api/newsletter", body).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(resp.body["message"], "Invalid request body", "{body}");
    }
    assert_eq!(app.list.put_calls(), 0);
}
