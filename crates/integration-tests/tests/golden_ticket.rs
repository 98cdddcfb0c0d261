//! Golden ticket sweepstakes entries.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;
use sweetbox_core::SubscriptionStatus;
use sweetbox_integration_tests::TestApp;
use sweetbox_landing::services::{RejectionKind, RemoteError};

#[tokio::test]
async fn test_entry_with_opt_in_is_pending_and_tagged() {
    let app = TestApp::new();

    let resp = app
        .post(
            "/api/golden-ticket",
            &json!({
                "email": "gewinner@example.de",
                "firstName": "Jonas",
                "ticketCode": "GT7A2K9Q",
                "newsletterOptIn": true
            }),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["ticketCode"], "GT7A2K9Q");
    assert_eq!(resp.body["email"], "gewinner@example.de");
    assert_eq!(resp.body["mailchimpSynced"], true);

    let member = app.list.member("gewinner@example.de").unwrap();
    assert_eq!(member.status, SubscriptionStatus::Pending);
    assert_eq!(member.merge_fields["TICKET"], "GT7A2K9Q");
    for tag in [
        "golden_ticket",
        "promo-offer",
        "sweepstakes-entry",
        "gewinnspiel-teilnehmer",
        "golden-ticket-2024",
        "ticket-GT7",
        "newsletter-opt-in",
        "golden-ticket-gewinnspiel",
        "offer-adventskalender-2025",
    ] {
        assert!(member.tags.contains(tag), "missing tag {tag}");
    }
}

#[tokio::test]
async fn test_entry_without_opt_in_is_transactional() {
    let app = TestApp::new();

    let resp = app
        .post(
            "/api/golden-ticket",
            &json!({"email": "a@b.com", "ticketCode": "ABCD1234"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let member = app.list.member("a@b.com").unwrap();
    assert_eq!(member.status, SubscriptionStatus::Transactional);
    assert!(!member.tags.contains("newsletter-opt-in"));
    assert!(!member.tags.contains("golden-ticket-gewinnspiel"));
    assert!(member.tags.contains("gewinnspiel-teilnehmer"));
}

#[tokio::test]
async fn test_opt_in_on_re_entry_confirms_existing_member() {
    let app = TestApp::new();

    app.post(
        "/api/golden-ticket",
        &json!({"email": "a@b.com", "ticketCode": "ABCD1234"}),
    )
    .await;
    assert_eq!(
        app.list.member("a@b.com").unwrap().status,
        SubscriptionStatus::Transactional
    );

    let resp = app
        .post(
            "/api/golden-ticket",
            &json!({"email": "a@b.com", "ticketCode": "ABCD1234", "newsletterOptIn": true}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let member = app.list.member("a@b.com").unwrap();
    assert_eq!(member.status, SubscriptionStatus::Pending);
    assert!(member.tags.contains("newsletter-opt-in"));
    assert_eq!(app.list.member_count(), 1);
}

#[tokio::test]
async fn test_entry_without_opt_in_keeps_subscriber_status() {
    let app = TestApp::new();

    app.post("/api/newsletter", &json!({"email": "a@b.com"}))
        .await;
    app.post(
        "/api/golden-ticket",
        &json!({"email": "a@b.com", "ticketCode": "ABCD1234"}),
    )
    .await;

    let member = app.list.member("a@b.com").unwrap();
    assert_eq!(member.status, SubscriptionStatus::Subscribed);
    assert_eq!(member.merge_fields["TICKET"], "ABCD1234");
}

#[tokio::test]
async fn test_explicit_offer_is_kept() {
    let app = TestApp::new();

    app.post(
        "/api/golden-ticket",
        &json!({"email": "a@b.com", "ticketCode": "ABCD1234", "offer": "Dubai Schokolade"}),
    )
    .await;

    let member = app.list.member("a@b.com").unwrap();
    assert!(member.tags.contains("offer-dubai-schokolade"));
    assert!(!member.tags.contains("offer-adventskalender-2025"));
}

#[tokio::test]
async fn test_invalid_ticket_code_is_rejected_without_remote_call() {
    let app = TestApp::new();

    for code in [json!("abcd1234"), json!("SHORT"), json!(null)] {
        let resp = app
            .post(
                "/api/golden-ticket",
                &json!({"email": "a@b.com", "ticketCode": code}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "code {code}");
    }

    assert_eq!(app.list.put_calls(), 0);
}

#[tokio::test]
async fn test_remote_failure_still_accepts_entry() {
    let app = TestApp::new();
    app.list.fail_next_put(RemoteError {
        kind: RejectionKind::InvalidResource,
        status: Some(400),
        detail: "Please provide a valid email address.".to_string(),
    });

    let resp = app
        .post(
            "/api/golden-ticket",
            &json!({"email": "a@b.com", "ticketCode": "ABCD1234"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["mailchimpSynced"], false);
}

#[tokio::test]
async fn test_explicit_source_is_kept() {
    let app = TestApp::new();

    app.post(
        "/api/golden-ticket",
        &json!({"email": "a@b.com", "ticketCode": "ABCD1234", "source": "advent_calendar"}),
    )
    .await;

    let member = app.list.member("a@b.com").unwrap();
    assert!(member.tags.contains("advent_calendar"));
    assert!(!member.tags.contains("golden_ticket"));
}

#[tokio::test]
async fn test_unconfigured_list_is_server_error() {
    let app = TestApp::unconfigured();

    let resp = app
        .post(
            "/api/golden-ticket",
            &json!({"email": "a@b.com", "ticketCode": "ABCD1234"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
}
