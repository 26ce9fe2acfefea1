//! Calendar reminder integration tests.

mod common;

use axum::http::StatusCode;
use common::{auth_header, TestHarness};
use serde_json::{json, Value};

use bazaar_core::UserId;

async fn remind(
    harness: &TestHarness,
    user: &UserId,
    title: &str,
    date: &str,
) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/reminders")
        .add_header("authorization", auth_header(user))
        .json(&json!({ "title": title, "date": date }))
        .await
}

async fn reminders(harness: &TestHarness, user: &UserId) -> Vec<Value> {
    let response = harness
        .server
        .get("/v1/reminders")
        .add_header("authorization", auth_header(user))
        .await;
    response.assert_status_ok();
    response.json::<Value>().as_array().unwrap().clone()
}

#[tokio::test]
async fn reminders_are_listed_by_day() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.create_account(&user).await;

    let response = remind(&harness, &user, "  ship the kettle ", "2026-04-20").await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["title"], "ship the kettle");
    assert_eq!(body["date"], "2026-04-20");

    remind(&harness, &user, "renew listing", "2026-04-02")
        .await
        .assert_status(StatusCode::CREATED);

    let titles: Vec<String> = reminders(&harness, &user)
        .await
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["renew listing", "ship the kettle"]);
}

#[tokio::test]
async fn reminders_are_private() {
    let harness = TestHarness::new();
    let owner = harness.test_user_id;
    let other = UserId::generate();
    harness.create_account(&owner).await;
    harness.create_account(&other).await;

    remind(&harness, &owner, "pay rent", "2026-05-01")
        .await
        .assert_status(StatusCode::CREATED);

    assert_eq!(reminders(&harness, &owner).await.len(), 1);
    assert!(reminders(&harness, &other).await.is_empty());
}

#[tokio::test]
async fn invalid_reminders_are_rejected() {
    let harness = TestHarness::new();
    let user = harness.test_user_id;
    harness.create_account(&user).await;

    remind(&harness, &user, "   ", "2026-05-01")
        .await
        .assert_status_bad_request();
    remind(&harness, &user, &"x".repeat(256), "2026-05-01")
        .await
        .assert_status_bad_request();

    let response = harness
        .server
        .post("/v1/reminders")
        .add_header("authorization", auth_header(&user))
        .json(&json!({ "title": "pay rent", "date": "next tuesday" }))
        .await;
    assert!(response.status_code().is_client_error());

    assert!(reminders(&harness, &user).await.is_empty());
}

#[tokio::test]
async fn reminders_need_an_account() {
    let harness = TestHarness::new();

    remind(&harness, &harness.test_user_id, "pay rent", "2026-05-01")
        .await
        .assert_status_not_found();

    harness
        .server
        .get("/v1/reminders")
        .await
        .assert_status_unauthorized();
}
