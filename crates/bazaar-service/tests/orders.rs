//! Order history integration tests.

mod common;

use axum::http::StatusCode;
use common::{auth_header, TestHarness};
use serde_json::{json, Value};

use bazaar_core::UserId;

/// Buy `quantity` of a fresh product as the test user, returning the order ID.
async fn place_order(harness: &TestHarness, title: &str, quantity: u32) -> String {
    let product_id = harness.create_product(title, "1.00", 10).await;
    let body: Value = harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "quantity": quantity }))
        .await
        .json();
    body["orders"][0]["id"].as_str().unwrap().to_string()
}

async fn order_ids(harness: &TestHarness, auth: String) -> Vec<String> {
    let body: Value = harness
        .server
        .get("/v1/orders")
        .add_header("authorization", auth)
        .await
        .json();
    body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn orders_are_listed_newest_first_with_paging() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let first = place_order(&harness, "Lamp", 1).await;
    let second = place_order(&harness, "Chair", 1).await;
    let third = place_order(&harness, "Desk", 1).await;

    assert_eq!(
        order_ids(&harness, harness.user_auth_header()).await,
        [third.clone(), second.clone(), first.clone()]
    );

    let page: Value = harness
        .server
        .get("/v1/orders?limit=2&offset=1")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(page["orders"][0]["id"], second);
    assert_eq!(page["orders"][1]["id"], first);
    assert_eq!(page["has_more"], false);
}

#[tokio::test]
async fn deleting_someone_elses_order_is_forbidden() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let order_id = place_order(&harness, "Lamp", 1).await;

    let intruder = UserId::generate();
    harness
        .server
        .delete(&format!("/v1/orders/{order_id}"))
        .add_header("authorization", auth_header(&intruder))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    assert_eq!(
        order_ids(&harness, harness.user_auth_header()).await,
        [order_id]
    );
}

#[tokio::test]
async fn owner_deletes_an_order() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let kept = place_order(&harness, "Lamp", 1).await;
    let removed = place_order(&harness, "Chair", 1).await;

    harness
        .server
        .delete(&format!("/v1/orders/{removed}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    assert_eq!(
        order_ids(&harness, harness.user_auth_header()).await,
        [kept]
    );

    harness
        .server
        .delete(&format!("/v1/orders/{removed}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn clearing_history_only_touches_own_orders() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    place_order(&harness, "Lamp", 1).await;
    place_order(&harness, "Chair", 2).await;

    let other = UserId::generate();
    harness.create_account(&other).await;
    harness.fund(&other, "10.00").await;
    let product_id = harness.create_product("Desk", "1.00", 1).await;
    harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", auth_header(&other))
        .json(&json!({}))
        .await
        .assert_status_ok();

    let body: Value = harness
        .server
        .post("/v1/orders/clear")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(body["removed"], 2);

    assert!(order_ids(&harness, harness.user_auth_header())
        .await
        .is_empty());
    assert_eq!(order_ids(&harness, auth_header(&other)).await.len(), 1);
}

#[tokio::test]
async fn orders_survive_product_deletion() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let category_id = harness.create_category("Misc").await;
    let seller = UserId::generate();
    let product_id = harness
        .create_product_as(&seller, &category_id, "Lamp", "5.00", 3)
        .await;

    harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "quantity": 1 }))
        .await
        .assert_status_ok();

    harness
        .server
        .delete(&format!("/v1/products/{product_id}"))
        .add_header("authorization", auth_header(&seller))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let body: Value = harness
        .server
        .get("/v1/orders")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(body["orders"][0]["product_title"], "Lamp");
    assert_eq!(body["orders"][0]["price_cents"], 500);
}
