//! Checkout integration tests: buy-now, cart checkout, and the guarantees
//! that a rejected checkout changes nothing.

mod common;

use common::TestHarness;
use serde_json::{json, Value};

async fn buy_now(
    harness: &TestHarness,
    product_id: &str,
    quantity: u32,
) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "quantity": quantity }))
        .await
}

async fn add_to_cart(harness: &TestHarness, product_id: &str, quantity: u32) {
    harness
        .server
        .post("/v1/cart/items")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "product_id": product_id, "quantity": quantity }))
        .await
        .assert_status_ok();
}

async fn checkout_cart(harness: &TestHarness) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/cart/checkout")
        .add_header("authorization", harness.user_auth_header())
        .await
}

async fn orders(harness: &TestHarness) -> Vec<Value> {
    let body: Value = harness
        .server
        .get("/v1/orders")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    body["orders"].as_array().unwrap().clone()
}

async fn count(harness: &TestHarness, product_id: &str) -> i64 {
    harness.product(product_id).await["product"]["count"]
        .as_i64()
        .unwrap()
}

// ============================================================================
// Buy Now
// ============================================================================

#[tokio::test]
async fn buy_now_debits_balance_and_stock() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    let response = buy_now(&harness, &product_id, 3).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["total_cents"], 3_000);
    assert_eq!(body["balance_cents"], 7_000);
    assert_eq!(body["balance_formatted"], "70.00");

    assert_eq!(harness.balance_cents().await, 7_000);
    assert_eq!(count(&harness, &product_id).await, 2);

    let orders = orders(&harness).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["price_cents"], 3_000);
    assert_eq!(orders[0]["quantity"], 3);
    assert_eq!(orders[0]["product_title"], "Lamp");
}

#[tokio::test]
async fn buy_now_with_promo_charges_discount_and_consumes_it() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    harness.create_promo("SAVE10", 10).await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    harness
        .server
        .post("/v1/cart/promo")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "code": "SAVE10" }))
        .await
        .assert_status_ok();

    let response = buy_now(&harness, &product_id, 3).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["base_total_cents"], 3_000);
    assert_eq!(body["discount_cents"], 300);
    assert_eq!(body["total_cents"], 2_700);
    assert_eq!(harness.balance_cents().await, 7_300);

    let cart: Value = harness
        .server
        .get("/v1/cart")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert!(cart["promo_code"].is_null());
}

#[tokio::test]
async fn buy_now_leaves_the_cart_alone() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let lamp = harness.create_product("Lamp", "10.00", 5).await;
    let chair = harness.create_product("Chair", "20.00", 5).await;
    add_to_cart(&harness, &chair, 1).await;

    buy_now(&harness, &lamp, 1).await.assert_status_ok();

    let cart: Value = harness
        .server
        .get("/v1/cart")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn buy_now_over_stock_is_rejected() {
    let harness = TestHarness::new();
    harness.funded_user("1000.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    let response = buy_now(&harness, &product_id, 6).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_stock");
    assert_eq!(body["error"]["details"]["available"], 5);
    assert_eq!(body["error"]["details"]["requested"], 6);
}

#[tokio::test]
async fn buy_now_without_body_buys_one() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    let response = harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();

    assert_eq!(response.json::<Value>()["total_cents"], 1_000);
    assert_eq!(count(&harness, &product_id).await, 4);
}

#[tokio::test]
async fn buy_now_with_malformed_body_is_rejected() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    harness
        .server
        .post(&format!("/v1/products/{product_id}/buy"))
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "quantity": "three" }))
        .await
        .assert_status_bad_request();

    assert_eq!(harness.balance_cents().await, 10_000);
    assert_eq!(count(&harness, &product_id).await, 5);
}

#[tokio::test]
async fn buy_now_without_account_is_not_found() {
    let harness = TestHarness::new();
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    buy_now(&harness, &product_id, 1).await.assert_status_not_found();
    assert_eq!(count(&harness, &product_id).await, 5);
}

// ============================================================================
// Cart Checkout
// ============================================================================

#[tokio::test]
async fn cart_checkout_creates_one_order_per_line_and_empties_the_cart() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let lamp = harness.create_product("Lamp", "10.00", 5).await;
    let chair = harness.create_product("Chair", "25.00", 2).await;
    add_to_cart(&harness, &lamp, 2).await;
    add_to_cart(&harness, &chair, 1).await;

    let response = checkout_cart(&harness).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["orders"].as_array().unwrap().len(), 2);
    assert_eq!(body["total_cents"], 4_500);
    assert_eq!(harness.balance_cents().await, 5_500);
    assert_eq!(count(&harness, &lamp).await, 3);
    assert_eq!(count(&harness, &chair).await, 1);

    let cart: Value = harness
        .server
        .get("/v1/cart")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn over_stock_line_rejects_the_whole_cart() {
    let harness = TestHarness::new();
    harness.funded_user("1000.00").await;
    let lamp = harness.create_product("Lamp", "10.00", 5).await;
    let chair = harness.create_product("Chair", "25.00", 2).await;
    add_to_cart(&harness, &chair, 1).await;
    add_to_cart(&harness, &lamp, 10).await;

    let response = checkout_cart(&harness).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    assert_eq!(harness.balance_cents().await, 100_000);
    assert_eq!(count(&harness, &lamp).await, 5);
    assert_eq!(count(&harness, &chair).await, 2);
    assert!(orders(&harness).await.is_empty());

    let cart: Value = harness
        .server
        .get("/v1/cart")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn insufficient_funds_changes_nothing_and_keeps_the_promo() {
    let harness = TestHarness::new();
    harness.funded_user("20.00").await;
    harness.create_promo("SAVE10", 10).await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;
    add_to_cart(&harness, &product_id, 3).await;

    harness
        .server
        .post("/v1/cart/promo")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "code": "SAVE10" }))
        .await
        .assert_status_ok();

    let response = checkout_cart(&harness).await;
    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_funds");
    assert_eq!(body["error"]["details"]["balance"], 2_000);
    assert_eq!(body["error"]["details"]["required"], 2_700);

    assert_eq!(harness.balance_cents().await, 2_000);
    assert_eq!(count(&harness, &product_id).await, 5);
    assert!(orders(&harness).await.is_empty());

    let cart: Value = harness
        .server
        .get("/v1/cart")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(cart["promo_code"], "SAVE10");
}

#[tokio::test]
async fn next_checkout_after_a_discount_pays_full_price() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    harness.create_promo("SAVE10", 10).await;
    let product_id = harness.create_product("Lamp", "10.00", 10).await;

    harness
        .server
        .post("/v1/cart/promo")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "code": "SAVE10" }))
        .await
        .assert_status_ok();

    add_to_cart(&harness, &product_id, 3).await;
    let first: Value = checkout_cart(&harness).await.json();
    assert_eq!(first["total_cents"], 2_700);

    add_to_cart(&harness, &product_id, 3).await;
    let second: Value = checkout_cart(&harness).await.json();
    assert_eq!(second["total_cents"], 3_000);
    assert!(second["discount_percentage"].is_null());

    assert_eq!(harness.balance_cents().await, 10_000 - 2_700 - 3_000);
}

#[tokio::test]
async fn empty_cart_checkout_is_bad_request() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;

    checkout_cart(&harness).await.assert_status_bad_request();
}

#[tokio::test]
async fn exact_balance_is_enough() {
    let harness = TestHarness::new();
    harness.funded_user("30.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;

    buy_now(&harness, &product_id, 3).await.assert_status_ok();

    assert_eq!(harness.balance_cents().await, 0);
}

#[tokio::test]
async fn purchases_are_recorded_in_the_ledger() {
    let harness = TestHarness::new();
    harness.funded_user("100.00").await;
    let product_id = harness.create_product("Lamp", "10.00", 5).await;
    buy_now(&harness, &product_id, 2).await.assert_status_ok();

    let body: Value = harness
        .server
        .get("/v1/balance/entries")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "purchase");
    assert_eq!(entries[0]["amount_cents"], -2_000);
    assert_eq!(entries[0]["balance_after_cents"], 8_000);
}
