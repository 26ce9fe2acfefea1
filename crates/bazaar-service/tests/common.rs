//! Common test utilities for bazaar integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use bazaar_core::UserId;
use bazaar_service::{create_router, AppState, ServiceConfig};
use bazaar_store::{MemoryStore, Store};

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle on the store, for asserting on persisted state.
    pub store: Arc<MemoryStore>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The admin API key.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with an empty store.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            allow_test_tokens: true,
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };

        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            store,
            test_user_id,
            admin_api_key,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        auth_header(&self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        auth_header(&UserId::generate())
    }

    // =========================================================================
    // Seeding through the API
    // =========================================================================

    /// Register an account for `user`.
    pub async fn create_account(&self, user: &UserId) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", auth_header(user))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    /// Create a category and return its ID.
    pub async fn create_category(&self, name: &str) -> String {
        let response = self
            .server
            .post("/v1/admin/categories")
            .add_header("x-api-key", self.admin_api_key.clone())
            .json(&json!({ "name": name }))
            .await;
        response.assert_status(StatusCode::CREATED);
        id_of(&response.json())
    }

    /// List a product sold by a fresh seller and return its ID.
    pub async fn create_product(&self, title: &str, price: &str, count: u32) -> String {
        let name = format!("cat-{}", &UserId::generate().to_string()[..8]);
        let category_id = self.create_category(&name).await;
        let seller = UserId::generate();
        self.create_product_as(&seller, &category_id, title, price, count)
            .await
    }

    /// List a product as `seller` and return its ID.
    pub async fn create_product_as(
        &self,
        seller: &UserId,
        category_id: &str,
        title: &str,
        price: &str,
        count: u32,
    ) -> String {
        let response = self
            .server
            .post("/v1/products")
            .add_header("authorization", auth_header(seller))
            .json(&json!({
                "category_id": category_id,
                "title": title,
                "description": "test listing",
                "price": price,
                "address": "Market St 1",
                "count": count
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        id_of(&response.json())
    }

    /// Request a deposit for `user` and confirm it.
    pub async fn fund(&self, user: &UserId, amount: &str) {
        let deposit_id = self.request_deposit(user, amount).await;
        self.server
            .post(&format!("/v1/admin/deposits/{deposit_id}/confirm"))
            .add_header("x-api-key", self.admin_api_key.clone())
            .await
            .assert_status_ok();
    }

    /// Request a deposit for `user` and return its ID.
    pub async fn request_deposit(&self, user: &UserId, amount: &str) -> String {
        let response = self
            .server
            .post("/v1/deposits")
            .add_header("authorization", auth_header(user))
            .json(&json!({ "amount": amount }))
            .await;
        response.assert_status(StatusCode::CREATED);
        id_of(&response.json())
    }

    /// Create a promo code.
    pub async fn create_promo(&self, code: &str, discount_percentage: u8) {
        self.server
            .post("/v1/admin/promo-codes")
            .add_header("x-api-key", self.admin_api_key.clone())
            .json(&json!({ "code": code, "discount_percentage": discount_percentage }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    /// Balance of the test user in cents.
    pub async fn balance_cents(&self) -> i64 {
        let response = self
            .server
            .get("/v1/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json::<Value>()["balance_cents"]
            .as_i64()
            .expect("balance_cents")
    }

    /// Current product detail.
    pub async fn product(&self, product_id: &str) -> Value {
        let response = self
            .server
            .get(&format!("/v1/products/{product_id}"))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// An account for the test user holding `amount`.
    pub async fn funded_user(&self, amount: &str) {
        self.create_account(&self.test_user_id).await;
        self.fund(&self.test_user_id, amount).await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bearer header for `user` using the test token format.
pub fn auth_header(user: &UserId) -> String {
    format!("Bearer test-token:{user}")
}

fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("id in response").to_string()
}
