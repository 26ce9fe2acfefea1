//! `PostgreSQL` storage implementation.
//!
//! Identifiers are stored as text (ULIDs sort lexicographically by time) and
//! user ids as `UUID`. Checkout and deposit confirmation lock the rows they
//! read with `SELECT ... FOR UPDATE`: the buyer's account first, then products
//! in ascending id order, so concurrent checkouts cannot deadlock or oversell.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{query, Postgres, Row, Transaction};

use bazaar_core::{
    plan_checkout, username_key, Account, Category, CategoryId, CheckoutReceipt, CheckoutRequest,
    Comment, CommentId, Deposit, DepositId, DiscountPercent, EntryKind, LedgerEntry, Order,
    OrderId, Product, ProductId, ProductUpdate, ProfileUpdate, PromoCode, Reminder, Session,
    SessionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{DepositConfirmation, Store};

const ACCOUNT_COLUMNS: &str = "user_id, username, phone_number, tg_username, balance_cents, \
     lifetime_deposited_cents, lifetime_spent_cents, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, author_id, category_id, title, description, price_cents, \
     address, phone_number, tg_username, count, created_at, updated_at";

const COMMENT_COLUMNS: &str = "id, product_id, author_id, body, rating, created_at";

const PROMO_COLUMNS: &str = "code, discount_percentage, is_active, valid_until, created_at";

const DEPOSIT_COLUMNS: &str = "id, user_id, amount_cents, is_confirmed, created_at, confirmed_at";

const ORDER_COLUMNS: &str =
    "id, user_id, product_id, product_title, price_cents, quantity, created_at";

const LEDGER_COLUMNS: &str =
    "id, user_id, amount_cents, kind, balance_after_cents, description, created_at";

const REMINDER_COLUMNS: &str = "id, user_id, title, date, created_at";

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool. The schema must already be migrated.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `PostgreSQL` and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn lock_account(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> Result<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 FOR UPDATE");
        let row = query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::not_found("account", user_id))?;
        account_from_row(&row)
    }

    async fn lock_product(
        tx: &mut Transaction<'_, Postgres>,
        product_id: &ProductId,
    ) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        query(&sql)
            .bind(product_id.to_string())
            .fetch_optional(&mut **tx)
            .await?
            .map(|row| product_from_row(&row))
            .transpose()
    }

    async fn insert_ledger_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let sql = format!("INSERT INTO ledger_entries ({LEDGER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)");
        query(&sql)
            .bind(entry.id.to_string())
            .bind(*entry.user_id.as_uuid())
            .bind(entry.amount_cents)
            .bind(entry.kind.as_str())
            .bind(entry.balance_after_cents)
            .bind(&entry.description)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn write_account_balance(
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
    ) -> Result<()> {
        query(
            "UPDATE accounts SET balance_cents = $2, lifetime_deposited_cents = $3, \
             lifetime_spent_cents = $4, updated_at = $5 WHERE user_id = $1",
        )
        .bind(*account.user_id.as_uuid())
        .bind(account.balance_cents)
        .bind(account.lifetime_deposited_cents)
        .bind(account.lifetime_spent_cents)
        .bind(account.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_session<'e, E>(executor: E, session: &Session) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        query(
            "INSERT INTO sessions (id, data, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
        )
        .bind(session.id.as_str())
        .bind(Json(session))
        .bind(session.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &Account) -> Result<()> {
        let sql = format!(
            "INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (user_id) DO NOTHING"
        );
        let inserted = query(&sql)
            .bind(*account.user_id.as_uuid())
            .bind(&account.username)
            .bind(&account.phone_number)
            .bind(&account.tg_username)
            .bind(account.balance_cents)
            .bind(account.lifetime_deposited_cents)
            .bind(account.lifetime_spent_cents)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await
            .map_err(username_conflict)?
            .rows_affected();

        if inserted == 0 {
            return Err(StoreError::conflict("account already exists"));
        }
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1");
        query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let Some(key) = username_key(username) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username <> '' AND lower(username) = $1"
        );
        query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<Account> {
        let mut tx = self.pool.begin().await?;
        let mut account = Self::lock_account(&mut tx, user_id).await?;
        account.apply_profile(update)?;

        query(
            "UPDATE accounts SET username = $2, phone_number = $3, tg_username = $4, \
             updated_at = $5 WHERE user_id = $1",
        )
        .bind(*account.user_id.as_uuid())
        .bind(&account.username)
        .bind(&account.phone_number)
        .bind(&account.tg_username)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(username_conflict)?;

        tx.commit().await?;
        Ok(account)
    }

    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE user_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        query(&sql)
            .bind(*user_id.as_uuid())
            .bind(to_i64(limit))
            .bind(to_i64(offset))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(ledger_entry_from_row)
            .collect()
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn create_category(&self, category: &Category) -> Result<()> {
        let inserted = query(
            "INSERT INTO categories (id, name) VALUES ($1, $2) \
             ON CONFLICT ((lower(name))) DO NOTHING",
        )
        .bind(category.id.to_string())
        .bind(&category.name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::conflict(format!(
                "category {} already exists",
                category.name
            )));
        }
        Ok(())
    }

    async fn get_category(&self, category_id: &CategoryId) -> Result<Option<Category>> {
        query("SELECT id, name FROM categories WHERE id = $1")
            .bind(category_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| category_from_row(&row))
            .transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        query("SELECT id, name FROM categories ORDER BY lower(name)")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(category_from_row)
            .collect()
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        if self.get_category(&product.category_id).await?.is_none() {
            return Err(StoreError::not_found("category", product.category_id));
        }

        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        query(&sql)
            .bind(product.id.to_string())
            .bind(*product.author_id.as_uuid())
            .bind(product.category_id.to_string())
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price_cents)
            .bind(&product.address)
            .bind(&product.phone_number)
            .bind(&product.tg_username)
            .bind(i64::from(product.count))
            .bind(product.created_at)
            .bind(product.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        query(&sql)
            .bind(product_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| product_from_row(&row))
            .transpose()
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<String> = product_ids.iter().map(ToString::to_string).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        let mut found: HashMap<ProductId, Product> = query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| product_from_row(row).map(|p| (p.id, p)))
            .collect::<Result<_>>()?;

        Ok(product_ids
            .iter()
            .filter_map(|id| found.remove(id))
            .collect())
    }

    async fn update_product(
        &self,
        product_id: &ProductId,
        editor: &UserId,
        update: &ProductUpdate,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;

        let mut product = Self::lock_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.apply_update(editor, update)?;

        if update.category_id.is_some() {
            let exists = query("SELECT 1 FROM categories WHERE id = $1")
                .bind(product.category_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if !exists {
                return Err(StoreError::not_found("category", product.category_id));
            }
        }

        query(
            "UPDATE products SET category_id = $2, title = $3, description = $4, \
             price_cents = $5, address = $6, phone_number = $7, tg_username = $8, \
             count = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(product.id.to_string())
        .bind(product.category_id.to_string())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.address)
        .bind(&product.phone_number)
        .bind(&product.tg_username)
        .bind(i64::from(product.count))
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, product_id: &ProductId, requester: &UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let product = Self::lock_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.check_delete(requester)?;

        // Comments and saves cascade.
        query("DELETE FROM products WHERE id = $1")
            .bind(product_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Comment Operations
    // =========================================================================

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let sql = format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) \
             SELECT $1, $2, $3, $4, $5, $6 WHERE EXISTS (SELECT 1 FROM products WHERE id = $2)"
        );
        let inserted = query(&sql)
            .bind(comment.id.to_string())
            .bind(comment.product_id.to_string())
            .bind(*comment.author_id.as_uuid())
            .bind(&comment.body)
            .bind(i16::from(comment.rating))
            .bind(comment.created_at)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted == 0 {
            return Err(StoreError::not_found("product", comment.product_id));
        }
        Ok(())
    }

    async fn list_comments(&self, product_id: &ProductId) -> Result<Vec<Comment>> {
        let sql =
            format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE product_id = $1 ORDER BY id DESC");
        query(&sql)
            .bind(product_id.to_string())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(comment_from_row)
            .collect()
    }

    async fn delete_comment(
        &self,
        product_id: &ProductId,
        comment_id: &CommentId,
        requester: &UserId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND product_id = $2 FOR UPDATE"
        );
        let comment = query(&sql)
            .bind(comment_id.to_string())
            .bind(product_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| comment_from_row(&row))
            .transpose()?
            .ok_or_else(|| StoreError::not_found("comment", comment_id))?;
        comment.check_delete(requester)?;

        query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Saved Product Operations
    // =========================================================================

    async fn toggle_saved(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if Self::lock_product(&mut tx, product_id).await?.is_none() {
            return Err(StoreError::not_found("product", product_id));
        }

        let removed = query("DELETE FROM saved_products WHERE user_id = $1 AND product_id = $2")
            .bind(*user_id.as_uuid())
            .bind(product_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            query("INSERT INTO saved_products (user_id, product_id, saved_at) VALUES ($1, $2, $3)")
                .bind(*user_id.as_uuid())
                .bind(product_id.to_string())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed == 0)
    }

    async fn list_saved(&self, user_id: &UserId) -> Result<Vec<Product>> {
        let columns = PRODUCT_COLUMNS
            .split(", ")
            .map(|c| format!("p.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM saved_products s JOIN products p ON p.id = s.product_id \
             WHERE s.user_id = $1 ORDER BY s.saved_at DESC"
        );
        query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(product_from_row)
            .collect()
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let row = query("SELECT data FROM sessions WHERE id = $1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|row| row.try_get::<Json<Session>, _>("data"))
            .transpose()?
            .map(|json| json.0))
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        Self::upsert_session(&self.pool, session).await
    }

    async fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = query("DELETE FROM sessions WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    async fn create_reminder(&self, reminder: &Reminder) -> Result<()> {
        let sql = format!("INSERT INTO reminders ({REMINDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5)");
        query(&sql)
            .bind(reminder.id.to_string())
            .bind(*reminder.user_id.as_uuid())
            .bind(&reminder.title)
            .bind(reminder.date)
            .bind(reminder.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_reminders(&self, user_id: &UserId) -> Result<Vec<Reminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE user_id = $1 ORDER BY date, id"
        );
        query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(reminder_from_row)
            .collect()
    }

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    async fn create_promo_code(&self, promo: &PromoCode) -> Result<()> {
        let sql = format!(
            "INSERT INTO promo_codes (code_key, {PROMO_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (code_key) DO NOTHING"
        );
        let inserted = query(&sql)
            .bind(promo.key())
            .bind(&promo.code)
            .bind(i16::from(promo.discount_percentage.get()))
            .bind(promo.is_active)
            .bind(promo.valid_until)
            .bind(promo.created_at)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted == 0 {
            return Err(StoreError::conflict(format!(
                "promo code {} already exists",
                promo.code
            )));
        }
        Ok(())
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        let sql = format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code_key = $1");
        query(&sql)
            .bind(bazaar_core::normalize_code(code))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| promo_from_row(&row))
            .transpose()
    }

    async fn set_promo_code_active(&self, code: &str, is_active: bool) -> Result<PromoCode> {
        let sql = format!(
            "UPDATE promo_codes SET is_active = $2 WHERE code_key = $1 RETURNING {PROMO_COLUMNS}"
        );
        let row = query(&sql)
            .bind(bazaar_core::normalize_code(code))
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("promo code", code))?;
        promo_from_row(&row)
    }

    // =========================================================================
    // Deposit Operations
    // =========================================================================

    async fn create_deposit(&self, deposit: &Deposit) -> Result<()> {
        let sql = format!(
            "INSERT INTO deposits ({DEPOSIT_COLUMNS}) \
             SELECT $1, $2, $3, $4, $5, $6 WHERE EXISTS (SELECT 1 FROM accounts WHERE user_id = $2)"
        );
        let inserted = query(&sql)
            .bind(deposit.id.to_string())
            .bind(*deposit.user_id.as_uuid())
            .bind(deposit.amount_cents)
            .bind(deposit.is_confirmed)
            .bind(deposit.created_at)
            .bind(deposit.confirmed_at)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted == 0 {
            return Err(StoreError::not_found("account", deposit.user_id));
        }
        Ok(())
    }

    async fn list_deposits(&self, user_id: &UserId) -> Result<Vec<Deposit>> {
        let sql =
            format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE user_id = $1 ORDER BY id DESC");
        query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(deposit_from_row)
            .collect()
    }

    async fn list_pending_deposits(&self) -> Result<Vec<Deposit>> {
        let sql =
            format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE NOT is_confirmed ORDER BY id");
        query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(deposit_from_row)
            .collect()
    }

    async fn confirm_deposit(&self, deposit_id: &DepositId) -> Result<DepositConfirmation> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE id = $1 FOR UPDATE");
        let mut deposit = query(&sql)
            .bind(deposit_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| deposit_from_row(&row))
            .transpose()?
            .ok_or_else(|| StoreError::not_found("deposit", deposit_id))?;
        let mut account = Self::lock_account(&mut tx, &deposit.user_id).await?;

        let credited = deposit.confirm(Utc::now());
        if credited {
            account.credit_deposit(deposit.amount_cents)?;
            let entry = LedgerEntry::deposit(
                account.user_id,
                deposit.id,
                deposit.amount_cents,
                account.balance_cents,
            );

            query("UPDATE deposits SET is_confirmed = TRUE, confirmed_at = $2 WHERE id = $1")
                .bind(deposit.id.to_string())
                .bind(deposit.confirmed_at)
                .execute(&mut *tx)
                .await?;
            Self::write_account_balance(&mut tx, &account).await?;
            Self::insert_ledger_entry(&mut tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(DepositConfirmation {
            deposit,
            credited,
            balance_after_cents: account.balance_cents,
        })
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn list_orders(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        query(&sql)
            .bind(*user_id.as_uuid())
            .bind(to_i64(limit))
            .bind(to_i64(offset))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(order_from_row)
            .collect()
    }

    async fn delete_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let order = query(&sql)
            .bind(order_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| order_from_row(&row))
            .transpose()?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.check_owner(user_id)?;

        query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear_orders(&self, user_id: &UserId) -> Result<usize> {
        let removed = query("DELETE FROM orders WHERE user_id = $1")
            .bind(*user_id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn commit_checkout(
        &self,
        request: &CheckoutRequest,
        session_after: &Session,
    ) -> Result<CheckoutReceipt> {
        let mut tx = self.pool.begin().await?;

        let account = Self::lock_account(&mut tx, &request.user_id).await?;
        let mut products = HashMap::new();
        for id in request.product_ids() {
            if let Some(product) = Self::lock_product(&mut tx, &id).await? {
                products.insert(id, product);
            }
        }

        // Dropping `tx` on a rejection rolls back and releases the locks.
        let plan = plan_checkout(&account, &products, request)?;

        Self::write_account_balance(&mut tx, &plan.account).await?;
        for product in &plan.products {
            query("UPDATE products SET count = $2, updated_at = $3 WHERE id = $1")
                .bind(product.id.to_string())
                .bind(i64::from(product.count))
                .bind(product.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        let sql = format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)");
        for order in &plan.orders {
            query(&sql)
                .bind(order.id.to_string())
                .bind(*order.user_id.as_uuid())
                .bind(order.product_id.to_string())
                .bind(&order.product_title)
                .bind(order.price_cents)
                .bind(i64::from(order.quantity))
                .bind(order.created_at)
                .execute(&mut *tx)
                .await?;
        }
        Self::insert_ledger_entry(&mut tx, &plan.ledger_entry).await?;
        Self::upsert_session(&mut *tx, session_after).await?;

        tx.commit().await?;
        Ok(plan.receipt())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn corrupt(table: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table,
        reason: reason.to_string(),
    }
}

fn parse_id<T: FromStr>(table: &'static str, row: &PgRow, column: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| corrupt(table, format!("{column}: {e}")))
}

fn user_id(row: &PgRow, column: &str) -> Result<UserId> {
    Ok(UserId::from_uuid(row.try_get(column)?))
}

/// A unique violation on insert or update can only come from the username index.
fn username_conflict(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::conflict("username already taken")
        }
        _ => err.into(),
    }
}

fn to_u32(table: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|e| corrupt(table, e))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        user_id: user_id(row, "user_id")?,
        username: row.try_get("username")?,
        phone_number: row.try_get("phone_number")?,
        tg_username: row.try_get("tg_username")?,
        balance_cents: row.try_get("balance_cents")?,
        lifetime_deposited_cents: row.try_get("lifetime_deposited_cents")?,
        lifetime_spent_cents: row.try_get("lifetime_spent_cents")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn category_from_row(row: &PgRow) -> Result<Category> {
    Ok(Category {
        id: parse_id("categories", row, "id")?,
        name: row.try_get("name")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: parse_id("products", row, "id")?,
        author_id: user_id(row, "author_id")?,
        category_id: parse_id("products", row, "category_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price_cents: row.try_get("price_cents")?,
        address: row.try_get("address")?,
        phone_number: row.try_get("phone_number")?,
        tg_username: row.try_get("tg_username")?,
        count: to_u32("products", row.try_get("count")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    let rating: i16 = row.try_get("rating")?;
    Ok(Comment {
        id: parse_id("comments", row, "id")?,
        product_id: parse_id("comments", row, "product_id")?,
        author_id: user_id(row, "author_id")?,
        body: row.try_get("body")?,
        rating: u8::try_from(rating).map_err(|e| corrupt("comments", e))?,
        created_at: row.try_get("created_at")?,
    })
}

fn promo_from_row(row: &PgRow) -> Result<PromoCode> {
    let percentage: i16 = row.try_get("discount_percentage")?;
    let discount = u8::try_from(percentage)
        .map_err(|e| corrupt("promo_codes", e))
        .and_then(|p| DiscountPercent::try_from(p).map_err(|e| corrupt("promo_codes", e)))?;
    Ok(PromoCode {
        code: row.try_get("code")?,
        discount_percentage: discount,
        is_active: row.try_get("is_active")?,
        valid_until: row.try_get::<Option<DateTime<Utc>>, _>("valid_until")?,
        created_at: row.try_get("created_at")?,
    })
}

fn deposit_from_row(row: &PgRow) -> Result<Deposit> {
    Ok(Deposit {
        id: parse_id("deposits", row, "id")?,
        user_id: user_id(row, "user_id")?,
        amount_cents: row.try_get("amount_cents")?,
        is_confirmed: row.try_get("is_confirmed")?,
        created_at: row.try_get("created_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: parse_id("orders", row, "id")?,
        user_id: user_id(row, "user_id")?,
        product_id: parse_id("orders", row, "product_id")?,
        product_title: row.try_get("product_title")?,
        price_cents: row.try_get("price_cents")?,
        quantity: to_u32("orders", row.try_get("quantity")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn ledger_entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    Ok(LedgerEntry {
        id: parse_id("ledger_entries", row, "id")?,
        user_id: user_id(row, "user_id")?,
        amount_cents: row.try_get("amount_cents")?,
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| corrupt("ledger_entries", format!("unknown kind {kind}")))?,
        balance_after_cents: row.try_get("balance_after_cents")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn reminder_from_row(row: &PgRow) -> Result<Reminder> {
    Ok(Reminder {
        id: parse_id("reminders", row, "id")?,
        user_id: user_id(row, "user_id")?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{LineRequest, MarketError, NewAccount, NewProduct};

    async fn connect() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PgStore::connect(&url, 5).await.unwrap()
    }

    async fn seed(store: &PgStore, balance_cents: i64, count: u32) -> (Account, Product) {
        let mut account = Account::new(UserId::generate(), NewAccount::default()).unwrap();
        account.balance_cents = balance_cents;
        store.create_account(&account).await.unwrap();

        // Category names are unique, so make each test's name distinct.
        let name = CategoryId::generate().to_string()[..20].to_string();
        let category = Category::new(&name).unwrap();
        store.create_category(&category).await.unwrap();

        let product = Product::new(
            UserId::generate(),
            NewProduct {
                category_id: category.id,
                title: "Kettle".into(),
                description: String::new(),
                price_cents: 1000,
                address: String::new(),
                phone_number: String::new(),
                tg_username: String::new(),
                count,
            },
        )
        .unwrap();
        store.create_product(&product).await.unwrap();
        (account, product)
    }

    fn buy(account: &Account, product: &Product, quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            user_id: account.user_id,
            lines: vec![LineRequest {
                product_id: product.id,
                quantity,
            }],
            discount: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn checkout_commits_in_one_transaction() {
        let store = connect().await;
        let (account, product) = seed(&store, 10_000, 5).await;
        let session = Session::new(SessionId::for_user(&account.user_id));

        let receipt = store
            .commit_checkout(&buy(&account, &product, 3), &session)
            .await
            .unwrap();
        assert_eq!(receipt.balance_after_cents, 7000);
        assert_eq!(store.get_product(&product.id).await.unwrap().unwrap().count, 2);
        assert_eq!(store.list_orders(&account.user_id, 10, 0).await.unwrap().len(), 1);
        assert_eq!(store.get_session(&session.id).await.unwrap(), Some(session));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn rejected_checkout_rolls_back() {
        let store = connect().await;
        let (account, product) = seed(&store, 10_000, 5).await;
        let session = Session::new(SessionId::for_user(&account.user_id));

        let err = store
            .commit_checkout(&buy(&account, &product, 10), &session)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(MarketError::InsufficientStock { .. })
        ));
        let after = store.get_account(&account.user_id).await.unwrap().unwrap();
        assert_eq!(after.balance_cents, 10_000);
        assert_eq!(store.get_product(&product.id).await.unwrap().unwrap().count, 5);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_checkouts_cannot_oversell() {
        let store = connect().await;
        let (account, product) = seed(&store, 1_000_000, 1).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let request = buy(&account, &product, 1);
            let session = Session::new(SessionId::for_user(&account.user_id));
            handles.push(tokio::spawn(async move {
                store.commit_checkout(&request, &session).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.get_product(&product.id).await.unwrap().unwrap().count, 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn deposit_confirmation_credits_once() {
        let store = connect().await;
        let (account, _) = seed(&store, 0, 1).await;
        let deposit = Deposit::request(account.user_id, "25.50".parse().unwrap()).unwrap();
        store.create_deposit(&deposit).await.unwrap();

        assert!(store.confirm_deposit(&deposit.id).await.unwrap().credited);
        let second = store.confirm_deposit(&deposit.id).await.unwrap();
        assert!(!second.credited);
        assert_eq!(second.balance_after_cents, 2550);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn usernames_stay_unique_across_profile_updates() {
        let store = connect().await;
        let (first, _) = seed(&store, 0, 1).await;
        let (second, _) = seed(&store, 0, 1).await;
        let name = format!("user-{}", &first.user_id.to_string()[..8]);

        let update = ProfileUpdate {
            username: Some(name.clone()),
            ..ProfileUpdate::default()
        };
        store.update_profile(&first.user_id, &update).await.unwrap();
        let found = store
            .find_account_by_username(&name.to_uppercase())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, first.user_id);

        let err = store
            .update_profile(&second.user_id, &update)
            .await
            .unwrap_err();
        assert!(matches!(err.as_rejection(), Some(MarketError::Conflict(_))));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn reminders_list_in_day_order() {
        let store = connect().await;
        let (account, _) = seed(&store, 0, 1).await;
        let day = |d| chrono::NaiveDate::from_ymd_opt(2026, 5, d).unwrap();

        for (title, d) in [("later", 9), ("sooner", 2)] {
            let reminder = Reminder::new(account.user_id, title, day(d)).unwrap();
            store.create_reminder(&reminder).await.unwrap();
        }

        let titles: Vec<String> = store
            .list_reminders(&account.user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["sooner", "later"]);
    }
}
