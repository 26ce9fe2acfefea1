//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Values are CBOR. Compound operations take `write_lock`, read what they need,
//! validate, and commit a single `WriteBatch`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use bazaar_core::{
    plan_checkout, sort_reminders, username_key, Account, Category, CategoryId, CheckoutReceipt,
    CheckoutRequest, Comment, CommentId, Deposit, DepositId, LedgerEntry, LedgerEntryId, Order,
    OrderId, Product, ProductId, ProductUpdate, ProfileUpdate, PromoCode, Reminder, ReminderId,
    SavedProduct, Session, SessionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{page, DepositConfirmation, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key, Self::serialize(value)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn batch_put<T: serde::Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key, Self::serialize(value)?);
        Ok(())
    }

    fn batch_index(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key, []); // Index entry (empty value)
        Ok(())
    }

    fn batch_delete(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.delete_cf(&cf, key);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    fn scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Record ids under an owner's index prefix, newest first.
    fn index_ids_newest_first(&self, cf_name: &str, owner: &[u8; 16]) -> Result<Vec<[u8; 16]>> {
        let mut ids: Vec<[u8; 16]> = self
            .scan(cf_name, &keys::owner_prefix(owner))?
            .into_iter()
            .filter_map(|(key, _)| keys::index_suffix(&key))
            .collect();
        ids.reverse();
        Ok(ids)
    }

    fn values<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        self.scan(cf_name, &[])?
            .into_iter()
            .map(|(_, value)| Self::deserialize(&value))
            .collect()
    }

    fn require_product(&self, product_id: &ProductId) -> Result<Product> {
        self.get(cf::PRODUCTS, &keys::id_key(product_id.to_bytes()))?
            .ok_or_else(|| StoreError::not_found("product", product_id))
    }

    /// The account holding a username, compared case-insensitively.
    fn account_with_username(&self, key: &str) -> Result<Option<Account>> {
        let accounts: Vec<Account> = self.values(cf::ACCOUNTS)?;
        Ok(accounts
            .into_iter()
            .find(|a| a.username_key().as_deref() == Some(key)))
    }

    fn check_username_free(&self, account: &Account) -> Result<()> {
        let Some(key) = account.username_key() else {
            return Ok(());
        };
        match self.account_with_username(&key)? {
            Some(holder) if holder.user_id != account.user_id => {
                Err(StoreError::conflict("username already taken"))
            }
            _ => Ok(()),
        }
    }

    fn require_category(&self, category_id: &CategoryId) -> Result<()> {
        self.get::<Category>(cf::CATEGORIES, &keys::id_key(category_id.to_bytes()))?
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("category", category_id))
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &Account) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::account_key(&account.user_id);
        if self.get::<Account>(cf::ACCOUNTS, &key)?.is_some() {
            return Err(StoreError::conflict("account already exists"));
        }
        self.check_username_free(account)?;
        self.put(cf::ACCOUNTS, &key, account)
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        match username_key(username) {
            Some(key) => self.account_with_username(&key),
            None => Ok(None),
        }
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<Account> {
        let _guard = self.write_lock.lock();
        let key = keys::account_key(user_id);
        let mut account: Account = self
            .get(cf::ACCOUNTS, &key)?
            .ok_or_else(|| StoreError::not_found("account", user_id))?;
        account.apply_profile(update)?;
        self.check_username_free(&account)?;
        self.put(cf::ACCOUNTS, &key, &account)?;
        Ok(account)
    }

    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let ids = self.index_ids_newest_first(cf::LEDGER_BY_USER, user_id.as_bytes())?;

        let mut entries = Vec::new();
        for id in page(ids, limit, offset) {
            let id = LedgerEntryId::from_bytes(id);
            if let Some(entry) = self.get(cf::LEDGER, &keys::id_key(id.to_bytes()))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn create_category(&self, category: &Category) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = category.key();
        let existing: Vec<Category> = self.values(cf::CATEGORIES)?;
        if existing.iter().any(|c| c.key() == key) {
            return Err(StoreError::conflict(format!(
                "category {} already exists",
                category.name
            )));
        }
        self.put(cf::CATEGORIES, &keys::id_key(category.id.to_bytes()), category)
    }

    async fn get_category(&self, category_id: &CategoryId) -> Result<Option<Category>> {
        self.get(cf::CATEGORIES, &keys::id_key(category_id.to_bytes()))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self.values(cf::CATEGORIES)?;
        categories.sort_by_key(Category::key);
        Ok(categories)
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.require_category(&product.category_id)?;
        self.put(cf::PRODUCTS, &keys::id_key(product.id.to_bytes()), product)
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        self.get(cf::PRODUCTS, &keys::id_key(product_id.to_bytes()))
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut products = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            if let Some(product) = self.get(cf::PRODUCTS, &keys::id_key(id.to_bytes()))? {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn update_product(
        &self,
        product_id: &ProductId,
        editor: &UserId,
        update: &ProductUpdate,
    ) -> Result<Product> {
        let _guard = self.write_lock.lock();
        if let Some(category_id) = &update.category_id {
            self.require_category(category_id)?;
        }
        let mut product = self.require_product(product_id)?;
        product.apply_update(editor, update)?;
        self.put(cf::PRODUCTS, &keys::id_key(product.id.to_bytes()), &product)?;
        Ok(product)
    }

    async fn delete_product(&self, product_id: &ProductId, requester: &UserId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let product = self.require_product(product_id)?;
        product.check_delete(requester)?;

        let mut batch = WriteBatch::default();
        self.batch_delete(&mut batch, cf::PRODUCTS, &keys::id_key(product_id.to_bytes()))?;

        let product_bytes = product_id.to_bytes();
        for (key, _) in self.scan(cf::COMMENTS_BY_PRODUCT, &keys::owner_prefix(&product_bytes))? {
            if let Some(comment_id) = keys::index_suffix(&key) {
                self.batch_delete(&mut batch, cf::COMMENTS, &keys::id_key(comment_id))?;
            }
            self.batch_delete(&mut batch, cf::COMMENTS_BY_PRODUCT, &key)?;
        }
        for (key, _) in self.scan(cf::SAVED, &[])? {
            if keys::index_suffix(&key) == Some(product_bytes) {
                self.batch_delete(&mut batch, cf::SAVED, &key)?;
            }
        }

        self.write(batch)
    }

    // =========================================================================
    // Comment Operations
    // =========================================================================

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.require_product(&comment.product_id)?;

        let mut batch = WriteBatch::default();
        self.batch_put(
            &mut batch,
            cf::COMMENTS,
            &keys::id_key(comment.id.to_bytes()),
            comment,
        )?;
        self.batch_index(
            &mut batch,
            cf::COMMENTS_BY_PRODUCT,
            &keys::index_key(&comment.product_id.to_bytes(), comment.id.to_bytes()),
        )?;
        self.write(batch)
    }

    async fn list_comments(&self, product_id: &ProductId) -> Result<Vec<Comment>> {
        let ids = self.index_ids_newest_first(cf::COMMENTS_BY_PRODUCT, &product_id.to_bytes())?;

        let mut comments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(comment) = self.get(cf::COMMENTS, &keys::id_key(id))? {
                comments.push(comment);
            }
        }
        Ok(comments)
    }

    async fn delete_comment(
        &self,
        product_id: &ProductId,
        comment_id: &CommentId,
        requester: &UserId,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let comment: Comment = self
            .get(cf::COMMENTS, &keys::id_key(comment_id.to_bytes()))?
            .filter(|c: &Comment| c.product_id == *product_id)
            .ok_or_else(|| StoreError::not_found("comment", comment_id))?;
        comment.check_delete(requester)?;

        let mut batch = WriteBatch::default();
        self.batch_delete(&mut batch, cf::COMMENTS, &keys::id_key(comment_id.to_bytes()))?;
        self.batch_delete(
            &mut batch,
            cf::COMMENTS_BY_PRODUCT,
            &keys::index_key(&product_id.to_bytes(), comment_id.to_bytes()),
        )?;
        self.write(batch)
    }

    // =========================================================================
    // Saved Product Operations
    // =========================================================================

    async fn toggle_saved(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.require_product(product_id)?;

        let key = keys::index_key(user_id.as_bytes(), product_id.to_bytes());
        if self.get::<SavedProduct>(cf::SAVED, &key)?.is_some() {
            let cf = self.cf(cf::SAVED)?;
            self.db
                .delete_cf(&cf, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            return Ok(false);
        }

        self.put(cf::SAVED, &key, &SavedProduct::new(*user_id, *product_id))?;
        Ok(true)
    }

    async fn list_saved(&self, user_id: &UserId) -> Result<Vec<Product>> {
        let mut saved: Vec<SavedProduct> = self
            .scan(cf::SAVED, &keys::owner_prefix(user_id.as_bytes()))?
            .into_iter()
            .map(|(_, value)| Self::deserialize(&value))
            .collect::<Result<_>>()?;
        saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));

        let ids: Vec<ProductId> = saved.iter().map(|s| s.product_id).collect();
        self.get_products(&ids).await
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        self.get(cf::SESSIONS, &keys::session_key(session_id))
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.put(cf::SESSIONS, &keys::session_key(&session.id), session)
    }

    async fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for (key, value) in self.scan(cf::SESSIONS, &[])? {
            let session: Session = Self::deserialize(&value)?;
            if session.is_idle_since(cutoff) {
                self.batch_delete(&mut batch, cf::SESSIONS, &key)?;
                removed += 1;
            }
        }
        self.write(batch)?;
        Ok(removed)
    }

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    async fn create_reminder(&self, reminder: &Reminder) -> Result<()> {
        let mut batch = WriteBatch::default();
        let id = reminder.id.to_bytes();
        self.batch_put(&mut batch, cf::REMINDERS, &keys::id_key(id), reminder)?;
        self.batch_index(
            &mut batch,
            cf::REMINDERS_BY_USER,
            &keys::index_key(reminder.user_id.as_bytes(), id),
        )?;
        self.write(batch)
    }

    async fn list_reminders(&self, user_id: &UserId) -> Result<Vec<Reminder>> {
        let mut reminders = Vec::new();
        for id in self.index_ids_newest_first(cf::REMINDERS_BY_USER, user_id.as_bytes())? {
            let id = ReminderId::from_bytes(id);
            if let Some(reminder) = self.get(cf::REMINDERS, &keys::id_key(id.to_bytes()))? {
                reminders.push(reminder);
            }
        }
        sort_reminders(&mut reminders);
        Ok(reminders)
    }

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    async fn create_promo_code(&self, promo: &PromoCode) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::promo_key(&promo.code);
        if self.get::<PromoCode>(cf::PROMO_CODES, &key)?.is_some() {
            return Err(StoreError::conflict(format!(
                "promo code {} already exists",
                promo.code
            )));
        }
        self.put(cf::PROMO_CODES, &key, promo)
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        self.get(cf::PROMO_CODES, &keys::promo_key(code))
    }

    async fn set_promo_code_active(&self, code: &str, is_active: bool) -> Result<PromoCode> {
        let _guard = self.write_lock.lock();
        let key = keys::promo_key(code);
        let mut promo: PromoCode = self
            .get(cf::PROMO_CODES, &key)?
            .ok_or_else(|| StoreError::not_found("promo code", code))?;
        promo.is_active = is_active;
        self.put(cf::PROMO_CODES, &key, &promo)?;
        Ok(promo)
    }

    // =========================================================================
    // Deposit Operations
    // =========================================================================

    async fn create_deposit(&self, deposit: &Deposit) -> Result<()> {
        if self.get_account(&deposit.user_id).await?.is_none() {
            return Err(StoreError::not_found("account", deposit.user_id));
        }

        let mut batch = WriteBatch::default();
        self.batch_put(
            &mut batch,
            cf::DEPOSITS,
            &keys::id_key(deposit.id.to_bytes()),
            deposit,
        )?;
        self.batch_index(
            &mut batch,
            cf::DEPOSITS_BY_USER,
            &keys::index_key(deposit.user_id.as_bytes(), deposit.id.to_bytes()),
        )?;
        self.write(batch)
    }

    async fn list_deposits(&self, user_id: &UserId) -> Result<Vec<Deposit>> {
        let ids = self.index_ids_newest_first(cf::DEPOSITS_BY_USER, user_id.as_bytes())?;

        let mut deposits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(deposit) = self.get(cf::DEPOSITS, &keys::id_key(id))? {
                deposits.push(deposit);
            }
        }
        Ok(deposits)
    }

    async fn list_pending_deposits(&self) -> Result<Vec<Deposit>> {
        let deposits: Vec<Deposit> = self.values(cf::DEPOSITS)?;
        Ok(deposits.into_iter().filter(|d| !d.is_confirmed).collect())
    }

    async fn confirm_deposit(&self, deposit_id: &DepositId) -> Result<DepositConfirmation> {
        let _guard = self.write_lock.lock();
        let deposit_key = keys::id_key(deposit_id.to_bytes());
        let mut deposit: Deposit = self
            .get(cf::DEPOSITS, &deposit_key)?
            .ok_or_else(|| StoreError::not_found("deposit", deposit_id))?;
        let account_key = keys::account_key(&deposit.user_id);
        let mut account: Account = self
            .get(cf::ACCOUNTS, &account_key)?
            .ok_or_else(|| StoreError::not_found("account", deposit.user_id))?;

        let credited = deposit.confirm(Utc::now());
        if credited {
            account.credit_deposit(deposit.amount_cents)?;
            let entry = LedgerEntry::deposit(
                account.user_id,
                deposit.id,
                deposit.amount_cents,
                account.balance_cents,
            );

            // Write atomically
            let mut batch = WriteBatch::default();
            self.batch_put(&mut batch, cf::DEPOSITS, &deposit_key, &deposit)?;
            self.batch_put(&mut batch, cf::ACCOUNTS, &account_key, &account)?;
            self.batch_put(&mut batch, cf::LEDGER, &keys::id_key(entry.id.to_bytes()), &entry)?;
            self.batch_index(
                &mut batch,
                cf::LEDGER_BY_USER,
                &keys::index_key(account.user_id.as_bytes(), entry.id.to_bytes()),
            )?;
            self.write(batch)?;
        }

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
        let ids = self.index_ids_newest_first(cf::ORDERS_BY_USER, user_id.as_bytes())?;

        let mut orders = Vec::new();
        for id in page(ids, limit, offset) {
            if let Some(order) = self.get(cf::ORDERS, &keys::id_key(id))? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn delete_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let order: Order = self
            .get(cf::ORDERS, &keys::id_key(order_id.to_bytes()))?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.check_owner(user_id)?;

        let mut batch = WriteBatch::default();
        self.batch_delete(&mut batch, cf::ORDERS, &keys::id_key(order_id.to_bytes()))?;
        self.batch_delete(
            &mut batch,
            cf::ORDERS_BY_USER,
            &keys::index_key(user_id.as_bytes(), order_id.to_bytes()),
        )?;
        self.write(batch)
    }

    async fn clear_orders(&self, user_id: &UserId) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let ids = self.index_ids_newest_first(cf::ORDERS_BY_USER, user_id.as_bytes())?;

        let mut batch = WriteBatch::default();
        for id in &ids {
            self.batch_delete(&mut batch, cf::ORDERS, &keys::id_key(*id))?;
            self.batch_delete(
                &mut batch,
                cf::ORDERS_BY_USER,
                &keys::index_key(user_id.as_bytes(), *id),
            )?;
        }
        self.write(batch)?;
        Ok(ids.len())
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn commit_checkout(
        &self,
        request: &CheckoutRequest,
        session_after: &Session,
    ) -> Result<CheckoutReceipt> {
        let _guard = self.write_lock.lock();

        let account: Account = self
            .get(cf::ACCOUNTS, &keys::account_key(&request.user_id))?
            .ok_or_else(|| StoreError::not_found("account", request.user_id))?;
        let mut products = HashMap::new();
        for id in request.product_ids() {
            if let Some(product) = self.get::<Product>(cf::PRODUCTS, &keys::id_key(id.to_bytes()))? {
                products.insert(id, product);
            }
        }

        let plan = plan_checkout(&account, &products, request)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        self.batch_put(
            &mut batch,
            cf::ACCOUNTS,
            &keys::account_key(&plan.account.user_id),
            &plan.account,
        )?;
        for product in &plan.products {
            self.batch_put(&mut batch, cf::PRODUCTS, &keys::id_key(product.id.to_bytes()), product)?;
        }
        for order in &plan.orders {
            self.batch_put(&mut batch, cf::ORDERS, &keys::id_key(order.id.to_bytes()), order)?;
            self.batch_index(
                &mut batch,
                cf::ORDERS_BY_USER,
                &keys::index_key(order.user_id.as_bytes(), order.id.to_bytes()),
            )?;
        }
        let entry = &plan.ledger_entry;
        self.batch_put(&mut batch, cf::LEDGER, &keys::id_key(entry.id.to_bytes()), entry)?;
        self.batch_index(
            &mut batch,
            cf::LEDGER_BY_USER,
            &keys::index_key(entry.user_id.as_bytes(), entry.id.to_bytes()),
        )?;
        self.batch_put(
            &mut batch,
            cf::SESSIONS,
            &keys::session_key(&session_after.id),
            session_after,
        )?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %request.user_id,
            orders = plan.orders.len(),
            "checkout batch written"
        );
        Ok(plan.receipt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{LineRequest, MarketError, NewAccount, NewProduct};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    async fn seed(store: &RocksStore, balance_cents: i64, count: u32) -> (Account, Product) {
        let mut account = Account::new(UserId::generate(), NewAccount::default()).unwrap();
        account.balance_cents = balance_cents;
        store.create_account(&account).await.unwrap();

        let category = Category::new("Books").unwrap();
        store.create_category(&category).await.unwrap();

        let product = Product::new(
            UserId::generate(),
            NewProduct {
                category_id: category.id,
                title: "Atlas".into(),
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
    async fn account_create_is_unique() {
        let (store, _dir) = create_test_store();
        let account = Account::new(UserId::generate(), NewAccount::default()).unwrap();

        store.create_account(&account).await.unwrap();
        let err = store.create_account(&account).await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(MarketError::Conflict(_))));

        let retrieved = store.get_account(&account.user_id).await.unwrap().unwrap();
        assert_eq!(retrieved, account);
    }

    #[tokio::test]
    async fn checkout_writes_one_batch() {
        let (store, _dir) = create_test_store();
        let (account, product) = seed(&store, 10_000, 5).await;
        let session = Session::new(SessionId::for_user(&account.user_id));

        let receipt = store
            .commit_checkout(&buy(&account, &product, 3), &session)
            .await
            .unwrap();
        assert_eq!(receipt.balance_after_cents, 7000);

        assert_eq!(store.get_product(&product.id).await.unwrap().unwrap().count, 2);
        let orders = store.list_orders(&account.user_id, 10, 0).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price_cents, 3000);
        let entries = store
            .list_ledger_entries(&account.user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(entries[0].balance_after_cents, 7000);
        assert!(store.get_session(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn insufficient_funds_writes_nothing() {
        let (store, _dir) = create_test_store();
        let (account, product) = seed(&store, 2000, 5).await;
        let session = Session::new(SessionId::for_user(&account.user_id));

        let err = store
            .commit_checkout(&buy(&account, &product, 3), &session)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(MarketError::InsufficientFunds {
                balance_cents: 2000,
                required_cents: 3000
            })
        ));

        assert_eq!(store.get_product(&product.id).await.unwrap().unwrap().count, 5);
        assert!(store.list_orders(&account.user_id, 10, 0).await.unwrap().is_empty());
        assert!(store.get_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn orders_list_newest_first_and_clear() {
        let (store, _dir) = create_test_store();
        let (account, product) = seed(&store, 10_000, 5).await;
        let session = Session::new(SessionId::for_user(&account.user_id));

        let first = store
            .commit_checkout(&buy(&account, &product, 1), &session)
            .await
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = store
            .commit_checkout(&buy(&account, &product, 2), &session)
            .await
            .unwrap();

        let page1 = store.list_orders(&account.user_id, 1, 0).await.unwrap();
        let page2 = store.list_orders(&account.user_id, 1, 1).await.unwrap();
        assert_eq!(page1[0].id, second.orders[0].id);
        assert_eq!(page2[0].id, first.orders[0].id);

        assert_eq!(store.clear_orders(&account.user_id).await.unwrap(), 2);
        assert!(store.list_orders(&account.user_id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deposit_confirmation_is_idempotent() {
        let (store, _dir) = create_test_store();
        let (account, _) = seed(&store, 0, 1).await;
        let deposit = Deposit::request(account.user_id, "12.345".parse().unwrap()).unwrap();
        store.create_deposit(&deposit).await.unwrap();

        assert!(store.confirm_deposit(&deposit.id).await.unwrap().credited);
        assert!(!store.confirm_deposit(&deposit.id).await.unwrap().credited);

        let account = store.get_account(&account.user_id).await.unwrap().unwrap();
        assert_eq!(account.balance_cents, 1235);
        assert!(store.list_pending_deposits().await.unwrap().is_empty());
        assert_eq!(store.list_deposits(&account.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn product_delete_removes_comments_and_saves() {
        let (store, _dir) = create_test_store();
        let (account, product) = seed(&store, 0, 1).await;

        let comment = Comment::new(product.id, account.user_id, "Great", 5).unwrap();
        store.add_comment(&comment).await.unwrap();
        assert!(store.toggle_saved(&account.user_id, &product.id).await.unwrap());
        assert_eq!(store.list_comments(&product.id).await.unwrap().len(), 1);

        store
            .delete_product(&product.id, &product.author_id)
            .await
            .unwrap();
        assert!(store.get_product(&product.id).await.unwrap().is_none());
        assert!(store.list_comments(&product.id).await.unwrap().is_empty());
        assert!(store.list_saved(&account.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_update_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            let (account, _) = seed(&store, 700, 1).await;
            let update = ProfileUpdate {
                username: Some("Seller".into()),
                ..ProfileUpdate::default()
            };
            store.update_profile(&account.user_id, &update).await.unwrap();
            account.user_id
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let found = store.find_account_by_username("seller").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.balance_cents, 700);
    }

    #[tokio::test]
    async fn reminders_and_session_pruning() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let day = |d: u32| chrono::NaiveDate::from_ymd_opt(2026, 7, d).unwrap();
        for (title, d) in [("second", 9), ("first", 3)] {
            let reminder = Reminder::new(user, title, day(d)).unwrap();
            store.create_reminder(&reminder).await.unwrap();
        }
        let listed = store.list_reminders(&user).await.unwrap();
        assert_eq!(listed[0].title, "first");
        assert_eq!(listed.len(), 2);

        let mut stale = Session::new("stale".parse().unwrap());
        stale.updated_at = Utc::now() - chrono::Duration::days(60);
        store.put_session(&stale).await.unwrap();
        store
            .put_session(&Session::new("fresh".parse().unwrap()))
            .await
            .unwrap();

        let removed = store
            .prune_sessions(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_session(&stale.id).await.unwrap().is_none());
    }
}
