//! In-memory storage implementation.
//!
//! Every table lives behind a single `RwLock`. Compound operations hold the
//! write lock from the first read to the last write, which makes them atomic
//! and serializes competing checkouts.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use bazaar_core::{
    normalize_code, plan_checkout, sort_reminders, username_key, Account, Category, CategoryId,
    CheckoutReceipt, CheckoutRequest, Comment, CommentId, Deposit, DepositId, LedgerEntry,
    LedgerEntryId, Order, OrderId, Product, ProductId, ProductUpdate, ProfileUpdate, PromoCode,
    Reminder, ReminderId, SavedProduct, Session, SessionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{page, DepositConfirmation, Store};

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    comments: BTreeMap<CommentId, Comment>,
    saved: BTreeMap<(UserId, ProductId), SavedProduct>,
    sessions: HashMap<SessionId, Session>,
    promo_codes: HashMap<String, PromoCode>,
    deposits: BTreeMap<DepositId, Deposit>,
    orders: BTreeMap<OrderId, Order>,
    ledger: BTreeMap<LedgerEntryId, LedgerEntry>,
    reminders: BTreeMap<ReminderId, Reminder>,
}

impl Tables {
    fn username_taken(&self, account: &Account) -> bool {
        let Some(key) = account.username_key() else {
            return false;
        };
        self.accounts.values().any(|a| {
            a.user_id != account.user_id && a.username_key().as_deref() == Some(key.as_str())
        })
    }
}

/// Storage held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &Account) -> Result<()> {
        let mut t = self.tables.write();
        if t.accounts.contains_key(&account.user_id) {
            return Err(StoreError::conflict("account already exists"));
        }
        if t.username_taken(account) {
            return Err(StoreError::conflict("username already taken"));
        }
        t.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.tables.read().accounts.get(user_id).cloned())
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let Some(key) = username_key(username) else {
            return Ok(None);
        };
        Ok(self
            .tables
            .read()
            .accounts
            .values()
            .find(|a| a.username_key().as_deref() == Some(key.as_str()))
            .cloned())
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<Account> {
        let mut t = self.tables.write();
        let mut account = t
            .accounts
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", user_id))?;
        account.apply_profile(update)?;
        if t.username_taken(&account) {
            return Err(StoreError::conflict("username already taken"));
        }
        t.accounts.insert(account.user_id, account.clone());
        Ok(account)
    }

    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let t = self.tables.read();
        let entries = t
            .ledger
            .values()
            .rev()
            .filter(|e| e.user_id == *user_id)
            .cloned();
        Ok(page(entries, limit, offset))
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn create_category(&self, category: &Category) -> Result<()> {
        let mut t = self.tables.write();
        let key = category.key();
        if t.categories.values().any(|c| c.key() == key) {
            return Err(StoreError::conflict(format!(
                "category {} already exists",
                category.name
            )));
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_category(&self, category_id: &CategoryId) -> Result<Option<Category>> {
        Ok(self.tables.read().categories.get(category_id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.tables.read().categories.values().cloned().collect();
        categories.sort_by_key(Category::key);
        Ok(categories)
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write();
        if !t.categories.contains_key(&product.category_id) {
            return Err(StoreError::not_found("category", product.category_id));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().products.get(product_id).cloned())
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let t = self.tables.read();
        Ok(product_ids
            .iter()
            .filter_map(|id| t.products.get(id).cloned())
            .collect())
    }

    async fn update_product(
        &self,
        product_id: &ProductId,
        editor: &UserId,
        update: &ProductUpdate,
    ) -> Result<Product> {
        let mut t = self.tables.write();
        if let Some(category_id) = update.category_id {
            if !t.categories.contains_key(&category_id) {
                return Err(StoreError::not_found("category", category_id));
            }
        }
        let product = t
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.apply_update(editor, update)?;
        Ok(product.clone())
    }

    async fn delete_product(&self, product_id: &ProductId, requester: &UserId) -> Result<()> {
        let mut t = self.tables.write();
        let product = t
            .products
            .get(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.check_delete(requester)?;

        t.products.remove(product_id);
        t.comments.retain(|_, c| c.product_id != *product_id);
        t.saved.retain(|(_, pid), _| pid != product_id);
        Ok(())
    }

    // =========================================================================
    // Comment Operations
    // =========================================================================

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let mut t = self.tables.write();
        if !t.products.contains_key(&comment.product_id) {
            return Err(StoreError::not_found("product", comment.product_id));
        }
        t.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn list_comments(&self, product_id: &ProductId) -> Result<Vec<Comment>> {
        let t = self.tables.read();
        Ok(t.comments
            .values()
            .rev()
            .filter(|c| c.product_id == *product_id)
            .cloned()
            .collect())
    }

    async fn delete_comment(
        &self,
        product_id: &ProductId,
        comment_id: &CommentId,
        requester: &UserId,
    ) -> Result<()> {
        let mut t = self.tables.write();
        let comment = t
            .comments
            .get(comment_id)
            .filter(|c| c.product_id == *product_id)
            .ok_or_else(|| StoreError::not_found("comment", comment_id))?;
        comment.check_delete(requester)?;
        t.comments.remove(comment_id);
        Ok(())
    }

    // =========================================================================
    // Saved Product Operations
    // =========================================================================

    async fn toggle_saved(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool> {
        let mut t = self.tables.write();
        if !t.products.contains_key(product_id) {
            return Err(StoreError::not_found("product", product_id));
        }
        let key = (*user_id, *product_id);
        if t.saved.remove(&key).is_some() {
            return Ok(false);
        }
        t.saved.insert(key, SavedProduct::new(*user_id, *product_id));
        Ok(true)
    }

    async fn list_saved(&self, user_id: &UserId) -> Result<Vec<Product>> {
        let t = self.tables.read();
        let mut saved: Vec<&SavedProduct> = t
            .saved
            .range((*user_id, ProductId::from_bytes([0; 16]))..)
            .take_while(|((uid, _), _)| uid == user_id)
            .map(|(_, s)| s)
            .collect();
        saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(saved
            .into_iter()
            .filter_map(|s| t.products.get(&s.product_id).cloned())
            .collect())
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        Ok(self.tables.read().sessions.get(session_id).cloned())
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.tables
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut t = self.tables.write();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| !s.is_idle_since(cutoff));
        Ok(before - t.sessions.len())
    }

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    async fn create_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.tables
            .write()
            .reminders
            .insert(reminder.id, reminder.clone());
        Ok(())
    }

    async fn list_reminders(&self, user_id: &UserId) -> Result<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .tables
            .read()
            .reminders
            .values()
            .filter(|r| r.user_id == *user_id)
            .cloned()
            .collect();
        sort_reminders(&mut reminders);
        Ok(reminders)
    }

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    async fn create_promo_code(&self, promo: &PromoCode) -> Result<()> {
        let mut t = self.tables.write();
        let key = promo.key();
        if t.promo_codes.contains_key(&key) {
            return Err(StoreError::conflict(format!(
                "promo code {} already exists",
                promo.code
            )));
        }
        t.promo_codes.insert(key, promo.clone());
        Ok(())
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        Ok(self
            .tables
            .read()
            .promo_codes
            .get(&normalize_code(code))
            .cloned())
    }

    async fn set_promo_code_active(&self, code: &str, is_active: bool) -> Result<PromoCode> {
        let mut t = self.tables.write();
        let promo = t
            .promo_codes
            .get_mut(&normalize_code(code))
            .ok_or_else(|| StoreError::not_found("promo code", code))?;
        promo.is_active = is_active;
        Ok(promo.clone())
    }

    // =========================================================================
    // Deposit Operations
    // =========================================================================

    async fn create_deposit(&self, deposit: &Deposit) -> Result<()> {
        let mut t = self.tables.write();
        if !t.accounts.contains_key(&deposit.user_id) {
            return Err(StoreError::not_found("account", deposit.user_id));
        }
        t.deposits.insert(deposit.id, deposit.clone());
        Ok(())
    }

    async fn list_deposits(&self, user_id: &UserId) -> Result<Vec<Deposit>> {
        let t = self.tables.read();
        Ok(t.deposits
            .values()
            .rev()
            .filter(|d| d.user_id == *user_id)
            .cloned()
            .collect())
    }

    async fn list_pending_deposits(&self) -> Result<Vec<Deposit>> {
        let t = self.tables.read();
        Ok(t.deposits
            .values()
            .filter(|d| !d.is_confirmed)
            .cloned()
            .collect())
    }

    async fn confirm_deposit(&self, deposit_id: &DepositId) -> Result<DepositConfirmation> {
        let mut t = self.tables.write();
        let mut deposit = t
            .deposits
            .get(deposit_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("deposit", deposit_id))?;
        let mut account = t
            .accounts
            .get(&deposit.user_id)
            .cloned()
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
            t.ledger.insert(entry.id, entry);
            t.deposits.insert(deposit.id, deposit.clone());
            t.accounts.insert(account.user_id, account.clone());
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
        let t = self.tables.read();
        let orders = t
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == *user_id)
            .cloned();
        Ok(page(orders, limit, offset))
    }

    async fn delete_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<()> {
        let mut t = self.tables.write();
        let order = t
            .orders
            .get(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.check_owner(user_id)?;
        t.orders.remove(order_id);
        Ok(())
    }

    async fn clear_orders(&self, user_id: &UserId) -> Result<usize> {
        let mut t = self.tables.write();
        let before = t.orders.len();
        t.orders.retain(|_, o| o.user_id != *user_id);
        Ok(before - t.orders.len())
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn commit_checkout(
        &self,
        request: &CheckoutRequest,
        session_after: &Session,
    ) -> Result<CheckoutReceipt> {
        let mut t = self.tables.write();

        let account = t
            .accounts
            .get(&request.user_id)
            .ok_or_else(|| StoreError::not_found("account", request.user_id))?;
        let products: HashMap<ProductId, Product> = request
            .product_ids()
            .into_iter()
            .filter_map(|id| t.products.get(&id).map(|p| (id, p.clone())))
            .collect();

        let plan = plan_checkout(account, &products, request)?;

        t.accounts.insert(plan.account.user_id, plan.account.clone());
        for product in &plan.products {
            t.products.insert(product.id, product.clone());
        }
        for order in &plan.orders {
            t.orders.insert(order.id, order.clone());
        }
        t.ledger
            .insert(plan.ledger_entry.id, plan.ledger_entry.clone());
        t.sessions
            .insert(session_after.id.clone(), session_after.clone());

        Ok(plan.receipt())
    }
}
