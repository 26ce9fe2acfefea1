//! Checkout planning.
//!
//! [`plan_checkout`] is the whole business rule of a purchase: given the
//! buyer's account and the current product rows it either rejects the request
//! or returns every record the purchase changes. It performs no I/O, so a
//! storage backend can call it while holding its locks and then persist the
//! plan in one atomic write.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::ledger::LedgerEntry;
use crate::order::Order;
use crate::pricing::{price_lines, Quote};
use crate::promo::DiscountPercent;
use crate::session::{check_quantity, Session};
use crate::{Account, OrderId, Product, ProductId, UserId};

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    /// Product to buy.
    pub product_id: ProductId,
    /// Units to buy.
    pub quantity: u32,
}

/// A purchase to validate and commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// The buyer.
    pub user_id: UserId,
    /// Lines in the order they are priced.
    pub lines: Vec<LineRequest>,
    /// Session discount, if one was applied.
    pub discount: Option<DiscountPercent>,
}

impl CheckoutRequest {
    /// Check out every line of the session cart with the session discount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the cart is empty.
    pub fn from_cart(user_id: UserId, session: &Session) -> Result<Self> {
        if session.cart.is_empty() {
            return Err(MarketError::invalid("cart is empty"));
        }
        Ok(Self {
            user_id,
            lines: session
                .cart
                .lines()
                .map(|(product_id, quantity)| LineRequest {
                    product_id,
                    quantity,
                })
                .collect(),
            discount: session.promo.as_ref().map(|p| p.discount),
        })
    }

    /// Buy a single product directly, with the session discount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero or oversized quantity.
    pub fn single(
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        session: &Session,
    ) -> Result<Self> {
        check_quantity(quantity)?;
        Ok(Self {
            user_id,
            lines: vec![LineRequest {
                product_id,
                quantity,
            }],
            discount: session.promo.as_ref().map(|p| p.discount),
        })
    }

    /// Distinct product ids in ascending order.
    ///
    /// Backends that lock rows lock them in this order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.lines.iter().map(|l| l.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Every change a validated checkout makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    /// The buyer's account with the total debited.
    pub account: Account,
    /// Purchased products with their stock decremented.
    pub products: Vec<Product>,
    /// One order per line.
    pub orders: Vec<Order>,
    /// The debit entry.
    pub ledger_entry: LedgerEntry,
    /// Pricing the plan was built from.
    pub quote: Quote,
}

impl CheckoutPlan {
    /// What the buyer is told after the plan was committed.
    #[must_use]
    pub fn receipt(&self) -> CheckoutReceipt {
        CheckoutReceipt {
            orders: self.orders.clone(),
            quote: self.quote.clone(),
            balance_after_cents: self.account.balance_cents,
        }
    }
}

/// Outcome of a committed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    /// Orders created.
    pub orders: Vec<Order>,
    /// Pricing that was charged.
    pub quote: Quote,
    /// Buyer's balance after the debit.
    pub balance_after_cents: i64,
}

/// Validate a checkout against current state and plan its effects.
///
/// Checks run in this order, and all of them run before anything is planned:
/// every product exists, every line is in stock, the balance covers the total.
///
/// # Errors
///
/// - `InvalidInput` for an empty request, a bad quantity or a repeated product.
/// - `NotFound` for a missing product.
/// - `InsufficientStock` naming the first line that cannot be fulfilled.
/// - `InsufficientFunds` with the required total.
pub fn plan_checkout(
    account: &Account,
    products: &HashMap<ProductId, Product>,
    request: &CheckoutRequest,
) -> Result<CheckoutPlan> {
    if request.lines.is_empty() {
        return Err(MarketError::invalid("nothing to check out"));
    }

    let mut seen = HashSet::with_capacity(request.lines.len());
    for line in &request.lines {
        check_quantity(line.quantity)?;
        if !seen.insert(line.product_id) {
            return Err(MarketError::invalid(format!(
                "product {} appears more than once",
                line.product_id
            )));
        }
    }

    let mut priced = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| MarketError::not_found("product", line.product_id))?;
        priced.push((product, line.quantity));
    }

    for (product, quantity) in &priced {
        if product.count < *quantity {
            return Err(MarketError::InsufficientStock {
                product_id: product.id.to_string(),
                title: product.title.clone(),
                available: product.count,
                requested: *quantity,
            });
        }
    }

    let quote = price_lines(&priced, request.discount)?;

    let mut account = account.clone();
    account.debit_purchase(quote.total_cents)?;

    let now = Utc::now();
    let mut updated = Vec::with_capacity(priced.len());
    let mut orders = Vec::with_capacity(priced.len());
    for ((product, quantity), line) in priced.iter().zip(&quote.lines) {
        let mut product = (*product).clone();
        product.count -= quantity;
        product.updated_at = now;

        orders.push(Order {
            id: OrderId::generate(),
            user_id: request.user_id,
            product_id: product.id,
            product_title: product.title.clone(),
            price_cents: line.charged_cents,
            quantity: *quantity,
            created_at: now,
        });
        updated.push(product);
    }

    let ledger_entry = LedgerEntry::purchase(
        request.user_id,
        quote.total_cents,
        account.balance_cents,
        orders.len(),
    );

    Ok(CheckoutPlan {
        account,
        products: updated,
        orders,
        ledger_entry,
        quote,
    })
}
