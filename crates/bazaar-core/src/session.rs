//! Per-session state: the cart, the applied promo code and recently viewed products.
//!
//! Session state is owned by one browser session. It is passed explicitly into
//! the operations that read or change it and written back by the caller.
//!
//! A session started by an authenticated request records its owner. Only the
//! owner may read or change it afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::promo::AppliedPromo;
use crate::{ProductId, SessionId, UserId};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// Check a requested quantity.
///
/// # Errors
///
/// Returns `InvalidInput` for zero or more than [`MAX_LINE_QUANTITY`].
pub fn check_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(MarketError::invalid("quantity must be at least 1"));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(MarketError::invalid(format!(
            "quantity must be at most {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

/// A cart: product → requested quantity.
///
/// The cart is advisory. Stock is only checked at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: BTreeMap<ProductId, u32>,
}

impl Cart {
    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the quantity (or the merged line) is out of range.
    pub fn add(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        check_quantity(quantity)?;
        let current = self.lines.get(&product_id).copied().unwrap_or(0);
        let merged = current.saturating_add(quantity);
        check_quantity(merged)?;
        self.lines.insert(product_id, merged);
        Ok(merged)
    }

    /// Remove a product. Returns whether it was in the cart.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        self.lines.remove(product_id).is_some()
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Requested quantity for a product.
    #[must_use]
    pub fn quantity(&self, product_id: &ProductId) -> Option<u32> {
        self.lines.get(product_id).copied()
    }

    /// Lines in product-id order.
    pub fn lines(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.lines.iter().map(|(id, qty)| (*id, *qty))
    }
}

/// Everything a browser session carries between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,

    /// The user who started the session.
    #[serde(default)]
    pub owner: Option<UserId>,

    /// Products waiting to be checked out.
    #[serde(default)]
    pub cart: Cart,

    /// Discount to apply to the next checkout.
    #[serde(default)]
    pub promo: Option<AppliedPromo>,

    /// Products viewed in this session, oldest first.
    #[serde(default)]
    pub recently_viewed: Vec<ProductId>,

    /// When the session was last written.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh, empty session with no owner.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            owner: None,
            cart: Cart::default(),
            promo: None,
            recently_viewed: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// A fresh, empty session owned by `owner`.
    #[must_use]
    pub fn owned(id: SessionId, owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::new(id)
        }
    }

    /// Check that `user` may use this session.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the session is owned and `user` is anyone else,
    /// including an anonymous caller.
    pub fn check_access(&self, user: Option<&UserId>) -> Result<()> {
        match self.owner {
            Some(owner) if user != Some(&owner) => Err(MarketError::Forbidden(format!(
                "session {} belongs to another user",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Take ownership of an unowned session. An owned session is left as is.
    pub fn claim(&mut self, user: UserId) {
        if self.owner.is_none() {
            self.owner = Some(user);
        }
    }

    /// Whether the session has not been written since `cutoff`.
    #[must_use]
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }

    /// Record a product view. Returns false if it was already recorded.
    pub fn record_view(&mut self, product_id: ProductId) -> bool {
        if self.recently_viewed.contains(&product_id) {
            return false;
        }
        self.recently_viewed.push(product_id);
        self.touch();
        true
    }

    /// Drop the applied promo code, if any.
    pub fn clear_promo(&mut self) {
        self.promo = None;
        self.touch();
    }

    /// State after a successful cart checkout: no cart, no discount.
    #[must_use]
    pub fn after_cart_checkout(&self) -> Self {
        let mut next = self.clone();
        next.cart.clear();
        next.clear_promo();
        next
    }

    /// State after a successful buy-now: the discount is consumed, the cart stays.
    #[must_use]
    pub fn after_direct_purchase(&self) -> Self {
        let mut next = self.clone();
        next.clear_promo();
        next
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promo::DiscountPercent;

    fn session() -> Session {
        Session::new("s-1".parse().unwrap())
    }

    #[test]
    fn add_merges_quantities() {
        let mut cart = Cart::default();
        let product = ProductId::generate();

        assert_eq!(cart.add(product, 2).unwrap(), 2);
        assert_eq!(cart.add(product, 3).unwrap(), 5);
        assert_eq!(cart.quantity(&product), Some(5));
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn add_rejects_bad_quantities() {
        let mut cart = Cart::default();
        let product = ProductId::generate();

        assert!(cart.add(product, 0).is_err());
        cart.add(product, MAX_LINE_QUANTITY).unwrap();
        assert!(cart.add(product, 1).is_err());
        assert_eq!(cart.quantity(&product), Some(MAX_LINE_QUANTITY));
    }

    #[test]
    fn remove_and_clear() {
        let mut cart = Cart::default();
        let a = ProductId::generate();
        let b = ProductId::generate();
        cart.add(a, 1).unwrap();
        cart.add(b, 1).unwrap();

        assert!(cart.remove(&a));
        assert!(!cart.remove(&a));
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn cart_serializes_as_map() {
        let mut cart = Cart::default();
        let product = ProductId::generate();
        cart.add(product, 4).unwrap();

        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json[product.to_string()], 4);

        let parsed: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, cart);
    }

    #[test]
    fn record_view_is_deduplicated() {
        let mut session = session();
        let product = ProductId::generate();

        assert!(session.record_view(product));
        assert!(!session.record_view(product));
        assert_eq!(session.recently_viewed, vec![product]);
    }

    #[test]
    fn checkout_transitions() {
        let mut session = session();
        session.cart.add(ProductId::generate(), 1).unwrap();
        session.promo = Some(AppliedPromo {
            code: "SAVE10".into(),
            discount: DiscountPercent::try_from(10).unwrap(),
        });

        let after_cart = session.after_cart_checkout();
        assert!(after_cart.cart.is_empty());
        assert!(after_cart.promo.is_none());

        let after_direct = session.after_direct_purchase();
        assert_eq!(after_direct.cart.len(), 1);
        assert!(after_direct.promo.is_none());
    }

    #[test]
    fn owned_session_rejects_everyone_else() {
        let owner = UserId::generate();
        let session = Session::owned("s-1".parse().unwrap(), owner);

        assert!(session.check_access(Some(&owner)).is_ok());
        assert!(matches!(
            session.check_access(Some(&UserId::generate())),
            Err(MarketError::Forbidden(_))
        ));
        assert!(session.check_access(None).is_err());
    }

    #[test]
    fn claim_only_takes_unowned_sessions() {
        let first = UserId::generate();
        let second = UserId::generate();

        let mut session = session();
        assert!(session.check_access(None).is_ok());
        session.claim(first);
        session.claim(second);

        assert_eq!(session.owner, Some(first));
    }

    #[test]
    fn sessions_without_owner_field_still_load() {
        let json = serde_json::json!({
            "id": "s-1",
            "updated_at": "2026-01-01T00:00:00Z"
        });

        let session: Session = serde_json::from_value(json).unwrap();
        assert!(session.owner.is_none());
        assert!(session.is_idle_since(Utc::now()));
    }
}
