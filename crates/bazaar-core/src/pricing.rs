//! Checkout pricing.
//!
//! The debited total is the discounted base total rounded once. Each order line
//! is discounted and rounded on its own, so the sum of line prices may differ
//! from the total by a cent.

use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::money::{apply_discount, line_total};
use crate::promo::DiscountPercent;
use crate::{Product, ProductId};

/// One priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotedLine {
    /// The product.
    pub product_id: ProductId,
    /// Product title at pricing time.
    pub title: String,
    /// Unit price in cents.
    pub unit_price_cents: i64,
    /// Requested quantity.
    pub quantity: u32,
    /// `unit_price * quantity`.
    pub base_cents: i64,
    /// What this line is charged after the discount.
    pub charged_cents: i64,
}

/// A priced set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Priced lines, in request order.
    pub lines: Vec<QuotedLine>,
    /// Sum of line base prices.
    pub base_total_cents: i64,
    /// Discount applied, if any.
    pub discount: Option<DiscountPercent>,
    /// `base_total - total`.
    pub discount_cents: i64,
    /// Amount to debit.
    pub total_cents: i64,
}

/// Price `(product, quantity)` lines with an optional discount.
///
/// # Errors
///
/// Returns `InvalidInput` if an amount overflows.
pub fn price_lines(lines: &[(&Product, u32)], discount: Option<DiscountPercent>) -> Result<Quote> {
    let mut quoted = Vec::with_capacity(lines.len());
    let mut base_total_cents: i64 = 0;

    for (product, quantity) in lines {
        let base_cents = line_total(product.price_cents, *quantity)?;
        let charged_cents = match discount {
            Some(d) => apply_discount(base_cents, d)?,
            None => base_cents,
        };
        base_total_cents = base_total_cents
            .checked_add(base_cents)
            .ok_or_else(|| MarketError::invalid("cart total is out of range"))?;

        quoted.push(QuotedLine {
            product_id: product.id,
            title: product.title.clone(),
            unit_price_cents: product.price_cents,
            quantity: *quantity,
            base_cents,
            charged_cents,
        });
    }

    let total_cents = match discount {
        Some(d) => apply_discount(base_total_cents, d)?,
        None => base_total_cents,
    };

    Ok(Quote {
        lines: quoted,
        base_total_cents,
        discount,
        discount_cents: base_total_cents - total_cents,
        total_cents,
    })
}
