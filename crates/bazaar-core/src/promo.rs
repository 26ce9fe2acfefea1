//! Promo codes.
//!
//! A promo code grants a percentage discount on a whole checkout. Codes are
//! matched case-insensitively; the canonical spelling is the one the
//! administrator created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// Maximum length of a promo code.
pub const MAX_CODE_LEN: usize = 50;

/// A discount percentage between 1 and 100 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DiscountPercent(u8);

impl DiscountPercent {
    /// The percentage as an integer.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DiscountPercent {
    type Error = MarketError;

    fn try_from(value: u8) -> Result<Self> {
        if (1..=100).contains(&value) {
            Ok(Self(value))
        } else {
            Err(MarketError::invalid(
                "discount percentage must be between 1 and 100",
            ))
        }
    }
}

impl From<DiscountPercent> for u8 {
    fn from(value: DiscountPercent) -> Self {
        value.0
    }
}

/// A named percentage discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Canonical spelling of the code.
    pub code: String,

    /// Discount granted by the code.
    pub discount_percentage: DiscountPercent,

    /// Inactive codes are rejected.
    pub is_active: bool,

    /// Codes are rejected after this instant, when set.
    pub valid_until: Option<DateTime<Utc>>,

    /// When the code was created.
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Create a new active promo code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty, over-long or whitespace-containing code.
    pub fn new(
        code: &str,
        discount_percentage: DiscountPercent,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let code = code.trim();
        if code.is_empty() || code.len() > MAX_CODE_LEN {
            return Err(MarketError::invalid(format!(
                "promo code must be 1-{MAX_CODE_LEN} characters"
            )));
        }
        if code.chars().any(char::is_whitespace) {
            return Err(MarketError::invalid("promo code must not contain spaces"));
        }

        Ok(Self {
            code: code.to_string(),
            discount_percentage,
            is_active: true,
            valid_until,
            created_at: Utc::now(),
        })
    }

    /// Lookup key: codes compare case-insensitively.
    #[must_use]
    pub fn key(&self) -> String {
        normalize_code(&self.code)
    }

    /// Whether the code may be applied at `now`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_until.map_or(true, |until| now <= until)
    }

    /// Check the code and produce the session discount it grants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPromoCode` when the code is inactive or expired.
    pub fn redeem(&self, now: DateTime<Utc>) -> Result<AppliedPromo> {
        if !self.is_redeemable(now) {
            return Err(MarketError::InvalidPromoCode {
                code: self.code.clone(),
            });
        }
        Ok(AppliedPromo {
            code: self.code.clone(),
            discount: self.discount_percentage,
        })
    }
}

/// Normalize a code for case-insensitive lookup.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// A discount held in session state until a checkout consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromo {
    /// Canonical code that granted the discount.
    pub code: String,

    /// Percentage to take off the next checkout.
    pub discount: DiscountPercent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn save10() -> PromoCode {
        PromoCode::new("SAVE10", DiscountPercent::try_from(10).unwrap(), None).unwrap()
    }

    #[test]
    fn discount_percent_bounds() {
        assert!(DiscountPercent::try_from(0).is_err());
        assert!(DiscountPercent::try_from(1).is_ok());
        assert!(DiscountPercent::try_from(100).is_ok());
        assert!(DiscountPercent::try_from(101).is_err());
    }

    #[test]
    fn discount_percent_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<DiscountPercent>("0").is_err());
        let parsed: DiscountPercent = serde_json::from_str("25").unwrap();
        assert_eq!(parsed.get(), 25);
    }

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(save10().key(), normalize_code("  save10 "));
    }

    #[test]
    fn redeem_active_code() {
        let applied = save10().redeem(Utc::now()).unwrap();
        assert_eq!(applied.code, "SAVE10");
        assert_eq!(applied.discount.get(), 10);
    }

    #[test]
    fn inactive_code_is_rejected() {
        let mut code = save10();
        code.is_active = false;
        assert!(matches!(
            code.redeem(Utc::now()),
            Err(MarketError::InvalidPromoCode { .. })
        ));
    }

    #[test]
    fn expired_code_is_rejected() {
        let now = Utc::now();
        let mut code = save10();
        code.valid_until = Some(now - Duration::hours(1));
        assert!(!code.is_redeemable(now));

        code.valid_until = Some(now + Duration::hours(1));
        assert!(code.is_redeemable(now));
    }

    #[test]
    fn new_rejects_malformed_codes() {
        let pct = DiscountPercent::try_from(5).unwrap();
        assert!(PromoCode::new("", pct, None).is_err());
        assert!(PromoCode::new("TWO WORDS", pct, None).is_err());
        assert!(PromoCode::new(&"X".repeat(MAX_CODE_LEN + 1), pct, None).is_err());
    }
}
