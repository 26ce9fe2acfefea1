//! Deposit requests.
//!
//! A user asks to top up their balance; an administrator confirms the request
//! once the money has arrived out of band. Confirmation credits the balance
//! exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::money::cents_from_decimal;
use crate::{DepositId, UserId};

/// A request to add funds to a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit ID.
    pub id: DepositId,
    /// Whose balance will be credited.
    pub user_id: UserId,
    /// Requested amount in cents.
    pub amount_cents: i64,
    /// Set once the funds were received.
    pub is_confirmed: bool,
    /// When the request was made.
    pub created_at: DateTime<Utc>,
    /// When the request was confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Deposit {
    /// Create an unconfirmed deposit request.
    ///
    /// The amount is rounded half-up to two places first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` unless the rounded amount is positive and in range.
    pub fn request(user_id: UserId, amount: Decimal) -> Result<Self> {
        let amount_cents = cents_from_decimal(amount)?;
        if amount_cents == 0 {
            return Err(MarketError::invalid("deposit amount must be positive"));
        }

        Ok(Self {
            id: DepositId::generate(),
            user_id,
            amount_cents,
            is_confirmed: false,
            created_at: Utc::now(),
            confirmed_at: None,
        })
    }

    /// Mark the deposit confirmed.
    ///
    /// Returns true only on the false→true transition, i.e. when the caller
    /// owes the user a credit. Confirming again is a no-op returning false.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_confirmed {
            return false;
        }
        self.is_confirmed = true;
        self.confirmed_at = Some(now);
        true
    }
}
