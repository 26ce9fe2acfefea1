//! Account types for bazaar.
//!
//! An account holds the profile a marketplace user shows to buyers and the
//! internal balance used to pay for purchases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::money::{format_cents, MAX_AMOUNT_CENTS};
use crate::UserId;

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 150;
/// Maximum phone number length.
pub const MAX_PHONE_LEN: usize = 17;
/// Maximum Telegram username length.
pub const MAX_TG_USERNAME_LEN: usize = 150;

/// A marketplace account.
///
/// The balance is an internal ledger value: it only grows through confirmed
/// deposits and only shrinks through checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Display name.
    pub username: String,

    /// Contact phone number.
    pub phone_number: String,

    /// Telegram handle.
    pub tg_username: String,

    /// Current balance in cents. Never negative.
    pub balance_cents: i64,

    /// Lifetime confirmed deposits (in cents).
    pub lifetime_deposited_cents: i64,

    /// Lifetime purchases (in cents).
    pub lifetime_spent_cents: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Profile fields supplied when an account is registered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Contact phone number.
    #[serde(default)]
    pub phone_number: String,
    /// Telegram handle.
    #[serde(default)]
    pub tg_username: String,
}

/// Profile fields a user may change later. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    pub username: Option<String>,
    /// New contact phone number.
    pub phone_number: Option<String>,
    /// New Telegram handle.
    pub tg_username: Option<String>,
}

/// Lookup key for a username: trimmed and lowercased. Empty names have none.
#[must_use]
pub fn username_key(username: &str) -> Option<String> {
    let key = username.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

impl Account {
    /// Create a new account with zero balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when a profile field is too long.
    pub fn new(user_id: UserId, profile: NewAccount) -> Result<Self> {
        check_len("username", &profile.username, MAX_USERNAME_LEN)?;
        check_len("phone_number", &profile.phone_number, MAX_PHONE_LEN)?;
        check_len("tg_username", &profile.tg_username, MAX_TG_USERNAME_LEN)?;

        let now = Utc::now();
        Ok(Self {
            user_id,
            username: profile.username.trim().to_string(),
            phone_number: profile.phone_number.trim().to_string(),
            tg_username: profile.tg_username.trim().to_string(),
            balance_cents: 0,
            lifetime_deposited_cents: 0,
            lifetime_spent_cents: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a profile update.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` and leaves the account untouched when a field is
    /// too long.
    pub fn apply_profile(&mut self, update: &ProfileUpdate) -> Result<()> {
        let fields = [
            ("username", &update.username, MAX_USERNAME_LEN),
            ("phone_number", &update.phone_number, MAX_PHONE_LEN),
            ("tg_username", &update.tg_username, MAX_TG_USERNAME_LEN),
        ];
        for (field, value, max) in fields {
            if let Some(value) = value {
                check_len(field, value, max)?;
            }
        }

        if let Some(username) = &update.username {
            self.username = username.trim().to_string();
        }
        if let Some(phone_number) = &update.phone_number {
            self.phone_number = phone_number.trim().to_string();
        }
        if let Some(tg_username) = &update.tg_username {
            self.tg_username = tg_username.trim().to_string();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Lookup key of this account's username, if it has one.
    #[must_use]
    pub fn username_key(&self) -> Option<String> {
        username_key(&self.username)
    }

    /// Check if the balance covers an amount.
    #[must_use]
    pub fn has_sufficient_funds(&self, amount_cents: i64) -> bool {
        self.balance_cents >= amount_cents
    }

    /// Credit a confirmed deposit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` and leaves the account untouched if the new
    /// balance would exceed [`MAX_AMOUNT_CENTS`].
    pub fn credit_deposit(&mut self, amount_cents: i64) -> Result<()> {
        let balance = self
            .balance_cents
            .checked_add(amount_cents)
            .filter(|b| *b <= MAX_AMOUNT_CENTS)
            .ok_or_else(|| {
                MarketError::invalid(format!(
                    "balance would exceed {}",
                    format_cents(MAX_AMOUNT_CENTS)
                ))
            })?;
        self.balance_cents = balance;
        self.lifetime_deposited_cents = self.lifetime_deposited_cents.saturating_add(amount_cents);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Debit a purchase.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` and leaves the account untouched if the
    /// balance does not cover the amount.
    pub fn debit_purchase(&mut self, amount_cents: i64) -> Result<()> {
        if !self.has_sufficient_funds(amount_cents) {
            return Err(MarketError::InsufficientFunds {
                balance_cents: self.balance_cents,
                required_cents: amount_cents,
            });
        }
        self.balance_cents -= amount_cents;
        self.lifetime_spent_cents += amount_cents;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Reject a field longer than `max` characters.
pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().chars().count() > max {
        return Err(MarketError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(UserId::generate(), NewAccount::default()).unwrap()
    }

    #[test]
    fn new_account_has_zero_balance() {
        let account = account();
        assert_eq!(account.balance_cents, 0);
        assert_eq!(account.lifetime_deposited_cents, 0);
        assert_eq!(account.lifetime_spent_cents, 0);
    }

    #[test]
    fn account_sufficient_funds() {
        let mut account = account();
        account.balance_cents = 1000;

        assert!(account.has_sufficient_funds(500));
        assert!(account.has_sufficient_funds(1000));
        assert!(!account.has_sufficient_funds(1001));
    }

    #[test]
    fn debit_never_goes_negative() {
        let mut account = account();
        account.credit_deposit(1000).unwrap();

        let err = account.debit_purchase(1500).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientFunds {
                balance_cents: 1000,
                required_cents: 1500
            }
        );
        assert_eq!(account.balance_cents, 1000);

        account.debit_purchase(1000).unwrap();
        assert_eq!(account.balance_cents, 0);
        assert_eq!(account.lifetime_spent_cents, 1000);
    }

    #[test]
    fn rejects_long_phone_number() {
        let profile = NewAccount {
            phone_number: "1".repeat(MAX_PHONE_LEN + 1),
            ..NewAccount::default()
        };
        assert!(Account::new(UserId::generate(), profile).is_err());
    }

    #[test]
    fn deposit_cannot_push_balance_past_the_cap() {
        let mut account = account();
        account.credit_deposit(MAX_AMOUNT_CENTS - 100).unwrap();

        assert!(matches!(
            account.credit_deposit(101),
            Err(MarketError::InvalidInput(_))
        ));
        assert_eq!(account.balance_cents, MAX_AMOUNT_CENTS - 100);

        account.credit_deposit(100).unwrap();
        assert_eq!(account.balance_cents, MAX_AMOUNT_CENTS);
    }

    #[test]
    fn profile_update_changes_only_given_fields() {
        let mut account = account();
        account.balance_cents = 500;

        account
            .apply_profile(&ProfileUpdate {
                username: Some("  Alice ".into()),
                tg_username: Some("@alice".into()),
                ..ProfileUpdate::default()
            })
            .unwrap();

        assert_eq!(account.username, "Alice");
        assert_eq!(account.tg_username, "@alice");
        assert_eq!(account.phone_number, "");
        assert_eq!(account.balance_cents, 500);
        assert_eq!(account.username_key().as_deref(), Some("alice"));
    }

    #[test]
    fn invalid_profile_update_changes_nothing() {
        let mut account = account();

        let result = account.apply_profile(&ProfileUpdate {
            username: Some("bob".into()),
            phone_number: Some("1".repeat(MAX_PHONE_LEN + 1)),
            ..ProfileUpdate::default()
        });

        assert!(result.is_err());
        assert_eq!(account.username, "");
        assert!(account.username_key().is_none());
    }
}
