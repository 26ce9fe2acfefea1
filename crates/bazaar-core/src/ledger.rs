//! Balance ledger entries.
//!
//! Every change to an account's balance appends a ledger entry in the same
//! atomic write as the balance change itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::format_cents;
use crate::{DepositId, LedgerEntryId, UserId};

/// A ledger entry representing a balance change.
///
/// Entry IDs are ULIDs, so listing by ID is listing by time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: LedgerEntryId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Amount in cents. Positive = credit, Negative = debit.
    pub amount_cents: i64,

    /// What caused the change.
    pub kind: EntryKind,

    /// Balance after this entry (in cents).
    pub balance_after_cents: i64,

    /// Human-readable description.
    pub description: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Entry for a confirmed deposit.
    #[must_use]
    pub fn deposit(
        user_id: UserId,
        deposit_id: DepositId,
        amount_cents: i64,
        balance_after_cents: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            amount_cents,
            kind: EntryKind::Deposit,
            balance_after_cents,
            description: format!("Deposit {deposit_id} confirmed"),
            created_at: Utc::now(),
        }
    }

    /// Entry for a checkout debit.
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        amount_cents: i64,
        balance_after_cents: i64,
        line_count: usize,
    ) -> Self {
        let noun = if line_count == 1 { "item" } else { "items" };
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            amount_cents: -amount_cents.abs(), // Always negative for purchases
            kind: EntryKind::Purchase,
            balance_after_cents,
            description: format!(
                "Purchase of {line_count} {noun} for {}",
                format_cents(amount_cents.abs())
            ),
            created_at: Utc::now(),
        }
    }
}

/// Cause of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A deposit was confirmed.
    Deposit,

    /// A checkout was paid.
    Purchase,
}

impl EntryKind {
    /// Check if this entry kind adds funds.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Deposit)
    }

    /// Stable lowercase name, used by storage backends.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Purchase => "purchase",
        }
    }

    /// Parse the name produced by [`EntryKind::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(Self::Deposit),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_entry() {
        let user_id = UserId::generate();
        let entry = LedgerEntry::deposit(user_id, DepositId::generate(), 5000, 5000);

        assert_eq!(entry.amount_cents, 5000);
        assert_eq!(entry.kind, EntryKind::Deposit);
        assert_eq!(entry.balance_after_cents, 5000);
    }

    #[test]
    fn purchase_entry_is_negative() {
        let user_id = UserId::generate();
        let entry = LedgerEntry::purchase(user_id, 2700, 7300, 1);

        assert_eq!(entry.amount_cents, -2700);
        assert_eq!(entry.kind, EntryKind::Purchase);
        assert_eq!(entry.description, "Purchase of 1 item for 27.00");
    }

    #[test]
    fn entry_kind_names_roundtrip() {
        for kind in [EntryKind::Deposit, EntryKind::Purchase] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
        assert!(EntryKind::Deposit.is_credit());
        assert!(!EntryKind::Purchase.is_credit());
    }
}
