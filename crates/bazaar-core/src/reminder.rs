//! Calendar reminders kept on a user's profile.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::account::check_len;
use crate::error::{MarketError, Result};
use crate::{ReminderId, UserId};

/// Maximum reminder title length.
pub const MAX_REMINDER_TITLE_LEN: usize = 255;

/// A dated note only its owner can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Reminder ID.
    pub id: ReminderId,
    /// Owner.
    pub user_id: UserId,
    /// What to remember.
    pub title: String,
    /// Calendar day the reminder is for.
    pub date: NaiveDate,
    /// When the reminder was created.
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Create a reminder.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or overlong title.
    pub fn new(user_id: UserId, title: &str, date: NaiveDate) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(MarketError::invalid("title must not be empty"));
        }
        check_len("title", title, MAX_REMINDER_TITLE_LEN)?;

        Ok(Self {
            id: ReminderId::generate(),
            user_id,
            title: title.to_string(),
            date,
            created_at: Utc::now(),
        })
    }
}

/// Order reminders by day, then by creation.
pub fn sort_reminders(reminders: &mut [Reminder]) {
    reminders.sort_by_key(|r| (r.date, r.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn title_is_trimmed_and_required() {
        let reminder = Reminder::new(UserId::generate(), "  pay rent ", day(1)).unwrap();
        assert_eq!(reminder.title, "pay rent");

        assert!(Reminder::new(UserId::generate(), "   ", day(1)).is_err());
        let long = "x".repeat(MAX_REMINDER_TITLE_LEN + 1);
        assert!(Reminder::new(UserId::generate(), &long, day(1)).is_err());
    }

    #[test]
    fn sorted_by_day_then_creation() {
        let user = UserId::generate();
        let late = Reminder::new(user, "late", day(20)).unwrap();
        let first = Reminder::new(user, "first", day(5)).unwrap();
        let second = Reminder::new(user, "second", day(5)).unwrap();

        let mut reminders = vec![late, second, first];
        sort_reminders(&mut reminders);

        let titles: Vec<&str> = reminders.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["first", "second", "late"]);
    }
}
