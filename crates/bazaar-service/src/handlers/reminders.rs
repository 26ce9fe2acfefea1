//! Calendar reminder handlers. Reminders are private to their owner.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bazaar_core::Reminder;

use super::require_account;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Reminder response.
#[derive(Debug, Serialize)]
pub struct ReminderResponse {
    /// Reminder ID.
    pub id: String,
    /// What to remember.
    pub title: String,
    /// Day, as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Reminder> for ReminderResponse {
    fn from(reminder: &Reminder) -> Self {
        Self {
            id: reminder.id.to_string(),
            title: reminder.title.clone(),
            date: reminder.date,
            created_at: reminder.created_at.to_rfc3339(),
        }
    }
}

/// Create reminder request.
#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    /// What to remember.
    pub title: String,
    /// Day, as `YYYY-MM-DD`.
    pub date: NaiveDate,
}

/// Add a reminder to the current user's calendar.
pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<ReminderResponse>), ApiError> {
    require_account(state.store.as_ref(), &auth.user_id).await?;

    let reminder = Reminder::new(auth.user_id, &body.title, body.date)?;
    state.store.create_reminder(&reminder).await?;

    tracing::info!(
        user_id = %auth.user_id,
        reminder_id = %reminder.id,
        date = %reminder.date,
        "Reminder created"
    );

    Ok((StatusCode::CREATED, Json(ReminderResponse::from(&reminder))))
}

/// List the current user's reminders by day.
pub async fn list_reminders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ReminderResponse>>, ApiError> {
    let reminders = state.store.list_reminders(&auth.user_id).await?;
    Ok(Json(reminders.iter().map(ReminderResponse::from).collect()))
}
