//! Browser session resolution.
//!
//! A request names its session with the `x-session-id` header. Authenticated
//! requests without the header fall back to the user's default session.
//!
//! Sessions are only started by authenticated requests and belong to the user
//! who started them. Anonymous requests may read an existing unowned session
//! but never create one. Sessions idle past the configured TTL are pruned in
//! the background.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;

use bazaar_core::ids::USER_SESSION_PREFIX;
use bazaar_core::{Session, SessionId, UserId};
use bazaar_store::{Store, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the browser session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// The session id supplied by the client, if any.
#[derive(Debug, Clone, Default)]
pub struct SessionHeader(pub Option<SessionId>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionHeader {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(SESSION_HEADER) else {
            return Ok(Self(None));
        };

        let id = value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<SessionId>().ok())
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "{SESSION_HEADER} must be 1-128 visible ASCII characters"
                ))
            })?;

        // Default sessions are derived from the token, never named by the client.
        if id.is_user_default() {
            return Err(ApiError::BadRequest(format!(
                "{SESSION_HEADER} must not start with {USER_SESSION_PREFIX}"
            )));
        }

        Ok(Self(Some(id)))
    }
}

impl SessionHeader {
    /// The session to use for an authenticated user.
    #[must_use]
    pub fn for_user(&self, user_id: &UserId) -> SessionId {
        self.0
            .clone()
            .unwrap_or_else(|| SessionId::for_user(user_id))
    }
}

/// Load the caller's session, starting one owned by `user_id` if it has never
/// been stored.
///
/// An unowned session is claimed by the caller; the claim sticks once the
/// session is written back.
///
/// # Errors
///
/// Returns `Forbidden` if the session belongs to another user, or an error if
/// the store fails.
pub async fn load_session(
    store: &dyn Store,
    id: SessionId,
    user_id: &UserId,
) -> Result<Session, ApiError> {
    match store.get_session(&id).await? {
        Some(mut session) => {
            session.check_access(Some(user_id))?;
            session.claim(*user_id);
            Ok(session)
        }
        None => Ok(Session::owned(id, *user_id)),
    }
}

/// Load the session a caller who may be anonymous is browsing with.
///
/// Authenticated callers get [`load_session`]. Anonymous callers only get a
/// session that is already stored; without one they have none.
///
/// # Errors
///
/// Returns `Forbidden` if the session belongs to another user, or an error if
/// the store fails.
pub async fn browsing_session(
    store: &dyn Store,
    header: &SessionHeader,
    user_id: Option<&UserId>,
) -> Result<Option<Session>, ApiError> {
    if let Some(user_id) = user_id {
        return load_session(store, header.for_user(user_id), user_id)
            .await
            .map(Some);
    }

    let Some(id) = &header.0 else {
        return Ok(None);
    };
    let Some(session) = store.get_session(id).await? else {
        return Ok(None);
    };
    session.check_access(None)?;
    Ok(Some(session))
}

/// Delete sessions not touched in the last `ttl_hours`.
///
/// A TTL too large to subtract from the current time prunes nothing.
pub async fn prune_idle_sessions(store: &dyn Store, ttl_hours: u64) -> Result<usize, StoreError> {
    let cutoff = i64::try_from(ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
    match cutoff {
        Some(cutoff) => store.prune_sessions(cutoff).await,
        None => Ok(0),
    }
}

/// Run [`prune_idle_sessions`] every `interval_seconds` until the runtime stops.
pub fn spawn_session_pruner(
    store: Arc<dyn Store>,
    ttl_hours: u64,
    interval_seconds: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            ticker.tick().await;
            match prune_idle_sessions(store.as_ref(), ttl_hours).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, ttl_hours, "Pruned idle sessions"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune idle sessions"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_store::MemoryStore;

    #[test]
    fn header_wins_over_user_default() {
        let user = UserId::generate();
        let header = SessionHeader(Some("browser-1".parse().unwrap()));

        assert_eq!(header.for_user(&user).as_str(), "browser-1");
        assert_eq!(
            SessionHeader::default().for_user(&user),
            SessionId::for_user(&user)
        );
    }

    #[tokio::test]
    async fn new_sessions_are_owned_by_the_caller() {
        let store = MemoryStore::new();
        let user = UserId::generate();

        let session = load_session(&store, "browser-1".parse().unwrap(), &user)
            .await
            .unwrap();

        assert_eq!(session.owner, Some(user));
    }

    #[tokio::test]
    async fn another_users_session_is_forbidden() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let session = Session::owned("browser-1".parse().unwrap(), owner);
        store.put_session(&session).await.unwrap();

        let err = load_session(&store, session.id.clone(), &UserId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let header = SessionHeader(Some(session.id.clone()));
        let err = browsing_session(&store, &header, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn anonymous_callers_never_start_a_session() {
        let store = MemoryStore::new();
        let header = SessionHeader(Some("browser-1".parse().unwrap()));

        assert!(browsing_session(&store, &header, None)
            .await
            .unwrap()
            .is_none());
        assert!(browsing_session(&store, &SessionHeader::default(), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pruning_keeps_recent_sessions() {
        let store = MemoryStore::new();
        let mut stale = Session::owned("old-tab".parse().unwrap(), UserId::generate());
        stale.updated_at = Utc::now() - chrono::Duration::hours(48);
        let fresh = Session::owned("new-tab".parse().unwrap(), UserId::generate());
        store.put_session(&stale).await.unwrap();
        store.put_session(&fresh).await.unwrap();

        assert_eq!(prune_idle_sessions(&store, 24).await.unwrap(), 1);
        assert!(store.get_session(&stale.id).await.unwrap().is_none());
        assert!(store.get_session(&fresh.id).await.unwrap().is_some());
    }
}
