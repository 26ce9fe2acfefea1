//! Identifier types for bazaar.
//!
//! Users are identified by the UUID issued by the external identity provider.
//! Everything the marketplace creates itself (products, orders, deposits, ...)
//! gets a ULID so that identifiers sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use ulid::{Generator, Ulid};

/// A user identifier (UUID format from the identity provider).
///
/// User IDs are extracted from the JWT `sub` claim.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(uuid::Uuid);

impl UserId {
    /// Create a new `UserId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `UserId` (for testing).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0.to_string()
    }
}

/// Next ULID from a process-wide monotonic generator, so ids sort in creation
/// order even within one millisecond.
fn next_ulid() -> Ulid {
    static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();
    GENERATOR
        .get_or_init(|| Mutex::new(Generator::new()))
        .lock()
        .generate()
        .unwrap_or_else(|_| Ulid::new())
}

/// Defines a ULID-backed identifier with string serde and byte conversions.
macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create the identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            ///
            /// Identifiers generated in this process are strictly increasing.
            #[must_use]
            pub fn generate() -> Self {
                Self(next_ulid())
            }

            /// Return the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }

            /// Return the bytes of the ULID (16 bytes).
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }

            /// Create the identifier from its 16 byte encoding.
            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Ulid::from_bytes(bytes))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

ulid_id!(
    /// A product listing identifier.
    ProductId
);

ulid_id!(
    /// A product category identifier.
    CategoryId
);

ulid_id!(
    /// A product comment identifier.
    CommentId
);

ulid_id!(
    /// A completed order line identifier.
    OrderId
);

ulid_id!(
    /// A deposit request identifier.
    DepositId
);

ulid_id!(
    /// A balance ledger entry identifier.
    LedgerEntryId
);

ulid_id!(
    /// A calendar reminder identifier.
    ReminderId
);

/// Maximum length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Prefix reserved for per-user default sessions.
pub const USER_SESSION_PREFIX: &str = "user:";

/// A browser session identifier.
///
/// Session ids are opaque tokens chosen by the client. Authenticated callers that
/// do not send one share a single per-user session, whose id starts with
/// [`USER_SESSION_PREFIX`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// The default session of an authenticated user.
    #[must_use]
    pub fn for_user(user_id: &UserId) -> Self {
        Self(format!("{USER_SESSION_PREFIX}{user_id}"))
    }

    /// Whether this id is in the reserved per-user namespace.
    #[must_use]
    pub fn is_user_default(&self) -> bool {
        self.0.starts_with(USER_SESSION_PREFIX)
    }

    /// Return the session id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_SESSION_ID_LEN
            && s.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(IdError::InvalidSession);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,

    /// The input is not a usable session id.
    #[error("invalid session id")]
    InvalidSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_roundtrip() {
        let id = UserId::generate();
        let parsed = UserId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn product_id_serde_json() {
        let id = ProductId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn order_id_bytes_roundtrip() {
        let id = OrderId::generate();
        assert_eq!(OrderId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn generated_ids_increase() {
        let ids: Vec<OrderId> = (0..64).map(|_| OrderId::generate()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ulid_ids_reject_garbage() {
        assert_eq!(ProductId::from_str("42"), Err(IdError::InvalidUlid));
        assert_eq!(UserId::from_str("not-a-uuid"), Err(IdError::InvalidUuid));
    }

    #[test]
    fn product_ids_sort_by_creation_time() {
        let first = ProductId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ProductId::generate();
        assert!(first < second);
    }

    #[test]
    fn session_id_validation() {
        assert!(SessionId::from_str("abc-123").is_ok());
        assert_eq!(SessionId::from_str(""), Err(IdError::InvalidSession));
        assert_eq!(SessionId::from_str("has space"), Err(IdError::InvalidSession));
        let too_long = "x".repeat(MAX_SESSION_ID_LEN + 1);
        assert_eq!(SessionId::from_str(&too_long), Err(IdError::InvalidSession));
    }

    #[test]
    fn default_session_is_per_user() {
        let user = UserId::generate();
        assert_eq!(
            SessionId::for_user(&user).as_str(),
            format!("user:{user}")
        );
        assert!(SessionId::for_user(&user).is_user_default());
        assert!(!SessionId::from_str("laptop").unwrap().is_user_default());
    }
}
