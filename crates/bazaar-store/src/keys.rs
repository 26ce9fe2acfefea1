//! Key encoding utilities for `RocksDB`.
//!
//! Primary keys are the 16 raw bytes of the record's UUID or ULID. Index keys
//! concatenate the owner's 16 bytes with the record's 16 bytes, so a prefix
//! scan over the owner yields its records in ULID (time) order.

use bazaar_core::{normalize_code, SessionId, UserId};

/// Length of a two-part index key.
pub const INDEX_KEY_LEN: usize = 32;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a primary key from a ULID-backed identifier's bytes.
#[must_use]
pub fn id_key(id: [u8; 16]) -> Vec<u8> {
    id.to_vec()
}

/// Create a two-part index key.
///
/// Format: `owner (16 bytes) || id (16 bytes)`
#[must_use]
pub fn index_key(owner: &[u8; 16], id: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_KEY_LEN);
    key.extend_from_slice(owner);
    key.extend_from_slice(&id);
    key
}

/// Create a prefix for iterating an owner's index entries.
#[must_use]
pub fn owner_prefix(owner: &[u8; 16]) -> Vec<u8> {
    owner.to_vec()
}

/// Extract the record id from a two-part index key.
///
/// Returns `None` if the key is not exactly 32 bytes.
#[must_use]
pub fn index_suffix(key: &[u8]) -> Option<[u8; 16]> {
    if key.len() != INDEX_KEY_LEN {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..]);
    Some(bytes)
}

/// Create a session key.
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_str().as_bytes().to_vec()
}

/// Create a promo code key. Codes compare case-insensitively.
#[must_use]
pub fn promo_key(code: &str) -> Vec<u8> {
    normalize_code(code).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::OrderId;

    #[test]
    fn index_key_format() {
        let user_id = UserId::generate();
        let order_id = OrderId::generate();
        let key = index_key(user_id.as_bytes(), order_id.to_bytes());

        assert_eq!(key.len(), INDEX_KEY_LEN);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert!(key.starts_with(&owner_prefix(user_id.as_bytes())));
        assert_eq!(index_suffix(&key), Some(order_id.to_bytes()));
    }

    #[test]
    fn index_suffix_rejects_short_keys() {
        assert_eq!(index_suffix(&[0u8; 16]), None);
    }

    #[test]
    fn promo_keys_ignore_case() {
        assert_eq!(promo_key("SAVE10"), promo_key(" save10 "));
    }
}
