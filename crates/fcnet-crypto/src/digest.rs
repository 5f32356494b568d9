//! Admin credential digests.
//!
//! Authenticated admin requests carry `hex(SHA-256(password ‖ cookie))`
//! instead of the password itself, where the cookie is a short-lived value
//! issued by the core.

use crate::constant_time::ct_eq;
use sha2::{Digest, Sha256};

/// Compute the credential digest for a password and cookie.
#[must_use]
pub fn credential_hash(password: &[u8], cookie: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(cookie);
    hasher.finalize().into()
}

/// Lowercase hex encoding of [`credential_hash`].
#[must_use]
pub fn credential_hash_hex(password: &[u8], cookie: &[u8]) -> String {
    hex::encode(credential_hash(password, cookie))
}

/// Check a caller-supplied hex digest against the expected one in constant time.
///
/// Uppercase hex is not accepted; callers are expected to send the
/// lowercase form [`credential_hash_hex`] produces.
#[must_use]
pub fn verify_credential(password: &[u8], cookie: &[u8], supplied_hex: &[u8]) -> bool {
    let expected = credential_hash_hex(password, cookie);
    ct_eq(expected.as_bytes(), supplied_hex)
}
