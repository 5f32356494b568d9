//! Cookie-based request authentication.
//!
//! A client first calls the unauthenticated `cookie` command, which returns
//! the core's current unix time in seconds as a decimal string. It then sends
//!
//! ```text
//! { q: "auth", aq: <command>, cookie: <cookie>, hash: hex(SHA-256(password ‖ cookie)), ... }
//! ```
//!
//! The password never crosses the channel. A cookie is only accepted within
//! the configured window of the current time, so a captured request cannot
//! be replayed indefinitely.

use crate::benc::{Dict, Value};
use fcnet_crypto::digest::verify_credential;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Why authentication was refused. Callers only ever see "Auth failed.".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A required auth field is absent or not a string
    #[error("missing or malformed '{0}'")]
    MissingField(&'static str),

    /// Cookie is not a decimal timestamp
    #[error("cookie is not a timestamp")]
    InvalidCookie,

    /// Cookie is outside the accepted window
    #[error("cookie is {age}s from now, window is {window}s")]
    StaleCookie {
        /// Distance from the current time in seconds
        age: u64,
        /// Accepted window in seconds
        window: u64,
    },

    /// Hash does not match
    #[error("credential hash mismatch")]
    BadHash,
}

/// Seconds since the unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Check the auth fields of `message`, removing them, and return the target
/// command name from `aq`.
///
/// # Errors
///
/// Returns an [`AuthError`] describing the first check that failed.
pub fn authenticate(
    password: &[u8],
    window: Duration,
    message: &mut Dict,
) -> Result<String, AuthError> {
    authenticate_at(password, window, message, unix_now())
}

pub(crate) fn authenticate_at(
    password: &[u8],
    window: Duration,
    message: &mut Dict,
    now: u64,
) -> Result<String, AuthError> {
    let aq = take_bytes(message, "aq")?;
    let cookie = take_bytes(message, "cookie")?;
    let hash = take_bytes(message, "hash")?;

    let issued: u64 = std::str::from_utf8(&cookie)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(AuthError::InvalidCookie)?;

    let age = now.abs_diff(issued);
    if age > window.as_secs() {
        return Err(AuthError::StaleCookie {
            age,
            window: window.as_secs(),
        });
    }

    if !verify_credential(password, &cookie, &hash) {
        return Err(AuthError::BadHash);
    }

    String::from_utf8(aq).map_err(|_| AuthError::MissingField("aq"))
}

fn take_bytes(message: &mut Dict, key: &'static str) -> Result<Vec<u8>, AuthError> {
    match message.remove(key.as_bytes()) {
        Some(Value::Bytes(b)) => Ok(b),
        _ => Err(AuthError::MissingField(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcnet_crypto::digest::credential_hash_hex;

    const WINDOW: Duration = Duration::from_secs(10);

    fn request(password: &str, cookie: &str) -> Dict {
        Dict::new()
            .with("aq", "Core_exit")
            .with("cookie", cookie)
            .with("hash", credential_hash_hex(password.as_bytes(), cookie.as_bytes()))
            .with("extra", 1i64)
    }

    #[test]
    fn test_valid_credentials() {
        let mut message = request("pw", "1000");
        let name = authenticate_at(b"pw", WINDOW, &mut message, 1005).unwrap();
        assert_eq!(name, "Core_exit");

        // Auth fields are consumed, the rest stays
        assert!(message.get(b"hash").is_none());
        assert!(message.get(b"cookie").is_none());
        assert_eq!(message.get_int(b"extra"), Some(1));
    }

    #[test]
    fn test_wrong_password() {
        let mut message = request("guess", "1000");
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::BadHash)
        );
    }

    #[test]
    fn test_stale_cookie() {
        let mut message = request("pw", "1000");
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1011),
            Err(AuthError::StaleCookie { age: 11, window: 10 })
        );

        // Cookies from the future are bounded the same way
        let mut message = request("pw", "2000");
        assert!(matches!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::StaleCookie { .. })
        ));
    }

    #[test]
    fn test_malformed_cookie() {
        let mut message = request("pw", "soon");
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::InvalidCookie)
        );
    }

    #[test]
    fn test_missing_fields() {
        let mut message = request("pw", "1000");
        message.remove(b"hash");
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::MissingField("hash"))
        );

        let mut message = Dict::new().with("cookie", "1000");
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::MissingField("aq"))
        );
    }

    #[test]
    fn test_uppercase_hash_rejected() {
        let cookie = "1000";
        let mut message = request("pw", cookie);
        message.insert(
            "hash",
            credential_hash_hex(b"pw", cookie.as_bytes()).to_uppercase(),
        );
        assert_eq!(
            authenticate_at(b"pw", WINDOW, &mut message, 1000),
            Err(AuthError::BadHash)
        );
    }
}
