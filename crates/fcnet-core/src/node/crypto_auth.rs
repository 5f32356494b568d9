//! Session-layer handle and its password table.
//!
//! The peer session protocol itself lives elsewhere. The core owns the
//! layer's identity and the set of passwords peers may authenticate with,
//! which operators manage over the admin channel.

use crate::admin::{Admin, AdminError, CommandError, Request, ok_response};
use crate::arena::{Arena, ArenaError, Reservation};
use crate::benc::{Dict, Value};
use crate::log::Log;
use fcnet_crypto::constant_time::ct_eq;
use fcnet_crypto::x25519::{PrivateKey, PublicKey};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use zeroize::Zeroizing;

/// Bytes charged to the arena for the session layer.
pub const FOOTPRINT: usize = 16 * 1024;

/// The only supported password authentication type.
pub const AUTH_TYPE_PASSWORD: i64 = 1;

/// Password table errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    /// Same password already present
    #[error("Password already added.")]
    Duplicate,

    /// User name already present
    #[error("User already exists.")]
    UserExists,

    /// Unsupported auth type
    #[error("Specified auth type is not supported.")]
    UnsupportedAuthType,

    /// Empty password
    #[error("Password must not be empty.")]
    Empty,
}

/// Session-layer state held by the core.
pub struct CryptoAuth {
    private_key: PrivateKey,
    public_key: PublicKey,
    passwords: Mutex<BTreeMap<String, Zeroizing<Vec<u8>>>>,
    log: Arc<dyn Log>,
    _footprint: Reservation,
}

impl CryptoAuth {
    /// Set up the session layer keyed with the node's private key.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold the layer.
    pub fn new(
        private_key: &PrivateKey,
        log: Arc<dyn Log>,
        arena: &Arc<Arena>,
    ) -> Result<Arc<Self>, ArenaError> {
        let footprint = arena.reserve(FOOTPRINT)?;
        log.debug("session layer ready");
        Ok(Arc::new(Self {
            private_key: private_key.clone(),
            public_key: private_key.public_key(),
            passwords: Mutex::new(BTreeMap::new()),
            log,
            _footprint: footprint,
        }))
    }

    /// Public key peers see.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Whether this layer holds the private half of `public_key`.
    #[must_use]
    pub fn owns(&self, public_key: &PublicKey) -> bool {
        ct_eq(self.private_key.public_key().as_bytes(), public_key.as_bytes())
    }

    /// Authorize a password for `user`.
    ///
    /// # Errors
    ///
    /// See [`PasswordError`].
    pub fn add_password(
        &self,
        user: &str,
        password: &[u8],
        auth_type: i64,
    ) -> Result<(), PasswordError> {
        if auth_type != AUTH_TYPE_PASSWORD {
            return Err(PasswordError::UnsupportedAuthType);
        }
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }

        let mut passwords = self.lock();
        if passwords.contains_key(user) {
            return Err(PasswordError::UserExists);
        }
        if passwords.values().any(|p| ct_eq(p, password)) {
            return Err(PasswordError::Duplicate);
        }
        passwords.insert(user.to_string(), Zeroizing::new(password.to_vec()));
        drop(passwords);

        self.log.info(&format!("authorized password for user [{user}]"));
        Ok(())
    }

    /// Revoke `user`'s password. Returns false if unknown.
    pub fn remove_password(&self, user: &str) -> bool {
        let removed = self.lock().remove(user).is_some();
        if removed {
            self.log.info(&format!("revoked password for user [{user}]"));
        }
        removed
    }

    /// Users with an authorized password, sorted.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Register `AuthorizedPasswords_add`, `_remove` and `_list`.
    ///
    /// # Errors
    ///
    /// Fails if a name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let this = Arc::clone(self);
        admin.register("AuthorizedPasswords_add", true, move |req: &Request| {
            let password = req.require_bytes("password")?;
            let user = match req.arg_bytes("user") {
                Some(user) => std::str::from_utf8(user)
                    .map_err(|_| CommandError::InvalidArgument("user"))?
                    .to_string(),
                None => format!("user{}", this.lock().len()),
            };
            let auth_type = req.arg_int("authType").unwrap_or(AUTH_TYPE_PASSWORD);
            this.add_password(&user, password, auth_type)
                .map_err(|e| CommandError::Failed(e.to_string()))?;
            Ok(ok_response())
        })?;

        let this = Arc::clone(self);
        admin.register("AuthorizedPasswords_remove", true, move |req: &Request| {
            let user = req
                .arg_str("user")
                .ok_or(CommandError::MissingArgument("user"))?;
            if this.remove_password(user) {
                Ok(ok_response())
            } else {
                Err(CommandError::Failed("Unknown user.".into()))
            }
        })?;

        let this = Arc::clone(self);
        admin.register("AuthorizedPasswords_list", true, move |_: &Request| {
            let users: Vec<Value> = this.users().into_iter().map(Value::from).collect();
            Ok(Dict::new().with("total", users.len()).with("users", users))
        })?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Zeroizing<Vec<u8>>>> {
        self.passwords.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CryptoAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoAuth")
            .field("public_key", &hex::encode(self.public_key.as_bytes()))
            .field("users", &self.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::testing::{admin, auth_request};
    use crate::log::TracingLog;
    use crate::node::identity::NetworkIdentity;

    fn layer(arena: &Arc<Arena>) -> Arc<CryptoAuth> {
        let identity = NetworkIdentity::generate().unwrap();
        CryptoAuth::new(identity.private_key(), Arc::new(TracingLog), arena).unwrap()
    }

    #[test]
    fn test_charges_arena() {
        let arena = Arena::new(1 << 20);
        let ca = layer(&arena);
        assert_eq!(arena.bytes_allocated(), FOOTPRINT);
        drop(ca);
        assert_eq!(arena.bytes_allocated(), 0);
    }

    #[test]
    fn test_arena_too_small() {
        let arena = Arena::new(FOOTPRINT - 1);
        let identity = NetworkIdentity::generate().unwrap();
        assert!(CryptoAuth::new(identity.private_key(), Arc::new(TracingLog), &arena).is_err());
    }

    #[test]
    fn test_keyed_with_private_key() {
        let identity = NetworkIdentity::generate().unwrap();
        let other = NetworkIdentity::generate().unwrap();
        let ca = CryptoAuth::new(identity.private_key(), Arc::new(TracingLog), &Arena::new(1 << 20))
            .unwrap();

        assert_eq!(ca.public_key(), identity.public_key());
        assert!(ca.owns(identity.public_key()));
        assert!(!ca.owns(other.public_key()));
    }

    #[test]
    fn test_password_table() {
        let ca = layer(&Arena::new(1 << 20));
        ca.add_password("alice", b"secret", 1).unwrap();
        assert_eq!(ca.add_password("bob", b"secret", 1), Err(PasswordError::Duplicate));
        assert_eq!(ca.add_password("alice", b"other", 1), Err(PasswordError::UserExists));
        assert_eq!(
            ca.add_password("carol", b"x", 2),
            Err(PasswordError::UnsupportedAuthType)
        );
        assert_eq!(ca.users(), vec!["alice".to_string()]);

        assert!(ca.remove_password("alice"));
        assert!(!ca.remove_password("alice"));
        assert!(ca.users().is_empty());
    }

    #[test]
    fn test_commands() {
        let admin = admin();
        let ca = layer(&Arena::new(1 << 20));
        ca.register_commands(&admin).unwrap();

        let response = admin
            .handle(auth_request(
                "AuthorizedPasswords_add",
                "1",
                Dict::new().with("password", "pw").with("user", "dave"),
            ))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some("none"));

        let response = admin
            .handle(auth_request("AuthorizedPasswords_list", "2", Dict::new()))
            .unwrap();
        assert_eq!(response.get_int(b"total"), Some(1));
        assert_eq!(response.get_list(b"users").unwrap()[0].as_str(), Some("dave"));

        let response = admin
            .handle(auth_request(
                "AuthorizedPasswords_add",
                "3",
                Dict::new().with("password", "pw"),
            ))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some("Password already added."));

        // Listing is not public
        let response = admin
            .handle(Dict::new().with("q", "AuthorizedPasswords_list").with("txid", "4"))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some(crate::admin::AUTH_FAILED));
    }
}
