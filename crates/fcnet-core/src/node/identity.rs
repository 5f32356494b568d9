//! Network identity derivation
//!
//! A node is identified on the mesh by the address derived from its X25519
//! public key. The supervisor hands the core a raw private key; the core
//! derives the public key and address and refuses to run if the address
//! falls outside `fc00::/8`.
//!
//! # Example
//!
//! ```
//! use fcnet_core::node::identity::NetworkIdentity;
//!
//! let identity = NetworkIdentity::generate().expect("entropy available");
//! assert!(identity.address().is_valid());
//! ```

use fcnet_crypto::x25519::{PrivateKey, PublicKey};
use fcnet_crypto::{Address, CryptoError, address_for_public_key};
use std::fmt;
use thiserror::Error;

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Derived address is outside `fc00::/8`
    #[error("Ip address {address} outside of the FC00/8 range, invalid private key")]
    InvalidIdentity {
        /// The address that was derived
        address: Address,
    },

    /// Key generation could not get randomness
    #[error("identity generation failed: {0}")]
    Random(#[from] CryptoError),
}

/// A validated node identity.
///
/// Immutable once derived. The private key is zeroized when the identity is
/// dropped.
#[derive(Clone)]
pub struct NetworkIdentity {
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
}

impl NetworkIdentity {
    /// Derive an identity from raw private key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidIdentity`] if the derived address does
    /// not start with `0xFC`.
    pub fn derive(private_key: [u8; 32]) -> Result<Self, IdentityError> {
        Self::from_private_key(PrivateKey::from_bytes(private_key))
    }

    /// Derive an identity from a private key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidIdentity`] if the derived address does
    /// not start with `0xFC`.
    pub fn from_private_key(private_key: PrivateKey) -> Result<Self, IdentityError> {
        let public_key = private_key.public_key();
        let address = address_for_public_key(&public_key);
        if !address.is_valid() {
            return Err(IdentityError::InvalidIdentity { address });
        }

        Ok(Self {
            private_key,
            public_key,
            address,
        })
    }

    /// Generate a fresh valid identity.
    ///
    /// Roughly one random key in 256 yields a usable address, so this draws
    /// keys until one does.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Random`] if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, IdentityError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut bytes = fcnet_crypto::random::random_32()?;
            let candidate = PrivateKey::from_bytes(bytes);
            zeroize::Zeroize::zeroize(&mut bytes);

            if let Ok(identity) = Self::from_private_key(candidate) {
                tracing::debug!(attempts, "generated identity");
                return Ok(identity);
            }
        }
    }

    /// The private key.
    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The node address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Debug for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkIdentity")
            .field("public_key", &hex::encode(self.public_key.as_bytes()))
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Private key 0x5011 followed by zeros lands in fc00::/8.
    const VALID_KEY: &str = "5011000000000000000000000000000000000000000000000000000000000000";
    const VALID_PUBLIC: &str = "a4faa8d1968c5ec3c42564d1c2279eb4530421d0eaf9decac680cb5166f3866b";

    fn key(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_derive_known_key() {
        let identity = NetworkIdentity::derive(key(VALID_KEY)).unwrap();
        assert_eq!(hex::encode(identity.public_key().as_bytes()), VALID_PUBLIC);
        assert_eq!(
            identity.address().to_string(),
            "fcfa:238e:a096:f776:ef0f:a56e:1d12:e024"
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = NetworkIdentity::derive(key(VALID_KEY)).unwrap();
        let b = NetworkIdentity::derive(key(VALID_KEY)).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_zero_key_is_rejected() {
        let err = NetworkIdentity::derive([0u8; 32]).unwrap_err();
        match err {
            IdentityError::InvalidIdentity { address } => {
                assert_eq!(address.as_bytes()[0], 0xa2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_generate_is_valid() {
        let identity = NetworkIdentity::generate().unwrap();
        assert_eq!(identity.address().as_bytes()[0], 0xFC);

        let again = NetworkIdentity::from_private_key(identity.private_key().clone()).unwrap();
        assert_eq!(again.address(), identity.address());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let identity = NetworkIdentity::derive(key(VALID_KEY)).unwrap();
        let debug = format!("{identity:?}");
        assert!(debug.contains(VALID_PUBLIC));
        assert!(!debug.contains(VALID_KEY));
    }
}
