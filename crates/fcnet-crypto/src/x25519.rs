//! X25519 identity keys (RFC 7748).
//!
//! A node's private key is a raw 32-byte scalar handed over by the supervisor.
//! The public key is the clamped scalar multiplied by the curve base point.
//! Private keys are zeroized on drop and never printed.

use crate::CryptoError;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// X25519 private key (32 bytes).
#[derive(Clone, ZeroizeOnDrop, Zeroize)]
pub struct PrivateKey(x25519_dalek::StaticSecret);

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PrivateKey {
    /// Generate a new random private key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(x25519_dalek::StaticSecret::random_from_rng(rng))
    }

    /// Derive the public key from this private key (base-point multiplication).
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Export as bytes.
    ///
    /// # Security
    ///
    /// The returned bytes contain the raw private key. Handle with care.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Import from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::StaticSecret::from(bytes))
    }

    /// Import from a 64 character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the string is not 64
    /// characters long, or [`CryptoError::InvalidKeyEncoding`] if it contains
    /// non-hex characters.
    pub fn from_hex(encoded: &[u8]) -> Result<Self, CryptoError> {
        if encoded.len() != 64 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 64,
                actual: encoded.len(),
            });
        }

        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(encoded, &mut bytes[..]).map_err(|e| match e {
            hex::FromHexError::InvalidHexCharacter { .. } => {
                CryptoError::InvalidKeyEncoding(e.to_string())
            }
            _ => CryptoError::InvalidKeyLength {
                expected: 64,
                actual: encoded.len(),
            },
        })?;
        Ok(Self::from_bytes(*bytes))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PublicKey {
    /// Export public key as bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        *self.0.as_bytes()
    }

    /// Import public key from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Get bytes as a slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}
