//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key material is not valid hex
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
