//! # fcnet Crypto
//!
//! Cryptographic primitives used by the fcnet core process to establish its
//! network identity and to authenticate administrative callers.
//!
//! This crate provides:
//! - X25519 private/public keys (RFC 7748 base-point multiplication)
//! - Self-certifying address derivation into the `fc00::/8` range
//! - Constant-time comparison for credentials
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Output |
//! |----------|-----------|--------|
//! | Identity key | X25519 | 32 bytes |
//! | Address | SHA-512(SHA-512(public key)), truncated | 16 bytes |
//! | Admin credential | SHA-256(password ‖ cookie) | 32 bytes |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod address;
pub mod constant_time;
pub mod digest;
pub mod error;
pub mod random;
pub mod x25519;

pub use address::{Address, address_for_public_key};
pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// Network address size (an IPv6 address)
pub const ADDRESS_SIZE: usize = 16;

/// First byte every valid node address must carry
pub const ADDRESS_PREFIX: u8 = 0xFC;

/// SHA-256 output size
pub const SHA256_OUTPUT_SIZE: usize = 32;
