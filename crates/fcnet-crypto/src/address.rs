//! Self-certifying network addresses.
//!
//! A node address is the first 16 bytes of `SHA-512(SHA-512(public_key))`,
//! interpreted as an IPv6 address. Only keys whose address falls inside
//! `fc00::/8` are usable; key generation searches for such keys, derivation
//! only checks.

use crate::{ADDRESS_PREFIX, ADDRESS_SIZE};
use crate::x25519::PublicKey;
use sha2::{Digest, Sha512};
use std::fmt;
use std::net::Ipv6Addr;

/// 16-byte node address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Wrap raw address bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Whether the address lies in the `fc00::/8` range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0[0] == ADDRESS_PREFIX
    }

    /// The address as a standard library IPv6 address.
    #[must_use]
    pub fn to_ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0)
    }
}

impl fmt::Display for Address {
    /// Fully expanded form, e.g. `fc12:3456:789a:...`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.0.chunks_exact(2).enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}{:02x}", pair[0], pair[1])?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Compute the address for a public key.
#[must_use]
pub fn address_for_public_key(public_key: &PublicKey) -> Address {
    let first = Sha512::digest(public_key.as_bytes());
    let second = Sha512::digest(first);

    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&second[..ADDRESS_SIZE]);
    Address(bytes)
}
