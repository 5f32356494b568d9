//! Known-answer tests for the fcnet crypto primitives.
//!
//! - RFC 7748 (X25519 base-point multiplication)
//! - FIPS 180-4 (SHA-256 via the credential helper)

use fcnet_crypto::address::address_for_public_key;
use fcnet_crypto::digest::{credential_hash_hex, verify_credential};
use fcnet_crypto::x25519::{PrivateKey, PublicKey};
use proptest::prelude::*;

fn decode_hex(hex: &str) -> Vec<u8> {
    hex::decode(hex).unwrap()
}

// ============================================================================
// RFC 7748 Test Vectors (X25519)
// ============================================================================

#[test]
fn test_x25519_rfc7748_public_keys() {
    let alice_private = PrivateKey::from_hex(
        b"77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
    )
    .unwrap();
    let bob_private = PrivateKey::from_hex(
        b"5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb",
    )
    .unwrap();

    assert_eq!(
        alice_private.public_key().to_bytes().to_vec(),
        decode_hex("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
    );
    assert_eq!(
        bob_private.public_key().to_bytes().to_vec(),
        decode_hex("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
    );
}

// ============================================================================
// Credential digest
// ============================================================================

#[test]
fn test_credential_hash_empty() {
    // SHA-256("")
    assert_eq!(
        credential_hash_hex(b"", b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

proptest! {
    #[test]
    fn credential_roundtrip(password in prop::collection::vec(any::<u8>(), 0..64), cookie in "[0-9]{1,12}") {
        let digest = credential_hash_hex(&password, cookie.as_bytes());
        prop_assert_eq!(digest.len(), 64);
        prop_assert!(verify_credential(&password, cookie.as_bytes(), digest.as_bytes()));
    }

    #[test]
    fn public_key_derivation_is_pure(seed in any::<[u8; 32]>()) {
        let a = PrivateKey::from_bytes(seed).public_key();
        let b = PrivateKey::from_bytes(seed).public_key();
        prop_assert_eq!(a, b);
        prop_assert_eq!(address_for_public_key(&a), address_for_public_key(&b));
    }
}
