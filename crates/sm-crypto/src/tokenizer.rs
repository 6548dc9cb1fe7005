//! Deterministic search fingerprints
//!
//! Two fingerprints per searchable (field, value):
//!
//! ```text
//! secret token = HMAC-SHA256(mac_key, u32_be(len(field)) || field || normalize(value))
//! public hash  = SHA-256(normalize(value))
//! ```
//!
//! The secret token binds the field name through a length prefix, so
//! `("ab", "c")` and `("a", "bc")` never collide. The binding is part of the
//! on-disk index format: changing it orphans every stored token.
//!
//! The public hash carries no field name. An auditor can compute it from a
//! candidate keyword alone, and a value indexed under two different fields
//! is found by one trapdoor.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::keys::DerivedKeys;
use crate::KEY_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// Trim surrounding whitespace and lowercase.
///
/// Applied identically at index and query time; this is equality search,
/// not full-text search.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Unkeyed SHA-256 of the normalized value, lowercase hex.
pub fn public_hash(value: &str) -> String {
    hex::encode(Sha256::digest(normalize(value).as_bytes()))
}

/// Computes secret tokens under the derived MAC key.
#[derive(Clone)]
pub struct Tokenizer {
    mac_key: [u8; KEY_SIZE],
}

impl Tokenizer {
    pub fn new(keys: &DerivedKeys) -> Self {
        Self {
            mac_key: *keys.mac_key(),
        }
    }

    /// Keyed token for `value` under `field`, lowercase hex.
    pub fn secret_token(&self, field: &str, value: &str) -> String {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&self.mac_key) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(&(field.len() as u32).to_be_bytes());
        mac.update(field.as_bytes());
        mac.update(normalize(value).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Drop for Tokenizer {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.mac_key);
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive_keys, MasterKey};
    use proptest::prelude::*;

    fn test_tokenizer() -> Tokenizer {
        Tokenizer::new(&derive_keys(&MasterKey::from_bytes([42u8; KEY_SIZE])))
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Foo "), normalize("foo"));
        assert_eq!(normalize("\tAlice@Example.COM\n"), "alice@example.com");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_public_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            public_hash(" ABC "),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_secret_token_deterministic() {
        let t = test_tokenizer();
        assert_eq!(
            t.secret_token("email", "alice@example.com"),
            t.secret_token("email", "  ALICE@example.com ")
        );
        assert_eq!(t.secret_token("email", "x").len(), 64);
    }

    #[test]
    fn test_secret_token_field_bound() {
        let t = test_tokenizer();
        assert_ne!(
            t.secret_token("email", "alice@example.com"),
            t.secret_token("name", "alice@example.com")
        );
    }

    #[test]
    fn test_field_boundary_unambiguous() {
        let t = test_tokenizer();
        assert_ne!(t.secret_token("ab", "c"), t.secret_token("a", "bc"));
    }

    #[test]
    fn test_secret_token_depends_on_key() {
        let other = Tokenizer::new(&derive_keys(&MasterKey::from_bytes([1u8; KEY_SIZE])));
        assert_ne!(
            test_tokenizer().secret_token("email", "bob"),
            other.secret_token("email", "bob")
        );
    }

    #[test]
    fn test_secret_token_unlinkable_to_public_hash() {
        let t = test_tokenizer();
        assert_ne!(t.secret_token("email", "bob"), public_hash("bob"));
    }

    proptest! {
        #[test]
        fn prop_case_and_padding_invariant(value in "[a-zA-Z0-9@. ]{0,32}", pad in " {0,4}") {
            let t = test_tokenizer();
            let padded = format!("{pad}{}{pad}", value.to_uppercase());

            prop_assert_eq!(t.secret_token("email", &value), t.secret_token("email", &padded));
            prop_assert_eq!(public_hash(&value), public_hash(&padded));
        }
    }
}
