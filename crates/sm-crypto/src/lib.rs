//! sm-crypto: searchable-encryption primitives for securematch
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, base64 in the MASTER_KEY environment variable)
//!   └── HKDF-SHA256 (no salt, info = KDF_CONTEXT) → 64 bytes
//!       ├── cipher key [0..32]  AES-256-GCM document encryption (random 96-bit nonce)
//!       └── mac key   [32..64]  HMAC-SHA256 secret search tokens
//!
//! Public keyword hash:   SHA-256(normalize(value))          (unkeyed, for auditors)
//! Trapdoor:              RSA-PSS-SHA256(auditor key, hex(public hash))
//! ```

pub mod cipher;
pub mod keys;
pub mod tokenizer;
pub mod trapdoor;

pub use cipher::DocumentCipher;
pub use keys::{derive_keys, generate_master_key, load_master_key, DerivedKeys, MasterKey};
pub use tokenizer::{normalize, public_hash, Tokenizer};
pub use trapdoor::{
    generate_keypair, issue_trapdoor, parse_public_key, sign_public_hash, verify, AuditorKeypair,
};

/// Size of the master key and of each derived subkey (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// HKDF info label. Changing it re-keys the whole index.
pub const KDF_CONTEXT: &[u8] = b"securematch-sse-v1";

/// RSA modulus size for auditor keypairs
pub const RSA_BITS: usize = 2048;
