//! AES-256-GCM document encryption
//!
//! Stored form:
//! ```text
//! nonce:      12 random bytes, fresh per encryption
//! ciphertext: AES-256-GCM(cipher_key, nonce, canonical JSON) || 16-byte tag
//! AAD:        none
//! ```
//!
//! Canonical JSON is `serde_json` over a `BTreeMap`, so field order is fixed.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sm_core::{Document, EncryptedBlob, SmError, SmResult};

use crate::keys::DerivedKeys;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Authenticated encryption of documents under the derived cipher key.
#[derive(Clone)]
pub struct DocumentCipher {
    cipher: Aes256Gcm,
}

impl DocumentCipher {
    pub fn new(keys: &DerivedKeys) -> Self {
        Self {
            cipher: Aes256Gcm::new(keys.cipher_key().into()),
        }
    }

    /// Serialize and encrypt a document under a fresh random nonce.
    pub fn encrypt(&self, document: &Document) -> SmResult<EncryptedBlob> {
        let plaintext = serde_json::to_vec(document)?;
        self.seal(&plaintext)
    }

    /// Decrypt and deserialize a document.
    ///
    /// Any failure (wrong nonce length, short ciphertext, tag mismatch,
    /// payload that is not a document) is an `Integrity` error. No partial
    /// plaintext is ever returned.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> SmResult<Document> {
        let plaintext = self.open(blob)?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| SmError::Integrity("decrypted payload is not a document".into()))
    }

    /// Encrypt raw bytes. Output ciphertext carries the tag at the end.
    pub fn seal(&self, plaintext: &[u8]) -> SmResult<EncryptedBlob> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SmError::Crypto(format!("document encryption failed: {e}")))?;

        Ok(EncryptedBlob {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt raw bytes sealed by [`DocumentCipher::seal`].
    pub fn open(&self, blob: &EncryptedBlob) -> SmResult<Vec<u8>> {
        if blob.nonce.len() != NONCE_SIZE {
            return Err(SmError::Integrity(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                blob.nonce.len()
            )));
        }
        if blob.ciphertext.len() < TAG_SIZE {
            return Err(SmError::Integrity(format!(
                "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
                blob.ciphertext.len()
            )));
        }

        let nonce = Nonce::from_slice(&blob.nonce);
        self.cipher
            .decrypt(nonce, blob.ciphertext.as_ref())
            .map_err(|_| SmError::Integrity("authentication tag mismatch".into()))
    }
}

impl std::fmt::Debug for DocumentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCipher").finish_non_exhaustive()
    }
}
