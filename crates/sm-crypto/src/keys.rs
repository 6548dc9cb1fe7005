//! Key material: master key loading and HKDF subkey derivation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use sm_core::{SmError, SmResult};
use zeroize::Zeroize;

use crate::{KDF_CONTEXT, KEY_SIZE};

/// The 256-bit process master key.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Decode a base64 master key. Anything but exactly 32 bytes is rejected.
    pub fn from_base64(encoded: &str) -> SmResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SmError::Configuration("master key is not valid base64".into()))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(SmError::Configuration(format!(
                "master key must decode to {KEY_SIZE} bytes, got {len}"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The two subkeys every component is built from.
///
/// Constructed once at startup and shared read-only (`Arc<DerivedKeys>`).
pub struct DerivedKeys {
    cipher_key: [u8; KEY_SIZE],
    mac_key: [u8; KEY_SIZE],
}

impl DerivedKeys {
    pub fn cipher_key(&self) -> &[u8; KEY_SIZE] {
        &self.cipher_key
    }

    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac_key
    }
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("cipher_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

/// Read the master key from the environment variable `var`.
pub fn load_master_key(var: &str) -> SmResult<MasterKey> {
    let encoded = std::env::var(var)
        .map_err(|_| SmError::Configuration(format!("{var} not found in environment")))?;
    if encoded.trim().is_empty() {
        return Err(SmError::Configuration(format!("{var} is empty")));
    }
    MasterKey::from_base64(&encoded)
}

/// Derive the cipher and MAC subkeys via HKDF-SHA256 (no salt, fixed info).
///
/// Deterministic: the secret token index stays queryable across restarts
/// only as long as this function and `KDF_CONTEXT` are unchanged.
pub fn derive_keys(master: &MasterKey) -> DerivedKeys {
    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());
    let mut okm = [0u8; 2 * KEY_SIZE];
    let Ok(()) = hkdf.expand(KDF_CONTEXT, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut cipher_key = [0u8; KEY_SIZE];
    let mut mac_key = [0u8; KEY_SIZE];
    cipher_key.copy_from_slice(&okm[..KEY_SIZE]);
    mac_key.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    DerivedKeys {
        cipher_key,
        mac_key,
    }
}

/// Generate a fresh random master key, base64-encoded for the environment.
pub fn generate_master_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = STANDARD.encode(bytes);
    bytes.zeroize();
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_derive_deterministic() {
        let a = derive_keys(&test_master_key());
        let b = derive_keys(&test_master_key());

        assert_eq!(a.cipher_key(), b.cipher_key(), "derivation must be deterministic");
        assert_eq!(a.mac_key(), b.mac_key(), "derivation must be deterministic");
    }

    #[test]
    fn test_subkeys_independent() {
        let keys = derive_keys(&test_master_key());
        assert_ne!(keys.cipher_key(), keys.mac_key());
    }

    #[test]
    fn test_different_master_keys() {
        let a = derive_keys(&MasterKey::from_bytes([1u8; KEY_SIZE]));
        let b = derive_keys(&MasterKey::from_bytes([2u8; KEY_SIZE]));

        assert_ne!(a.cipher_key(), b.cipher_key());
        assert_ne!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn test_derive_matches_hkdf_split() {
        let master = test_master_key();
        let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());
        let mut okm = [0u8; 64];
        hkdf.expand(KDF_CONTEXT, &mut okm).unwrap();

        let keys = derive_keys(&master);
        assert_eq!(keys.cipher_key().as_slice(), &okm[..32]);
        assert_eq!(keys.mac_key().as_slice(), &okm[32..]);
    }

    #[test]
    fn test_from_base64_roundtrip() {
        let encoded = generate_master_key();
        let key = MasterKey::from_base64(&encoded).unwrap();
        assert_eq!(STANDARD.encode(key.as_bytes()), encoded);
    }

    #[test]
    fn test_from_base64_wrong_length() {
        let short = STANDARD.encode([0u8; 16]);
        let long = STANDARD.encode([0u8; 33]);

        assert!(matches!(MasterKey::from_base64(&short), Err(SmError::Configuration(_))));
        assert!(matches!(MasterKey::from_base64(&long), Err(SmError::Configuration(_))));
    }

    #[test]
    fn test_from_base64_garbage() {
        let result = MasterKey::from_base64("not base64 at all!!");
        assert!(matches!(result, Err(SmError::Configuration(_))));
    }

    #[test]
    fn test_load_master_key_from_env() {
        let var = "SM_CRYPTO_TEST_MASTER_KEY_PRESENT";
        std::env::set_var(var, STANDARD.encode([7u8; KEY_SIZE]));

        let key = load_master_key(var).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_SIZE]);
    }

    #[test]
    fn test_load_master_key_absent() {
        let result = load_master_key("SM_CRYPTO_TEST_MASTER_KEY_NEVER_SET");
        assert!(matches!(result, Err(SmError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts() {
        let master = test_master_key();
        let keys = derive_keys(&master);

        assert!(format!("{master:?}").contains("REDACTED"));
        assert!(!format!("{keys:?}").contains("42"));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(generate_master_key(), generate_master_key());
    }
}
