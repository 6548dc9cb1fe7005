//! RSA-PSS trapdoors: auditor keypairs, signing, and verification
//!
//! A trapdoor is `(public_hash, signature)` where the signature is
//! RSA-PSS with SHA-256 (MGF1-SHA256, maximum salt length) over the UTF-8
//! bytes of the lowercase hex hash string. The random PSS salt makes every
//! signature over the same hash different. Verification also accepts a salt
//! of digest length, the default of most PSS signers.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use sm_core::{SmError, SmResult, Trapdoor};

use crate::tokenizer::public_hash;
use crate::RSA_BITS;

/// An auditor keypair in exportable PEM form.
///
/// The private key is PKCS#8 without passphrase protection; protecting it at
/// rest is the holder's concern.
pub struct AuditorKeypair {
    /// SubjectPublicKeyInfo PEM
    pub public_pem: String,
    private_pem: SecretString,
}

impl AuditorKeypair {
    pub fn private_pem(&self) -> &SecretString {
        &self.private_pem
    }
}

impl std::fmt::Debug for AuditorKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditorKeypair")
            .field("public_pem", &self.public_pem)
            .field("private_pem", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh 2048-bit RSA keypair.
pub fn generate_keypair() -> SmResult<AuditorKeypair> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| SmError::Crypto(format!("RSA key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| SmError::Crypto(format!("encoding private key: {e}")))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| SmError::Crypto(format!("encoding public key: {e}")))?;

    Ok(AuditorKeypair {
        public_pem,
        private_pem: SecretString::from(private_pem.as_str().to_owned()),
    })
}

/// Parse an auditor public key (SPKI or PKCS#1 PEM) and enforce the
/// minimum modulus size.
pub fn parse_public_key(pem: &str) -> SmResult<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| SmError::Validation("public key is not an RSA PEM".into()))?;

    if key.size() * 8 < RSA_BITS {
        return Err(SmError::Validation(format!(
            "public key is {} bits, minimum is {RSA_BITS}",
            key.size() * 8
        )));
    }
    Ok(key)
}

fn parse_private_key(pem: &str) -> SmResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| SmError::Crypto("private key is not an RSA PEM".into()))
}

/// Sign an already computed public hash. Returns the signature as hex.
pub fn sign_public_hash(public_hash: &str, private_pem: &SecretString) -> SmResult<String> {
    let private = parse_private_key(private_pem.expose_secret())?;
    let salt_len = max_salt_len(&private);
    let signing_key = BlindedSigningKey::<Sha256>::new_with_salt_len(private, salt_len);
    let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), public_hash.as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Hash `value` the way the index does and sign the result.
pub fn issue_trapdoor(value: &str, private_pem: &SecretString) -> SmResult<Trapdoor> {
    let public_hash = public_hash(value);
    let signature = sign_public_hash(&public_hash, private_pem)?;
    Ok(Trapdoor {
        public_hash,
        signature,
    })
}

/// Check `signature_hex` over `public_hash` against `public_pem`.
///
/// Returns `false` for every failure: unparsable key, bad hex, wrong-length
/// signature, or a signature that does not verify. Callers cannot tell
/// these apart.
pub fn verify(public_hash: &str, signature_hex: &str, public_pem: &str) -> bool {
    try_verify(public_hash, signature_hex, public_pem).is_some()
}

fn try_verify(public_hash: &str, signature_hex: &str, public_pem: &str) -> Option<()> {
    let public = RsaPublicKey::from_public_key_pem(public_pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
        .ok()?;
    let bytes = hex::decode(signature_hex.trim()).ok()?;
    let signature = Signature::try_from(bytes.as_slice()).ok()?;
    let max_salt = max_salt_len(&public);
    VerifyingKey::<Sha256>::new_with_salt_len(public.clone(), max_salt)
        .verify(public_hash.as_bytes(), &signature)
        .or_else(|_| VerifyingKey::<Sha256>::new(public).verify(public_hash.as_bytes(), &signature))
        .ok()
}

/// Largest PSS salt for this modulus: `emLen - hLen - 2`.
fn max_salt_len(key: &impl PublicKeyParts) -> usize {
    let em_len = (key.n().bits() - 1).div_ceil(8);
    em_len.saturating_sub(SHA256_LEN + 2)
}

const SHA256_LEN: usize = 32;
