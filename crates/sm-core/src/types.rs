use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A plaintext document: an ordered map of field name to JSON value.
///
/// `BTreeMap` keeps keys sorted, so serializing the same document always
/// yields the same bytes.
pub type Document = BTreeMap<String, serde_json::Value>;

/// AEAD output: 12-byte nonce and ciphertext with the 16-byte tag appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

/// A stored document. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDocument {
    pub id: String,
    #[serde(flatten)]
    pub blob: EncryptedBlob,
    /// Unix timestamp (milliseconds) of ingestion
    pub created_at: u64,
}

/// One searchable field value of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// HMAC-SHA256 of the field-bound normalized value (hex)
    pub secret_token: String,
    /// SHA-256 of the normalized value (hex)
    pub public_hash: String,
    pub document_id: String,
}

/// An external auditor allowed to run trapdoor searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auditor {
    pub id: String,
    pub name: String,
    /// RSA public key, SubjectPublicKeyInfo PEM
    pub public_key_pem: String,
    pub created_at: u64,
    #[serde(default)]
    pub rotated_at: Option<u64>,
}

/// A signed search capability. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trapdoor {
    pub public_hash: String,
    /// RSA-PSS signature over the UTF-8 bytes of `public_hash` (hex)
    pub signature: String,
}

/// One row per external search attempt that reached a known auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSearchAudit {
    pub id: String,
    pub auditor_id: String,
    pub public_hash: String,
    pub total_matches: usize,
    pub returned_count: usize,
    pub truncated: bool,
    /// Unrounded wall time of the attempt
    pub execution_time_ms: f64,
    pub success: bool,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_serialization_is_key_ordered() {
        let mut a = Document::new();
        a.insert("zeta".into(), serde_json::json!(1));
        a.insert("alpha".into(), serde_json::json!("x"));

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"alpha":"x","zeta":1}"#);
    }

    #[test]
    fn test_encrypted_document_hex_layout() {
        let doc = EncryptedDocument {
            id: "d1".into(),
            blob: EncryptedBlob {
                nonce: vec![0xab; 12],
                ciphertext: vec![0x01, 0xff],
            },
            created_at: 7,
        };
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["nonce"], "abababababababababababab");
        assert_eq!(value["ciphertext"], "01ff");

        let back: EncryptedDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
