//! Trapdoor-gated external search
//!
//! ```text
//! request {auditor_id, public_hash, signature}
//!   ├── missing/malformed field ─────────────► Validation   (no audit row)
//!   ├── unknown auditor ─────────────────────► NotFound     (no audit row)
//!   ├── signature does not verify ───────────► Authorization (audit row, success=false)
//!   └── verified
//!         └── index/public/{hash}/ ──► first MAX_RESULTS ──► ciphertext only
//!                                                            (audit row, success=true)
//! ```
//!
//! This engine holds no key material and never decrypts. Every attempt that
//! reaches a known auditor is written to the audit log before the call
//! returns, including attempts that fail after verification.

use serde::{Deserialize, Serialize};
use sm_core::{now_millis, EncryptedDocument, ExternalSearchAudit, SmError, SmResult};
use sm_storage::SearchStore;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::timing::{elapsed_ms, serialize_ms};
use crate::MAX_RESULTS;

/// External search payload. Every field is required; they are optional here
/// so a missing one is reported as a validation failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalSearchRequest {
    pub auditor_id: Option<String>,
    pub public_hash: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchTiming {
    #[serde(serialize_with = "serialize_ms")]
    pub signature_verification_ms: f64,
    #[serde(serialize_with = "serialize_ms")]
    pub total_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReceipt {
    pub id: String,
    pub timestamp: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalSearchResult {
    /// Stored ciphertext of each match: id, nonce, ciphertext
    pub results: Vec<EncryptedDocument>,
    pub total_matches: usize,
    pub returned_count: usize,
    pub truncated: bool,
    pub performance: SearchTiming,
    pub audit: AuditReceipt,
}

/// Auditor-facing search: sees ciphertext only.
#[derive(Clone)]
pub struct ExternalSearchEngine {
    store: SearchStore,
}

struct Matches {
    results: Vec<EncryptedDocument>,
    total: usize,
}

impl ExternalSearchEngine {
    pub fn new(store: SearchStore) -> Self {
        Self { store }
    }

    pub async fn search(&self, request: &ExternalSearchRequest) -> SmResult<ExternalSearchResult> {
        let start = Instant::now();

        let auditor_id = required(&request.auditor_id, "auditor_id")?;
        let public_hash = required(&request.public_hash, "public_hash")?;
        let signature = required(&request.signature, "signature")?;
        if !is_sha256_hex(public_hash) {
            return Err(SmError::Validation(
                "public_hash must be 64 lowercase hex characters".into(),
            ));
        }

        let auditor = self
            .store
            .get_auditor(auditor_id)
            .await?
            .ok_or_else(|| SmError::NotFound(format!("auditor {auditor_id}")))?;

        let verify_start = Instant::now();
        let verified = sm_crypto::verify(public_hash, signature, &auditor.public_key_pem);
        let signature_verification_ms = elapsed_ms(verify_start);

        if !verified {
            let row = self
                .record(auditor_id, public_hash, 0, 0, false, elapsed_ms(start))
                .await?;
            warn!(
                auditor_id = %auditor_id,
                audit_id = %row.id,
                "trapdoor signature rejected"
            );
            return Err(SmError::Authorization);
        }

        let matches = match self.collect(public_hash).await {
            Ok(m) => m,
            Err(e) => {
                error!(auditor_id = %auditor_id, error = %e, "external search failed after verification");
                self.record(auditor_id, public_hash, 0, 0, false, elapsed_ms(start))
                    .await?;
                return Err(e);
            }
        };

        let returned_count = matches.results.len();
        let truncated = matches.total > MAX_RESULTS;
        let total_ms = elapsed_ms(start);
        let row = self
            .record(auditor_id, public_hash, matches.total, returned_count, true, total_ms)
            .await?;

        info!(
            auditor_id = %auditor_id,
            audit_id = %row.id,
            total_matches = matches.total,
            returned = returned_count,
            truncated,
            elapsed_ms = total_ms,
            "external search"
        );
        Ok(ExternalSearchResult {
            results: matches.results,
            total_matches: matches.total,
            returned_count,
            truncated,
            performance: SearchTiming {
                signature_verification_ms,
                total_ms,
            },
            audit: AuditReceipt {
                id: row.id,
                timestamp: row.timestamp,
                success: row.success,
            },
        })
    }

    async fn collect(&self, public_hash: &str) -> SmResult<Matches> {
        // One document can carry the same value under several fields.
        let ids: BTreeSet<String> = self
            .store
            .documents_for_public_hash(public_hash)
            .await?
            .into_iter()
            .collect();
        let total = ids.len();

        let mut results = Vec::with_capacity(total.min(MAX_RESULTS));
        for id in ids.into_iter().take(MAX_RESULTS) {
            let doc = self
                .store
                .get_document(&id)
                .await?
                .ok_or_else(|| SmError::Integrity(format!("document {id} is missing")))?;
            results.push(doc);
        }
        Ok(Matches { results, total })
    }

    async fn record(
        &self,
        auditor_id: &str,
        public_hash: &str,
        total_matches: usize,
        returned_count: usize,
        success: bool,
        execution_time_ms: f64,
    ) -> SmResult<ExternalSearchAudit> {
        let row = ExternalSearchAudit {
            id: uuid::Uuid::now_v7().to_string(),
            auditor_id: auditor_id.to_string(),
            public_hash: public_hash.to_string(),
            total_matches,
            returned_count,
            truncated: total_matches > returned_count,
            execution_time_ms,
            success,
            timestamp: now_millis(),
        };
        self.store.append_audit(&row).await?;
        Ok(row)
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> SmResult<&'a str> {
    match field.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SmError::Validation(format!("{name} is required"))),
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_storage::build_memory_operator;

    fn engine() -> ExternalSearchEngine {
        ExternalSearchEngine::new(SearchStore::new(build_memory_operator().unwrap()))
    }

    fn request(auditor: Option<&str>, hash: Option<&str>, sig: Option<&str>) -> ExternalSearchRequest {
        ExternalSearchRequest {
            auditor_id: auditor.map(Into::into),
            public_hash: hash.map(Into::into),
            signature: sig.map(Into::into),
        }
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&"a".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex(&"a".repeat(63)));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let engine = engine();
        let hash = "0".repeat(64);

        for req in [
            request(None, Some(&hash), Some("00")),
            request(Some("aud"), None, Some("00")),
            request(Some("aud"), Some(&hash), None),
            request(Some(""), Some(&hash), Some("00")),
            request(Some("aud"), Some(&hash), Some("   ")),
        ] {
            assert!(matches!(engine.search(&req).await, Err(SmError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_malformed_hash_rejected() {
        let engine = engine();
        let req = request(Some("aud"), Some("not-a-hash"), Some("00"));
        assert!(matches!(engine.search(&req).await, Err(SmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_auditor_not_found() {
        let engine = engine();
        let req = request(Some("ghost"), Some(&"0".repeat(64)), Some("00"));
        assert!(matches!(engine.search(&req).await, Err(SmError::NotFound(_))));
        assert!(engine.store.audits_for_auditor("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unstorable_auditor_id_not_found() {
        let engine = engine();
        let req = request(Some("auditor.42"), Some(&"0".repeat(64)), Some("00"));
        assert!(matches!(engine.search(&req).await, Err(SmError::NotFound(_))));
    }

    #[test]
    fn test_request_deserializes_with_missing_fields() {
        let req: ExternalSearchRequest =
            serde_json::from_str(r#"{"auditor_id": "a1"}"#).unwrap();
        assert_eq!(req.auditor_id.as_deref(), Some("a1"));
        assert!(req.public_hash.is_none());
        assert!(req.signature.is_none());
    }
}
