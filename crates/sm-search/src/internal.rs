//! Internal conjunctive search over the secret token index
//!
//! ```text
//! {field: value, ...}
//!   └── per field: secret_token(field, value) ──► document id set
//!         └── intersect (empty set short-circuits)
//!               └── first MAX_RESULTS ids ──► fetch + decrypt
//! ```
//!
//! Ids are kept in a `BTreeSet`, so the ids selected under truncation are
//! the lexicographically smallest. Callers must not rely on which ids are
//! chosen.
//!
//! A selected document that fails to decrypt fails the whole query with
//! `SmError::Integrity`. It is never dropped silently or reported as a miss.

use serde::Serialize;
use serde_json::Value;
use sm_core::{Document, SmError, SmResult};
use sm_crypto::{DerivedKeys, DocumentCipher, Tokenizer};
use sm_storage::SearchStore;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{error, info};

use crate::ingest::{json_kind, scalar_text};
use crate::timing::{elapsed_ms, serialize_ms};
use crate::MAX_RESULTS;

/// One decrypted match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMatch {
    pub id: String,
    pub document: Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct InternalSearchResult {
    pub results: Vec<DocumentMatch>,
    pub total_matches: usize,
    pub returned_count: usize,
    pub truncated: bool,
    #[serde(serialize_with = "serialize_ms")]
    pub execution_time_ms: f64,
}

/// Trusted-caller search: sees decrypted documents.
#[derive(Clone)]
pub struct InternalSearchEngine {
    cipher: DocumentCipher,
    tokenizer: Tokenizer,
    store: SearchStore,
}

impl InternalSearchEngine {
    pub fn new(keys: &DerivedKeys, store: SearchStore) -> Self {
        Self {
            cipher: DocumentCipher::new(keys),
            tokenizer: Tokenizer::new(keys),
            store,
        }
    }

    /// Search with a parsed JSON query: a non-empty object of field to
    /// scalar value.
    pub async fn search(&self, query: &Value) -> SmResult<InternalSearchResult> {
        let Value::Object(map) = query else {
            return Err(SmError::Validation(format!(
                "query must be a JSON object, got {}",
                json_kind(query)
            )));
        };

        let mut terms = Vec::with_capacity(map.len());
        for (field, value) in map {
            let text = scalar_text(value).ok_or_else(|| {
                SmError::Validation(format!("query value for {field:?} must be a non-empty scalar"))
            })?;
            terms.push((field.clone(), text));
        }
        self.search_terms(&terms).await
    }

    /// Search with already extracted `(field, value)` terms. All must match.
    pub async fn search_terms(&self, terms: &[(String, String)]) -> SmResult<InternalSearchResult> {
        let start = Instant::now();
        if terms.is_empty() {
            return Err(SmError::Validation("query must name at least one field".into()));
        }
        if let Some((field, _)) = terms.iter().find(|(f, _)| f.trim().is_empty()) {
            return Err(SmError::Validation(format!("empty field name: {field:?}")));
        }

        let candidates = self.matching_ids(terms).await?;
        let total_matches = candidates.len();
        let truncated = total_matches > MAX_RESULTS;

        let mut results = Vec::with_capacity(total_matches.min(MAX_RESULTS));
        for id in candidates.into_iter().take(MAX_RESULTS) {
            let Some(stored) = self.store.get_document(&id).await? else {
                error!(document_id = %id, "index row references a missing document");
                return Err(SmError::Integrity(format!("document {id} is missing")));
            };
            let document = self.cipher.decrypt(&stored.blob).map_err(|e| {
                error!(document_id = %id, "stored document failed authentication");
                e
            })?;
            results.push(DocumentMatch { id, document });
        }

        let execution_time_ms = elapsed_ms(start);
        info!(
            fields = terms.len(),
            total_matches,
            returned = results.len(),
            truncated,
            elapsed_ms = execution_time_ms,
            "internal search"
        );
        Ok(InternalSearchResult {
            returned_count: results.len(),
            results,
            total_matches,
            truncated,
            execution_time_ms,
        })
    }

    async fn matching_ids(&self, terms: &[(String, String)]) -> SmResult<BTreeSet<String>> {
        let mut matched: Option<BTreeSet<String>> = None;
        for (field, value) in terms {
            let token = self.tokenizer.secret_token(field, value);
            let ids: BTreeSet<String> = self
                .store
                .documents_for_secret_token(&token)
                .await?
                .into_iter()
                .collect();

            let next = match matched {
                None => ids,
                Some(prev) => prev.intersection(&ids).cloned().collect(),
            };
            if next.is_empty() {
                return Ok(BTreeSet::new());
            }
            matched = Some(next);
        }
        Ok(matched.unwrap_or_default())
    }
}
