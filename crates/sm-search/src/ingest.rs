//! Document ingestion
//!
//! ```text
//! document ──► allow-listed scalar fields ──► (secret token, public hash) per field
//!    │
//!    └──► DocumentCipher::encrypt ──► documents/{id}.json
//!                                       then index rows for each field
//! ```
//!
//! The document object is written before its index rows, so an index row
//! never points at a document that was not stored.

use serde::Serialize;
use serde_json::Value;
use sm_core::{now_millis, Document, EncryptedDocument, IndexEntry, SmError, SmResult};
use sm_crypto::{public_hash, DerivedKeys, DocumentCipher, Tokenizer};
use sm_storage::SearchStore;
use tracing::{debug, info};

/// What ingestion did with one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    /// Allow-listed fields that were tokenized, in name order
    pub indexed_fields: Vec<String>,
}

/// Encrypts documents and writes their search index rows.
#[derive(Clone)]
pub struct DocumentIndexer {
    cipher: DocumentCipher,
    tokenizer: Tokenizer,
    store: SearchStore,
    searchable_fields: Vec<String>,
}

impl DocumentIndexer {
    pub fn new(keys: &DerivedKeys, store: SearchStore, searchable_fields: Vec<String>) -> Self {
        Self {
            cipher: DocumentCipher::new(keys),
            tokenizer: Tokenizer::new(keys),
            store,
            searchable_fields,
        }
    }

    pub fn searchable_fields(&self) -> &[String] {
        &self.searchable_fields
    }

    /// Ingest a parsed JSON payload. Anything but an object is rejected.
    pub async fn ingest(&self, input: Value) -> SmResult<IngestReceipt> {
        match input {
            Value::Object(map) => self.ingest_document(map.into_iter().collect()).await,
            other => Err(SmError::Validation(format!(
                "document must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Ingest each payload independently. One failure does not stop the rest.
    pub async fn ingest_many(&self, inputs: Vec<Value>) -> Vec<SmResult<IngestReceipt>> {
        let mut receipts = Vec::with_capacity(inputs.len());
        for input in inputs {
            receipts.push(self.ingest(input).await);
        }
        receipts
    }

    pub async fn ingest_document(&self, document: Document) -> SmResult<IngestReceipt> {
        let document_id = uuid::Uuid::new_v4().to_string();

        let entries: Vec<(String, IndexEntry)> = self
            .searchable_fields
            .iter()
            .filter_map(|field| {
                let value = document.get(field).and_then(scalar_text)?;
                Some((
                    field.clone(),
                    IndexEntry {
                        secret_token: self.tokenizer.secret_token(field, &value),
                        public_hash: public_hash(&value),
                        document_id: document_id.clone(),
                    },
                ))
            })
            .collect();

        let blob = self.cipher.encrypt(&document)?;
        self.store
            .put_document(&EncryptedDocument {
                id: document_id.clone(),
                blob,
                created_at: now_millis(),
            })
            .await?;

        let mut indexed_fields = Vec::with_capacity(entries.len());
        for (field, entry) in entries {
            self.store.put_index_entry(&entry).await?;
            debug!(document_id = %document_id, field = %field, "index row written");
            indexed_fields.push(field);
        }
        indexed_fields.sort();

        info!(
            document_id = %document_id,
            fields = document.len(),
            indexed = indexed_fields.len(),
            "document ingested"
        );
        Ok(IngestReceipt {
            document_id,
            indexed_fields,
        })
    }
}

/// Text form of a searchable scalar, or `None` if the value is not indexable.
///
/// Strings are taken as-is, numbers and booleans by their JSON spelling.
/// Nulls, arrays, objects, and blank strings are never indexed.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
