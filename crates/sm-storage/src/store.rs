//! Object layout for documents, index rows, auditors, and the audit log.
//!
//! ```text
//! documents/{document_id}.json                 EncryptedDocument
//! index/secret/{secret_token}/{document_id}    IndexEntry
//! index/public/{public_hash}/{document_id}     IndexEntry
//! auditors/{auditor_id}.json                   Auditor
//! audit/{audit_id}.json                        ExternalSearchAudit
//! audit-by-auditor/{auditor_id}/{audit_id}     empty marker
//! ```
//!
//! Every lookup is an exact-key read or the listing of one exact token
//! directory. Objects are written once and never rewritten, except
//! auditor records on key rotation.

use opendal::{ErrorKind, Operator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sm_core::{Auditor, EncryptedDocument, ExternalSearchAudit, IndexEntry, SmError, SmResult};
use tracing::debug;

const MAX_SEGMENT_LEN: usize = 128;

/// Storage collaborator for the search engines.
#[derive(Clone, Debug)]
pub struct SearchStore {
    op: Operator,
}

impl SearchStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    // ── Documents ────────────────────────────────────────────────────────

    pub async fn put_document(&self, doc: &EncryptedDocument) -> SmResult<()> {
        let key = format!("documents/{}.json", segment(&doc.id)?);
        self.write_json(&key, doc).await
    }

    pub async fn get_document(&self, id: &str) -> SmResult<Option<EncryptedDocument>> {
        let Some(id) = stored_id(id) else {
            return Ok(None);
        };
        self.read_json(&format!("documents/{id}.json")).await
    }

    // ── Search index ─────────────────────────────────────────────────────

    /// Write the entry under both its secret token and its public hash.
    pub async fn put_index_entry(&self, entry: &IndexEntry) -> SmResult<()> {
        let doc = segment(&entry.document_id)?;
        let secret_key = format!("index/secret/{}/{doc}", segment(&entry.secret_token)?);
        let public_key = format!("index/public/{}/{doc}", segment(&entry.public_hash)?);

        self.write_json(&secret_key, entry).await?;
        self.write_json(&public_key, entry).await
    }

    /// Ids of documents indexed under `token`, in storage listing order.
    pub async fn documents_for_secret_token(&self, token: &str) -> SmResult<Vec<String>> {
        let dir = format!("index/secret/{}/", segment(token)?);
        self.list_names(&dir).await
    }

    /// Ids of documents indexed under `hash`, in storage listing order.
    pub async fn documents_for_public_hash(&self, hash: &str) -> SmResult<Vec<String>> {
        let dir = format!("index/public/{}/", segment(hash)?);
        self.list_names(&dir).await
    }

    // ── Auditors ─────────────────────────────────────────────────────────

    pub async fn put_auditor(&self, auditor: &Auditor) -> SmResult<()> {
        let key = format!("auditors/{}.json", segment(&auditor.id)?);
        self.write_json(&key, auditor).await
    }

    pub async fn get_auditor(&self, id: &str) -> SmResult<Option<Auditor>> {
        let Some(id) = stored_id(id) else {
            return Ok(None);
        };
        self.read_json(&format!("auditors/{id}.json")).await
    }

    // ── Audit log ────────────────────────────────────────────────────────

    /// Append an audit row. Returns only after both objects are written.
    pub async fn append_audit(&self, row: &ExternalSearchAudit) -> SmResult<()> {
        let id = segment(&row.id)?;
        let auditor = segment(&row.auditor_id)?;

        self.write_json(&format!("audit/{id}.json"), row).await?;
        self.op
            .write(&format!("audit-by-auditor/{auditor}/{id}"), Vec::<u8>::new())
            .await
            .map_err(|e| SmError::Storage(format!("writing audit marker {id}: {e}")))?;

        debug!(audit_id = %id, auditor_id = %auditor, success = row.success, "audit row appended");
        Ok(())
    }

    pub async fn get_audit(&self, id: &str) -> SmResult<Option<ExternalSearchAudit>> {
        let Some(id) = stored_id(id) else {
            return Ok(None);
        };
        self.read_json(&format!("audit/{id}.json")).await
    }

    /// All audit rows for one auditor, oldest first.
    pub async fn audits_for_auditor(&self, auditor_id: &str) -> SmResult<Vec<ExternalSearchAudit>> {
        let dir = format!("audit-by-auditor/{}/", segment(auditor_id)?);
        let mut rows = Vec::new();
        for id in self.list_names(&dir).await? {
            match self.get_audit(&id).await? {
                Some(row) => rows.push(row),
                None => tracing::warn!(audit_id = %id, "audit marker without audit row"),
            }
        }
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> SmResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.op
            .write(key, bytes)
            .await
            .map_err(|e| SmError::Storage(format!("writing {key}: {e}")))?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> SmResult<Option<T>> {
        match self.op.read(key).await {
            Ok(data) => {
                let value = serde_json::from_slice(&data.to_vec())
                    .map_err(|e| SmError::Serialization(format!("parsing {key}: {e}")))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SmError::Storage(format!("reading {key}: {e}"))),
        }
    }

    /// File names directly under `dir` (which ends with `/`).
    async fn list_names(&self, dir: &str) -> SmResult<Vec<String>> {
        match self.op.list(dir).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|e| e.path() != dir && !e.path().ends_with('/'))
                .map(|e| e.name().to_string())
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SmError::Storage(format!("listing {dir}: {e}"))),
        }
    }
}

/// A caller-supplied path segment: ASCII alphanumerics, `-`, `_`.
fn segment(s: &str) -> SmResult<&str> {
    let ok = !s.is_empty()
        && s.len() <= MAX_SEGMENT_LEN
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(s)
    } else {
        Err(SmError::Validation(format!("invalid identifier: {s:?}")))
    }
}

/// An id read back by exact key. One that could never have been written
/// names nothing.
fn stored_id(id: &str) -> Option<&str> {
    segment(id).ok()
}
