//! `SecureMatch`: one keyset and one store wired into every engine

use opendal::Operator;
use serde_json::Value;
use sm_core::config::SmConfig;
use sm_core::{Auditor, ExternalSearchAudit, SmResult};
use sm_crypto::{derive_keys, load_master_key, DerivedKeys, MasterKey};
use sm_storage::{build_from_core_config, check_health, SearchStore};
use std::sync::Arc;
use tracing::info;

use crate::auditors::{AuditorRegistry, RotatedKey};
use crate::external::{ExternalSearchEngine, ExternalSearchRequest, ExternalSearchResult};
use crate::ingest::{DocumentIndexer, IngestReceipt};
use crate::internal::{InternalSearchEngine, InternalSearchResult};

/// The assembled service. Cheap to clone; clones share keys and storage.
#[derive(Clone)]
pub struct SecureMatch {
    keys: Arc<DerivedKeys>,
    store: SearchStore,
    indexer: DocumentIndexer,
    internal: InternalSearchEngine,
    external: ExternalSearchEngine,
    auditors: AuditorRegistry,
}

impl SecureMatch {
    pub fn new(keys: Arc<DerivedKeys>, store: SearchStore, searchable_fields: Vec<String>) -> Self {
        Self {
            indexer: DocumentIndexer::new(&keys, store.clone(), searchable_fields),
            internal: InternalSearchEngine::new(&keys, store.clone()),
            external: ExternalSearchEngine::new(store.clone()),
            auditors: AuditorRegistry::new(store.clone()),
            keys,
            store,
        }
    }

    /// Build from config with an explicit master key and operator.
    pub fn with_operator(config: &SmConfig, master: &MasterKey, op: Operator) -> Self {
        let keys = Arc::new(derive_keys(master));
        Self::new(keys, SearchStore::new(op), config.index.searchable_fields.clone())
    }

    /// Build entirely from config: master key from the configured
    /// environment variable, storage from `[storage]`.
    pub fn open(config: &SmConfig) -> SmResult<Self> {
        config.validate()?;
        let master = load_master_key(&config.keys.master_key_env)?;
        let op = build_from_core_config(&config.storage)?;
        info!(
            backend = ?config.storage.backend,
            searchable_fields = ?config.index.searchable_fields,
            "securematch ready"
        );
        Ok(Self::with_operator(config, &master, op))
    }

    pub fn keys(&self) -> &Arc<DerivedKeys> {
        &self.keys
    }

    pub fn store(&self) -> &SearchStore {
        &self.store
    }

    pub fn searchable_fields(&self) -> &[String] {
        self.indexer.searchable_fields()
    }

    pub async fn health(&self) -> SmResult<()> {
        check_health(self.store.operator()).await?;
        Ok(())
    }

    pub async fn ingest(&self, document: Value) -> SmResult<IngestReceipt> {
        self.indexer.ingest(document).await
    }

    pub async fn ingest_many(&self, documents: Vec<Value>) -> Vec<SmResult<IngestReceipt>> {
        self.indexer.ingest_many(documents).await
    }

    pub async fn search_internal(&self, query: &Value) -> SmResult<InternalSearchResult> {
        self.internal.search(query).await
    }

    pub async fn search_internal_terms(
        &self,
        terms: &[(String, String)],
    ) -> SmResult<InternalSearchResult> {
        self.internal.search_terms(terms).await
    }

    pub async fn search_external(
        &self,
        request: &ExternalSearchRequest,
    ) -> SmResult<ExternalSearchResult> {
        self.external.search(request).await
    }

    pub async fn register_auditor(&self, name: &str, public_key_pem: &str) -> SmResult<Auditor> {
        self.auditors.register(name, public_key_pem).await
    }

    pub async fn auditor(&self, auditor_id: &str) -> SmResult<Auditor> {
        self.auditors.get(auditor_id).await
    }

    pub async fn rotate_auditor_key(&self, auditor_id: &str) -> SmResult<RotatedKey> {
        self.auditors.rotate_key(auditor_id).await
    }

    pub async fn audit_log(&self, auditor_id: &str) -> SmResult<Vec<ExternalSearchAudit>> {
        self.auditors.audit_log(auditor_id).await
    }

    pub async fn audit_entry(&self, audit_id: &str) -> SmResult<ExternalSearchAudit> {
        self.auditors.audit_entry(audit_id).await
    }
}
