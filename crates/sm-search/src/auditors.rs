//! Auditor accounts: registration, key rotation, audit-log retrieval

use secrecy::{ExposeSecret, SecretString};
use sm_core::{now_millis, Auditor, ExternalSearchAudit, SmError, SmResult};
use sm_crypto::{generate_keypair, parse_public_key};
use sm_storage::SearchStore;
use tracing::info;

const MAX_NAME_LEN: usize = 200;

/// A rotated auditor plus the new private key.
///
/// The private key is never stored server-side. This is the only copy.
#[derive(Debug)]
pub struct RotatedKey {
    pub auditor: Auditor,
    pub private_key_pem: SecretString,
}

#[derive(Clone)]
pub struct AuditorRegistry {
    store: SearchStore,
}

impl AuditorRegistry {
    pub fn new(store: SearchStore) -> Self {
        Self { store }
    }

    /// Register an auditor under a fresh id. The key must be RSA, 2048 bits
    /// or more, SPKI or PKCS#1 PEM.
    pub async fn register(&self, name: &str, public_key_pem: &str) -> SmResult<Auditor> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(SmError::Validation(format!(
                "auditor name must be 1..={MAX_NAME_LEN} characters"
            )));
        }
        parse_public_key(public_key_pem)?;

        let auditor = Auditor {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            public_key_pem: public_key_pem.trim().to_string() + "\n",
            created_at: now_millis(),
            rotated_at: None,
        };
        self.store.put_auditor(&auditor).await?;

        info!(auditor_id = %auditor.id, "auditor registered");
        Ok(auditor)
    }

    pub async fn get(&self, auditor_id: &str) -> SmResult<Auditor> {
        self.store
            .get_auditor(auditor_id)
            .await?
            .ok_or_else(|| SmError::NotFound(format!("auditor {auditor_id}")))
    }

    /// Replace the auditor's key with a freshly generated one.
    ///
    /// Trapdoors signed with the old key stop verifying immediately.
    pub async fn rotate_key(&self, auditor_id: &str) -> SmResult<RotatedKey> {
        let mut auditor = self.get(auditor_id).await?;

        let keypair = tokio::task::spawn_blocking(generate_keypair)
            .await
            .map_err(|e| SmError::Crypto(format!("key generation task failed: {e}")))??;

        auditor.public_key_pem = keypair.public_pem.clone();
        auditor.rotated_at = Some(now_millis());
        self.store.put_auditor(&auditor).await?;

        info!(auditor_id = %auditor.id, "auditor key rotated");
        Ok(RotatedKey {
            auditor,
            private_key_pem: SecretString::from(keypair.private_pem().expose_secret().to_owned()),
        })
    }

    /// Every external search attempt by this auditor, oldest first.
    pub async fn audit_log(&self, auditor_id: &str) -> SmResult<Vec<ExternalSearchAudit>> {
        self.get(auditor_id).await?;
        self.store.audits_for_auditor(auditor_id).await
    }

    pub async fn audit_entry(&self, audit_id: &str) -> SmResult<ExternalSearchAudit> {
        self.store
            .get_audit(audit_id)
            .await?
            .ok_or_else(|| SmError::NotFound(format!("audit entry {audit_id}")))
    }
}
