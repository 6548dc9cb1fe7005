//! Storage reachability probe

use anyhow::{anyhow, Result};
use opendal::{ErrorKind, Operator};
use serde::Serialize;
use std::time::Instant;

/// Outcome of one probe, as reported by `securematch status`.
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    /// OpenDAL scheme, e.g. `fs`, `s3`, `memory`
    pub scheme: String,
    pub reachable: bool,
    pub latency_ms: f64,
}

/// Verify the backend answers a listing of the document prefix.
///
/// A store that has never held a document has no such prefix; that counts
/// as healthy.
pub async fn check_health(op: &Operator) -> Result<()> {
    match op.list("documents/").await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow!(
            "storage health check failed ({}): {e}",
            op.info().scheme()
        )),
    }
}

/// Run [`check_health`] and time it. Never fails; errors are logged.
pub async fn probe(op: &Operator) -> StorageHealth {
    let start = Instant::now();
    let result = check_health(op).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "storage probe failed");
    }
    StorageHealth {
        scheme: op.info().scheme().to_string(),
        reachable: result.is_ok(),
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }
}
