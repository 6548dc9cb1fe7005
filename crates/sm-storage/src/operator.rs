//! OpenDAL Operator factory for securematch storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use sm_core::config::{StorageBackend, StorageConfig};
use std::path::{Path, PathBuf};

/// In-process backend. Contents vanish with the operator.
pub fn build_memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish();
    Ok(op)
}

/// Local filesystem backend rooted at `root`.
pub fn build_fs_operator(root: &Path) -> Result<Operator> {
    let root = expand_tilde(root);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("creating storage root: {}", root.display()))?;

    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
    let op = Operator::new(builder)
        .context("creating OpenDAL fs operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// S3-compatible backend (path-style addressing).
pub fn build_s3_operator(
    cfg: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();
    Ok(op)
}

/// Build an operator from the `[storage]` config section.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints. S3
/// credentials come from the standard AWS environment variables.
pub fn build_from_core_config(storage: &StorageConfig) -> Result<Operator> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("memory storage backend: documents are lost on exit");
            build_memory_operator()
        }
        StorageBackend::Fs => build_fs_operator(&storage.root),
        StorageBackend::S3 => {
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP, ciphertext and index rows travel unencrypted"
                );
            }
            let access_key = std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID environment variable not set")?;
            let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
            build_s3_operator(storage, &access_key, &secret_key)
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
