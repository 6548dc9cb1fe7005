//! End-to-end flows through the `SecureMatch` facade on an in-memory store.

mod common;

use serde_json::json;
use sm_core::SmError;
use sm_crypto::{issue_trapdoor, public_hash};
use sm_search::ExternalSearchRequest;

fn request(auditor_id: &str, public_hash: &str, signature: &str) -> ExternalSearchRequest {
    ExternalSearchRequest {
        auditor_id: Some(auditor_id.into()),
        public_hash: Some(public_hash.into()),
        signature: Some(signature.into()),
    }
}

/// An internal query matches regardless of case and surrounding whitespace.
#[tokio::test]
async fn internal_hit_on_case_and_whitespace_variant() {
    let service = common::service();
    let receipt = service
        .ingest(json!({"email": "alice@example.com", "name": "Alice", "ssn": "123-45-6789"}))
        .await
        .unwrap();

    let result = service
        .search_internal(&json!({"email": "  ALICE@Example.com  "}))
        .await
        .unwrap();

    assert_eq!(result.total_matches, 1);
    assert_eq!(result.returned_count, 1);
    assert!(!result.truncated);
    assert_eq!(result.results[0].id, receipt.document_id);
    assert_eq!(result.results[0].document["ssn"], json!("123-45-6789"));
}

/// A valid trapdoor returns ciphertext only and logs a successful attempt.
#[tokio::test]
async fn external_hit_returns_ciphertext_and_logs_success() {
    let service = common::service();
    let receipt = service
        .ingest(json!({"email": "alice@example.com", "name": "Alice"}))
        .await
        .unwrap();
    let auditor = service
        .register_auditor("Acme Audit", &common::auditor_key().public_pem)
        .await
        .unwrap();

    let trapdoor = issue_trapdoor("Alice@Example.com", common::auditor_key().private_pem()).unwrap();
    let result = service
        .search_external(&request(&auditor.id, &trapdoor.public_hash, &trapdoor.signature))
        .await
        .unwrap();

    assert_eq!(result.total_matches, 1);
    assert_eq!(result.results[0].id, receipt.document_id);
    assert_eq!(result.results[0].blob.nonce.len(), 12);

    let wire = serde_json::to_string(&result).unwrap();
    assert!(!wire.contains("alice@example.com"));
    assert!(!wire.contains("Alice"));

    assert!(result.audit.success);
    let row = service.audit_entry(&result.audit.id).await.unwrap();
    assert!(row.success);
    assert_eq!(row.auditor_id, auditor.id);
    assert_eq!(row.total_matches, 1);
    assert_eq!(row.returned_count, 1);
    assert_eq!(row.timestamp, result.audit.timestamp);
}

/// An unknown auditor id is NotFound and leaves no audit row.
#[tokio::test]
async fn wrong_auditor_is_not_found_without_audit_row() {
    let service = common::service();
    service.ingest(json!({"email": "alice@example.com"})).await.unwrap();
    let auditor = service
        .register_auditor("Acme Audit", &common::auditor_key().public_pem)
        .await
        .unwrap();

    let trapdoor = issue_trapdoor("alice@example.com", common::auditor_key().private_pem()).unwrap();
    let err = service
        .search_external(&request("no-such-auditor", &trapdoor.public_hash, &trapdoor.signature))
        .await
        .unwrap_err();

    assert!(matches!(err, SmError::NotFound(_)));
    assert_eq!(err.public_message(), "not found");
    assert!(service.audit_log(&auditor.id).await.unwrap().is_empty());
}

/// A tampered signature is an opaque authorization failure with one failed row.
#[tokio::test]
async fn tampered_signature_logs_one_failed_row() {
    let service = common::service();
    service.ingest(json!({"email": "alice@example.com"})).await.unwrap();
    let auditor = service
        .register_auditor("Acme Audit", &common::auditor_key().public_pem)
        .await
        .unwrap();

    let trapdoor = issue_trapdoor("alice@example.com", common::auditor_key().private_pem()).unwrap();
    let mut sig = hex::decode(&trapdoor.signature).unwrap();
    sig[0] ^= 0x80;

    let err = service
        .search_external(&request(&auditor.id, &trapdoor.public_hash, &hex::encode(sig)))
        .await
        .unwrap_err();

    assert!(matches!(err, SmError::Authorization));
    assert_eq!(err.public_message(), "not authorized");

    let log = service.audit_log(&auditor.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].success);
    assert_eq!(log[0].total_matches, 0);
    assert_eq!(log[0].returned_count, 0);
    assert!(!log[0].truncated);
    assert_eq!(log[0].public_hash, public_hash("alice@example.com"));
}

/// A value stored under two fields is counted once by external search.
#[tokio::test]
async fn external_counts_distinct_documents() {
    let service = common::service();
    service
        .ingest(json!({"name": "sam", "city": "Sam"}))
        .await
        .unwrap();
    let auditor = service
        .register_auditor("Acme Audit", &common::auditor_key().public_pem)
        .await
        .unwrap();

    let trapdoor = issue_trapdoor("sam", common::auditor_key().private_pem()).unwrap();
    let result = service
        .search_external(&request(&auditor.id, &trapdoor.public_hash, &trapdoor.signature))
        .await
        .unwrap();

    assert_eq!(result.total_matches, 1);
    assert_eq!(result.returned_count, 1);
}
