//! Shared fixtures: an in-memory service and cached auditor keypairs.
//!
//! RSA-2048 generation is slow, so each keypair is generated once per test
//! binary.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use sm_crypto::{derive_keys, generate_keypair, AuditorKeypair, MasterKey};
use sm_search::SecureMatch;
use sm_storage::{build_memory_operator, SearchStore};

pub fn service() -> SecureMatch {
    let keys = Arc::new(derive_keys(&MasterKey::from_bytes([0x5Au8; 32])));
    let store = SearchStore::new(build_memory_operator().unwrap());
    SecureMatch::new(
        keys,
        store,
        vec!["email".into(), "name".into(), "phone".into(), "city".into()],
    )
}

pub fn auditor_key() -> &'static AuditorKeypair {
    static KEY: OnceLock<AuditorKeypair> = OnceLock::new();
    KEY.get_or_init(|| generate_keypair().unwrap())
}

pub fn other_key() -> &'static AuditorKeypair {
    static KEY: OnceLock<AuditorKeypair> = OnceLock::new();
    KEY.get_or_init(|| generate_keypair().unwrap())
}
