//! sm-core: shared types, config schema, and error taxonomy for securematch

pub mod config;
pub mod error;
pub mod types;

pub use error::{SmError, SmResult};
pub use types::{
    now_millis, Auditor, Document, EncryptedBlob, EncryptedDocument, ExternalSearchAudit,
    IndexEntry, Trapdoor,
};
