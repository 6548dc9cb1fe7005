//! sm-search: the searchable-encryption engines
//!
//! ```text
//! ingest ──► DocumentIndexer ──► documents/ + index/secret/ + index/public/
//!
//! internal query ──► InternalSearchEngine ──► secret tokens ──► decrypted documents
//!
//! external query ──► ExternalSearchEngine ──► verify trapdoor ──► ciphertext only
//!                                                    └──► audit/ (every attempt)
//! ```

pub mod auditors;
pub mod external;
pub mod ingest;
pub mod internal;
pub mod service;
pub mod timing;

pub use auditors::{AuditorRegistry, RotatedKey};
pub use external::{
    AuditReceipt, ExternalSearchEngine, ExternalSearchRequest, ExternalSearchResult, SearchTiming,
};
pub use ingest::{DocumentIndexer, IngestReceipt};
pub use internal::{DocumentMatch, InternalSearchEngine, InternalSearchResult};
pub use service::SecureMatch;

/// Result cap shared by internal and external search.
pub const MAX_RESULTS: usize = 50;
