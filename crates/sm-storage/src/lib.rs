//! sm-storage: OpenDAL storage abstraction for the securematch index

pub mod health;
pub mod operator;
pub mod store;

pub use health::{check_health, probe, StorageHealth};
pub use operator::{build_from_core_config, build_memory_operator};
pub use store::SearchStore;
