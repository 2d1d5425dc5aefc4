//! Persistence layer: libSQL-backed storage with an in-memory fallback mirror.

pub mod fallback;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use fallback::{FallbackStore, spawn_connectivity_probe};
pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{
    Analytics, AnalyticsField, LeadPage, LeadQuery, LeadStore, SourceCount, StorageKind,
};
