//! Keyshift core library.
//!
//! Versioned, one-shot data migrations for records in a schema-less key-value
//! store, a ledger of what has been applied, and the admin surface used to
//! control a running host.

pub mod admin;
pub mod errors;
pub mod id;
pub mod keys;
pub mod ledger;
pub mod migration;
pub mod record;
pub mod registry;
pub mod runner;
pub mod store;
pub mod units;

pub use errors::*;
pub use keys::{DEFAULT_NAMESPACE, KeySpace};
pub use ledger::{AppliedMigration, DEFAULT_LEDGER_KEY, Ledger};
pub use migration::{Migration, MigrationSet, Write};
pub use record::{Record, RecordExt};
pub use registry::*;
pub use runner::{LedgerStatus, MigrationRunner, PassReport, RunnerState, UnitReport, WriteCounts};
pub use store::{MemoryStore, RedisStore, Store, StoreRead, cleanup_prefix};

// Re-export redis types so users don't need to depend on a specific redis version
pub use redis;
pub use redis::aio::ConnectionManager;

// Re-export for unit registration and implementing the async traits
pub use async_trait::async_trait;
pub use inventory;
