//! Store adapter contract.
//!
//! This module provides:
//! - `StoreRead` - read-only primitives handed to migration transforms
//! - `Store` - the full primitive set used by the runner and ledger
//! - `RedisStore` - JSON-string records in Redis
//! - `MemoryStore` - ordered in-memory map with operation counters

mod memory;
mod redis_store;

use async_trait::async_trait;

pub use self::memory::{MemoryStore, OperationCounts};
pub use self::redis_store::{RedisStore, cleanup_prefix};

use crate::{errors::StoreError, record::Record};

#[async_trait]
pub trait StoreRead: Send + Sync {
    /// Record stored at `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Snapshot of every key starting with `prefix`, de-duplicated and sorted.
    ///
    /// Keys written after the snapshot is taken are not included.
    async fn enumerate_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait Store: StoreRead {
    async fn set(&self, key: &str, record: &Record) -> Result<(), StoreError>;

    /// Move the value at `from` to `to`, byte for byte.
    ///
    /// Fails with [`StoreError::MissingKey`] if `from` is absent and
    /// [`StoreError::KeyExists`] if `to` is already present.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Remove `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

pub(crate) fn decode(key: &str, raw: &str) -> Result<Record, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn encode(key: &str, record: &Record) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}
