use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Store, StoreRead, decode, encode};
use crate::{errors::StoreError, record::Record};

/// Number of primitive calls issued against a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: u64,
    pub exists: u64,
    pub scans: u64,
    pub sets: u64,
    pub renames: u64,
    pub deletes: u64,
}

impl OperationCounts {
    pub fn total(&self) -> u64 {
        self.gets + self.exists + self.scans + self.sets + self.renames + self.deletes
    }

    /// Calls that change stored data.
    pub fn writes(&self) -> u64 {
        self.sets + self.renames + self.deletes
    }
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, String>,
    counts: OperationCounts,
}

/// In-memory store keeping serialized values, so renames are byte-identical
/// exactly as they are in Redis.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records without counting operations.
    pub fn with_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Record)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for (key, record) in records {
                inner.entries.insert(key.into(), record.to_string());
            }
        }
        store
    }

    /// Store a raw value without counting the operation.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.lock().entries.insert(key.into(), raw.into());
    }

    /// Raw stored value without counting the operation.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    /// Decoded record without counting the operation.
    pub fn record(&self, key: &str) -> Option<Record> {
        self.raw(key).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Every stored key in order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn counts(&self) -> OperationCounts {
        self.lock().counts
    }

    pub fn reset_counts(&self) {
        self.lock().counts = OperationCounts::default();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned map is still structurally valid; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StoreRead for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let raw = {
            let mut inner = self.lock();
            inner.counts.gets += 1;
            inner.entries.get(key).cloned()
        };
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        inner.counts.exists += 1;
        Ok(inner.entries.contains_key(key))
    }

    async fn enumerate_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        inner.counts.scans += 1;
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, record: &Record) -> Result<(), StoreError> {
        let raw = encode(key, record)?;
        let mut inner = self.lock();
        inner.counts.sets += 1;
        inner.entries.insert(key.to_string(), raw);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.counts.renames += 1;
        if !inner.entries.contains_key(from) {
            return Err(StoreError::MissingKey { key: from.to_string() });
        }
        if inner.entries.contains_key(to) {
            return Err(StoreError::KeyExists { key: to.to_string() });
        }
        if let Some(raw) = inner.entries.remove(from) {
            inner.entries.insert(to.to_string(), raw);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        inner.counts.deletes += 1;
        Ok(inner.entries.remove(key).is_some())
    }
}
