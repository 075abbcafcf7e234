#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use keyshift::{
    MemoryStore, Migration, Record, Store, StoreError, StoreRead, UnitError, Write,
    admin::{AdminError, UserDirectory},
    async_trait,
};

/// Wraps a [`MemoryStore`] and fails writes to chosen keys.
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes_to: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_writes_to: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_writes_to(&self, key: &str) {
        self.fail_writes_to.lock().unwrap().insert(key.to_string());
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_writes_to.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(redis::RedisError::from((
                redis::ErrorKind::ResponseError,
                "injected write failure",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreRead for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn enumerate_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.enumerate_keys(prefix).await
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn set(&self, key: &str, record: &Record) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set(key, record).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check(from)?;
        self.inner.rename(from, to).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check(key)?;
        self.inner.delete(key).await
    }
}

/// Marks every `Item:` record with `{"<id>": true}`.
pub struct MarkItems {
    pub id: &'static str,
}

#[async_trait]
impl Migration for MarkItems {
    fn id(&self) -> &str {
        self.id
    }

    fn key_prefix(&self) -> String {
        "Item:".to_string()
    }

    async fn apply(&self, _store: &dyn StoreRead, key: &str, record: Option<Record>) -> Result<Vec<Write>, UnitError> {
        let mut record = record.ok_or_else(|| UnitError::MissingRecord { key: key.to_string() })?;
        let fields = record.as_object_mut().ok_or(UnitError::InvalidField {
            field: "<record>".to_string(),
            expected: "an object",
        })?;
        fields.insert(self.id.to_string(), serde_json::Value::Bool(true));
        Ok(vec![Write::update(key, record)])
    }
}

pub fn mark_items(ids: &[&'static str]) -> Vec<Box<dyn Migration>> {
    ids.iter()
        .map(|id| Box::new(MarkItems { id: *id }) as Box<dyn Migration>)
        .collect()
}

/// In-memory user directory for admin tests.
#[derive(Default)]
pub struct TestDirectory {
    passwords: Mutex<HashMap<String, String>>,
    connected: Mutex<HashSet<String>>,
}

impl TestDirectory {
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.passwords
            .lock()
            .unwrap()
            .insert(username.to_string(), password.to_string());
        self
    }

    pub fn connect(&self, username: &str) {
        self.connected.lock().unwrap().insert(username.to_string());
    }
}

#[async_trait]
impl UserDirectory for TestDirectory {
    async fn verify_password(&self, username: &str, password: &str) -> Result<Option<bool>, AdminError> {
        Ok(self
            .passwords
            .lock()
            .unwrap()
            .get(username)
            .map(|stored| stored == password))
    }

    async fn is_connected(&self, username: &str) -> Result<bool, AdminError> {
        Ok(self.connected.lock().unwrap().contains(username))
    }

    async fn set_password(&self, username: &str, new_password: &str) -> Result<bool, AdminError> {
        let mut passwords = self.passwords.lock().unwrap();
        match passwords.get_mut(username) {
            Some(stored) => {
                *stored = new_password.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_user_count(&self) -> Result<usize, AdminError> {
        Ok(self.connected.lock().unwrap().len())
    }
}

/// Connection to the Redis at `REDIS_URL`, or `None` when it is unreachable.
pub async fn try_redis() -> Option<redis::aio::ConnectionManager> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url).ok()?;
    match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        redis::aio::ConnectionManager::new(client),
    )
    .await
    {
        Ok(Ok(conn)) => Some(conn),
        _ => {
            eprintln!("skipping: Redis is not reachable");
            None
        }
    }
}

/// Unique key prefix per test run.
pub fn test_prefix(name: &str) -> String {
    format!("keyshift_test_{name}_{}", uuid::Uuid::new_v4().simple())
}
