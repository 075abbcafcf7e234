use std::collections::BTreeSet;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{Store, StoreRead, decode, encode};
use crate::{errors::StoreError, record::Record};

const SCAN_COUNT: usize = 1000;

/// Store adapter over plain Redis string keys holding JSON records.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to a Redis URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl StoreRead for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn enumerate_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once.
        let mut keys = BTreeSet::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch.into_iter().filter(|key| key.starts_with(prefix)));

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys.into_iter().collect())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, key: &str, record: &Record) -> Result<(), StoreError> {
        let raw = encode(key, record)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET").arg(key).arg(raw).query_async(&mut conn).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        if !self.exists(from).await? {
            return Err(StoreError::MissingKey { key: from.to_string() });
        }

        let mut conn = self.conn.clone();
        let renamed: bool = redis::cmd("RENAMENX").arg(from).arg(to).query_async(&mut conn).await?;
        if !renamed {
            return Err(StoreError::KeyExists { key: to.to_string() });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }
}

/// Delete every key starting with `prefix` (test and tooling cleanup).
///
/// Uses SCAN + DEL so Redis is never blocked by a KEYS call.
pub async fn cleanup_prefix(conn: &mut ConnectionManager, prefix: &str) -> Result<u64, StoreError> {
    let pattern = format!("{}*", escape_glob(prefix));
    let mut cursor: u64 = 0;
    let mut total_deleted: u64 = 0;

    loop {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await?;

        if !keys.is_empty() {
            let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(conn).await?;
            total_deleted += deleted;
        }

        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(total_deleted)
}

/// Escape Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_glob_metacharacters() {
        assert_eq!(escape_glob("Hybrasyl.Board:"), "Hybrasyl.Board:");
        assert_eq!(escape_glob("a*b?c[d]"), "a\\*b\\?c\\[d\\]");
        assert_eq!(escape_glob("back\\slash"), "back\\\\slash");
    }
}
