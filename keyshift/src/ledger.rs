//! Ledger of applied migrations, persisted as one record in the migrated store.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    errors::{MigrationError, StoreError},
    record::Record,
    store::{Store, StoreRead},
};

/// Default well-known key holding the ledger.
pub const DEFAULT_LEDGER_KEY: &str = "Hybrasyl.RedisMigrations";

/// Details recorded alongside an applied identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Migration id (e.g., "20201006-board-rename")
    pub name: String,
    /// When the ledger entry was written
    pub applied_at: DateTime<Utc>,
    /// Pass that applied it
    pub pass_id: String,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of keys transformed
    pub keys_transformed: u64,
    /// Whether an operator marked it applied by hand
    #[serde(default)]
    pub resolved: bool,
}

impl AppliedMigration {
    /// Entry for a unit the operator verified and marked by hand.
    pub fn resolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied_at: Utc::now(),
            pass_id: "manual".to_string(),
            execution_time_ms: 0,
            keys_transformed: 0,
            resolved: true,
        }
    }
}

/// On-disk shape of the ledger record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(rename = "Migrations")]
    migrations: Vec<String>,
    #[serde(rename = "History", default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<AppliedMigration>,
    /// Fields written by other tools, carried through unchanged
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// In-memory view of the ledger for one pass.
///
/// An identifier is reported as applied only after the write that recorded
/// it has returned successfully.
#[derive(Debug, Clone)]
pub struct Ledger {
    key: String,
    applied: Vec<String>,
    history: Vec<AppliedMigration>,
    extra: Map<String, Value>,
}

impl Ledger {
    /// Read the ledger at `key`. An absent key is an empty ledger.
    pub async fn load<S>(store: &S, key: &str) -> Result<Self, MigrationError>
    where
        S: StoreRead + ?Sized,
    {
        let record = match store.get(key).await {
            Ok(record) => record,
            Err(StoreError::Decode { source, .. }) => {
                return Err(MigrationError::LedgerCorrupt {
                    key: key.to_string(),
                    detail: source.to_string(),
                });
            }
            Err(source) => return Err(MigrationError::store(key, source)),
        };

        let document = match record {
            Some(record) => parse_document(key, record)?,
            None => LedgerDocument::default(),
        };

        let mut applied = Vec::with_capacity(document.migrations.len());
        for id in document.migrations {
            if applied.contains(&id) {
                warn!("ledger {key}: dropping duplicate entry '{id}'");
                continue;
            }
            applied.push(id);
        }

        Ok(Self {
            key: key.to_string(),
            applied,
            history: document.history,
            extra: document.extra,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Applied identifiers in application order.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    pub fn history(&self) -> &[AppliedMigration] {
        &self.history
    }

    pub fn is_applied(&self, id: &str) -> bool {
        self.applied.iter().any(|applied| applied == id)
    }

    /// Append `entry` and persist the ledger.
    ///
    /// Must only be called after every write of the unit succeeded. Marking an
    /// identifier that is already present is a no-op.
    pub async fn mark_applied<S>(&mut self, store: &S, entry: AppliedMigration) -> Result<(), StoreError>
    where
        S: Store + ?Sized,
    {
        if self.is_applied(&entry.name) {
            warn!("ledger {}: '{}' is already recorded", self.key, entry.name);
            return Ok(());
        }

        let mut document = LedgerDocument {
            migrations: self.applied.clone(),
            history: self.history.clone(),
            extra: self.extra.clone(),
        };
        document.migrations.push(entry.name.clone());
        document.history.push(entry.clone());

        let record = serde_json::to_value(&document).map_err(|source| StoreError::Encode {
            key: self.key.clone(),
            source,
        })?;
        store.set(&self.key, &record).await?;

        self.applied.push(entry.name.clone());
        self.history.push(entry);
        Ok(())
    }
}

fn parse_document(key: &str, record: Record) -> Result<LedgerDocument, MigrationError> {
    let corrupt = |detail: String| MigrationError::LedgerCorrupt {
        key: key.to_string(),
        detail,
    };

    match record {
        // Bare list of identifiers.
        Value::Array(_) => {
            let migrations: Vec<String> =
                serde_json::from_value(record).map_err(|err| corrupt(format!("expected a list of identifiers ({err})")))?;
            Ok(LedgerDocument {
                migrations,
                ..LedgerDocument::default()
            })
        }
        Value::Object(_) => {
            serde_json::from_value(record).map_err(|err| corrupt(format!("expected a Migrations list ({err})")))
        }
        other => Err(corrupt(format!("expected an object or list, found {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn entry(name: &str) -> AppliedMigration {
        AppliedMigration {
            name: name.to_string(),
            applied_at: Utc::now(),
            pass_id: "pass".to_string(),
            execution_time_ms: 5,
            keys_transformed: 2,
            resolved: false,
        }
    }

    #[tokio::test]
    async fn absent_ledger_is_empty() {
        let store = MemoryStore::new();
        let ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        assert!(ledger.applied().is_empty());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn reads_original_document_shape() {
        let store = MemoryStore::with_records([(
            DEFAULT_LEDGER_KEY,
            json!({"Migrations": ["20200929-authinfo", "20200930-mailbox-uuid"]}),
        )]);
        let ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        assert_eq!(ledger.applied(), ["20200929-authinfo", "20200930-mailbox-uuid"]);
        assert!(ledger.is_applied("20200929-authinfo"));
        assert!(!ledger.is_applied("20201006-board-rename"));
    }

    #[tokio::test]
    async fn duplicates_are_collapsed_on_load() {
        let store = MemoryStore::with_records([(
            DEFAULT_LEDGER_KEY,
            json!({"Migrations": ["20200929-authinfo", "20200929-authinfo", "20201006-board-rename"]}),
        )]);
        let ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        assert_eq!(ledger.applied(), ["20200929-authinfo", "20201006-board-rename"]);
    }

    #[tokio::test]
    async fn accepts_bare_list() {
        let store = MemoryStore::with_records([("ledger", json!(["a", "b"]))]);
        let ledger = Ledger::load(&store, "ledger").await.unwrap();
        assert_eq!(ledger.applied(), ["a", "b"]);
    }

    #[tokio::test]
    async fn corrupt_values_are_rejected() {
        let store = MemoryStore::new();
        store.insert_raw("not-json", "{{{");
        store.insert_raw("wrong-type", r#"{"Migrations": [1, 2]}"#);
        store.insert_raw("scalar", "42");

        for key in ["not-json", "wrong-type", "scalar"] {
            match Ledger::load(&store, key).await {
                Err(MigrationError::LedgerCorrupt { key: corrupt_key, .. }) => assert_eq!(corrupt_key, key),
                other => panic!("expected corrupt ledger for {key}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn read_failure_names_the_ledger_key() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl StoreRead for Unreachable {
            async fn get(&self, _: &str) -> Result<Option<Record>, StoreError> {
                Err(StoreError::Unavailable(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                ))))
            }

            async fn exists(&self, _: &str) -> Result<bool, StoreError> {
                Ok(false)
            }

            async fn enumerate_keys(&self, _: &str) -> Result<Vec<String>, StoreError> {
                Ok(Vec::new())
            }
        }

        let err = Ledger::load(&Unreachable, "ops.Ledger").await.unwrap_err();
        assert!(matches!(err, MigrationError::StoreUnavailable { .. }));
        assert_eq!(err.key(), Some("ops.Ledger"));
        assert!(err.to_string().contains("at key 'ops.Ledger'"));
    }

    #[tokio::test]
    async fn mark_applied_appends_and_persists() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        ledger.mark_applied(&store, entry("a")).await.unwrap();
        ledger.mark_applied(&store, entry("b")).await.unwrap();

        let stored = store.record(DEFAULT_LEDGER_KEY).unwrap();
        assert_eq!(stored["Migrations"], json!(["a", "b"]));
        assert_eq!(stored["History"].as_array().map(Vec::len), Some(2));

        let reloaded = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        assert_eq!(reloaded.applied(), ["a", "b"]);
        assert_eq!(reloaded.history()[1].name, "b");
    }

    #[tokio::test]
    async fn foreign_fields_survive_mark_applied() {
        let store = MemoryStore::with_records([(
            DEFAULT_LEDGER_KEY,
            json!({"Migrations": ["a"], "Owner": "ops", "Schema": {"Version": 2}}),
        )]);
        let mut ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        ledger.mark_applied(&store, entry("b")).await.unwrap();

        let stored = store.record(DEFAULT_LEDGER_KEY).unwrap();
        assert_eq!(stored["Migrations"], json!(["a", "b"]));
        assert_eq!(stored["Owner"], json!("ops"));
        assert_eq!(stored["Schema"], json!({"Version": 2}));
    }

    #[tokio::test]
    async fn marking_twice_is_a_noop() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
        ledger.mark_applied(&store, entry("a")).await.unwrap();
        store.reset_counts();
        ledger.mark_applied(&store, entry("a")).await.unwrap();
        assert_eq!(store.counts().writes(), 0);
        assert_eq!(ledger.applied(), ["a"]);
    }

    #[tokio::test]
    async fn history_entries_keep_resolved_flag() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(&store, "ledger").await.unwrap();
        ledger
            .mark_applied(&store, AppliedMigration::resolved("20201210-rename-cookies"))
            .await
            .unwrap();
        let reloaded = Ledger::load(&store, "ledger").await.unwrap();
        assert!(reloaded.history()[0].resolved);
        assert_eq!(reloaded.history()[0].pass_id, "manual");
    }

    #[test]
    fn applied_migration_serialization() {
        let migration = entry("20201006-board-rename");
        let json = serde_json::to_string(&migration).unwrap();
        let deserialized: AppliedMigration = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, migration);
    }
}
