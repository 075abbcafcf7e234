//! Migration units and the ordered set a runner applies.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;

use crate::{
    errors::{MigrationError, StoreError, UnitError},
    record::Record,
    store::StoreRead,
};

/// One store mutation produced by a unit's transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the record at `key`.
    Update { key: String, record: Record },
    /// Move the value at `from` to `to` unchanged.
    Rename { from: String, to: String },
    Delete { key: String },
}

impl Write {
    pub fn update(key: impl Into<String>, record: Record) -> Self {
        Self::Update {
            key: key.into(),
            record,
        }
    }

    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Key the write lands on.
    pub fn target(&self) -> &str {
        match self {
            Self::Update { key, .. } | Self::Delete { key } => key,
            Self::Rename { to, .. } => to,
        }
    }
}

impl fmt::Display for Write {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update { key, .. } => write!(f, "update {key}"),
            Self::Rename { from, to } => write!(f, "rename {from} -> {to}"),
            Self::Delete { key } => write!(f, "delete {key}"),
        }
    }
}

/// A named, one-shot transformation over a subset of store keys.
///
/// The transform may assume it runs exactly once per key: the runner never
/// re-invokes a unit whose id is in the ledger.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, sortable identifier (e.g., "20201006-board-rename").
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Prefix of the keys this unit targets.
    fn key_prefix(&self) -> String;

    /// Whether `apply` needs the record body. Rename-only units return false
    /// and receive `None`.
    fn loads_record(&self) -> bool {
        true
    }

    /// Candidate keys, in processing order.
    async fn select(&self, store: &dyn StoreRead) -> Result<Vec<String>, StoreError> {
        store.enumerate_keys(&self.key_prefix()).await
    }

    /// Map one record to the writes that migrate it.
    async fn apply(&self, store: &dyn StoreRead, key: &str, record: Option<Record>) -> Result<Vec<Write>, UnitError>;
}

/// Statically ordered list of units with unique ids.
pub struct MigrationSet {
    units: Vec<Box<dyn Migration>>,
}

impl MigrationSet {
    /// Keep the supplied order.
    pub fn new(units: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        for unit in &units {
            let id = unit.id();
            if id.trim().is_empty() {
                return Err(MigrationError::InvalidPlan {
                    message: "migration id must not be empty".to_string(),
                });
            }
            if !seen.insert(id.to_string()) {
                return Err(MigrationError::InvalidPlan {
                    message: format!("duplicate migration id '{id}'"),
                });
            }
        }
        Ok(Self { units })
    }

    /// Order by id first; date-prefixed ids sort chronologically.
    pub fn sorted(mut units: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        units.sort_by(|a, b| a.id().cmp(b.id()));
        Self::new(units)
    }

    pub fn units(&self) -> impl Iterator<Item = &dyn Migration> {
        self.units.iter().map(|unit| unit.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(|unit| unit.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Migration> {
        self.units().find(|unit| unit.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
