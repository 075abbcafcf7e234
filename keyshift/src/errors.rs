use thiserror::Error;

/// Failure of a single store primitive.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Unavailable(#[from] redis::RedisError),

    /// Rename source (or another required key) does not exist.
    #[error("key '{key}' does not exist")]
    MissingKey { key: String },

    /// Rename target already exists.
    #[error("key '{key}' already exists")]
    KeyExists { key: String },

    /// Stored value is not a JSON record.
    #[error("value at '{key}' is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Record could not be serialized for writing.
    #[error("failed to encode record for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned from a migration unit's transform.
///
/// The runner attaches the unit id and key before surfacing it as a
/// [`MigrationError`].
#[derive(Debug, Error)]
pub enum UnitError {
    /// A field the unit relies on is absent.
    #[error("missing field '{field}'")]
    MissingField { field: String },

    /// A field exists but holds the wrong kind of value.
    #[error("field '{field}' is not {expected}")]
    InvalidField { field: String, expected: &'static str },

    /// A related record the unit reads does not exist.
    #[error("related record '{key}' does not exist")]
    MissingRecord { key: String },

    /// Store access from inside the transform failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{message}")]
    Other { message: String },
}

/// Top-level error type returned by the ledger and runner.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Any store operation failed. Aborts the pass.
    #[error("store unavailable{}: {source}", context_suffix(.migration.as_deref(), .key.as_deref()))]
    StoreUnavailable {
        migration: Option<String>,
        key: Option<String>,
        #[source]
        source: StoreError,
    },

    /// A unit assumed a field shape the record does not have.
    #[error("record shape mismatch in migration '{migration}' at key '{key}': {field}")]
    RecordShapeMismatch {
        migration: String,
        key: String,
        field: String,
    },

    /// A unit needed a related record that does not exist.
    #[error("migration '{migration}' at key '{key}' needs missing record '{related}'")]
    MissingRecord {
        migration: String,
        key: String,
        related: String,
    },

    /// Ledger value exists but is not an ordered list of identifiers.
    #[error("ledger at '{key}' is corrupt: {detail}")]
    LedgerCorrupt { key: String, detail: String },

    /// A unit failed after some of its writes landed. The ledger was not updated.
    ///
    /// `transformed` lists keys whose writes all succeeded. `partial_key_writes`
    /// lists the targets already written for the failing `key` itself.
    #[error(
        "migration '{migration}' failed at key '{key}' after transforming {} key(s){}: {source}",
        .transformed.len(),
        landed_suffix(.partial_key_writes)
    )]
    PartialUnitApplication {
        migration: String,
        key: String,
        transformed: Vec<String>,
        partial_key_writes: Vec<String>,
        #[source]
        source: Box<MigrationError>,
    },

    /// Every write of a unit succeeded but persisting the ledger failed.
    #[error(
        "migration '{migration}' transformed {keys_transformed} key(s) but the ledger could not be updated; \
         verify its writes and resolve it manually: {source}"
    )]
    UnrecordedUnit {
        migration: String,
        keys_transformed: usize,
        #[source]
        source: StoreError,
    },

    /// The migration list or an operator request is invalid.
    #[error("invalid migration plan: {message}")]
    InvalidPlan { message: String },

    /// Unit-specific failure that is not a shape problem.
    #[error("migration '{migration}' failed at key '{key}': {message}")]
    Unit {
        migration: String,
        key: String,
        message: String,
    },
}

impl MigrationError {
    /// Wrap a store failure at `key` that happened outside any unit.
    pub fn store(key: &str, source: StoreError) -> Self {
        Self::StoreUnavailable {
            migration: None,
            key: Some(key.to_string()),
            source,
        }
    }

    /// Attach unit and key context to a transform failure.
    pub fn from_unit(migration: &str, key: &str, err: UnitError) -> Self {
        match err {
            UnitError::MissingField { field } => Self::RecordShapeMismatch {
                migration: migration.to_string(),
                key: key.to_string(),
                field: format!("missing field '{field}'"),
            },
            UnitError::InvalidField { field, expected } => Self::RecordShapeMismatch {
                migration: migration.to_string(),
                key: key.to_string(),
                field: format!("field '{field}' is not {expected}"),
            },
            UnitError::MissingRecord { key: related } => Self::MissingRecord {
                migration: migration.to_string(),
                key: key.to_string(),
                related,
            },
            UnitError::Store(source) => Self::from_store(migration, key, source),
            UnitError::Other { message } => Self::Unit {
                migration: migration.to_string(),
                key: key.to_string(),
                message,
            },
        }
    }

    /// Attach unit and key context to a store failure.
    ///
    /// An undecodable record is a shape problem, not an outage.
    pub fn from_store(migration: &str, key: &str, source: StoreError) -> Self {
        match source {
            StoreError::Decode { source, .. } => Self::RecordShapeMismatch {
                migration: migration.to_string(),
                key: key.to_string(),
                field: format!("record is not valid JSON ({source})"),
            },
            source => Self::StoreUnavailable {
                migration: Some(migration.to_string()),
                key: Some(key.to_string()),
                source,
            },
        }
    }

    /// Id of the unit that was in progress, if any.
    pub fn migration(&self) -> Option<&str> {
        match self {
            Self::StoreUnavailable { migration, .. } => migration.as_deref(),
            Self::RecordShapeMismatch { migration, .. }
            | Self::MissingRecord { migration, .. }
            | Self::PartialUnitApplication { migration, .. }
            | Self::UnrecordedUnit { migration, .. }
            | Self::Unit { migration, .. } => Some(migration),
            Self::LedgerCorrupt { .. } | Self::InvalidPlan { .. } => None,
        }
    }

    /// Key being processed when the failure happened, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::StoreUnavailable { key, .. } => key.as_deref(),
            Self::RecordShapeMismatch { key, .. }
            | Self::MissingRecord { key, .. }
            | Self::PartialUnitApplication { key, .. }
            | Self::Unit { key, .. }
            | Self::LedgerCorrupt { key, .. } => Some(key),
            Self::UnrecordedUnit { .. } | Self::InvalidPlan { .. } => None,
        }
    }
}

fn landed_suffix(partial_key_writes: &[String]) -> String {
    if partial_key_writes.is_empty() {
        String::new()
    } else {
        format!(" (already written for this key: {})", partial_key_writes.join(", "))
    }
}

fn context_suffix(migration: Option<&str>, key: Option<&str>) -> String {
    match (migration, key) {
        (Some(migration), Some(key)) => format!(" in migration '{migration}' at key '{key}'"),
        (Some(migration), None) => format!(" in migration '{migration}'"),
        (None, Some(key)) => format!(" at key '{key}'"),
        (None, None) => String::new(),
    }
}
