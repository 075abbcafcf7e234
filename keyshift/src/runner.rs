//! Migration runner: applies pending units in order and records them in the ledger.

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    errors::{MigrationError, StoreError},
    id::generate_pass_id,
    ledger::{AppliedMigration, DEFAULT_LEDGER_KEY, Ledger},
    migration::{Migration, MigrationSet, Write},
    store::{Store, StoreRead},
};

/// Where a runner is within its current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    LoadingLedger,
    SelectingPending,
    /// Applying the pending unit at this index.
    ApplyingUnit(usize),
    /// Recording the pending unit at this index.
    PersistingLedger(usize),
    Failed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::LoadingLedger => f.write_str("loading ledger"),
            Self::SelectingPending => f.write_str("selecting pending"),
            Self::ApplyingUnit(index) => write!(f, "applying unit {index}"),
            Self::PersistingLedger(index) => write!(f, "persisting ledger for unit {index}"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Writes issued (or planned, in dry-run) by one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub updates: u64,
    pub renames: u64,
    pub deletes: u64,
}

impl WriteCounts {
    fn record(&mut self, write: &Write) {
        match write {
            Write::Update { .. } => self.updates += 1,
            Write::Rename { .. } => self.renames += 1,
            Write::Delete { .. } => self.deletes += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.updates + self.renames + self.deletes
    }
}

/// Outcome of one unit within a pass.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub id: String,
    pub keys_selected: usize,
    pub keys_transformed: usize,
    /// Keys that disappeared between enumeration and read
    pub keys_skipped: usize,
    pub writes: WriteCounts,
    pub execution_time_ms: u64,
}

/// Outcome of a full pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub dry_run: bool,
    /// Units applied this pass, in order
    pub applied: Vec<UnitReport>,
    /// Units that were already in the ledger
    pub already_applied: Vec<String>,
    /// Ledger ids with no matching unit
    pub unknown_applied: Vec<String>,
    pub total_time_ms: u64,
}

impl PassReport {
    pub fn keys_transformed(&self) -> usize {
        self.applied.iter().map(|unit| unit.keys_transformed).sum()
    }
}

/// Applied/pending breakdown without touching any record.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatus {
    pub ledger_key: String,
    pub applied: Vec<String>,
    pub pending: Vec<String>,
    pub unknown: Vec<String>,
}

/// Migration runner.
///
/// One `run` call is one pass. Concurrent runners against the same store are
/// not coordinated and must be serialized by the operator.
pub struct MigrationRunner<S> {
    store: S,
    ledger_key: String,
    dry_run: bool,
    state: RunnerState,
}

impl<S> MigrationRunner<S>
where
    S: Store,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger_key: DEFAULT_LEDGER_KEY.to_string(),
            dry_run: false,
            state: RunnerState::Idle,
        }
    }

    pub fn with_ledger_key(mut self, key: impl Into<String>) -> Self {
        self.ledger_key = key.into();
        self
    }

    /// Compute writes without issuing them or touching the ledger.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn ledger_key(&self) -> &str {
        &self.ledger_key
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load the ledger and compare it with `set`.
    pub async fn status(&self, set: &MigrationSet) -> Result<LedgerStatus, MigrationError> {
        let ledger = Ledger::load(&self.store, &self.ledger_key).await?;
        let pending = set
            .units()
            .filter(|unit| !ledger.is_applied(unit.id()))
            .map(|unit| unit.id().to_string())
            .collect();

        Ok(LedgerStatus {
            ledger_key: self.ledger_key.clone(),
            applied: ledger.applied().to_vec(),
            pending,
            unknown: unknown_ids(&ledger, set),
        })
    }

    /// Run every pending unit of `set`, in order.
    pub async fn run(&mut self, set: &MigrationSet) -> Result<PassReport, MigrationError> {
        let start_time = Instant::now();
        let pass_id = generate_pass_id();
        info!("pass {pass_id}: starting (dry_run={})", self.dry_run);

        self.state = RunnerState::LoadingLedger;
        let mut ledger = match Ledger::load(&self.store, &self.ledger_key).await {
            Ok(ledger) => ledger,
            Err(err) => return Err(self.fail(err)),
        };

        self.state = RunnerState::SelectingPending;
        let mut pending: Vec<&dyn Migration> = Vec::new();
        let mut already_applied = Vec::new();
        for unit in set.units() {
            if ledger.is_applied(unit.id()) {
                already_applied.push(unit.id().to_string());
            } else {
                pending.push(unit);
            }
        }
        for (unit, later) in ledger_gaps(&ledger, set) {
            warn!("pass {pass_id}: '{unit}' is pending but the later migration '{later}' is already recorded");
        }

        let unknown_applied = unknown_ids(&ledger, set);
        for id in &unknown_applied {
            warn!("pass {pass_id}: ledger contains unknown migration '{id}'");
        }

        info!(
            "pass {pass_id}: {} pending, {} already applied",
            pending.len(),
            already_applied.len()
        );

        let mut applied = Vec::with_capacity(pending.len());
        for (index, unit) in pending.into_iter().enumerate() {
            self.state = RunnerState::ApplyingUnit(index);
            let unit_start = Instant::now();
            let mut report = match self.apply_unit(unit).await {
                Ok(report) => report,
                Err(err) => return Err(self.fail(err)),
            };
            report.execution_time_ms = unit_start.elapsed().as_millis() as u64;

            if self.dry_run {
                info!(
                    "{}: dry run would transform {} key(s) with {} write(s)",
                    report.id,
                    report.keys_transformed,
                    report.writes.total()
                );
            } else {
                self.state = RunnerState::PersistingLedger(index);
                let entry = AppliedMigration {
                    name: report.id.clone(),
                    applied_at: Utc::now(),
                    pass_id: pass_id.clone(),
                    execution_time_ms: report.execution_time_ms,
                    keys_transformed: report.keys_transformed as u64,
                    resolved: false,
                };
                if let Err(source) = ledger.mark_applied(&self.store, entry).await {
                    return Err(self.fail(MigrationError::UnrecordedUnit {
                        migration: report.id.clone(),
                        keys_transformed: report.keys_transformed,
                        source,
                    }));
                }
                info!("{}: marked migration as complete", report.id);
            }

            applied.push(report);
        }

        self.state = RunnerState::Idle;
        Ok(PassReport {
            pass_id,
            dry_run: self.dry_run,
            applied,
            already_applied,
            unknown_applied,
            total_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Record `id` as applied without running it.
    ///
    /// For recovering after the operator verified a unit whose ledger update
    /// failed. Returns false when the id was already recorded.
    pub async fn resolve(&self, set: &MigrationSet, id: &str) -> Result<bool, MigrationError> {
        if !set.contains(id) {
            return Err(MigrationError::InvalidPlan {
                message: format!("unknown migration '{id}'"),
            });
        }

        let mut ledger = Ledger::load(&self.store, &self.ledger_key).await?;
        if ledger.is_applied(id) {
            return Ok(false);
        }
        if self.dry_run {
            return Ok(true);
        }

        ledger
            .mark_applied(&self.store, AppliedMigration::resolved(id))
            .await
            .map_err(|source| MigrationError::StoreUnavailable {
                migration: Some(id.to_string()),
                key: Some(self.ledger_key.clone()),
                source,
            })?;
        info!("{id}: resolved as applied");
        Ok(true)
    }

    async fn apply_unit(&self, unit: &dyn Migration) -> Result<UnitReport, MigrationError> {
        let id = unit.id();
        let reader: &dyn StoreRead = &self.store;

        let keys = unit
            .select(reader)
            .await
            .map_err(|source| MigrationError::StoreUnavailable {
                migration: Some(id.to_string()),
                key: None,
                source,
            })?;
        info!("{id}: {} candidate key(s)", keys.len());

        let mut report = UnitReport {
            id: id.to_string(),
            keys_selected: keys.len(),
            keys_transformed: 0,
            keys_skipped: 0,
            writes: WriteCounts::default(),
            execution_time_ms: 0,
        };
        let mut transformed: Vec<String> = Vec::new();

        for key in &keys {
            let mut landed = Vec::new();
            match self.apply_key(unit, reader, key, &mut report.writes, &mut landed).await {
                Ok(true) => transformed.push(key.clone()),
                Ok(false) => report.keys_skipped += 1,
                // nothing in the store has changed yet
                Err(err) if transformed.is_empty() && landed.is_empty() => return Err(err),
                Err(err) => {
                    return Err(MigrationError::PartialUnitApplication {
                        migration: id.to_string(),
                        key: key.clone(),
                        transformed,
                        partial_key_writes: landed,
                        source: Box::new(err),
                    });
                }
            }
        }

        report.keys_transformed = transformed.len();
        Ok(report)
    }

    /// Returns false when the key vanished before it could be read.
    ///
    /// Targets of writes that succeeded are pushed to `landed` as they land.
    async fn apply_key(
        &self,
        unit: &dyn Migration,
        reader: &dyn StoreRead,
        key: &str,
        counts: &mut WriteCounts,
        landed: &mut Vec<String>,
    ) -> Result<bool, MigrationError> {
        let id = unit.id();

        let record = if unit.loads_record() {
            match self.store.get(key).await {
                Ok(Some(record)) => Some(record),
                Ok(None) => {
                    warn!("{id}: {key} disappeared before it was read, skipping");
                    return Ok(false);
                }
                Err(source) => return Err(MigrationError::from_store(id, key, source)),
            }
        } else {
            None
        };

        let writes = unit
            .apply(reader, key, record)
            .await
            .map_err(|err| MigrationError::from_unit(id, key, err))?;

        for write in &writes {
            counts.record(write);
        }

        if self.dry_run {
            for write in &writes {
                debug!("{id}: would {write}");
            }
            return Ok(true);
        }

        for write in writes {
            debug!("{id}: {write}");
            let target = write.target().to_string();
            self.execute(write)
                .await
                .map_err(|source| MigrationError::from_store(id, key, source))?;
            landed.push(target);
        }
        info!("{id}: migrated {key}");
        Ok(true)
    }

    async fn execute(&self, write: Write) -> Result<(), StoreError> {
        match write {
            Write::Update { key, record } => self.store.set(&key, &record).await,
            Write::Rename { from, to } => self.store.rename(&from, &to).await,
            Write::Delete { key } => self.store.delete(&key).await.map(|_| ()),
        }
    }

    fn fail(&mut self, err: MigrationError) -> MigrationError {
        error!("migration pass failed during {}: {err}", self.state);
        if let MigrationError::PartialUnitApplication {
            transformed,
            partial_key_writes,
            ..
        } = &err
        {
            error!("keys already transformed: {}", transformed.join(", "));
            if !partial_key_writes.is_empty() {
                error!("writes that landed for the failing key: {}", partial_key_writes.join(", "));
            }
        }
        self.state = RunnerState::Failed;
        err
    }
}

/// Pending units that sort before the last recorded one, paired with that id.
fn ledger_gaps<'a>(ledger: &Ledger, set: &'a MigrationSet) -> Vec<(&'a str, &'a str)> {
    let Some(last) = set
        .units()
        .filter(|unit| ledger.is_applied(unit.id()))
        .last()
        .map(|unit| unit.id())
    else {
        return Vec::new();
    };
    set.units()
        .take_while(move |unit| unit.id() != last)
        .filter(|unit| !ledger.is_applied(unit.id()))
        .map(move |unit| (unit.id(), last))
        .collect()
}

fn unknown_ids(ledger: &Ledger, set: &MigrationSet) -> Vec<String> {
    ledger
        .applied()
        .iter()
        .filter(|id| !set.contains(id))
        .cloned()
        .collect()
}
