use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Table};
use keyshift::{
    Ledger, LedgerStatus, MigrationError, MigrationRunner, MigrationSet, PassReport, RedisStore, catalog,
};
use serde::Serialize;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};
use crate::theme::LedgerState;
use crate::utils::{format_datetime, format_elapsed, redact_url};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Deploy Migrations",
        commands: &[
            "keyshift migrate deploy                # Run all pending migrations",
            "keyshift migrate deploy --dry-run      # Preview what would be migrated",
        ],
    },
    ExampleGroup {
        title: "Inspect",
        commands: &[
            "keyshift migrate status                # Applied and pending migrations",
            "keyshift --output json migrate status  # Ledger status for scripts",
        ],
    },
    ExampleGroup {
        title: "Recovery",
        commands: &["keyshift migrate resolve 20200929-authinfo --applied   # Mark migration as applied"],
    },
];

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Run pending migrations against Redis
    #[command(name = "deploy")]
    Deploy {
        /// Compute writes without issuing them or updating the ledger
        #[arg(long)]
        dry_run: bool,
    },

    /// Show applied, pending and unknown migrations
    #[command(name = "status")]
    Status,

    /// Manually mark a migration as applied
    #[command(name = "resolve")]
    Resolve {
        /// Migration id to resolve
        migration_id: String,

        /// Mark the migration as applied
        #[arg(long, required = true)]
        applied: bool,
    },
}

pub async fn handle_migrate_commands(command: MigrateCommands, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::find()?;
    if ctx.is_initialized() {
        output.verbose(&format!("Project root: {}", ctx.project_root.display()));
    } else {
        output.verbose("No .keyshift/config.toml found, using defaults");
    }

    let set = catalog(&ctx.key_space()).context("Failed to build the migration catalog")?;

    match command {
        MigrateCommands::Deploy { dry_run } => handle_deploy(&ctx, &set, dry_run, output).await,
        MigrateCommands::Status => handle_status(&ctx, &set, output).await,
        // --applied is required; the ledger is append-only so there is no other resolution
        MigrateCommands::Resolve { migration_id, applied: _ } => {
            handle_resolve(&ctx, &set, &migration_id, output).await
        }
    }
}

async fn connect(ctx: &ProjectContext, output: &OutputManager) -> Result<MigrationRunner<RedisStore>> {
    let redis_url = ctx.redis_url().map_err(|err| {
        output.error("Redis URL could not be resolved");
        err.context("REDIS_URL is required for migrations")
    })?;
    let ledger_key = ctx.ledger_key()?;

    output.bullet(&format!("Redis: {}", redact_url(&redis_url)));
    output.bullet(&format!("Ledger: {ledger_key}"));

    output.progress("Connecting to Redis");
    let store = RedisStore::connect(&redis_url)
        .await
        .context("Failed to connect to Redis")?;
    output.clear_line();
    output.success("Connected to Redis");

    Ok(MigrationRunner::new(store).with_ledger_key(ledger_key))
}

async fn handle_deploy(ctx: &ProjectContext, set: &MigrationSet, dry_run: bool, output: &OutputManager) -> Result<()> {
    output.heading("Deploy Migrations");

    if dry_run {
        output.warning("DRY RUN MODE - No changes will be made");
    }

    let mut runner = connect(ctx, output).await?.with_dry_run(dry_run);

    let report = match runner.run(set).await {
        Ok(report) => report,
        Err(err) => {
            report_failure(&err, output);
            return Err(err).context("Migration pass failed");
        }
    };

    output.heading("Summary");
    output.display(&report)?;

    if report.applied.is_empty() {
        output.success("Store is up to date");
    } else {
        output.success(&format!(
            "{} migration(s) {} in {}",
            report.applied.len(),
            if dry_run { "checked" } else { "applied" },
            format_elapsed(report.total_time_ms)
        ));
    }

    if !report.already_applied.is_empty() {
        output.info(&format!("{} migration(s) already applied", report.already_applied.len()));
    }

    for id in &report.unknown_applied {
        output.warning(&format!("Ledger lists unknown migration '{id}'"));
    }

    if dry_run {
        output.warning("DRY RUN - No actual changes were made");
    }

    Ok(())
}

fn report_failure(err: &MigrationError, output: &OutputManager) {
    output.error(&err.to_string());
    match err {
        MigrationError::PartialUnitApplication {
            key,
            transformed,
            partial_key_writes,
            ..
        } => {
            if !transformed.is_empty() {
                output.warning("These keys already have the new shape:");
                for key in transformed {
                    output.bullet(key);
                }
            }
            if !partial_key_writes.is_empty() {
                output.warning(&format!("Writes that landed before {key} failed:"));
                for target in partial_key_writes {
                    output.bullet(target);
                }
            }
            output.info("Repair or restore them before deploying again.");
        }
        MigrationError::UnrecordedUnit { migration, .. } => {
            output.info(&format!(
                "Verify its writes, then run 'keyshift migrate resolve {migration} --applied'"
            ));
        }
        _ => {}
    }
}

async fn handle_status(ctx: &ProjectContext, set: &MigrationSet, output: &OutputManager) -> Result<()> {
    output.heading("Migration Status");

    let runner = connect(ctx, output).await?;
    let status = runner.status(set).await?;
    let ledger = Ledger::load(runner.store(), runner.ledger_key()).await?;

    let view = StatusView::new(set, &ledger, status);
    output.display(&view)?;

    if view.status.pending.is_empty() {
        output.success("All migrations applied");
    } else {
        output.info(&format!("{} migration(s) pending", view.status.pending.len()));
    }
    for id in &view.status.unknown {
        output.warning(&format!("Ledger lists unknown migration '{id}'"));
    }

    Ok(())
}

async fn handle_resolve(ctx: &ProjectContext, set: &MigrationSet, migration_id: &str, output: &OutputManager) -> Result<()> {
    output.heading(&format!("Resolve Migration: {migration_id}"));
    output.info("Marking migration as: applied");

    let runner = connect(ctx, output).await?;
    if runner.resolve(set, migration_id).await? {
        output.success(&format!("Marked '{migration_id}' as applied"));
    } else {
        output.warning(&format!("Migration '{migration_id}' is already marked as applied"));
    }

    Ok(())
}

impl TableDisplay for PassReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(
            &mut table,
            &["Migration", "Selected", "Transformed", "Skipped", "Updates", "Renames", "Deletes", "Time"],
        );

        for unit in &self.applied {
            table.add_row(vec![
                Cell::new(&unit.id),
                Cell::new(unit.keys_selected),
                Cell::new(unit.keys_transformed),
                Cell::new(unit.keys_skipped),
                Cell::new(unit.writes.updates),
                Cell::new(unit.writes.renames),
                Cell::new(unit.writes.deletes),
                Cell::new(format_elapsed(unit.execution_time_ms)),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!(
            "pass={} dry_run={} applied={} keys={} time={}ms",
            self.pass_id,
            self.dry_run,
            self.applied.len(),
            self.keys_transformed(),
            self.total_time_ms
        )
    }
}

/// Ledger status joined with unit descriptions and history
#[derive(Serialize)]
struct StatusView {
    #[serde(flatten)]
    status: LedgerStatus,
    migrations: Vec<StatusRow>,
}

#[derive(Serialize)]
struct StatusRow {
    id: String,
    description: String,
    state: LedgerState,
    applied_at: Option<String>,
    pass_id: Option<String>,
}

impl StatusView {
    fn new(set: &MigrationSet, ledger: &Ledger, status: LedgerStatus) -> Self {
        let history_for = |id: &str| ledger.history().iter().rev().find(|entry| entry.name == id);

        let mut migrations: Vec<StatusRow> = set
            .units()
            .map(|unit| {
                let entry = history_for(unit.id());
                StatusRow {
                    id: unit.id().to_string(),
                    description: unit.description().to_string(),
                    state: if ledger.is_applied(unit.id()) {
                        LedgerState::Applied
                    } else {
                        LedgerState::Pending
                    },
                    applied_at: entry.map(|entry| format_datetime(entry.applied_at)),
                    pass_id: entry.map(|entry| entry.pass_id.clone()),
                }
            })
            .collect();

        migrations.extend(status.unknown.iter().map(|id| StatusRow {
            id: id.clone(),
            description: String::new(),
            state: LedgerState::Unknown,
            applied_at: history_for(id).map(|entry| format_datetime(entry.applied_at)),
            pass_id: history_for(id).map(|entry| entry.pass_id.clone()),
        }));

        Self { status, migrations }
    }
}

impl TableDisplay for StatusView {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["", "Migration", "Description", "Applied At", "Pass"]);

        for row in &self.migrations {
            table.add_row(vec![
                output.state_cell(row.state.icon(), row.state.table_color()),
                Cell::new(&row.id),
                Cell::new(&row.description),
                Cell::new(row.applied_at.as_deref().unwrap_or("-")),
                Cell::new(row.pass_id.as_deref().unwrap_or("-")),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!(
            "applied={} pending={} unknown={}",
            self.status.applied.len(),
            self.status.pending.len(),
            self.status.unknown.len()
        )
    }
}
