use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use timekeep_core::{SchemaGeneration, TARGET_SCHEMA_VERSION};
use timekeep_store_sqlite::{detect, migrate, MigrationOptions, SqliteStore, StepProgress};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "tk")]
#[command(about = "Timekeep database CLI")]
struct Cli {
    #[arg(long, default_value = "./timekeep.sqlite3")]
    db: PathBuf,

    /// Log migration progress to stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    Bootstrap,
    SchemaVersion,
    Inspect(DbInspectArgs),
    Migrate(DbMigrateArgs),
    Stats,
    IntegrityCheck,
    Backup(DbBackupArgs),
}

#[derive(Debug, Args)]
struct DbInspectArgs {
    #[arg(long)]
    source: PathBuf,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long, default_value_t = false)]
    atomic: bool,
    /// Take a timestamped copy of the source here before migrating.
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Migrate even when the destination already records the target version.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Db { command } => {
            let store = SqliteStore::open(&cli.db)?;
            run_db(command, &store)
        }
    }
}

fn run_db(command: DbCommand, store: &SqliteStore) -> Result<()> {
    match command {
        DbCommand::Bootstrap => run_db_bootstrap(store),
        DbCommand::SchemaVersion => run_db_schema_version(store),
        DbCommand::Inspect(args) => run_db_inspect(&args),
        DbCommand::Migrate(args) => run_db_migrate(&args, store),
        DbCommand::Stats => run_db_stats(store),
        DbCommand::IntegrityCheck => run_db_integrity_check(store),
        DbCommand::Backup(args) => run_db_backup(&args, store),
    }
}

fn run_db_bootstrap(store: &SqliteStore) -> Result<()> {
    store.bootstrap()?;
    emit_json(serde_json::json!({
        "db": store.path(),
        "schema_version": store.schema_version()?,
        "tables": store.table_counts()?
    }))
}

fn run_db_schema_version(store: &SqliteStore) -> Result<()> {
    let current_version = store.schema_version()?;
    emit_json(serde_json::json!({
        "current_version": current_version,
        "target_version": TARGET_SCHEMA_VERSION,
        "up_to_date": current_version >= TARGET_SCHEMA_VERSION
    }))
}

fn run_db_inspect(args: &DbInspectArgs) -> Result<()> {
    let source = open_source(&args.source)?;
    let detection = detect(&source);
    let planned_steps: Vec<&str> =
        detection.generation.steps().iter().map(|step| step.label()).collect();
    emit_json(serde_json::json!({
        "source": args.source,
        "detection": detection,
        "planned_steps": planned_steps,
        "tables": source.table_counts()?
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &SqliteStore) -> Result<()> {
    let before_version = store.schema_version()?;
    if before_version >= TARGET_SCHEMA_VERSION && !args.force {
        return emit_json(serde_json::json!({
            "skipped": true,
            "reason": "destination already at target schema version",
            "before_version": before_version,
            "target_version": TARGET_SCHEMA_VERSION
        }));
    }

    let source = open_source(&args.source)?;
    let backup = match args.backup_dir.as_deref() {
        Some(dir) if !args.dry_run => take_backup(&source, dir),
        _ => None,
    };

    let options = MigrationOptions {
        atomic: args.atomic,
        dry_run: args.dry_run,
        ..MigrationOptions::default()
    };
    let report = migrate(&source, store, &options, log_progress)
        .with_context(|| format!("failed to migrate from {}", args.source.display()))?;

    emit_json(serde_json::json!({
        "skipped": false,
        "before_version": before_version,
        "legacy_source": report.generation == SchemaGeneration::Legacy,
        "backup": backup,
        "report": report
    }))
}

fn run_db_stats(store: &SqliteStore) -> Result<()> {
    emit_json(serde_json::json!({
        "schema_version": store.schema_version()?,
        "tables": store.table_counts()?
    }))
}

fn run_db_integrity_check(store: &SqliteStore) -> Result<()> {
    let report = store.integrity_check()?;
    emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
}

fn run_db_backup(args: &DbBackupArgs, store: &SqliteStore) -> Result<()> {
    store.backup_database(&args.out)?;
    emit_json(serde_json::json!({
        "backup_path": args.out,
        "status": "ok"
    }))
}

fn open_source(path: &Path) -> Result<SqliteStore> {
    if !path.exists() {
        anyhow::bail!("source database does not exist: {}", path.display());
    }
    SqliteStore::open_read_only(path)
}

/// Backups are advisory: a failure is logged and the migration continues.
fn take_backup(store: &SqliteStore, dir: &Path) -> Option<Value> {
    match store.backup_timestamped(dir) {
        Ok(receipt) => {
            tracing::info!(path = %receipt.path.display(), sha256 = %receipt.sha256, "backup written");
            serde_json::to_value(&receipt).ok()
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "backup failed; continuing without one");
            None
        }
    }
}

fn log_progress(progress: &StepProgress) {
    tracing::info!(index = progress.index, total = progress.total, "{}", progress.label);
}
