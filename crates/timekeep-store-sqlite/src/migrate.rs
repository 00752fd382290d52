//! Migration orchestrator: bootstrap, detect, run the step list, record the version.
//!
//! Steps run strictly in order on one destination connection. The first failing
//! step ends the run; nothing is retried. Without `atomic` the steps that already
//! ran stay applied.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timekeep_core::{MigrationStep, SchemaGeneration, TARGET_SCHEMA_VERSION};
use ulid::Ulid;

use crate::inspect::{detect, SchemaDetection};
use crate::transform::legacy::InstanceLedger;
use crate::transform::{current, legacy, StepStats};
use crate::{now_rfc3339, SqliteStore};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrationOptions {
    /// Run bootstrap, every step and the version write in one destination transaction.
    pub atomic: bool,
    /// Run transactionally and roll back at the end, keeping only the report.
    pub dry_run: bool,
    pub target_version: i64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self { atomic: false, dry_run: false, target_version: TARGET_SCHEMA_VERSION }
    }
}

impl MigrationOptions {
    fn transactional(self) -> bool {
        self.atomic || self.dry_run
    }
}

/// Handed to the progress observer immediately before a step starts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StepProgress {
    /// 1-based position in the step list.
    pub index: usize,
    pub total: usize,
    pub step: MigrationStep,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub step: MigrationStep,
    pub label: String,
    /// Whether re-running this step against the same source leaves the destination unchanged.
    pub idempotent: bool,
    pub stats: StepStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub run_id: String,
    pub generation: SchemaGeneration,
    pub detection: SchemaDetection,
    pub steps: Vec<StepReport>,
    pub schema_version: i64,
    pub atomic: bool,
    pub dry_run: bool,
    /// False when the run was rolled back as a dry run.
    pub committed: bool,
    pub started_at: String,
    pub finished_at: String,
}

impl MigrationReport {
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.steps.iter().map(|step| step.stats.rows_written).sum()
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to bootstrap destination: {cause:#}")]
    Bootstrap { cause: anyhow::Error },
    #[error("step {index}/{total} ({label}) failed: {cause:#}")]
    Step { index: usize, total: usize, label: &'static str, cause: anyhow::Error },
    #[error("data steps completed but schema version {version} could not be recorded: {cause:#}")]
    VersionWrite { version: i64, cause: anyhow::Error },
    #[error("failed to {action} migration transaction: {cause:#}")]
    Transaction { action: &'static str, cause: anyhow::Error },
}

struct Outcome {
    detection: SchemaDetection,
    steps: Vec<StepReport>,
    schema_version: i64,
}

/// Migrate every entity from `source` into `destination`.
///
/// `on_progress` runs synchronously before each step and cannot fail the run.
///
/// # Errors
/// Returns [`MigrationError`] for the first failure. In transactional mode the
/// destination is rolled back before returning.
pub fn migrate<F>(
    source: &SqliteStore,
    destination: &SqliteStore,
    options: &MigrationOptions,
    mut on_progress: F,
) -> Result<MigrationReport, MigrationError>
where
    F: FnMut(&StepProgress),
{
    let run_id = Ulid::new().to_string();
    let span = tracing::info_span!("migrate", run_id = %run_id);
    let _entered = span.enter();
    let started_at = now_rfc3339().unwrap_or_default();

    tracing::info!(
        source = %source.path().display(),
        destination = %destination.path().display(),
        atomic = options.atomic,
        dry_run = options.dry_run,
        "starting migration"
    );

    if options.transactional() {
        destination
            .begin_transaction()
            .map_err(|cause| MigrationError::Transaction { action: "begin", cause })?;
    }

    let outcome = match run(source, destination, options, &mut on_progress) {
        Ok(outcome) => outcome,
        Err(error) => return Err(abort(destination, options.transactional(), error)),
    };

    let committed = if options.dry_run {
        destination
            .rollback()
            .map_err(|cause| MigrationError::Transaction { action: "roll back", cause })?;
        false
    } else {
        if options.atomic {
            if let Err(cause) = destination.commit() {
                let error = MigrationError::Transaction { action: "commit", cause };
                return Err(abort(destination, destination.in_transaction(), error));
            }
        }
        true
    };

    tracing::info!(
        generation = %outcome.detection.generation,
        schema_version = outcome.schema_version,
        committed,
        "migration finished"
    );

    Ok(MigrationReport {
        run_id,
        generation: outcome.detection.generation,
        detection: outcome.detection,
        steps: outcome.steps,
        schema_version: outcome.schema_version,
        atomic: options.atomic,
        dry_run: options.dry_run,
        committed,
        started_at,
        finished_at: now_rfc3339().unwrap_or_default(),
    })
}

fn run<F>(
    source: &SqliteStore,
    destination: &SqliteStore,
    options: &MigrationOptions,
    on_progress: &mut F,
) -> Result<Outcome, MigrationError>
where
    F: FnMut(&StepProgress),
{
    destination.bootstrap().map_err(|cause| MigrationError::Bootstrap { cause })?;

    let detection = detect(source);
    tracing::info!(
        generation = %detection.generation,
        markers = ?detection.legacy_markers,
        fail_safe = detection.fail_safe,
        "detected source schema"
    );

    let plan = detection.generation.steps();
    let total = plan.len();
    let mut ledger: Option<InstanceLedger> = None;
    let mut steps = Vec::with_capacity(total);

    for (offset, step) in plan.iter().copied().enumerate() {
        let index = offset + 1;
        let label = step.label();
        on_progress(&StepProgress { index, total, step, label });

        let stats = run_step(step, source, destination, &mut ledger)
            .map_err(|cause| MigrationError::Step { index, total, label, cause })?;
        tracing::info!(
            step = label,
            index,
            total,
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            rows_skipped = stats.rows_skipped,
            name_conflicts = stats.name_conflicts,
            references_reset = stats.references_reset,
            "step complete"
        );
        steps.push(StepReport {
            index,
            step,
            label: label.to_string(),
            idempotent: step.is_idempotent(),
            stats,
        });
    }

    let version = options.target_version;
    destination
        .set_schema_version(version)
        .map_err(|cause| MigrationError::VersionWrite { version, cause })?;
    let schema_version = destination
        .schema_version()
        .map_err(|cause| MigrationError::VersionWrite { version, cause })?;

    Ok(Outcome { detection, steps, schema_version })
}

fn run_step(
    step: MigrationStep,
    source: &SqliteStore,
    destination: &SqliteStore,
    ledger: &mut Option<InstanceLedger>,
) -> Result<StepStats> {
    match step {
        MigrationStep::MigrateProjects => legacy::migrate_projects(source, destination),
        MigrationStep::MigrateClients => legacy::migrate_clients(source, destination),
        MigrationStep::MigrateTasks => legacy::migrate_tasks(source, destination),
        MigrationStep::BuildTaskInstances => {
            let (stats, built) = legacy::build_task_instances(source, destination)?;
            *ledger = Some(built);
            Ok(stats)
        }
        MigrationStep::BuildTimeEntries => match ledger.as_ref() {
            Some(built) => legacy::build_time_entries(destination, built),
            None => bail!("time entries requested before task instances were built"),
        },
        MigrationStep::CopyProjects => current::copy_projects(source, destination),
        MigrationStep::CopyClients => current::copy_clients(source, destination),
        MigrationStep::CopyTasks => current::copy_tasks(source, destination),
        MigrationStep::CopyTaskInstances => current::copy_task_instances(source, destination),
        MigrationStep::CopyTimeEntries => current::copy_time_entries(source, destination),
    }
}

fn abort(destination: &SqliteStore, rollback: bool, error: MigrationError) -> MigrationError {
    tracing::error!(error = %error, "migration failed");
    if rollback {
        match destination.rollback() {
            Ok(()) => tracing::warn!("destination rolled back"),
            Err(cause) => {
                tracing::error!(error = %format!("{cause:#}"), "rollback after failed migration failed");
            }
        }
    }
    error
}
