//! Expansion of the denormalized legacy layout into Task, `TaskInstance` and `TimeEntry`.
//!
//! Project, Client and Task writes ignore conflicts and can be re-run safely.
//! `TaskInstance` and `TimeEntry` writes are plain inserts: running them twice
//! against the same source duplicates rows, so callers must gate on the ledger.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use timekeep_core::{
    sql_params, Row, SqlValue, DEFAULT_CLIENT_CURRENCY, DEFAULT_CLIENT_RATE,
    DEFAULT_ICON_COLOR_MODE, DEFAULT_PROJECT_COLOR, DEFAULT_PROJECT_ICON, SENTINEL_CLIENT_ID,
    SENTINEL_PROJECT_ID,
};

use super::{read_all, StepStats};
use crate::schema::{quote_ident, CLIENT_TABLE, PROJECT_TABLE, TASK_TABLE};
use crate::{now_rfc3339, Execution, SqliteStore};

const INSERT_PROJECT_SQL: &str = "INSERT OR IGNORE INTO Project(
    id, name, color, icon, client_id, total_time, dark_icons,
    icon_color, icon_color_mode, created_at, updated_at
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const INSERT_CLIENT_SQL: &str = "INSERT OR IGNORE INTO Client(
    id, name, rate, currency, created_at, updated_at
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const INSERT_TASK_SQL: &str =
    "INSERT OR IGNORE INTO Task(name, created_at, updated_at) VALUES (?1, ?2, ?2)";

const INSERT_TASK_INSTANCE_SQL: &str = "INSERT INTO TaskInstance(
    task_id, project_id, client_id, total_time, last_used_at, is_favorite, created_at, updated_at
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_TIME_ENTRY_SQL: &str = "INSERT INTO TimeEntry(
    task_instance_id, start_time, end_time, duration, created_at
 ) VALUES (?1, ?2, ?3, ?4, ?5)";

/// What a built `TaskInstance` needs to carry into time-entry construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSeed {
    pub task_instance_id: i64,
    pub start_time: SqlValue,
    pub end_time: SqlValue,
    pub duration: Option<i64>,
}

impl InstanceSeed {
    #[must_use]
    pub fn has_interval(&self) -> bool {
        !self.start_time.is_null() && !self.end_time.is_null()
    }
}

/// Legacy task row id → generated instance, scoped to one migration run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceLedger {
    entries: BTreeMap<i64, InstanceSeed>,
}

impl InstanceLedger {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &InstanceSeed)> {
        self.entries.iter().map(|(id, seed)| (*id, seed))
    }

    fn insert(&mut self, source_id: i64, seed: InstanceSeed) {
        self.entries.insert(source_id, seed);
    }
}

/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn migrate_projects(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    let rows = read_all(source, PROJECT_TABLE)?;
    let now = now_rfc3339()?;
    let mut stats = StepStats { rows_read: rows.len(), ..StepStats::default() };

    for row in &rows {
        let id = row.value("id");
        let execution = destination
            .execute(
                INSERT_PROJECT_SQL,
                &[
                    id.clone(),
                    row.value("name"),
                    or_default(row.value("color"), DEFAULT_PROJECT_COLOR),
                    or_default(row.value("icon"), DEFAULT_PROJECT_ICON),
                    row.value("client_id"),
                    or_default(row.value("total_time"), 0_i64),
                    or_default(row.value("dark_icons"), false),
                    row.value("icon_color"),
                    or_default(row.value("icon_color_mode"), DEFAULT_ICON_COLOR_MODE),
                    or_default(row.value("created_at"), now.as_str()),
                    or_default(row.value("updated_at"), now.as_str()),
                ],
            )
            .with_context(|| format!("failed to migrate project {id}"))?;
        tally(destination, &mut stats, execution, PROJECT_TABLE, Some(&id), &row.value("name"))?;
    }

    Ok(stats)
}

/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn migrate_clients(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    let rows = read_all(source, CLIENT_TABLE)?;
    let now = now_rfc3339()?;
    let mut stats = StepStats { rows_read: rows.len(), ..StepStats::default() };

    for row in &rows {
        let id = row.value("id");
        let execution = destination
            .execute(
                INSERT_CLIENT_SQL,
                &[
                    id.clone(),
                    row.value("name"),
                    or_default(row.value("rate"), DEFAULT_CLIENT_RATE),
                    or_default(row.value("currency"), DEFAULT_CLIENT_CURRENCY),
                    or_default(row.value("created_at"), now.as_str()),
                    or_default(row.value("updated_at"), now.as_str()),
                ],
            )
            .with_context(|| format!("failed to migrate client {id}"))?;
        tally(destination, &mut stats, execution, CLIENT_TABLE, Some(&id), &row.value("name"))?;
    }

    Ok(stats)
}

/// Insert one Task template per distinct legacy task name, in order of first use.
///
/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn migrate_tasks(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    let names = source
        .query(
            "SELECT name FROM Task WHERE name IS NOT NULL GROUP BY name ORDER BY MIN(rowid)",
            &[],
        )
        .context("failed to read distinct legacy task names")?;
    let now = now_rfc3339()?;
    let mut stats = StepStats { rows_read: names.len(), ..StepStats::default() };

    for row in &names {
        let name = row.value("name");
        let execution = destination
            .execute(INSERT_TASK_SQL, &[name.clone(), SqlValue::from(now.as_str())])
            .with_context(|| format!("failed to migrate task {name}"))?;
        tally(destination, &mut stats, execution, TASK_TABLE, None, &name)?;
    }

    Ok(stats)
}

/// Create one `TaskInstance` per legacy task row (duplicates by name included).
///
/// Rows whose name has no destination Task are logged and skipped. Project and
/// client ids with no destination row fall back to the sentinels, like NULLs.
///
/// # Errors
/// Returns an error when the source cannot be read, a legacy row is malformed,
/// or an insert fails.
pub fn build_task_instances(
    source: &SqliteStore,
    destination: &SqliteStore,
) -> Result<(StepStats, InstanceLedger)> {
    let rows = read_all(source, TASK_TABLE)?;
    let now = now_rfc3339()?;
    let mut stats = StepStats { rows_read: rows.len(), ..StepStats::default() };
    let mut ledger = InstanceLedger::default();

    for row in &rows {
        let source_id = row.i64("id").context("legacy task row has no id")?;
        let name = row.value("name");
        let Some(task_id) = resolve_task_id(destination, &name)? else {
            tracing::warn!(source_id, name = %name, "no destination task matches legacy row; skipping");
            stats.rows_skipped += 1;
            continue;
        };

        let duration = duration_seconds(row)
            .with_context(|| format!("legacy task {source_id} has an unreadable duration"))?;
        let project_id = resolve_reference(
            destination,
            &mut stats,
            source_id,
            PROJECT_TABLE,
            row.opt_i64("project_id")?,
            SENTINEL_PROJECT_ID,
        )?;
        let client_id = resolve_reference(
            destination,
            &mut stats,
            source_id,
            CLIENT_TABLE,
            row.opt_i64("client_id")?,
            SENTINEL_CLIENT_ID,
        )?;

        let execution = destination
            .execute(
                INSERT_TASK_INSTANCE_SQL,
                &sql_params![
                    task_id,
                    project_id,
                    client_id,
                    duration.unwrap_or(0),
                    now.as_str(),
                    false,
                    or_default(row.value("created_at"), now.as_str()),
                    or_default(row.value("updated_at"), now.as_str()),
                ],
            )
            .with_context(|| format!("failed to build task instance for legacy task {source_id}"))?;
        let task_instance_id = execution.inserted_id().ok_or_else(|| {
            anyhow!("task instance insert for legacy task {source_id} produced no row id")
        })?;

        ledger.insert(
            source_id,
            InstanceSeed {
                task_instance_id,
                start_time: row.value("start_time"),
                end_time: row.value("end_time"),
                duration,
            },
        );
        stats.rows_written += 1;
    }

    Ok((stats, ledger))
}

/// Create one `TimeEntry` per ledger entry whose interval has both endpoints.
///
/// Open or endpoint-less intervals stay counted only in the instance total.
///
/// # Errors
/// Returns an error when an insert fails.
pub fn build_time_entries(destination: &SqliteStore, ledger: &InstanceLedger) -> Result<StepStats> {
    let now = now_rfc3339()?;
    let mut stats = StepStats { rows_read: ledger.len(), ..StepStats::default() };

    for (source_id, seed) in ledger.iter() {
        if !seed.has_interval() {
            tracing::debug!(source_id, "legacy task has no complete interval; no time entry");
            stats.rows_skipped += 1;
            continue;
        }

        destination
            .execute(
                INSERT_TIME_ENTRY_SQL,
                &[
                    SqlValue::from(seed.task_instance_id),
                    seed.start_time.clone(),
                    seed.end_time.clone(),
                    SqlValue::from(seed.duration.unwrap_or(0)),
                    SqlValue::from(now.as_str()),
                ],
            )
            .with_context(|| format!("failed to build time entry for legacy task {source_id}"))?;
        stats.rows_written += 1;
    }

    Ok(stats)
}

fn resolve_task_id(destination: &SqliteStore, name: &SqlValue) -> Result<Option<i64>> {
    if name.is_null() {
        return Ok(None);
    }

    let rows = destination
        .query("SELECT id FROM Task WHERE name = ?1", std::slice::from_ref(name))
        .with_context(|| format!("failed to look up task {name}"))?;
    rows.first().map(|row| row.i64("id")).transpose().map_err(anyhow::Error::from)
}

fn resolve_reference(
    destination: &SqliteStore,
    stats: &mut StepStats,
    source_id: i64,
    table: &str,
    id: Option<i64>,
    sentinel: i64,
) -> Result<i64> {
    let Some(id) = id else {
        return Ok(sentinel);
    };
    if row_exists(destination, table, &SqlValue::from(id))? {
        return Ok(id);
    }

    tracing::warn!(source_id, table, id, "legacy reference has no destination row; using sentinel");
    stats.references_reset += 1;
    Ok(sentinel)
}

fn row_exists(destination: &SqliteStore, table: &str, id: &SqlValue) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1) AS present",
        quote_ident(table)
    );
    let rows = destination
        .query(&sql, std::slice::from_ref(id))
        .with_context(|| format!("failed to look up {table} {id}"))?;
    let present = rows.first().map(|row| row.i64("present")).transpose()?;
    Ok(present == Some(1))
}

/// Legacy durations are whole seconds but older writers stored reals or text.
fn duration_seconds(row: &Row) -> Result<Option<i64>> {
    match row.value("duration") {
        SqlValue::Null => Ok(None),
        SqlValue::Integer(value) => Ok(Some(value)),
        SqlValue::Real(value) => Ok(Some(round_seconds(value))),
        SqlValue::Text(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("duration is not a number: {raw}")),
        SqlValue::Blob(_) => bail!("duration is a blob"),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_seconds(value: f64) -> i64 {
    value.round() as i64
}

fn or_default(value: SqlValue, fallback: impl Into<SqlValue>) -> SqlValue {
    if value.is_null() {
        fallback.into()
    } else {
        value
    }
}

/// An ignored insert either hit an id that is already migrated or a unique name
/// held by a different destination row. Only the second loses a source row.
fn tally(
    destination: &SqliteStore,
    stats: &mut StepStats,
    execution: Execution,
    table: &str,
    id: Option<&SqlValue>,
    name: &SqlValue,
) -> Result<()> {
    if execution.rows() > 0 {
        stats.rows_written += 1;
        return Ok(());
    }

    stats.rows_skipped += 1;
    match id {
        Some(id) if !row_exists(destination, table, id)? => {
            tracing::warn!(
                table,
                id = %id,
                name = %name,
                "name already taken by another destination row; legacy row dropped"
            );
            stats.name_conflicts += 1;
        }
        Some(id) => tracing::info!(table, id = %id, "id already present in destination; ignored"),
        None => tracing::info!(table, name = %name, "name already present in destination; ignored"),
    }
    Ok(())
}
