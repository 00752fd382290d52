//! Column-preserving copy for sources already in the current layout.
//!
//! Only columns present on both sides are copied and ids are carried over. A
//! NULL source cell is left out of the insert so the destination default applies.

use anyhow::{Context, Result};
use timekeep_core::{Row, SqlValue};

use super::{read_all, OnConflict, StepStats};
use crate::schema::{
    quote_ident, CLIENT_TABLE, PROJECT_TABLE, TASK_INSTANCE_TABLE, TASK_TABLE, TIME_ENTRY_TABLE,
};
use crate::SqliteStore;

/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn copy_projects(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    copy_table(source, destination, PROJECT_TABLE, OnConflict::Ignore)
}

/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn copy_clients(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    copy_table(source, destination, CLIENT_TABLE, OnConflict::Ignore)
}

/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn copy_tasks(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    copy_table(source, destination, TASK_TABLE, OnConflict::Ignore)
}

/// Plain insert: an id already present in the destination is a hard failure.
///
/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn copy_task_instances(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    copy_table(source, destination, TASK_INSTANCE_TABLE, OnConflict::Fail)
}

/// Plain insert: an id already present in the destination is a hard failure.
///
/// # Errors
/// Returns an error when the source cannot be read or an insert fails.
pub fn copy_time_entries(source: &SqliteStore, destination: &SqliteStore) -> Result<StepStats> {
    copy_table(source, destination, TIME_ENTRY_TABLE, OnConflict::Fail)
}

fn copy_table(
    source: &SqliteStore,
    destination: &SqliteStore,
    table: &str,
    on_conflict: OnConflict,
) -> Result<StepStats> {
    let rows = read_all(source, table)?;
    let mut stats = StepStats { rows_read: rows.len(), ..StepStats::default() };
    if rows.is_empty() {
        return Ok(stats);
    }

    let destination_columns = destination
        .table_columns(table)
        .with_context(|| format!("failed to read destination columns for {table}"))?;

    for row in &rows {
        let (columns, values) = shared_cells(row, &destination_columns);
        if columns.is_empty() {
            tracing::warn!(table, "source row shares no non-null columns with destination; skipping");
            stats.rows_skipped += 1;
            continue;
        }

        let sql = insert_sql(on_conflict, table, &columns);
        let execution = destination
            .execute(&sql, &values)
            .with_context(|| format!("failed to copy {table} row {}", row.value("id")))?;

        if execution.rows() == 0 {
            tracing::info!(table, id = %row.value("id"), "row already present in destination; ignored");
            stats.rows_skipped += 1;
        } else {
            stats.rows_written += 1;
        }
    }

    Ok(stats)
}

/// Non-null cells whose column also exists in the destination, named as the
/// destination declares them.
fn shared_cells<'a>(row: &Row, destination_columns: &'a [String]) -> (Vec<&'a str>, Vec<SqlValue>) {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in destination_columns {
        let cell = row
            .columns()
            .find(|candidate| candidate.eq_ignore_ascii_case(column))
            .map(|candidate| row.value(candidate));
        if let Some(value) = cell.filter(|value| !value.is_null()) {
            columns.push(column.as_str());
            values.push(value);
        }
    }
    (columns, values)
}

fn insert_sql(on_conflict: OnConflict, table: &str, columns: &[&str]) -> String {
    let column_list: Vec<String> = columns.iter().map(|column| quote_ident(column)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();
    format!(
        "{} {}({}) VALUES ({})",
        on_conflict.insert_verb(),
        quote_ident(table),
        column_list.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::anyhow;
    use timekeep_core::sql_params;

    use super::*;

    fn current_source() -> Result<SqliteStore> {
        let source = SqliteStore::open(Path::new(":memory:"))?;
        source.bootstrap()?;
        source.execute(
            "INSERT INTO Project(id, name, color) VALUES (5, 'Docs', '#112233')",
            &[],
        )?;
        source.execute("INSERT INTO Client(id, name, rate) VALUES (7, 'Acme', 95.5)", &[])?;
        source.execute("INSERT INTO Task(id, name) VALUES (11, 'write docs')", &[])?;
        source.execute(
            "INSERT INTO TaskInstance(id, task_id, project_id, client_id, total_time)
             VALUES (21, 11, 5, 7, 90)",
            &[],
        )?;
        source.execute(
            "INSERT INTO TimeEntry(id, task_instance_id, start_time, end_time, duration)
             VALUES (31, 21, ?1, ?2, 90)",
            &sql_params![1_700_000_000_i64, 1_700_000_090_i64],
        )?;
        Ok(source)
    }

    fn copy_all(source: &SqliteStore, destination: &SqliteStore) -> Result<()> {
        copy_projects(source, destination)?;
        copy_clients(source, destination)?;
        copy_tasks(source, destination)?;
        copy_task_instances(source, destination)?;
        copy_time_entries(source, destination)?;
        Ok(())
    }

    #[test]
    fn copy_preserves_ids_and_cell_types() -> Result<()> {
        let source = current_source()?;
        let destination = SqliteStore::open(Path::new(":memory:"))?;
        destination.bootstrap()?;

        copy_all(&source, &destination)?;

        let instances = destination.list_task_instances()?;
        assert_eq!(instances.len(), 1);
        assert_eq!((instances[0].id, instances[0].task_id), (21, 11));
        assert_eq!(instances[0].total_time, 90);

        let entries = destination.list_time_entries()?;
        assert_eq!(entries[0].id, 31);
        assert_eq!(entries[0].start_time, SqlValue::Integer(1_700_000_000));

        let clients = destination.list_clients()?;
        let acme = clients.iter().find(|c| c.id == 7).ok_or_else(|| anyhow!("missing acme"))?;
        assert!((acme.rate - 95.5).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn null_cells_fall_back_to_destination_defaults() -> Result<()> {
        let source = SqliteStore::open(Path::new(":memory:"))?;
        source.execute(
            "CREATE TABLE Project (id INTEGER PRIMARY KEY, name TEXT, color TEXT, legacy_flag INTEGER)",
            &[],
        )?;
        source.execute(
            "INSERT INTO Project (id, name, color, legacy_flag) VALUES (4, 'Ops', NULL, 1)",
            &[],
        )?;
        let destination = SqliteStore::open(Path::new(":memory:"))?;
        destination.bootstrap()?;

        let stats = copy_projects(&source, &destination)?;
        assert_eq!(stats.rows_written, 1);

        let projects = destination.list_projects()?;
        let ops = projects.iter().find(|p| p.id == 4).ok_or_else(|| anyhow!("missing ops"))?;
        assert_eq!(ops.color, timekeep_core::DEFAULT_PROJECT_COLOR);
        Ok(())
    }

    #[test]
    fn rerun_ignores_parents_but_fails_on_instances() -> Result<()> {
        let source = current_source()?;
        let destination = SqliteStore::open(Path::new(":memory:"))?;
        destination.bootstrap()?;
        copy_all(&source, &destination)?;

        let stats = copy_projects(&source, &destination)?;
        assert_eq!(stats.rows_written, 0);
        assert_eq!(stats.rows_skipped, stats.rows_read);
        copy_clients(&source, &destination)?;
        copy_tasks(&source, &destination)?;

        assert!(copy_task_instances(&source, &destination).is_err());
        assert!(copy_time_entries(&source, &destination).is_err());
        assert_eq!(destination.count_rows("TaskInstance")?, 1);
        Ok(())
    }

    #[test]
    fn missing_source_table_copies_nothing() -> Result<()> {
        let source = SqliteStore::open(Path::new(":memory:"))?;
        let destination = SqliteStore::open(Path::new(":memory:"))?;
        destination.bootstrap()?;

        let stats = copy_time_entries(&source, &destination)?;
        assert_eq!(stats, StepStats::default());
        Ok(())
    }

    #[test]
    fn insert_sql_quotes_identifiers() {
        assert_eq!(
            insert_sql(OnConflict::Ignore, "Task", &["id", "name"]),
            "INSERT OR IGNORE INTO \"Task\"(\"id\", \"name\") VALUES (?1, ?2)"
        );
    }
}
