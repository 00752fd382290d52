use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, DatabaseName, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;
use timekeep_core::{
    sql_params, Client, Project, Row, SqlValue, Task, TaskInstance, TimeEntry,
    DEFAULT_CLIENT_CURRENCY, DEFAULT_CLIENT_RATE, DEFAULT_ICON_COLOR_MODE, DEFAULT_PROJECT_COLOR,
    DEFAULT_PROJECT_ICON, SENTINEL_CLIENT_ID, SENTINEL_CLIENT_NAME, SENTINEL_PROJECT_ID,
    SENTINEL_PROJECT_NAME,
};

pub mod inspect;
pub mod migrate;
pub mod schema;
pub mod transform;

pub use inspect::{detect, SchemaDetection};
pub use migrate::{
    migrate, MigrationError, MigrationOptions, MigrationReport, StepProgress, StepReport,
};
pub use transform::StepStats;

use schema::{
    quote_ident, BOOTSTRAP_SQL, CREATE_SCHEMA_VERSION_SQL, ENTITY_TABLES,
    SEED_SENTINEL_CLIENT_SQL, SEED_SENTINEL_PROJECT_SQL, SCHEMA_VERSION_TABLE,
};

/// One live connection to a file-backed time-tracking store.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Execution {
    /// An INSERT/REPLACE ran. `row_id` is the connection's last generated row id,
    /// which is stale when a conflict clause suppressed the insert (`rows == 0`).
    Inserted { row_id: i64, rows: usize },
    Affected { rows: usize },
}

impl Execution {
    #[must_use]
    pub fn rows(self) -> usize {
        match self {
            Self::Inserted { rows, .. } | Self::Affected { rows } => rows,
        }
    }

    #[must_use]
    pub fn inserted_id(self) -> Option<i64> {
        match self {
            Self::Inserted { row_id, rows } if rows > 0 => Some(row_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableCount {
    pub table: String,
    pub exists: bool,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupReceipt {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
    pub created_at: String,
}

impl SqliteStore {
    /// Open a `SQLite` store for reading and writing and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Open an existing store without write access. Used for migration sources.
    ///
    /// # Errors
    /// Returns an error when the file is missing or cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| {
            format!("failed to open sqlite database read-only at {}", path.display())
        })?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn, path: path.to_path_buf() })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read and return every row keyed by column name.
    ///
    /// # Errors
    /// Returns an error when preparation fails, the parameter count does not match
    /// the statement's placeholders, or any row fails to step.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut stmt =
            self.conn.prepare_cached(sql).with_context(|| format!("failed to prepare: {sql}"))?;
        check_parameter_count(stmt.parameter_count(), params.len(), sql)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sqlite)))
            .with_context(|| format!("failed to run query: {sql}"))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().with_context(|| format!("failed to read row: {sql}"))? {
            let mut mapped = Row::new();
            for (index, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), from_sqlite(row.get_ref(index)?));
            }
            out.push(mapped);
        }

        Ok(out)
    }

    /// Run a write. INSERT and REPLACE statements report the generated row id.
    ///
    /// # Errors
    /// Returns an error when preparation fails, the parameter count does not match,
    /// or the statement violates a constraint.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<Execution> {
        let mut stmt =
            self.conn.prepare_cached(sql).with_context(|| format!("failed to prepare: {sql}"))?;
        check_parameter_count(stmt.parameter_count(), params.len(), sql)?;

        let rows = stmt
            .execute(params_from_iter(params.iter().map(to_sqlite)))
            .with_context(|| format!("failed to execute: {sql}"))?;

        if !is_insert(sql) {
            return Ok(Execution::Affected { rows });
        }

        let row_id = self
            .conn
            .query_row("SELECT last_insert_rowid()", [], |row| row.get::<_, i64>(0))
            .context("failed to read last inserted row id")?;
        Ok(Execution::Inserted { row_id, rows })
    }

    /// Start an explicit transaction on this connection.
    ///
    /// # Errors
    /// Returns an error when a transaction is already open or the database is locked.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE").context("failed to begin transaction")
    }

    /// # Errors
    /// Returns an error when no transaction is open or the commit fails.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT").context("failed to commit transaction")
    }

    /// # Errors
    /// Returns an error when no transaction is open.
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").context("failed to roll back transaction")
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Highest version recorded in the ledger, or 0 when nothing was recorded.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be read.
    pub fn schema_version(&self) -> Result<i64> {
        if !self.table_exists(SCHEMA_VERSION_TABLE)? {
            return Ok(0);
        }

        let version = self
            .conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("failed to read current schema version")?;
        Ok(version)
    }

    /// Append `version` to the ledger. Recording a lower version never lowers
    /// the reported current version.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be created or written.
    pub fn set_schema_version(&self, version: i64) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_VERSION_SQL)
            .context("failed to apply schema_version table")?;
        self.execute(
            "INSERT OR REPLACE INTO schema_version(version, created_at) VALUES (?1, ?2)",
            &sql_params![version, now_rfc3339()?],
        )
        .with_context(|| format!("failed to record schema version {version}"))?;
        Ok(())
    }

    /// Create the destination tables, foreign keys and sentinel rows if absent.
    ///
    /// # Errors
    /// Returns an error when DDL or the sentinel seed inserts fail.
    pub fn bootstrap(&self) -> Result<()> {
        self.conn.execute_batch(BOOTSTRAP_SQL).context("failed to apply bootstrap schema")?;

        let now = now_rfc3339()?;
        self.execute(
            SEED_SENTINEL_PROJECT_SQL,
            &sql_params![
                SENTINEL_PROJECT_ID,
                SENTINEL_PROJECT_NAME,
                DEFAULT_PROJECT_COLOR,
                DEFAULT_PROJECT_ICON,
                DEFAULT_ICON_COLOR_MODE,
                now.as_str(),
            ],
        )
        .context("failed to seed sentinel project")?;
        self.execute(
            SEED_SENTINEL_CLIENT_SQL,
            &sql_params![
                SENTINEL_CLIENT_ID,
                SENTINEL_CLIENT_NAME,
                DEFAULT_CLIENT_RATE,
                DEFAULT_CLIENT_CURRENCY,
                now.as_str(),
            ],
        )
        .context("failed to seed sentinel client")?;

        Ok(())
    }

    /// # Errors
    /// Returns an error when `sqlite_master` cannot be read.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("failed to check if table exists: {table}"))?;
        Ok(exists == 1)
    }

    /// Column names of `table` in declaration order; empty when the table is absent.
    ///
    /// # Errors
    /// Returns an error when the column catalog cannot be read.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .query("SELECT name FROM pragma_table_info(?1) ORDER BY cid", &sql_params![table])
            .with_context(|| format!("failed to inspect table_info for {table}"))?;
        rows.iter().map(|row| row.text("name").map_err(anyhow::Error::from)).collect()
    }

    /// # Errors
    /// Returns an error when the table is missing or cannot be counted.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        self.conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .with_context(|| format!("failed to count rows in {table}"))
    }

    /// Row counts for every entity table, reporting absent tables as empty.
    ///
    /// # Errors
    /// Returns an error when the catalog or a count query fails.
    pub fn table_counts(&self) -> Result<Vec<TableCount>> {
        let mut counts = Vec::with_capacity(ENTITY_TABLES.len());
        for table in ENTITY_TABLES {
            let exists = self.table_exists(table)?;
            let rows = if exists { self.count_rows(table)? } else { 0 };
            counts.push(TableCount { table: table.to_string(), exists, rows });
        }
        Ok(counts)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.list("SELECT * FROM Project ORDER BY id", Project::from_row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_clients(&self) -> Result<Vec<Client>> {
        self.list("SELECT * FROM Client ORDER BY id", Client::from_row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.list("SELECT * FROM Task ORDER BY id", Task::from_row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_task_instances(&self) -> Result<Vec<TaskInstance>> {
        self.list("SELECT * FROM TaskInstance ORDER BY id", TaskInstance::from_row)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_time_entries(&self) -> Result<Vec<TimeEntry>> {
        self.list("SELECT * FROM TimeEntry ORDER BY id", TimeEntry::from_row)
    }

    fn list<T, F>(&self, sql: &str, decode: F) -> Result<Vec<T>>
    where
        F: Fn(&Row) -> Result<T, timekeep_core::CoreError>,
    {
        self.query(sql, &[])?
            .iter()
            .map(|row| decode(row).with_context(|| format!("failed to decode row from: {sql}")))
            .collect()
    }

    /// Run quick-check and foreign-key-check, and report the ledger version.
    ///
    /// # Errors
    /// Returns an error when either integrity query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_version: self.schema_version()?,
        })
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Back up into `dir` under a timestamped file name and return its digest.
    ///
    /// # Errors
    /// Returns an error when the backup or digest cannot be produced.
    pub fn backup_timestamped(&self, dir: &Path) -> Result<BackupReceipt> {
        let now = OffsetDateTime::now_utc();
        let stamp = now
            .format(format_description!(
                "[year][month][day]T[hour][minute][second][subsecond digits:3]Z"
            ))
            .context("failed to format backup timestamp")?;
        let stem = self
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty() && *stem != ":memory:")
            .unwrap_or("timekeep");
        let out_file = dir.join(format!("{stem}-{stamp}.sqlite3.bak"));

        self.backup_database(&out_file)?;

        let bytes = fs::read(&out_file)
            .with_context(|| format!("failed to read backup file {}", out_file.display()))?;
        Ok(BackupReceipt {
            sha256: format!("{:x}", Sha256::digest(&bytes)),
            bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            path: out_file,
            created_at: rfc3339(now)?,
        })
    }
}

fn check_parameter_count(expected: usize, given: usize, sql: &str) -> Result<()> {
    if expected != given {
        return Err(anyhow!(
            "statement expects {expected} parameter(s) but {given} were supplied: {sql}"
        ));
    }
    Ok(())
}

fn is_insert(sql: &str) -> bool {
    let keyword: String =
        sql.trim_start().chars().take_while(char::is_ascii_alphabetic).collect();
    keyword.eq_ignore_ascii_case("insert") || keyword.eq_ignore_ascii_case("replace")
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(value) => Value::Blob(value.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Real(value),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

pub(crate) fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> Result<SqliteStore> {
        SqliteStore::open(Path::new(":memory:"))
    }

    #[test]
    fn query_returns_typed_cells_by_column_name() -> Result<()> {
        let store = memory_store()?;
        let rows = store.query(
            "SELECT ?1 AS n, ?2 AS r, ?3 AS t, ?4 AS z, ?5 AS b",
            &sql_params![7_i64, 1.5_f64, "o'clock", None::<i64>, true],
        )?;

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.value("n"), SqlValue::Integer(7));
        assert_eq!(row.value("r"), SqlValue::Real(1.5));
        assert_eq!(row.value("t"), SqlValue::Text("o'clock".to_string()));
        assert_eq!(row.value("z"), SqlValue::Null);
        assert_eq!(row.value("b"), SqlValue::Integer(1));
        Ok(())
    }

    #[test]
    fn execute_reports_generated_ids_for_inserts_only() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;

        let first = store.execute(
            "INSERT INTO Task(name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            &sql_params!["write docs", "2024-01-01T00:00:00Z"],
        )?;
        let second = store.execute(
            "  insert into Task(name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            &sql_params!["review", "2024-01-01T00:00:00Z"],
        )?;
        assert_eq!(first, Execution::Inserted { row_id: 1, rows: 1 });
        assert_eq!(second.inserted_id(), Some(2));

        let update = store.execute("UPDATE Task SET updated_at = ?1", &sql_params!["later"])?;
        assert_eq!(update, Execution::Affected { rows: 2 });

        let ignored = store.execute(
            "INSERT OR IGNORE INTO Task(name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            &sql_params!["review", "2024-01-02T00:00:00Z"],
        )?;
        assert_eq!(ignored.rows(), 0);
        assert_eq!(ignored.inserted_id(), None);
        Ok(())
    }

    #[test]
    fn parameter_count_mismatch_is_rejected() -> Result<()> {
        let store = memory_store()?;
        let too_few = store.query("SELECT ?1 AS a, ?2 AS b", &sql_params![1_i64]);
        assert!(too_few.is_err());

        let too_many = store.query("SELECT ?1 AS a", &sql_params![1_i64, 2_i64]);
        let message = format!("{:#}", too_many.err().ok_or_else(|| anyhow!("expected error"))?);
        assert!(message.contains("expects 1 parameter(s) but 2 were supplied"));
        Ok(())
    }

    #[test]
    fn placeholder_characters_inside_text_stay_data() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;
        store.execute(
            "INSERT INTO Task(name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            &sql_params!["why? it's ?1", "2024-01-01T00:00:00Z"],
        )?;

        let tasks = store.list_tasks()?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "why? it's ?1");
        Ok(())
    }

    #[test]
    fn bootstrap_is_idempotent_and_seeds_sentinels() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;
        store.bootstrap()?;

        let projects = store.list_projects()?;
        let clients = store.list_clients()?;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, SENTINEL_PROJECT_ID);
        assert_eq!(projects[0].name, SENTINEL_PROJECT_NAME);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, SENTINEL_CLIENT_NAME);
        assert_eq!(clients[0].currency, DEFAULT_CLIENT_CURRENCY);

        for table in ENTITY_TABLES {
            assert!(store.table_exists(table)?, "missing table {table}");
        }
        Ok(())
    }

    #[test]
    fn foreign_keys_cascade_from_task_to_entries() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;

        let task_id = store
            .execute(
                "INSERT INTO Task(name) VALUES (?1)",
                &sql_params!["deploy"],
            )?
            .inserted_id()
            .ok_or_else(|| anyhow!("task insert produced no id"))?;
        let instance_id = store
            .execute(
                "INSERT INTO TaskInstance(task_id, project_id, client_id) VALUES (?1, 1, 1)",
                &sql_params![task_id],
            )?
            .inserted_id()
            .ok_or_else(|| anyhow!("instance insert produced no id"))?;
        store.execute(
            "INSERT INTO TimeEntry(task_instance_id, start_time, end_time, duration)
             VALUES (?1, ?2, ?3, ?4)",
            &sql_params![instance_id, 100_i64, 160_i64, 60_i64],
        )?;

        let orphan = store.execute(
            "INSERT INTO TaskInstance(task_id, project_id, client_id) VALUES (?1, 1, 1)",
            &sql_params![999_i64],
        );
        assert!(orphan.is_err());

        store.execute("DELETE FROM Task WHERE id = ?1", &sql_params![task_id])?;
        assert_eq!(store.count_rows("TaskInstance")?, 0);
        assert_eq!(store.count_rows("TimeEntry")?, 0);
        Ok(())
    }

    #[test]
    fn schema_version_reads_maximum_and_never_reverts() -> Result<()> {
        let store = memory_store()?;
        assert_eq!(store.schema_version()?, 0);

        store.set_schema_version(2)?;
        assert_eq!(store.schema_version()?, 2);

        store.set_schema_version(1)?;
        assert_eq!(store.schema_version()?, 2);

        store.set_schema_version(2)?;
        assert_eq!(store.count_rows("schema_version")?, 2);
        Ok(())
    }

    #[test]
    fn rollback_discards_writes_since_begin() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;

        store.begin_transaction()?;
        assert!(store.in_transaction());
        store.execute("INSERT INTO Task(name) VALUES (?1)", &sql_params!["temp"])?;
        store.rollback()?;
        assert!(!store.in_transaction());
        assert_eq!(store.count_rows("Task")?, 0);

        store.begin_transaction()?;
        store.execute("INSERT INTO Task(name) VALUES (?1)", &sql_params!["kept"])?;
        store.commit()?;
        assert_eq!(store.count_rows("Task")?, 1);
        Ok(())
    }

    #[test]
    fn table_columns_is_empty_for_missing_table() -> Result<()> {
        let store = memory_store()?;
        assert!(store.table_columns("Task")?.is_empty());

        store.bootstrap()?;
        let columns = store.table_columns("Task")?;
        assert_eq!(columns, vec!["id", "name", "created_at", "updated_at"]);
        Ok(())
    }

    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let store = memory_store()?;
        store.bootstrap()?;
        store.set_schema_version(2)?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert!(report.foreign_key_violations.is_empty());
        assert_eq!(report.schema_version, 2);
        Ok(())
    }

    #[test]
    fn timestamped_backup_produces_digest_and_readable_copy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&dir.path().join("tracker.db"))?;
        store.bootstrap()?;

        let receipt = store.backup_timestamped(&dir.path().join("backups"))?;
        assert!(receipt.path.exists());
        assert_eq!(receipt.sha256.len(), 64);
        assert!(receipt
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("tracker-")));

        let restored = SqliteStore::open_read_only(&receipt.path)?;
        assert_eq!(restored.count_rows("Project")?, 1);
        Ok(())
    }

    #[test]
    fn read_only_store_rejects_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("source.db");
        SqliteStore::open(&path)?.bootstrap()?;

        let source = SqliteStore::open_read_only(&path)?;
        assert_eq!(source.count_rows("Client")?, 1);
        assert!(source.execute("DELETE FROM Client", &[]).is_err());
        Ok(())
    }
}
