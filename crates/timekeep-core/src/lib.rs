use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Schema version written to the destination ledger after a successful upgrade.
pub const TARGET_SCHEMA_VERSION: i64 = 2;

/// Permanent fallback rows seeded at bootstrap and never deleted.
pub const SENTINEL_PROJECT_ID: i64 = 1;
pub const SENTINEL_PROJECT_NAME: &str = "Default";
pub const SENTINEL_CLIENT_ID: i64 = 1;
pub const SENTINEL_CLIENT_NAME: &str = "Default Client";

/// Columns that only exist on the denormalized legacy `Task` table.
pub const LEGACY_TASK_MARKERS: [&str; 3] = ["project_id", "client_id", "duration"];

pub const DEFAULT_PROJECT_COLOR: &str = "#4A90D9";
pub const DEFAULT_PROJECT_ICON: &str = "folder";
pub const DEFAULT_ICON_COLOR_MODE: &str = "auto";
pub const DEFAULT_CLIENT_RATE: f64 = 0.0;
pub const DEFAULT_CLIENT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("column {column} holds {found}, expected {expected}")]
    Decode { column: String, expected: &'static str, found: &'static str },
}

/// A single SQLite cell, either bound as a parameter or read back from a row.
///
/// Conversions encode the parameter coercion contract: `None` becomes NULL,
/// `bool` becomes `1`/`0`, strings stay text and numbers keep their numeric class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl Display for SqlValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Build a parameter list from heterogeneous values.
#[macro_export]
macro_rules! sql_params {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlValue::from($value)),+]
    };
}

/// One result row keyed by column name.
///
/// Accessors treat an absent column like NULL for the `opt_*` family, which lets
/// readers consume legacy tables that predate some optional columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, SqlValue>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Cell value, NULL when the column is absent.
    #[must_use]
    pub fn value(&self, column: &str) -> SqlValue {
        self.columns.get(column).cloned().unwrap_or(SqlValue::Null)
    }

    /// # Errors
    /// Returns [`CoreError`] when the column is absent, NULL, or not an integer.
    pub fn i64(&self, column: &str) -> Result<i64, CoreError> {
        self.opt_i64(column)?.ok_or_else(|| CoreError::MissingColumn(column.to_string()))
    }

    /// # Errors
    /// Returns [`CoreError`] when the column is absent, NULL, or not text.
    pub fn text(&self, column: &str) -> Result<String, CoreError> {
        self.opt_text(column)?.ok_or_else(|| CoreError::MissingColumn(column.to_string()))
    }

    /// # Errors
    /// Returns [`CoreError::Decode`] when the column holds a non-integer value.
    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, CoreError> {
        match self.columns.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(decode_error(column, "integer", other)),
        }
    }

    /// Integers are widened so `rate` columns written as whole numbers still decode.
    ///
    /// # Errors
    /// Returns [`CoreError::Decode`] when the column holds a non-numeric value.
    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>, CoreError> {
        match self.columns.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Real(value)) => Ok(Some(*value)),
            #[allow(clippy::cast_precision_loss)]
            Some(SqlValue::Integer(value)) => Ok(Some(*value as f64)),
            Some(other) => Err(decode_error(column, "real", other)),
        }
    }

    /// # Errors
    /// Returns [`CoreError::Decode`] when the column holds a non-text value.
    pub fn opt_text(&self, column: &str) -> Result<Option<String>, CoreError> {
        match self.columns.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(decode_error(column, "text", other)),
        }
    }

    /// # Errors
    /// Returns [`CoreError::Decode`] when the column holds a non-integer value.
    pub fn opt_bool(&self, column: &str) -> Result<Option<bool>, CoreError> {
        Ok(self.opt_i64(column)?.map(|value| value != 0))
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self { columns: iter.into_iter().collect() }
    }
}

fn decode_error(column: &str, expected: &'static str, found: &SqlValue) -> CoreError {
    CoreError::Decode { column: column.to_string(), expected, found: found.type_name() }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchemaGeneration {
    /// Denormalized `Task` rows carrying project, client and interval fields.
    Legacy,
    /// Already split into Task, `TaskInstance` and `TimeEntry`.
    Current,
}

impl SchemaGeneration {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Current => "current",
        }
    }

    /// Fixed, ordered step list for this generation.
    #[must_use]
    pub fn steps(self) -> &'static [MigrationStep] {
        match self {
            Self::Legacy => &LEGACY_STEPS,
            Self::Current => &CURRENT_STEPS,
        }
    }
}

impl Display for SchemaGeneration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    MigrateProjects,
    MigrateClients,
    MigrateTasks,
    BuildTaskInstances,
    BuildTimeEntries,
    CopyProjects,
    CopyClients,
    CopyTasks,
    CopyTaskInstances,
    CopyTimeEntries,
}

const LEGACY_STEPS: [MigrationStep; 5] = [
    MigrationStep::MigrateProjects,
    MigrationStep::MigrateClients,
    MigrationStep::MigrateTasks,
    MigrationStep::BuildTaskInstances,
    MigrationStep::BuildTimeEntries,
];

const CURRENT_STEPS: [MigrationStep; 5] = [
    MigrationStep::CopyProjects,
    MigrationStep::CopyClients,
    MigrationStep::CopyTasks,
    MigrationStep::CopyTaskInstances,
    MigrationStep::CopyTimeEntries,
];

impl MigrationStep {
    /// Human-readable label handed to progress observers.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::MigrateProjects => "Migrating projects",
            Self::MigrateClients => "Migrating clients",
            Self::MigrateTasks => "Migrating tasks",
            Self::BuildTaskInstances => "Building task instances",
            Self::BuildTimeEntries => "Building time entries",
            Self::CopyProjects => "Copying projects",
            Self::CopyClients => "Copying clients",
            Self::CopyTasks => "Copying tasks",
            Self::CopyTaskInstances => "Copying task instances",
            Self::CopyTimeEntries => "Copying time entries",
        }
    }

    /// Whether re-running this step alone against the same source is a no-op.
    #[must_use]
    pub fn is_idempotent(self) -> bool {
        !matches!(
            self,
            Self::BuildTaskInstances
                | Self::BuildTimeEntries
                | Self::CopyTaskInstances
                | Self::CopyTimeEntries
        )
    }
}

impl Display for MigrationStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
    pub client_id: Option<i64>,
    pub total_time: i64,
    pub dark_icons: bool,
    pub icon_color: Option<String>,
    pub icon_color_mode: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Project {
    /// # Errors
    /// Returns [`CoreError`] when a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            color: row.opt_text("color")?.unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            icon: row.opt_text("icon")?,
            client_id: row.opt_i64("client_id")?,
            total_time: row.opt_i64("total_time")?.unwrap_or(0),
            dark_icons: row.opt_bool("dark_icons")?.unwrap_or(false),
            icon_color: row.opt_text("icon_color")?,
            icon_color_mode: row
                .opt_text("icon_color_mode")?
                .unwrap_or_else(|| DEFAULT_ICON_COLOR_MODE.to_string()),
            created_at: row.opt_text("created_at")?,
            updated_at: row.opt_text("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub rate: f64,
    pub currency: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Client {
    /// # Errors
    /// Returns [`CoreError`] when a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            rate: row.opt_f64("rate")?.unwrap_or(DEFAULT_CLIENT_RATE),
            currency: row
                .opt_text("currency")?
                .unwrap_or_else(|| DEFAULT_CLIENT_CURRENCY.to_string()),
            created_at: row.opt_text("created_at")?,
            updated_at: row.opt_text("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Task {
    /// # Errors
    /// Returns [`CoreError`] when a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            created_at: row.opt_text("created_at")?,
            updated_at: row.opt_text("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TaskInstance {
    pub id: i64,
    pub task_id: i64,
    pub project_id: i64,
    pub client_id: i64,
    pub total_time: i64,
    pub last_used_at: Option<String>,
    pub is_favorite: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl TaskInstance {
    /// # Errors
    /// Returns [`CoreError`] when a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.i64("id")?,
            task_id: row.i64("task_id")?,
            project_id: row.opt_i64("project_id")?.unwrap_or(SENTINEL_PROJECT_ID),
            client_id: row.opt_i64("client_id")?.unwrap_or(SENTINEL_CLIENT_ID),
            total_time: row.opt_i64("total_time")?.unwrap_or(0),
            last_used_at: row.opt_text("last_used_at")?,
            is_favorite: row.opt_bool("is_favorite")?.unwrap_or(false),
            created_at: row.opt_text("created_at")?,
            updated_at: row.opt_text("updated_at")?,
        })
    }
}

/// One concrete tracked interval. Endpoints keep whatever cell type the source
/// stored (epoch integers or timestamp text).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    pub id: i64,
    pub task_instance_id: i64,
    pub start_time: SqlValue,
    pub end_time: SqlValue,
    pub duration: i64,
    pub created_at: Option<String>,
}

impl TimeEntry {
    /// # Errors
    /// Returns [`CoreError`] when a required column is missing or mistyped.
    pub fn from_row(row: &Row) -> Result<Self, CoreError> {
        Ok(Self {
            id: row.i64("id")?,
            task_instance_id: row.i64("task_instance_id")?,
            start_time: row.value("start_time"),
            end_time: row.value("end_time"),
            duration: row.opt_i64("duration")?.unwrap_or(0),
            created_at: row.opt_text("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        pairs.iter().map(|(column, value)| ((*column).to_string(), value.clone())).collect()
    }

    #[test]
    fn conversions_follow_parameter_coercion_rules() {
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(false), SqlValue::Integer(0));
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(42_i64)), SqlValue::Integer(42));
        assert_eq!(SqlValue::from("it's"), SqlValue::Text("it's".to_string()));
        assert_eq!(SqlValue::from(2.5_f64), SqlValue::Real(2.5));
    }

    #[test]
    fn literal_display_escapes_quotes() {
        assert_eq!(SqlValue::from("it's").to_string(), "'it''s'");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::from(true).to_string(), "1");
    }

    #[test]
    fn sql_params_macro_mixes_types() {
        let params = sql_params![1_i64, "name", None::<i64>, true];
        assert_eq!(
            params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("name".to_string()),
                SqlValue::Null,
                SqlValue::Integer(1),
            ]
        );
        assert!(sql_params![].is_empty());
    }

    #[test]
    fn row_accessors_treat_absent_columns_as_null() -> Result<(), CoreError> {
        let row = row(&[("id", SqlValue::Integer(7)), ("rate", SqlValue::Integer(12))]);
        assert_eq!(row.i64("id")?, 7);
        assert_eq!(row.opt_text("currency")?, None);
        assert_eq!(row.opt_f64("rate")?, Some(12.0));
        assert_eq!(row.value("missing"), SqlValue::Null);
        assert_eq!(row.text("name"), Err(CoreError::MissingColumn("name".to_string())));
        Ok(())
    }

    #[test]
    fn row_accessors_reject_mistyped_cells() {
        let row = row(&[("id", SqlValue::Text("seven".to_string()))]);
        assert_eq!(
            row.i64("id"),
            Err(CoreError::Decode { column: "id".to_string(), expected: "integer", found: "text" })
        );
    }

    #[test]
    fn step_lists_are_fixed_per_generation() {
        let legacy: Vec<_> = SchemaGeneration::Legacy.steps().iter().map(|s| s.label()).collect();
        assert_eq!(
            legacy,
            vec![
                "Migrating projects",
                "Migrating clients",
                "Migrating tasks",
                "Building task instances",
                "Building time entries",
            ]
        );
        assert_eq!(SchemaGeneration::Current.steps().len(), 5);
        assert_eq!(SchemaGeneration::Current.steps()[0], MigrationStep::CopyProjects);
        assert!(MigrationStep::MigrateTasks.is_idempotent());
        assert!(!MigrationStep::BuildTimeEntries.is_idempotent());
        assert!(!MigrationStep::CopyTaskInstances.is_idempotent());
    }

    #[test]
    fn generation_displays_as_snake_case() {
        assert_eq!(SchemaGeneration::Legacy.to_string(), "legacy");
        assert_eq!(SchemaGeneration::Current.as_str(), "current");
    }

    #[test]
    fn entities_decode_with_defaults() -> Result<(), CoreError> {
        let project = Project::from_row(&row(&[
            ("id", SqlValue::Integer(3)),
            ("name", SqlValue::Text("Site".to_string())),
        ]))?;
        assert_eq!(project.color, DEFAULT_PROJECT_COLOR);
        assert!(!project.dark_icons);

        let client = Client::from_row(&row(&[
            ("id", SqlValue::Integer(2)),
            ("name", SqlValue::Text("Acme".to_string())),
        ]))?;
        assert_eq!(client.currency, DEFAULT_CLIENT_CURRENCY);

        let entry = TimeEntry::from_row(&row(&[
            ("id", SqlValue::Integer(1)),
            ("task_instance_id", SqlValue::Integer(4)),
            ("start_time", SqlValue::Integer(100)),
        ]))?;
        assert!(entry.end_time.is_null());
        assert_eq!(entry.duration, 0);
        Ok(())
    }
}
