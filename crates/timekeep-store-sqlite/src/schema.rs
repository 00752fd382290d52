//! Destination schema DDL and table names.

pub const PROJECT_TABLE: &str = "Project";
pub const CLIENT_TABLE: &str = "Client";
pub const TASK_TABLE: &str = "Task";
pub const TASK_INSTANCE_TABLE: &str = "TaskInstance";
pub const TIME_ENTRY_TABLE: &str = "TimeEntry";
pub const SCHEMA_VERSION_TABLE: &str = "schema_version";

/// Entity tables in parent-before-child order.
pub const ENTITY_TABLES: [&str; 5] =
    [PROJECT_TABLE, CLIENT_TABLE, TASK_TABLE, TASK_INSTANCE_TABLE, TIME_ENTRY_TABLE];

pub(crate) const CREATE_SCHEMA_VERSION_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
  version INTEGER PRIMARY KEY,
  created_at TEXT NOT NULL
);
";

// Interval endpoints are declared without a type so epoch integers and
// timestamp text both survive the copy unchanged.
pub(crate) const BOOTSTRAP_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
  version INTEGER PRIMARY KEY,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Client (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  rate REAL NOT NULL DEFAULT 0,
  currency TEXT NOT NULL DEFAULT 'USD',
  created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS Project (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  color TEXT NOT NULL DEFAULT '#4A90D9',
  icon TEXT,
  client_id INTEGER,
  total_time INTEGER NOT NULL DEFAULT 0,
  dark_icons INTEGER NOT NULL DEFAULT 0 CHECK (dark_icons IN (0, 1)),
  icon_color TEXT,
  icon_color_mode TEXT NOT NULL DEFAULT 'auto',
  created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS Task (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS TaskInstance (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  task_id INTEGER NOT NULL,
  project_id INTEGER NOT NULL DEFAULT 1,
  client_id INTEGER NOT NULL DEFAULT 1,
  total_time INTEGER NOT NULL DEFAULT 0,
  last_used_at TEXT,
  is_favorite INTEGER NOT NULL DEFAULT 0 CHECK (is_favorite IN (0, 1)),
  created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  FOREIGN KEY (task_id) REFERENCES Task(id) ON DELETE CASCADE,
  FOREIGN KEY (project_id) REFERENCES Project(id) ON DELETE CASCADE,
  FOREIGN KEY (client_id) REFERENCES Client(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS TimeEntry (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  task_instance_id INTEGER NOT NULL,
  start_time NOT NULL,
  end_time,
  duration INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
  FOREIGN KEY (task_instance_id) REFERENCES TaskInstance(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_task_instance_task ON TaskInstance(task_id);
CREATE INDEX IF NOT EXISTS idx_task_instance_project ON TaskInstance(project_id);
CREATE INDEX IF NOT EXISTS idx_task_instance_client ON TaskInstance(client_id);
CREATE INDEX IF NOT EXISTS idx_time_entry_instance ON TimeEntry(task_instance_id);
CREATE INDEX IF NOT EXISTS idx_time_entry_start ON TimeEntry(start_time);
";

pub(crate) const SEED_SENTINEL_PROJECT_SQL: &str = "INSERT OR IGNORE INTO Project(
    id, name, color, icon, icon_color_mode, created_at, updated_at
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)";

pub(crate) const SEED_SENTINEL_CLIENT_SQL: &str = "INSERT OR IGNORE INTO Client(
    id, name, rate, currency, created_at, updated_at
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)";

/// Double-quote an identifier for interpolation into SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
