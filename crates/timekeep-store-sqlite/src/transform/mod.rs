//! Generation-specific data-shape transformations.
//!
//! Every step reads from a source store and writes to a destination store. Steps
//! never catch their own errors; the orchestrator is the only catch point.

pub mod current;
pub mod legacy;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use timekeep_core::Row;

use crate::schema::quote_ident;
use crate::SqliteStore;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepStats {
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    /// Rows dropped because another destination row already holds their unique name.
    #[serde(default)]
    pub name_conflicts: usize,
    /// Project or client references that did not resolve and fell back to the sentinel.
    #[serde(default)]
    pub references_reset: usize,
}

/// Conflict handling for a destination insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnConflict {
    Ignore,
    Fail,
}

impl OnConflict {
    pub(crate) fn insert_verb(self) -> &'static str {
        match self {
            Self::Ignore => "INSERT OR IGNORE INTO",
            Self::Fail => "INSERT INTO",
        }
    }
}

/// All rows of `table` in rowid order; a missing table yields no rows.
pub(crate) fn read_all(source: &SqliteStore, table: &str) -> Result<Vec<Row>> {
    if !source.table_exists(table)? {
        tracing::warn!(table, "source table does not exist; nothing to read");
        return Ok(Vec::new());
    }

    source.query(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table)), &[])
}
