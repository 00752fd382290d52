//! Source schema classification.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use timekeep_core::{SchemaGeneration, LEGACY_TASK_MARKERS};

use crate::schema::TASK_TABLE;
use crate::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaDetection {
    pub generation: SchemaGeneration,
    /// Columns read from the source `Task` catalog; empty when it was unreadable.
    pub task_columns: Vec<String>,
    /// Legacy marker columns that were present.
    pub legacy_markers: Vec<String>,
    /// Set when the catalog could not be read and legacy was assumed.
    pub fail_safe: bool,
}

/// Classify `source` by the column catalog of its `Task` table.
#[must_use]
pub fn detect(source: &SqliteStore) -> SchemaDetection {
    classify(source.table_columns(TASK_TABLE))
}

/// Any legacy marker column means legacy. An unreadable catalog also means
/// legacy, so a faulty read never skips the expansion path. A missing or
/// column-less table reads as current and the copy path moves nothing.
#[must_use]
pub fn classify(catalog: Result<Vec<String>>) -> SchemaDetection {
    let task_columns = match catalog {
        Ok(columns) => columns,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "could not read Task catalog; assuming legacy schema");
            return SchemaDetection {
                generation: SchemaGeneration::Legacy,
                task_columns: Vec::new(),
                legacy_markers: Vec::new(),
                fail_safe: true,
            };
        }
    };

    let legacy_markers: Vec<String> = LEGACY_TASK_MARKERS
        .iter()
        .filter(|marker| task_columns.iter().any(|column| column.eq_ignore_ascii_case(marker)))
        .map(|marker| (*marker).to_string())
        .collect();

    let generation = if legacy_markers.is_empty() {
        SchemaGeneration::Current
    } else {
        SchemaGeneration::Legacy
    };

    SchemaDetection { generation, task_columns, legacy_markers, fail_safe: false }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::anyhow;

    use super::*;

    fn columns(names: &[&str]) -> Result<Vec<String>> {
        Ok(names.iter().map(|name| (*name).to_string()).collect())
    }

    #[test]
    fn any_single_marker_classifies_as_legacy() {
        for marker in LEGACY_TASK_MARKERS {
            let detection = classify(columns(&["id", "name", marker]));
            assert_eq!(detection.generation, SchemaGeneration::Legacy, "marker {marker}");
            assert_eq!(detection.legacy_markers, vec![marker.to_string()]);
            assert!(!detection.fail_safe);
        }
    }

    #[test]
    fn catalog_without_markers_is_current() {
        let detection = classify(columns(&["id", "name", "created_at", "updated_at"]));
        assert_eq!(detection.generation, SchemaGeneration::Current);
        assert!(detection.legacy_markers.is_empty());
    }

    #[test]
    fn unreadable_catalog_fails_safe_to_legacy() {
        let detection = classify(Err(anyhow!("disk I/O error")));
        assert_eq!(detection.generation, SchemaGeneration::Legacy);
        assert!(detection.fail_safe);
    }

    #[test]
    fn detect_reads_live_catalogs() -> Result<()> {
        let legacy = SqliteStore::open(Path::new(":memory:"))?;
        legacy.execute(
            "CREATE TABLE Task (id INTEGER PRIMARY KEY, name TEXT, project_id INTEGER,
                client_id INTEGER, duration INTEGER, start_time TEXT, end_time TEXT)",
            &[],
        )?;
        let detection = detect(&legacy);
        assert_eq!(detection.generation, SchemaGeneration::Legacy);
        assert_eq!(detection.legacy_markers.len(), 3);

        let current = SqliteStore::open(Path::new(":memory:"))?;
        current.bootstrap()?;
        assert_eq!(detect(&current).generation, SchemaGeneration::Current);

        let fresh = SqliteStore::open(Path::new(":memory:"))?;
        let detection = detect(&fresh);
        assert_eq!(detection.generation, SchemaGeneration::Current);
        assert!(detection.task_columns.is_empty());
        Ok(())
    }
}
