//! SQLite telemetry store: WAL-mode table sharing the application's database.
//!
//! One `telemetry` table; `id` is the insertion-ordered key. The connection sits
//! behind a mutex so the store can be shared between request threads, and every
//! insert is a single statement, so readers never see half a row.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Row, params_from_iter, types::Value};

use crate::core::errors::{QtError, Result};
use crate::telemetry::record::{StoredRecord, TelemetryRecord};
use crate::telemetry::store::{RecordQuery, SortOrder, TelemetryStore, now_rfc3339};

/// Telemetry store on a SQLite database file.
pub struct SqliteTelemetryStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteTelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTelemetryStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteTelemetryStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| QtError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        tracing::info!(path = %path.display(), "opened telemetry store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

impl TelemetryStore for SqliteTelemetryStore {
    fn insert(&self, record: &TelemetryRecord) -> Result<StoredRecord> {
        let recorded_at = now_rfc3339();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO telemetry (recorded_at, date, time, duration_ms, operation)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(rusqlite::params![
            recorded_at,
            record.date,
            record.time,
            record.duration_ms,
            record.operation,
        ])?;
        Ok(StoredRecord {
            id: conn.last_insert_rowid(),
            recorded_at,
            record: record.clone(),
        })
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let (sql, values) = build_select(query);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), stored_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        recorded_at: row.get(1)?,
        record: TelemetryRecord {
            date: row.get(2)?,
            time: row.get(3)?,
            duration_ms: row.get(4)?,
            operation: row.get(5)?,
        },
    })
}

fn build_select(query: &RecordQuery) -> (String, Vec<Value>) {
    let mut sql = String::from(
        "SELECT id, recorded_at, date, time, duration_ms, operation FROM telemetry",
    );
    let mut values = Vec::new();
    let mut clauses = Vec::new();

    if let Some(op) = &query.operation {
        values.push(Value::Text(op.clone()));
        clauses.push(format!("operation = ?{}", values.len()));
    }
    if query.exclude_zero_duration {
        clauses.push("duration_ms <> 0.0".to_string());
    }
    if !clauses.is_empty() {
        let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
    }

    let direction = match query.order {
        SortOrder::Descending => "DESC",
        SortOrder::Ascending => "ASC",
    };
    let _ = write!(sql, " ORDER BY duration_ms {direction}, id ASC");

    if query.limit.is_some() || query.offset > 0 {
        // SQLite treats a negative LIMIT as "no limit".
        values.push(Value::Integer(query.limit.map_or(-1, i64::from)));
        values.push(Value::Integer(i64::try_from(query.offset).unwrap_or(i64::MAX)));
        let _ = write!(sql, " LIMIT ?{} OFFSET ?{}", values.len() - 1, values.len());
    }
    (sql, values)
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(%mode, "requested WAL journal mode but sqlite kept another");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS telemetry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            duration_ms REAL NOT NULL DEFAULT 0.0,
            operation TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_telemetry_duration ON telemetry(duration_ms);
        CREATE INDEX IF NOT EXISTS idx_telemetry_operation_duration
            ON telemetry(operation, duration_ms);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, SqliteTelemetryStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("telemetry.db");
        let store = SqliteTelemetryStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn rec(duration_ms: f64, operation: &str) -> TelemetryRecord {
        TelemetryRecord {
            date: "2024/01/01".to_string(),
            time: "00:00:00".to_string(),
            duration_ms,
            operation: operation.to_string(),
        }
    }

    #[test]
    fn schema_created_and_wal_active() {
        let (_dir, store) = temp_db();
        assert!(store.is_wal_mode());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn insert_round_trips_fields() {
        let (_dir, store) = temp_db();
        let stored = store.insert(&rec(12.5, "SELECT")).unwrap();
        assert_eq!(stored.id, 1);

        let rows = store.select(&RecordQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], stored);
    }

    #[test]
    fn ordering_and_ties_match_memory_store() {
        let (_dir, store) = temp_db();
        for d in [3.0, 5.0, 3.0, 1.0, 5.0] {
            store.insert(&rec(d, "SELECT")).unwrap();
        }
        let desc: Vec<i64> = store
            .select(&RecordQuery::ordered(SortOrder::Descending))
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(desc, vec![2, 5, 1, 3, 4]);
        let asc: Vec<i64> = store
            .select(&RecordQuery::ordered(SortOrder::Ascending))
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(asc, vec![4, 1, 3, 2, 5]);
    }

    #[test]
    fn operation_filter_excludes_zero_duration() {
        let (_dir, store) = temp_db();
        for (d, op) in [(5.0, "SELECT"), (0.0, "SELECT"), (20.0, "INSERT"), (15.0, "SELECT")] {
            store.insert(&rec(d, op)).unwrap();
        }
        let rows = store
            .select(&RecordQuery {
                operation: Some("SELECT".to_string()),
                exclude_zero_duration: true,
                ..RecordQuery::default()
            })
            .unwrap();
        let durations: Vec<f64> = rows.iter().map(|r| r.record.duration_ms).collect();
        assert_eq!(durations, vec![15.0, 5.0]);
    }

    #[test]
    fn offset_without_limit_and_past_end() {
        let (_dir, store) = temp_db();
        for d in [1.0, 2.0, 3.0] {
            store.insert(&rec(d, "DELETE")).unwrap();
        }
        let rows = store
            .select(&RecordQuery {
                offset: 1,
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = store
            .select(&RecordQuery {
                limit: Some(10),
                offset: 30,
                ..RecordQuery::default()
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn build_select_numbers_parameters() {
        let (sql, values) = build_select(&RecordQuery {
            operation: Some("UPDATE".to_string()),
            exclude_zero_duration: true,
            limit: Some(10),
            offset: 20,
            order: SortOrder::Descending,
        });
        assert!(sql.contains("WHERE operation = ?1 AND duration_ms <> 0.0"), "{sql}");
        assert!(sql.ends_with("ORDER BY duration_ms DESC, id ASC LIMIT ?2 OFFSET ?3"), "{sql}");
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        {
            let store = SqliteTelemetryStore::open(&db_path).unwrap();
            store.insert(&rec(1.0, "INSERT")).unwrap();
        }
        let store = SqliteTelemetryStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let next = store.insert(&rec(2.0, "INSERT")).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn in_memory_store_works() {
        let store = SqliteTelemetryStore::open_in_memory().unwrap();
        store.insert(&rec(4.0, "UPDATE")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), Path::new(":memory:"));
    }
}
