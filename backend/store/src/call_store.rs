use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::{info, warn};

use sudsline_core::CallRecord;

/// Append-only SQLite table of finished calls.
pub struct CallStore {
    conn: Connection,
}

impl CallStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init_schema()?;
        info!(path = %path.display(), "Call store opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS call_records (
                id TEXT PRIMARY KEY,
                assistant_id TEXT NOT NULL,
                phone_number TEXT,
                call_type TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_secs INTEGER,
                end_reason TEXT,
                record TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_call_records_start ON call_records(start_time);
            CREATE INDEX IF NOT EXISTS idx_call_records_assistant ON call_records(assistant_id);",
        )?;
        Ok(())
    }

    /// Insert a record. A second append with the same id is ignored.
    /// Returns whether a row was written.
    pub fn append(&self, record: &CallRecord) -> Result<bool> {
        let json = serde_json::to_string(record)?;
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO call_records
                (id, assistant_id, phone_number, call_type, status, start_time,
                 end_time, duration_secs, end_reason, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.to_string(),
                record.assistant_id,
                record.phone_number,
                record.call_type.to_string(),
                record.status.to_string(),
                record.start_time.to_rfc3339(),
                record.end_time.map(|t| t.to_rfc3339()),
                record.duration_secs,
                record.end_reason,
                json,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Newest first. Rows that no longer decode are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<CallRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record FROM call_records ORDER BY start_time DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: String = row.get(0)?;
            let record: String = row.get(1)?;
            Ok((id, record))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match serde_json::from_str::<CallRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(id = %id, error = %e, "Skipping undecodable call record"),
            }
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM call_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sudsline_core::{CallStatus, CallType};

    fn finished(assistant: &str, offset_secs: i64) -> CallRecord {
        let mut record = CallRecord::new(assistant, "Helper", CallType::Outbound)
            .with_phone_number(Some("+1 (555) 123-4567".into()));
        record.start_time = Utc::now() - Duration::seconds(600 - offset_secs);
        record.transition(CallStatus::Active).unwrap();
        record
            .finish(CallStatus::Ended, "stopped by operator", record.start_time + Duration::seconds(42))
            .unwrap();
        record
    }

    #[test]
    fn test_append_and_count() {
        let store = CallStore::in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.append(&finished("A1", 0)).unwrap());
        assert!(store.append(&finished("A2", 1)).unwrap());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_append_ignored() {
        let store = CallStore::in_memory().unwrap();
        let record = finished("A1", 0);
        assert!(store.append(&record).unwrap());
        assert!(!store.append(&record).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_recent_newest_first() {
        let store = CallStore::in_memory().unwrap();
        let older = finished("A1", 0);
        let newer = finished("A2", 300);
        store.append(&older).unwrap();
        store.append(&newer).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, newer.id);
        assert_eq!(recent[0].duration_secs, Some(42));
        assert_eq!(recent[1].phone_number.as_deref(), Some("+1 (555) 123-4567"));

        assert_eq!(store.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_file() {
        let dir = std::env::temp_dir().join(format!("sudsline-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("calls.db");
        {
            let store = CallStore::open(&path).unwrap();
            store.append(&finished("A1", 0)).unwrap();
        }
        let reopened = CallStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
