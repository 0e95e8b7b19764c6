//! Append-only audit journal.

use super::{from_millis, to_millis, AmlStore};
use crate::{error::AmlResult, event::AuditEntry};
use rusqlite::params;

impl AmlStore {
    pub fn append_audit(&self, entry: &AuditEntry) -> AmlResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audit_log (recorded_at_ms, entity_id, event_type, actor, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_millis(entry.recorded_at),
                entry.entity_id,
                entry.event_type,
                entry.actor,
                entry.payload,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All journal rows for one entity, oldest first.
    pub fn audit_for_entity(&self, entity_id: &str) -> AmlResult<Vec<AuditEntry>> {
        self.query_audit(
            "SELECT id, recorded_at_ms, entity_id, event_type, actor, payload
             FROM audit_log WHERE entity_id = ?1 ORDER BY id ASC",
            entity_id,
        )
    }

    pub fn audit_of_type(&self, event_type: &str) -> AmlResult<Vec<AuditEntry>> {
        self.query_audit(
            "SELECT id, recorded_at_ms, entity_id, event_type, actor, payload
             FROM audit_log WHERE event_type = ?1 ORDER BY id ASC",
            event_type,
        )
    }

    pub fn audit_count(&self) -> AmlResult<i64> {
        let count = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_audit(&self, sql: &str, key: &str) -> AmlResult<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| {
            Ok(AuditEntry {
                id: Some(row.get(0)?),
                recorded_at: from_millis(1, row.get(1)?)?,
                entity_id: row.get(2)?,
                event_type: row.get(3)?,
                actor: row.get(4)?,
                payload: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
