use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use crate::db::{enum_col, format_audit_timestamp, timestamp_col, DatabaseError};
use crate::models::{AuditEvent, NewAuditEvent, ObjectRef};

const EVENT_COLUMNS: &str =
    "id, actor_id, action, module, description, details, ip_address, created_at, object_type, object_id";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    let object_type: Option<String> = row.get(8)?;
    let object_id: Option<String> = row.get(9)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        action: enum_col(row, 2)?,
        module: enum_col(row, 3)?,
        description: row.get(4)?,
        details: row.get(5)?,
        ip_address: row.get(6)?,
        created_at: timestamp_col(row, 7)?,
        object: match (object_type, object_id) {
            (Some(kind), Some(id)) => Some(ObjectRef { kind, id }),
            _ => None,
        },
    })
}

/// Append one audit event. Returns the new row id.
pub fn insert_audit_event(
    conn: &Connection,
    event: &NewAuditEvent,
    created_at: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_events
         (actor_id, action, module, description, details, ip_address, created_at, object_type, object_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.actor.staff_id,
            event.action.as_str(),
            event.module.as_str(),
            event.description,
            event.details,
            event.actor.ip_address.map(|ip| ip.to_string()),
            format_audit_timestamp(created_at),
            event.object.as_ref().map(|o| o.kind.as_str()),
            event.object.as_ref().map(|o| o.id.as_str()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_audit_events(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))?;
    Ok(count)
}

/// Timestamp of the `n`-th most recent event (1-based), if that many exist.
pub fn nth_most_recent_audit_timestamp(
    conn: &Connection,
    n: u64,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    if n == 0 {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT created_at FROM audit_events ORDER BY created_at DESC LIMIT 1 OFFSET ?1",
    )?;
    let mut rows = stmt.query_map(params![(n - 1) as i64], |row| timestamp_col(row, 0))?;
    rows.next().transpose().map_err(DatabaseError::from)
}

pub fn count_audit_events_before(
    conn: &Connection,
    cutoff: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM audit_events WHERE created_at < ?1",
        params![format_audit_timestamp(cutoff)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Delete every event strictly older than `cutoff`.
pub fn delete_audit_events_before(
    conn: &Connection,
    cutoff: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_events WHERE created_at < ?1",
        params![format_audit_timestamp(cutoff)],
    )?;
    Ok(deleted)
}

/// Most recent events first.
pub fn recent_audit_events(conn: &Connection, limit: u32) -> Result<Vec<AuditEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM audit_events ORDER BY created_at DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Full history of one object, oldest first.
pub fn audit_events_for_object(
    conn: &Connection,
    object: &ObjectRef,
) -> Result<Vec<AuditEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM audit_events
         WHERE object_type = ?1 AND object_id = ?2
         ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map(params![object.kind, object.id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
