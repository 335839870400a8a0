use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{format_time, format_timestamp, time_col, uuid_col, DatabaseError};
use crate::models::AvailabilityBlock;

const BLOCK_COLUMNS: &str = "id, practitioner_id, day_of_week, start_time, end_time, active";

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<AvailabilityBlock> {
    Ok(AvailabilityBlock {
        id: uuid_col(row, 0)?,
        practitioner_id: uuid_col(row, 1)?,
        day_of_week: row.get(2)?,
        start: time_col(row, 3)?,
        end: time_col(row, 4)?,
        active: row.get(5)?,
    })
}

pub fn insert_block(
    conn: &Connection,
    block: &AvailabilityBlock,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let ts = format_timestamp(now);
    conn.execute(
        "INSERT INTO availability_blocks
         (id, practitioner_id, day_of_week, start_time, end_time, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            block.id.to_string(),
            block.practitioner_id.to_string(),
            block.day_of_week,
            format_time(&block.start),
            format_time(&block.end),
            block.active,
            ts,
        ],
    )?;
    Ok(())
}

pub fn update_block_times(
    conn: &Connection,
    id: &Uuid,
    day_of_week: u8,
    start: &NaiveTime,
    end: &NaiveTime,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE availability_blocks
         SET day_of_week = ?1, start_time = ?2, end_time = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            day_of_week,
            format_time(start),
            format_time(end),
            format_timestamp(now),
            id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(block_not_found(id));
    }
    Ok(())
}

pub fn set_block_active(
    conn: &Connection,
    id: &Uuid,
    active: bool,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE availability_blocks SET active = ?1, updated_at = ?2 WHERE id = ?3",
        params![active, format_timestamp(now), id.to_string()],
    )?;
    if changed == 0 {
        return Err(block_not_found(id));
    }
    Ok(())
}

pub fn get_block(conn: &Connection, id: &Uuid) -> Result<Option<AvailabilityBlock>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {BLOCK_COLUMNS} FROM availability_blocks WHERE id = ?1"),
        params![id.to_string()],
        block_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Active blocks for one practitioner on one weekday, earliest first.
pub fn active_blocks_for_day(
    conn: &Connection,
    practitioner_id: &Uuid,
    day_of_week: u8,
) -> Result<Vec<AvailabilityBlock>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BLOCK_COLUMNS} FROM availability_blocks
         WHERE practitioner_id = ?1 AND day_of_week = ?2 AND active = 1
         ORDER BY start_time, end_time"
    ))?;
    let rows = stmt.query_map(
        params![practitioner_id.to_string(), day_of_week],
        block_from_row,
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn active_blocks_for_practitioner(
    conn: &Connection,
    practitioner_id: &Uuid,
) -> Result<Vec<AvailabilityBlock>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BLOCK_COLUMNS} FROM availability_blocks
         WHERE practitioner_id = ?1 AND active = 1
         ORDER BY day_of_week, start_time, end_time"
    ))?;
    let rows = stmt.query_map(params![practitioner_id.to_string()], block_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Whether an identical block (active or not) already exists, optionally
/// ignoring the block being edited.
pub fn block_exists(
    conn: &Connection,
    practitioner_id: &Uuid,
    day_of_week: u8,
    start: &NaiveTime,
    end: &NaiveTime,
    exclude: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM availability_blocks
         WHERE practitioner_id = ?1 AND day_of_week = ?2
           AND start_time = ?3 AND end_time = ?4
           AND (?5 IS NULL OR id <> ?5)",
        params![
            practitioner_id.to_string(),
            day_of_week,
            format_time(start),
            format_time(end),
            exclude.map(|id| id.to_string()),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn block_not_found(id: &Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: "AvailabilityBlock".into(),
        id: id.to_string(),
    }
}
