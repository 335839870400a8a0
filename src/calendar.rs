//! Weekly availability calendar.
//!
//! Each practitioner owns any number of recurring blocks per weekday
//! (0 = Monday .. 6 = Sunday). Blocks may overlap each other; only
//! appointments are checked against them. Blocks are deactivated, never
//! deleted.

use chrono::{Datelike, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::AvailabilityBlock;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Block end time {end} must be after start time {start}")]
    InvalidRange { start: NaiveTime, end: NaiveTime },

    #[error("Day of week must be between 0 (Monday) and 6 (Sunday), got {0}")]
    InvalidDay(u8),

    #[error("This practitioner already has a block on that day with the same hours")]
    DuplicateBlock,

    #[error("Practitioner {0} does not exist")]
    UnknownPractitioner(Uuid),

    #[error("Availability block {0} does not exist")]
    BlockNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Weekday index of a timestamp, Monday = 0.
pub fn day_index(at: &NaiveDateTime) -> u8 {
    // num_days_from_monday is always in 0..=6
    at.weekday().num_days_from_monday() as u8
}

/// Active blocks for a practitioner on one weekday. An empty result means
/// the practitioner does not work that day.
pub fn blocks_for(
    conn: &Connection,
    practitioner_id: &Uuid,
    day_of_week: u8,
) -> Result<Vec<AvailabilityBlock>, DatabaseError> {
    db::active_blocks_for_day(conn, practitioner_id, day_of_week)
}

/// Half-open containment: `start <= time < end`.
pub fn is_within(block: &AvailabilityBlock, time: NaiveTime) -> bool {
    block.start <= time && time < block.end
}

/// Whether the interval `[start, end]` lies inside the block. The end may
/// touch the block's end.
pub fn fits_within(block: &AvailabilityBlock, start: NaiveTime, end: NaiveTime) -> bool {
    block.start <= start && end <= block.end
}

fn validate(day_of_week: u8, start: NaiveTime, end: NaiveTime) -> Result<(), CalendarError> {
    if day_of_week > 6 {
        return Err(CalendarError::InvalidDay(day_of_week));
    }
    if end <= start {
        return Err(CalendarError::InvalidRange { start, end });
    }
    Ok(())
}

pub fn add_block(
    conn: &Connection,
    practitioner_id: &Uuid,
    day_of_week: u8,
    start: NaiveTime,
    end: NaiveTime,
    now: &NaiveDateTime,
) -> Result<AvailabilityBlock, CalendarError> {
    validate(day_of_week, start, end)?;
    if db::get_practitioner(conn, practitioner_id)?.is_none() {
        return Err(CalendarError::UnknownPractitioner(*practitioner_id));
    }
    if db::block_exists(conn, practitioner_id, day_of_week, &start, &end, None)? {
        return Err(CalendarError::DuplicateBlock);
    }

    let block = AvailabilityBlock {
        id: Uuid::new_v4(),
        practitioner_id: *practitioner_id,
        day_of_week,
        start,
        end,
        active: true,
    };
    db::insert_block(conn, &block, now)?;
    tracing::info!(
        block_id = %block.id,
        practitioner_id = %practitioner_id,
        day_of_week,
        "Availability block added"
    );
    Ok(block)
}

pub fn update_block(
    conn: &Connection,
    block_id: &Uuid,
    day_of_week: u8,
    start: NaiveTime,
    end: NaiveTime,
    now: &NaiveDateTime,
) -> Result<AvailabilityBlock, CalendarError> {
    validate(day_of_week, start, end)?;
    let existing = db::get_block(conn, block_id)?.ok_or(CalendarError::BlockNotFound(*block_id))?;
    if db::block_exists(
        conn,
        &existing.practitioner_id,
        day_of_week,
        &start,
        &end,
        Some(block_id),
    )? {
        return Err(CalendarError::DuplicateBlock);
    }

    db::update_block_times(conn, block_id, day_of_week, &start, &end, now)?;
    tracing::info!(block_id = %block_id, day_of_week, "Availability block updated");
    Ok(AvailabilityBlock {
        day_of_week,
        start,
        end,
        ..existing
    })
}

pub fn deactivate_block(
    conn: &Connection,
    block_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<(), CalendarError> {
    set_active(conn, block_id, false, now)
}

pub fn reactivate_block(
    conn: &Connection,
    block_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<(), CalendarError> {
    set_active(conn, block_id, true, now)
}

fn set_active(
    conn: &Connection,
    block_id: &Uuid,
    active: bool,
    now: &NaiveDateTime,
) -> Result<(), CalendarError> {
    match db::set_block_active(conn, block_id, active, now) {
        Ok(()) => {
            tracing::info!(block_id = %block_id, active, "Availability block toggled");
            Ok(())
        }
        Err(DatabaseError::NotFound { .. }) => Err(CalendarError::BlockNotFound(*block_id)),
        Err(e) => Err(e.into()),
    }
}

/// Every active block of a practitioner, by day then start time.
pub fn blocks_for_practitioner(
    conn: &Connection,
    practitioner_id: &Uuid,
) -> Result<Vec<AvailabilityBlock>, DatabaseError> {
    db::active_blocks_for_practitioner(conn, practitioner_id)
}
