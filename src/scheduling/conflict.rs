//! Slot conflict checker.
//!
//! Checks, in order: not in the past, practitioner works that day, start
//! falls inside a block, the whole interval fits one block, no overlap
//! with an occupying appointment, no appointment at the exact instant.
//! Intervals are half-open `[start, end)`, so back-to-back slots pass.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::calendar;
use crate::db;

use super::error::{ConflictReason, SchedulingError};

/// Minutes an appointment occupies: the service estimate, or the default.
pub fn resolve_duration(service_minutes: Option<u32>, default_minutes: u32) -> u32 {
    match service_minutes {
        Some(m) if m > 0 => m,
        _ => default_minutes,
    }
}

pub struct SlotChecker<'a> {
    conn: &'a Connection,
    now: NaiveDateTime,
    default_duration_minutes: u32,
}

impl<'a> SlotChecker<'a> {
    pub fn new(conn: &'a Connection, now: NaiveDateTime, default_duration_minutes: u32) -> Self {
        Self {
            conn,
            now,
            default_duration_minutes,
        }
    }

    pub fn check(
        &self,
        practitioner_id: &Uuid,
        start: NaiveDateTime,
        duration_minutes: u32,
        exclude: Option<&Uuid>,
    ) -> Result<(), SchedulingError> {
        if start < self.now {
            return Err(ConflictReason::InThePast(start).into());
        }

        let day = calendar::day_index(&start);
        let blocks = calendar::blocks_for(self.conn, practitioner_id, day)?;
        if blocks.is_empty() {
            return Err(ConflictReason::NoWorkingHours.into());
        }

        let time_of_day = start.time();
        if !blocks.iter().any(|b| calendar::is_within(b, time_of_day)) {
            return Err(ConflictReason::OutsideWorkingHours.into());
        }

        let end = start + Duration::minutes(i64::from(duration_minutes));
        let fits = end.date() == start.date()
            && blocks
                .iter()
                .any(|b| calendar::fits_within(b, time_of_day, end.time()));
        if !fits {
            return Err(ConflictReason::DurationDoesNotFit.into());
        }

        let booked = db::occupying_intervals_on_date(self.conn, practitioner_id, start.date(), exclude)?;
        for other in &booked {
            let other_minutes =
                resolve_duration(other.service_duration_minutes, self.default_duration_minutes);
            let other_end = other.starts_at + Duration::minutes(i64::from(other_minutes));
            if start < other_end && end > other.starts_at {
                return Err(ConflictReason::Overlap {
                    existing_id: other.appointment_id,
                    existing_start: other.starts_at,
                }
                .into());
            }
        }

        if db::appointment_id_at(self.conn, &start, exclude)?.is_some() {
            return Err(ConflictReason::DuplicateInstant(start).into());
        }

        Ok(())
    }
}
