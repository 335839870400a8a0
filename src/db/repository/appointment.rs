use chrono::{Days, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    enum_col, format_timestamp, opt_enum_col, opt_timestamp_col, opt_uuid_col, timestamp_col,
    uuid_col, DatabaseError,
};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, starts_at, state, practitioner_id, patient_id,
    patient_name, patient_email, patient_phone, service_type_id, charged_price, reason,
    arrived_at, no_show_reason, payment_method, price_adjustment_reason, notes,
    created_at, updated_at, created_by, completed_by, completed_at";

/// An occupying appointment reduced to what the overlap check needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedInterval {
    pub appointment_id: Uuid,
    pub starts_at: NaiveDateTime,
    /// Estimated duration of the appointment's service, if it declares one.
    pub service_duration_minutes: Option<u32>,
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_col(row, 0)?,
        starts_at: timestamp_col(row, 1)?,
        state: enum_col(row, 2)?,
        practitioner_id: opt_uuid_col(row, 3)?,
        patient_id: opt_uuid_col(row, 4)?,
        snapshot: PatientSnapshot {
            name: row.get(5)?,
            email: row.get(6)?,
            phone: row.get(7)?,
        },
        service_type_id: opt_uuid_col(row, 8)?,
        charged_price: row.get::<_, Option<i64>>(9)?.map(Money::from_minor),
        reason: row.get(10)?,
        arrived_at: opt_timestamp_col(row, 11)?,
        no_show_reason: row.get(12)?,
        payment_method: opt_enum_col(row, 13)?,
        price_adjustment_reason: row.get(14)?,
        notes: row.get(15)?,
        created_at: timestamp_col(row, 16)?,
        updated_at: timestamp_col(row, 17)?,
        created_by: row.get(18)?,
        completed_by: row.get(19)?,
        completed_at: opt_timestamp_col(row, 20)?,
    })
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)"
        ),
        params![
            appt.id.to_string(),
            format_timestamp(&appt.starts_at),
            appt.state.as_str(),
            appt.practitioner_id.map(|id| id.to_string()),
            appt.patient_id.map(|id| id.to_string()),
            appt.snapshot.name,
            appt.snapshot.email,
            appt.snapshot.phone,
            appt.service_type_id.map(|id| id.to_string()),
            appt.charged_price.map(Money::minor_units),
            appt.reason,
            appt.arrived_at.as_ref().map(format_timestamp),
            appt.no_show_reason,
            appt.payment_method.map(|m| m.as_str()),
            appt.price_adjustment_reason,
            appt.notes,
            format_timestamp(&appt.created_at),
            format_timestamp(&appt.updated_at),
            appt.created_by,
            appt.completed_by,
            appt.completed_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Overwrite every mutable column of an existing appointment.
pub fn update_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET
            starts_at = ?2, state = ?3, practitioner_id = ?4, patient_id = ?5,
            patient_name = ?6, patient_email = ?7, patient_phone = ?8,
            service_type_id = ?9, charged_price = ?10, reason = ?11, arrived_at = ?12,
            no_show_reason = ?13, payment_method = ?14, price_adjustment_reason = ?15,
            notes = ?16, updated_at = ?17, completed_by = ?18, completed_at = ?19
         WHERE id = ?1",
        params![
            appt.id.to_string(),
            format_timestamp(&appt.starts_at),
            appt.state.as_str(),
            appt.practitioner_id.map(|id| id.to_string()),
            appt.patient_id.map(|id| id.to_string()),
            appt.snapshot.name,
            appt.snapshot.email,
            appt.snapshot.phone,
            appt.service_type_id.map(|id| id.to_string()),
            appt.charged_price.map(Money::minor_units),
            appt.reason,
            appt.arrived_at.as_ref().map(format_timestamp),
            appt.no_show_reason,
            appt.payment_method.map(|m| m.as_str()),
            appt.price_adjustment_reason,
            appt.notes,
            format_timestamp(&appt.updated_at),
            appt.completed_by,
            appt.completed_at.as_ref().map(format_timestamp),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: appt.id.to_string(),
        });
    }
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id.to_string()],
        appointment_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Open, booked and confirmed appointments of one practitioner on one
/// calendar date, optionally ignoring the appointment being edited.
pub fn occupying_intervals_on_date(
    conn: &Connection,
    practitioner_id: &Uuid,
    date: NaiveDate,
    exclude: Option<&Uuid>,
) -> Result<Vec<BookedInterval>, DatabaseError> {
    let day_start = date.and_time(chrono::NaiveTime::MIN);
    let next_day = date
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX)
        .and_time(chrono::NaiveTime::MIN);

    let mut stmt = conn.prepare(
        "SELECT a.id, a.starts_at, s.estimated_duration_minutes
         FROM appointments a
         LEFT JOIN service_types s ON s.id = a.service_type_id
         WHERE a.practitioner_id = ?1
           AND a.starts_at >= ?2 AND a.starts_at < ?3
           AND a.state IN ('open', 'booked', 'confirmed')
           AND (?4 IS NULL OR a.id <> ?4)
         ORDER BY a.starts_at",
    )?;
    let rows = stmt.query_map(
        params![
            practitioner_id.to_string(),
            format_timestamp(&day_start),
            format_timestamp(&next_day),
            exclude.map(|id| id.to_string()),
        ],
        |row| {
            Ok(BookedInterval {
                appointment_id: uuid_col(row, 0)?,
                starts_at: timestamp_col(row, 1)?,
                service_duration_minutes: row.get(2)?,
            })
        },
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Any appointment, in any state, starting at exactly this instant.
pub fn appointment_id_at(
    conn: &Connection,
    starts_at: &NaiveDateTime,
    exclude: Option<&Uuid>,
) -> Result<Option<Uuid>, DatabaseError> {
    conn.query_row(
        "SELECT id FROM appointments WHERE starts_at = ?1 AND (?2 IS NULL OR id <> ?2)",
        params![format_timestamp(starts_at), exclude.map(|id| id.to_string())],
        |row| uuid_col(row, 0),
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Past appointments still `open` or `booked`, oldest first.
pub fn appointments_requiring_attention(
    conn: &Connection,
    now: &NaiveDateTime,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE starts_at <= ?1 AND state IN ('open', 'booked')
         ORDER BY starts_at"
    ))?;
    let rows = stmt
        .query_map(params![format_timestamp(now)], appointment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    // Stored instants have whole seconds; `now` may not.
    Ok(rows
        .into_iter()
        .filter(|appt| appt.requires_attention(*now))
        .collect())
}
