use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, opt_uuid_col, uuid_col, DatabaseError};
use crate::models::ClinicalRecord;

pub fn insert_clinical_record(
    conn: &Connection,
    record: &ClinicalRecord,
    created_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinical_records (id, appointment_id, patient_name, reason, practitioner_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.appointment_id.map(|id| id.to_string()),
            record.patient_name,
            record.reason,
            record.practitioner_id.map(|id| id.to_string()),
            format_timestamp(created_at),
        ],
    )?;
    Ok(())
}

/// Link an existing record to an appointment.
pub fn link_clinical_record(
    conn: &Connection,
    record_id: &Uuid,
    appointment_id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE clinical_records SET appointment_id = ?1 WHERE id = ?2",
        params![appointment_id.to_string(), record_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ClinicalRecord".into(),
            id: record_id.to_string(),
        });
    }
    Ok(())
}

pub fn get_record_for_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<ClinicalRecord>, DatabaseError> {
    conn.query_row(
        "SELECT id, appointment_id, patient_name, reason, practitioner_id
         FROM clinical_records WHERE appointment_id = ?1",
        params![appointment_id.to_string()],
        |row| {
            Ok(ClinicalRecord {
                id: uuid_col(row, 0)?,
                appointment_id: opt_uuid_col(row, 1)?,
                patient_name: row.get(2)?,
                reason: row.get(3)?,
                practitioner_id: opt_uuid_col(row, 4)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}
