use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{uuid_col, DatabaseError};
use crate::models::Patient;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: uuid_col(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
    })
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, email, phone) VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.full_name,
            patient.email,
            patient.phone,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        "SELECT id, full_name, email, phone FROM patients WHERE id = ?1",
        params![id.to_string()],
        patient_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Case-insensitive lookup on the unique email index.
pub fn find_patient_by_email(conn: &Connection, email: &str) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        "SELECT id, full_name, email, phone FROM patients WHERE lower(email) = lower(?1)",
        params![email.trim()],
        patient_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn update_patient_contact(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET full_name = ?1, email = ?2, phone = ?3 WHERE id = ?4",
        params![
            patient.full_name,
            patient.email,
            patient.phone,
            patient.id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: patient.id.to_string(),
        });
    }
    Ok(())
}
