use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{uuid_col, DatabaseError};
use crate::models::Practitioner;

pub fn insert_practitioner(conn: &Connection, practitioner: &Practitioner) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO practitioners (id, name, active) VALUES (?1, ?2, ?3)",
        params![
            practitioner.id.to_string(),
            practitioner.name,
            practitioner.active,
        ],
    )?;
    Ok(())
}

pub fn get_practitioner(conn: &Connection, id: &Uuid) -> Result<Option<Practitioner>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, active FROM practitioners WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(Practitioner {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                active: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn set_practitioner_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE practitioners SET active = ?1 WHERE id = ?2",
        params![active, id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Practitioner".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
