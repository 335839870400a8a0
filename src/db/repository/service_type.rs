use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{uuid_col, DatabaseError};
use crate::models::{Money, ServiceType};

pub fn insert_service_type(conn: &Connection, service: &ServiceType) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO service_types
         (id, name, base_price, estimated_duration_minutes, active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            service.id.to_string(),
            service.name,
            service.base_price.minor_units(),
            service.estimated_duration_minutes,
            service.active,
        ],
    )?;
    Ok(())
}

pub fn get_service_type(conn: &Connection, id: &Uuid) -> Result<Option<ServiceType>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, base_price, estimated_duration_minutes, active
         FROM service_types WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(ServiceType {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                base_price: Money::from_minor(row.get(2)?),
                estimated_duration_minutes: row.get(3)?,
                active: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}
