//! Boundaries to the services the scheduling core calls out to.
//!
//! The patient directory, service catalog and clinical record store
//! belong to other parts of the clinic system. The SQLite implementations
//! read the tables in this crate's schema.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{ClinicalRecord, Patient, ServiceType};

pub trait PatientDirectory: Send + Sync {
    fn get(&self, conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError>;

    /// Find the patient with this email or register a new one. An existing
    /// patient takes the given name, and the phone when one is given.
    fn find_or_create_by_email(
        &self,
        conn: &Connection,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Patient, DatabaseError>;
}

pub trait ServiceCatalog: Send + Sync {
    /// Active service types only.
    fn get(&self, conn: &Connection, id: &Uuid) -> Result<Option<ServiceType>, DatabaseError>;
}

pub trait ClinicalRecordStore: Send + Sync {
    fn record_for_appointment(
        &self,
        conn: &Connection,
        appointment_id: &Uuid,
    ) -> Result<Option<ClinicalRecord>, DatabaseError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlitePatientDirectory;

impl PatientDirectory for SqlitePatientDirectory {
    fn get(&self, conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
        db::get_patient(conn, id)
    }

    fn find_or_create_by_email(
        &self,
        conn: &Connection,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Patient, DatabaseError> {
        match db::find_patient_by_email(conn, email)? {
            Some(mut existing) => {
                existing.full_name = name.to_string();
                if let Some(phone) = phone {
                    existing.phone = Some(phone.to_string());
                }
                db::update_patient_contact(conn, &existing)?;
                Ok(existing)
            }
            None => {
                let patient = Patient {
                    id: Uuid::new_v4(),
                    full_name: name.to_string(),
                    email: Some(email.trim().to_string()),
                    phone: phone.map(str::to_string),
                };
                db::insert_patient(conn, &patient)?;
                tracing::debug!(patient_id = %patient.id, "Registered new patient from booking");
                Ok(patient)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteServiceCatalog;

impl ServiceCatalog for SqliteServiceCatalog {
    fn get(&self, conn: &Connection, id: &Uuid) -> Result<Option<ServiceType>, DatabaseError> {
        Ok(db::get_service_type(conn, id)?.filter(|s| s.active))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteClinicalRecordStore;

impl ClinicalRecordStore for SqliteClinicalRecordStore {
    fn record_for_appointment(
        &self,
        conn: &Connection,
        appointment_id: &Uuid,
    ) -> Result<Option<ClinicalRecord>, DatabaseError> {
        db::get_record_for_appointment(conn, appointment_id)
    }
}
