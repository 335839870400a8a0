use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live patient record as returned by the patient directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Contact triple supplied by staff when no patient record is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}
