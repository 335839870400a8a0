use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The clinical chart ("ficha") written by the practitioner for a visit.
/// Only the fields needed to decide completeness are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub patient_name: Option<String>,
    pub reason: Option<String>,
    pub practitioner_id: Option<Uuid>,
}

impl ClinicalRecord {
    /// Names of the minimum fields that are still blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.patient_name) {
            missing.push("patient name");
        }
        if is_blank(&self.reason) {
            missing.push("reason for visit");
        }
        if self.practitioner_id.is_none() {
            missing.push("practitioner");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}
