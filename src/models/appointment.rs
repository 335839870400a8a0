use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentState, PaymentMethod};
use super::money::Money;
use super::patient::{Patient, PatientContact};

/// Patient contact data copied onto the appointment for historical display.
/// Kept separately from the live `patient_id` so it survives the relation
/// being cleared or the patient record changing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl PatientSnapshot {
    pub fn from_patient(patient: &Patient) -> Self {
        Self {
            name: Some(patient.full_name.clone()),
            email: patient.email.clone(),
            phone: patient.phone.clone(),
        }
    }

    pub fn from_contact(contact: &PatientContact) -> Self {
        Self {
            name: Some(contact.name.clone()),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
        }
    }

    /// True when the live record no longer matches what was captured.
    pub fn differs_from(&self, patient: &Patient) -> bool {
        self.name.as_deref() != Some(patient.full_name.as_str())
            || self.email != patient.email
            || self.phone != patient.phone
    }

    /// Take the live contact data, keeping any captured value the live
    /// record no longer has.
    pub fn refresh_from(&mut self, patient: &Patient) {
        self.name = Some(patient.full_name.clone());
        if patient.email.is_some() {
            self.email = patient.email.clone();
        }
        if patient.phone.is_some() {
            self.phone = patient.phone.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub starts_at: NaiveDateTime,
    pub state: AppointmentState,
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub snapshot: PatientSnapshot,
    pub service_type_id: Option<Uuid>,
    pub charged_price: Option<Money>,
    pub reason: Option<String>,
    pub arrived_at: Option<NaiveDateTime>,
    pub no_show_reason: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub price_adjustment_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_by: Option<String>,
    pub completed_by: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Appointment {
    /// Past appointments that were neither progressed nor cancelled.
    pub fn requires_attention(&self, now: NaiveDateTime) -> bool {
        self.starts_at < now
            && matches!(self.state, AppointmentState::Open | AppointmentState::Booked)
    }

    pub fn has_patient(&self) -> bool {
        self.patient_id.is_some() || !self.snapshot.is_empty()
    }
}
