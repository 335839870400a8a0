//! Typed failures for scheduling and lifecycle operations.
//!
//! Every variant renders a message specific enough for the operator to
//! know what to change.

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::AppointmentState;

use super::state::Transition;

/// Malformed or missing input, caught before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("A practitioner must be selected")]
    MissingPractitioner,

    #[error("A date and time must be given")]
    MissingStart,

    #[error("Practitioner {0} does not exist or is inactive")]
    UnknownPractitioner(Uuid),

    #[error("Service type {0} does not exist or is inactive")]
    UnknownService(Uuid),

    #[error("Price must be greater than zero")]
    NonPositivePrice,

    #[error("Patient name is required")]
    MissingPatientName,

    #[error("Patient email is required")]
    MissingPatientEmail,

    #[error("Patient email is not a valid address")]
    InvalidPatientEmail,

    #[error("Patient {0} does not exist")]
    UnknownPatient(Uuid),

    #[error("The appointment at {0} has not started yet")]
    NotYetStarted(NaiveDateTime),
}

/// Why a candidate slot cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    #[error("Cannot book a time in the past ({0})")]
    InThePast(NaiveDateTime),

    #[error("The practitioner has no working hours on that day")]
    NoWorkingHours,

    #[error("The start time is outside the practitioner's working hours")]
    OutsideWorkingHours,

    #[error("The appointment would run past the end of the working block")]
    DurationDoesNotFit,

    #[error("Overlaps the appointment at {existing_start}")]
    Overlap {
        existing_id: Uuid,
        existing_start: NaiveDateTime,
    },

    #[error("Another appointment already starts at exactly {0}")]
    DuplicateInstant(NaiveDateTime),
}

/// What is wrong with the clinical record when the record gate fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordProblem {
    Missing,
    Incomplete(Vec<&'static str>),
}

/// A completion precondition that did not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateFailure {
    #[error("Cannot complete an appointment scheduled in the future ({0})")]
    TimeGate(NaiveDateTime),

    #[error("{}", record_message(.0))]
    RecordGate(RecordProblem),

    #[error("A price greater than zero must be set before completing")]
    PriceGate,
}

fn record_message(problem: &RecordProblem) -> String {
    match problem {
        RecordProblem::Missing => "No clinical record is linked to this appointment".to_string(),
        RecordProblem::Incomplete(fields) => {
            format!("The clinical record is missing: {}", fields.join(", "))
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {transition} an appointment that is {from}")]
pub struct StateError {
    pub from: AppointmentState,
    pub transition: Transition,
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictReason),

    #[error(transparent)]
    Gate(#[from] GateFailure),

    #[error(transparent)]
    InvalidState(#[from] StateError),

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for SchedulingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::from(e))
    }
}
