//! Appointment scheduling: slot checks, the lifecycle state machine and
//! the completion gates.

pub mod collaborators;
pub mod conflict;
pub mod error;
pub mod gates;
pub mod lifecycle;
pub mod state;


pub use collaborators::{
    ClinicalRecordStore, PatientDirectory, ServiceCatalog, SqliteClinicalRecordStore,
    SqlitePatientDirectory, SqliteServiceCatalog,
};
pub use conflict::{resolve_duration, SlotChecker};
pub use error::{
    ConflictReason, GateFailure, RecordProblem, SchedulingError, StateError, ValidationError,
};
pub use gates::{check_completion, CompletionInputs};
pub use lifecycle::{
    CompletionRequest, NewAppointment, PatientRef, PriceAdjustment, RescheduleRequest, Scheduler,
};
pub use state::{next_state, Transition};
