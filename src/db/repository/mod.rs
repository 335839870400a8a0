//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, so callers decide the
//! transaction boundary. All public functions are re-exported here.

mod appointment;
mod audit;
mod availability;
mod clinical_record;
mod patient;
mod practitioner;
mod service_type;

pub use appointment::*;
pub use audit::*;
pub use availability::*;
pub use clinical_record::*;
pub use patient::*;
pub use practitioner::*;
pub use service_type::*;
