pub mod appointment;
pub mod audit;
pub mod availability;
pub mod clinical_record;
pub mod enums;
pub mod money;
pub mod patient;
pub mod practitioner;
pub mod service_type;

pub use appointment::*;
pub use audit::*;
pub use availability::*;
pub use clinical_record::*;
pub use enums::*;
pub use money::*;
pub use patient::*;
pub use practitioner::*;
pub use service_type::*;
