use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring weekly open-hours interval for one practitioner.
/// `day_of_week` counts from Monday = 0 to Sunday = 6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub active: bool,
}
