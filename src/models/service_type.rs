use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: Uuid,
    pub name: String,
    pub base_price: Money,
    pub estimated_duration_minutes: Option<u32>,
    pub active: bool,
}
