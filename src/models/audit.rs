use std::net::IpAddr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::{AuditAction, AuditModule};

/// Hard caps applied before an event is stored.
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const DETAILS_MAX_CHARS: usize = 1000;

/// Who performed an audited action. `staff_id == None` means the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub staff_id: Option<String>,
    pub ip_address: Option<IpAddr>,
}

impl Actor {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            staff_id: Some(id.into()),
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }
}

/// Reference to the entity an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn appointment(id: uuid::Uuid) -> Self {
        Self::new("appointment", id)
    }
}

/// A stored, immutable audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub module: AuditModule,
    pub description: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: NaiveDateTime,
    pub object: Option<ObjectRef>,
}

/// An event about to be recorded.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor: Actor,
    pub action: AuditAction,
    pub module: AuditModule,
    pub description: String,
    pub details: Option<String>,
    pub object: Option<ObjectRef>,
}

impl NewAuditEvent {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        module: AuditModule,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.clone(),
            action,
            module,
            description: description.into(),
            details: None,
            object: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }

    /// Apply the storage caps. Counts characters, not bytes.
    pub fn truncated(mut self) -> Self {
        self.description = truncate_chars(&self.description, DESCRIPTION_MAX_CHARS);
        self.details = self
            .details
            .map(|d| truncate_chars(&d, DETAILS_MAX_CHARS));
        self
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}
