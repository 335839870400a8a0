use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AppointmentState {
    Open => "open",
    Booked => "booked",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl AppointmentState {
    /// States that hold their slot in the practitioner's day.
    pub const OCCUPYING: [AppointmentState; 3] = [Self::Open, Self::Booked, Self::Confirmed];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    pub fn occupies_slot(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }
}

str_enum!(PaymentMethod {
    Cash => "cash",
    Debit => "debit",
    Credit => "credit",
    Transfer => "transfer",
    Other => "other",
});

str_enum!(AuditAction {
    Create => "create",
    Update => "update",
    Edit => "edit",
    Delete => "delete",
    Login => "login",
    Logout => "logout",
    AccessDenied => "access_denied",
    Export => "export",
    Import => "import",
    StateChange => "state_change",
    Other => "other",
});

str_enum!(AuditModule {
    Appointments => "appointments",
    Patients => "patients",
    Staff => "staff",
    Inventory => "inventory",
    Suppliers => "suppliers",
    Finance => "finance",
    Documents => "documents",
    TreatmentPlans => "treatment_plans",
    DentalCharts => "dental_charts",
    Radiographs => "radiographs",
    Services => "services",
    Configuration => "configuration",
    Audit => "audit",
    System => "system",
    Other => "other",
});
