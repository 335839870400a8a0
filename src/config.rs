use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audit::RetentionPolicy;

/// Application-level constants
pub const APP_NAME: &str = "ClinicAgenda";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Appointments without a service duration occupy this many minutes.
pub const DEFAULT_APPOINTMENT_MINUTES: u32 = 30;

/// Get the application data directory.
/// Platform local-data dir when known, otherwise home, otherwise the
/// working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Location of the agenda database file
pub fn database_path() -> PathBuf {
    app_data_dir().join("agenda.db")
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "clinic_agenda=debug"
    } else {
        "clinic_agenda=info"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Duration used for the overlap check when the service declares none.
    pub default_duration_minutes: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: DEFAULT_APPOINTMENT_MINUTES,
        }
    }
}

/// Everything an embedding application may tune. Missing keys fall back
/// to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaConfig {
    pub scheduling: SchedulingConfig,
    pub retention: RetentionPolicy,
}

impl AgendaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
