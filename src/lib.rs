pub mod audit;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod db;
pub mod models;
pub mod scheduling;

#[cfg(test)]
mod phi_audit;

pub use clock::{Clock, FixedClock, SystemClock};
pub use scheduling::{Scheduler, SchedulingError};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over the default
/// filter. A second call is a no-op so embedding hosts and tests can both
/// call it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
