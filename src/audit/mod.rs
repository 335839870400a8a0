//! Audit trail: append-only event log plus its retention sweep.

pub mod log;
pub mod retention;
pub mod sweeper;

pub use self::log::{should_sweep, AuditLog, SweepTrigger};
pub use retention::{sweep, sweep_quietly, RetentionPolicy, SweepMode, SweepOutcome, SweepRule};
pub use sweeper::{start_sweeper, SweepRequest, SweepRequester, SweeperHandle};
