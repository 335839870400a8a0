//! Audit-log retention policy.
//!
//! Two rules, checked in order:
//! 1. more than `max_events` rows: keep the `max_events` most recent,
//!    deleting everything older than the oldest kept timestamp;
//! 2. otherwise delete everything older than `max_age_days`.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, DatabaseError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub max_events: u64,
    pub max_age_days: u32,
    /// Chance that one `record` call triggers a sweep.
    pub sweep_probability: f64,
    /// Period of the background sweeper's own sweeps. `None` means it only
    /// sweeps on request.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_age_days: 365,
            sweep_probability: 0.01,
            sweep_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    Apply,
    /// Count what would be deleted without deleting.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRule {
    MaxEvents { total: i64 },
    MaxAge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub rule: SweepRule,
    pub cutoff: NaiveDateTime,
    /// Rows deleted, or rows that would be deleted in dry-run mode.
    pub affected: u64,
    pub dry_run: bool,
}

/// Run the retention policy once.
pub fn sweep(
    conn: &Connection,
    policy: &RetentionPolicy,
    now: NaiveDateTime,
    mode: SweepMode,
) -> Result<SweepOutcome, DatabaseError> {
    let max_events = policy.max_events.max(1);
    let total = db::count_audit_events(conn)?;

    let by_count = if total > max_events as i64 {
        db::nth_most_recent_audit_timestamp(conn, max_events)?
    } else {
        None
    };

    let (rule, cutoff) = match by_count {
        Some(cutoff) => (SweepRule::MaxEvents { total }, cutoff),
        None => (
            SweepRule::MaxAge,
            now - Duration::days(i64::from(policy.max_age_days)),
        ),
    };

    let affected = match mode {
        SweepMode::Apply => db::delete_audit_events_before(conn, &cutoff)? as u64,
        SweepMode::DryRun => db::count_audit_events_before(conn, &cutoff)? as u64,
    };

    let outcome = SweepOutcome {
        rule,
        cutoff,
        affected,
        dry_run: mode == SweepMode::DryRun,
    };
    if affected > 0 {
        tracing::info!(
            rule = ?outcome.rule,
            affected,
            dry_run = outcome.dry_run,
            "Audit retention sweep"
        );
    } else {
        tracing::debug!(rule = ?outcome.rule, "Audit retention sweep: nothing to prune");
    }
    Ok(outcome)
}

/// Apply the policy, logging instead of returning any failure.
pub fn sweep_quietly(
    conn: &Connection,
    policy: &RetentionPolicy,
    now: NaiveDateTime,
) -> Option<SweepOutcome> {
    match sweep(conn, policy, now, SweepMode::Apply) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(error = %e, "Audit retention sweep failed");
            None
        }
    }
}
