use std::sync::Arc;

use rand::Rng;
use rusqlite::Connection;

use crate::clock::Clock;
use crate::db;
use crate::models::NewAuditEvent;

use super::retention::{sweep_quietly, RetentionPolicy};
use super::sweeper::SweepRequester;

/// How `record` triggers the retention sweep.
#[derive(Debug, Clone)]
pub enum SweepTrigger {
    /// Sweep synchronously inside `record` on a random fraction of calls.
    Inline,
    /// On the same random fraction, post a request to the background sweeper.
    Background(SweepRequester),
    /// Never sweep from `record`.
    Disabled,
}

/// Append-only audit log.
///
/// `record` never fails: storage errors are reported through `tracing`
/// and swallowed so that auditing cannot block a business operation.
pub struct AuditLog {
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
    trigger: SweepTrigger,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>, policy: RetentionPolicy, trigger: SweepTrigger) -> Self {
        Self {
            clock,
            policy,
            trigger,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn record(&self, conn: &Connection, event: NewAuditEvent) {
        let event = event.truncated();
        let now = self.clock.now();
        if let Err(e) = db::insert_audit_event(conn, &event, &now) {
            tracing::error!(
                error = %e,
                action = %event.action,
                module = %event.module,
                "Failed to record audit event"
            );
            return;
        }
        self.maybe_sweep(conn, now);
    }

    fn maybe_sweep(&self, conn: &Connection, now: chrono::NaiveDateTime) {
        match &self.trigger {
            SweepTrigger::Disabled => {}
            SweepTrigger::Inline => {
                if should_sweep(self.policy.sweep_probability) {
                    sweep_quietly(conn, &self.policy, now);
                }
            }
            SweepTrigger::Background(requester) => {
                if should_sweep(self.policy.sweep_probability) {
                    requester.request_sweep();
                }
            }
        }
    }
}

/// Bernoulli trial with probability clamped to `[0, 1]`.
pub fn should_sweep(probability: f64) -> bool {
    if probability.is_nan() || probability <= 0.0 {
        false
    } else if probability >= 1.0 {
        true
    } else {
        rand::thread_rng().gen_bool(probability)
    }
}
