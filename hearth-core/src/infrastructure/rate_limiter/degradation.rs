//! Outage tracking for the store failure policy
//!
//! Fail-open admits while the store is down, but only until the outage has
//! lasted longer than the ceiling. From then on requests are denied until the
//! store answers again. State is a single atomic timestamp plus counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{error, info, warn};

use super::storage::StoreError;
use crate::config::FailurePolicy;
use crate::infrastructure::clock::Clock;

const NO_OUTAGE: i64 = i64::MIN;

/// What to do with a request whose store call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedOutcome {
    Admit,
    Deny,
}

/// Point-in-time view of the guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradationSnapshot {
    pub policy: FailurePolicy,
    /// Start of the current outage, if any
    pub outage_since: Option<DateTime<Utc>>,
    /// Requests admitted without counting
    pub degraded_admissions: u64,
    /// Requests denied because the store was unavailable
    pub unavailable_denials: u64,
    /// Store calls that failed (after retry)
    pub store_errors: u64,
}

/// Tracks store outages and applies the configured failure policy
#[derive(Debug)]
pub struct DegradationGuard {
    policy: FailurePolicy,
    ceiling: Duration,
    clock: Arc<dyn Clock>,
    outage_started_ms: AtomicI64,
    degraded_admissions: AtomicU64,
    unavailable_denials: AtomicU64,
    store_errors: AtomicU64,
}

impl DegradationGuard {
    pub fn new(policy: FailurePolicy, ceiling: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            ceiling,
            clock,
            outage_started_ms: AtomicI64::new(NO_OUTAGE),
            degraded_admissions: AtomicU64::new(0),
            unavailable_denials: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Store answered; ends any outage in progress
    pub fn record_success(&self) {
        // Read-only on the hot path; only an outage in progress takes the write
        if self.outage_started_ms.load(Ordering::Acquire) == NO_OUTAGE {
            return;
        }
        let previous = self.outage_started_ms.swap(NO_OUTAGE, Ordering::AcqRel);
        if previous != NO_OUTAGE {
            let lasted_ms = self.clock.now().timestamp_millis().saturating_sub(previous);
            info!(outage_ms = lasted_ms, "Rate limit store recovered");
        }
    }

    /// Store failed; decide whether to admit
    pub fn record_failure(&self, err: &StoreError) -> DegradedOutcome {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        let now_ms = self.clock.now().timestamp_millis();

        let started_ms = match self.outage_started_ms.compare_exchange(
            NO_OUTAGE,
            now_ms,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                warn!(error = %err, policy = ?self.policy, "Rate limit store outage started");
                now_ms
            }
            Err(existing) => existing,
        };

        match self.policy {
            FailurePolicy::FailClosed => {
                self.unavailable_denials.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "Rate limit store unavailable, denying request (fail-closed)");
                DegradedOutcome::Deny
            }
            FailurePolicy::FailOpen => {
                let ceiling_ms = i64::try_from(self.ceiling.as_millis()).unwrap_or(i64::MAX);
                let elapsed_ms = now_ms.saturating_sub(started_ms);
                if elapsed_ms > ceiling_ms {
                    self.unavailable_denials.fetch_add(1, Ordering::Relaxed);
                    error!(
                        error = %err,
                        outage_ms = elapsed_ms,
                        ceiling_ms,
                        "Rate limit store outage exceeded fail-open ceiling, denying request"
                    );
                    DegradedOutcome::Deny
                } else {
                    self.degraded_admissions.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        error = %err,
                        outage_ms = elapsed_ms,
                        "Rate limit store unavailable, admitting request (fail-open)"
                    );
                    DegradedOutcome::Admit
                }
            }
        }
    }

    pub fn in_outage(&self) -> bool {
        self.outage_started_ms.load(Ordering::Acquire) != NO_OUTAGE
    }

    pub fn snapshot(&self) -> DegradationSnapshot {
        let started = self.outage_started_ms.load(Ordering::Acquire);
        DegradationSnapshot {
            policy: self.policy,
            outage_since: (started != NO_OUTAGE)
                .then(|| Utc.timestamp_millis_opt(started).single())
                .flatten(),
            degraded_admissions: self.degraded_admissions.load(Ordering::Relaxed),
            unavailable_denials: self.unavailable_denials.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
