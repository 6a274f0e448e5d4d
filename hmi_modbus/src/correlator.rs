//! Matching replies to outstanding requests.
//!
//! Every request issued through a device client is tracked here until its
//! reply arrives. A reply whose id is unknown (already answered, issued by
//! a previous connection, or never issued) is dropped with a debug trace.
//! Requests whose reply never arrives stay tracked and are reported by
//! [`RequestCorrelator::stale`]; nothing retries or retracts them.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::request::{Completion, Reply, Request, RequestId};

/// A tracked request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: Request,
    pub issued_at: Instant,
}

impl PendingRequest {
    /// Time since issue.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued_at)
    }
}

/// Outstanding requests of one device client, in issue order.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: BTreeMap<RequestId, PendingRequest>,
}

impl RequestCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `request`.
    pub fn track(&mut self, request: Request, now: Instant) {
        self.pending.insert(
            request.id,
            PendingRequest {
                request,
                issued_at: now,
            },
        );
    }

    /// Stop tracking `id` without a reply.
    pub fn forget(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Join `reply` with its request. Each request resolves at most once.
    pub fn resolve(&mut self, reply: Reply) -> Option<Completion> {
        let Some(pending) = self.pending.remove(&reply.request_id) else {
            debug!(request_id = %reply.request_id, "Dropping reply to unknown request");
            return None;
        };

        Some(Completion {
            request: pending.request,
            success: reply.success,
            payload: reply.payload,
        })
    }

    /// Whether `id` is outstanding.
    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Requests older than `timeout` at `now`.
    pub fn stale(&self, now: Instant, timeout: Duration) -> impl Iterator<Item = &PendingRequest> {
        self.pending
            .values()
            .filter(move |pending| pending.age(now) > timeout)
    }

    /// Drop every outstanding request. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
