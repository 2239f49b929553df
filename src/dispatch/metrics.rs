//! Process-scoped dispatch counters.
//!
//! Monotonic for the life of the process; read at any time for reporting.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::channels::Channel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCounters {
    pub sent: u64,
    pub failed: u64,
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub discovered: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    /// Send failures that moved a lead on to another channel.
    pub rotation_events: u64,
    pub quota_waits: u64,
    pub search_failures: u64,
    pub oracle_failures: u64,
    pub per_channel: BTreeMap<Channel, ChannelCounters>,
}

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    discovered: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    total_sent: AtomicU64,
    total_failed: AtomicU64,
    rotation_events: AtomicU64,
    quota_waits: AtomicU64,
    search_failures: AtomicU64,
    oracle_failures: AtomicU64,
    per_channel: Mutex<BTreeMap<Channel, ChannelCounters>>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_discovered(&self, n: usize) {
        self.discovered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, channel: Channel) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        self.bump_channel(channel, |c| c.sent += 1);
    }

    /// A send attempt failed. `rotating` is true when the lead will be
    /// retried on the next scheduled channel.
    pub fn record_send_failure(&self, channel: Channel, rotating: bool) {
        self.bump_channel(channel, |c| c.failed += 1);
        if rotating {
            self.rotation_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A lead exhausted its attempts (or had no reachable channel).
    pub fn record_lead_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_wait(&self) {
        self.quota_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_failure(&self) {
        self.search_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oracle_failure(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn bump_channel(&self, channel: Channel, f: impl FnOnce(&mut ChannelCounters)) {
        let mut map = self
            .per_channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(map.entry(channel).or_default());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_channel = self
            .per_channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        MetricsSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            rotation_events: self.rotation_events.load(Ordering::Relaxed),
            quota_waits: self.quota_waits.load(Ordering::Relaxed),
            search_failures: self.search_failures.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            per_channel,
        }
    }

    /// Log a one-line summary.
    pub fn log_status(&self) {
        let s = self.snapshot();
        tracing::info!(
            sent = s.total_sent,
            failed = s.total_failed,
            rotations = s.rotation_events,
            quota_waits = s.quota_waits,
            "Dispatch metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = DispatchMetrics::new();
        m.record_discovered(5);
        m.record_accepted();
        m.record_rejected();
        m.record_sent(Channel::Email);
        m.record_sent(Channel::Email);
        m.record_send_failure(Channel::Twitter, true);
        m.record_send_failure(Channel::Twitter, false);
        m.record_lead_failed();

        let s = m.snapshot();
        assert_eq!(s.discovered, 5);
        assert_eq!(s.total_sent, 2);
        assert_eq!(s.total_failed, 1);
        assert_eq!(s.rotation_events, 1);
        assert_eq!(s.per_channel[&Channel::Email].sent, 2);
        assert_eq!(s.per_channel[&Channel::Twitter].failed, 2);
    }

    #[test]
    fn snapshot_serializes_channel_keys() {
        let m = DispatchMetrics::new();
        m.record_sent(Channel::Reddit);
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["per_channel"]["reddit"]["sent"], 1);
        assert_eq!(json["total_sent"], 1);
    }
}
