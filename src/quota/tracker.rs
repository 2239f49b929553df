//! Per-channel rolling-window usage counters.
//!
//! Each channel keeps an ordered log of send timestamps. Hourly and daily
//! usage are the counts of entries younger than 3600 s / 86400 s. Entries
//! older than a day are dropped lazily on every call.
//!
//! Timestamps use `tokio::time::Instant` so paused-clock tests can advance
//! time without sleeping.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::channels::{Channel, ChannelLimits};

pub const HOUR: Duration = Duration::from_secs(3600);
pub const DAY: Duration = Duration::from_secs(86_400);

#[derive(Debug, Default)]
struct UsageLog {
    /// Send timestamps, ascending.
    sends: VecDeque<Instant>,
    /// Slots handed out by `reserve` whose outcome is still pending.
    reserved: u32,
}

impl UsageLog {
    fn compact(&mut self, now: Instant) {
        while let Some(front) = self.sends.front() {
            if now.saturating_duration_since(*front) >= DAY {
                self.sends.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> u32 {
        self.sends
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < window)
            .count() as u32
    }

    /// Time until `needed` entries of `window` have aged out.
    fn expiry_wait(&self, now: Instant, window: Duration, needed: u32) -> Duration {
        let in_window: Vec<Instant> = self
            .sends
            .iter()
            .copied()
            .filter(|t| now.saturating_duration_since(*t) < window)
            .collect();
        match in_window.get(needed.saturating_sub(1) as usize) {
            Some(t) => (*t + window).saturating_duration_since(now),
            // Pending reservations fill the rest. They settle when the
            // in-flight send finishes; callers apply their own floor.
            None => Duration::ZERO,
        }
    }
}

/// Hourly/daily usage of one channel at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub hourly: u32,
    pub daily: u32,
}

/// Rolling-window quota tracker over a fixed set of channels.
#[derive(Debug)]
pub struct QuotaTracker {
    limits: HashMap<Channel, ChannelLimits>,
    logs: HashMap<Channel, UsageLog>,
}

impl QuotaTracker {
    pub fn new(limits: impl IntoIterator<Item = (Channel, ChannelLimits)>) -> Self {
        let limits: HashMap<Channel, ChannelLimits> = limits.into_iter().collect();
        let logs = limits.keys().map(|c| (*c, UsageLog::default())).collect();
        Self { limits, logs }
    }

    pub fn limits(&self, channel: Channel) -> Option<ChannelLimits> {
        self.limits.get(&channel).copied()
    }

    /// Usage including pending reservations.
    pub fn usage_at(&mut self, channel: Channel, now: Instant) -> Option<Usage> {
        let log = self.logs.get_mut(&channel)?;
        log.compact(now);
        Some(Usage {
            hourly: log.count_within(now, HOUR) + log.reserved,
            daily: log.count_within(now, DAY) + log.reserved,
        })
    }

    /// Usage from recorded sends only, ignoring pending reservations.
    pub fn sent_at(&mut self, channel: Channel, now: Instant) -> Option<Usage> {
        let log = self.logs.get_mut(&channel)?;
        log.compact(now);
        Some(Usage {
            hourly: log.count_within(now, HOUR),
            daily: log.count_within(now, DAY),
        })
    }

    /// True iff both windows are below their limits. Unknown channels are
    /// never available.
    pub fn is_available_at(&mut self, channel: Channel, now: Instant) -> bool {
        let Some(limits) = self.limits(channel) else {
            return false;
        };
        self.usage_at(channel, now)
            .is_some_and(|u| u.hourly < limits.hourly && u.daily < limits.daily)
    }

    pub fn is_available(&mut self, channel: Channel) -> bool {
        self.is_available_at(channel, Instant::now())
    }

    /// `(hourly_remaining, daily_remaining)`, floored at zero.
    pub fn remaining_at(&mut self, channel: Channel, now: Instant) -> Option<(u32, u32)> {
        let limits = self.limits(channel)?;
        let usage = self.usage_at(channel, now)?;
        Some((
            limits.hourly.saturating_sub(usage.hourly),
            limits.daily.saturating_sub(usage.daily),
        ))
    }

    pub fn remaining(&mut self, channel: Channel) -> Option<(u32, u32)> {
        self.remaining_at(channel, Instant::now())
    }

    /// Append a send timestamp, consuming a reservation if one is held.
    pub fn record_send_at(&mut self, channel: Channel, now: Instant) {
        let Some(log) = self.logs.get_mut(&channel) else {
            tracing::warn!(channel = %channel, "record_send on unconfigured channel");
            return;
        };
        log.reserved = log.reserved.saturating_sub(1);
        let pos = log.sends.partition_point(|t| *t <= now);
        log.sends.insert(pos, now);
        log.compact(now);
    }

    pub fn record_send(&mut self, channel: Channel) {
        self.record_send_at(channel, Instant::now());
    }

    /// Hold a slot if the channel is available. Returns whether a slot was
    /// taken. The slot counts as usage until `record_send` or `release`.
    pub fn reserve_at(&mut self, channel: Channel, now: Instant) -> bool {
        if !self.is_available_at(channel, now) {
            return false;
        }
        if let Some(log) = self.logs.get_mut(&channel) {
            log.reserved += 1;
        }
        true
    }

    /// Return a reserved slot without recording a send.
    pub fn release(&mut self, channel: Channel) {
        if let Some(log) = self.logs.get_mut(&channel) {
            log.reserved = log.reserved.saturating_sub(1);
        }
    }

    /// How long until both windows have headroom again. Zero when available
    /// now; `None` for unknown channels.
    pub fn time_until_available_at(&mut self, channel: Channel, now: Instant) -> Option<Duration> {
        let limits = self.limits(channel)?;
        let usage = self.usage_at(channel, now)?;
        let log = self.logs.get(&channel)?;

        let hourly_wait = if usage.hourly >= limits.hourly {
            log.expiry_wait(now, HOUR, usage.hourly - limits.hourly + 1)
        } else {
            Duration::ZERO
        };
        let daily_wait = if usage.daily >= limits.daily {
            log.expiry_wait(now, DAY, usage.daily - limits.daily + 1)
        } else {
            Duration::ZERO
        };

        Some(hourly_wait.max(daily_wait))
    }

    /// Number of raw log entries held for a channel (after compaction).
    pub fn log_len_at(&mut self, channel: Channel, now: Instant) -> usize {
        self.logs
            .get_mut(&channel)
            .map(|log| {
                log.compact(now);
                log.sends.len()
            })
            .unwrap_or(0)
    }
}
