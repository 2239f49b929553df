//! Weighted round-robin channel rotation.

use std::time::Duration;

use tokio::time::Instant;

use crate::channels::{Channel, ChannelLimits};
use crate::quota::QuotaTracker;

/// Floor applied to the "nothing available" wait.
pub const MIN_WAIT: Duration = Duration::from_secs(60);

/// Daily capacity that earns one schedule slot.
pub const DEFAULT_NORMALIZATION: u32 = 50;

/// Precomputed weighted channel ordering. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSchedule {
    slots: Vec<Channel>,
}

impl RotationSchedule {
    /// `round(daily / normalization)`, at least 1.
    pub fn weight(daily: u32, normalization: u32) -> u32 {
        let normalization = normalization.max(1);
        let w = (f64::from(daily) / f64::from(normalization)).round() as u32;
        w.max(1)
    }

    /// Build the schedule. Channels are ordered by daily capacity (largest
    /// first, ties in enum order) and interleaved: round `k` holds every
    /// channel whose weight exceeds `k`. So weights A:3, B:1 give
    /// `[A, B, A, A]`.
    pub fn build(limits: &[(Channel, ChannelLimits)], normalization: u32) -> Self {
        let mut weighted: Vec<(Channel, u32, u32)> = limits
            .iter()
            .map(|(c, l)| (*c, l.daily, Self::weight(l.daily, normalization)))
            .collect();
        weighted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        weighted.dedup_by_key(|(c, _, _)| *c);

        let rounds = weighted.iter().map(|(_, _, w)| *w).max().unwrap_or(0);
        let mut slots = Vec::new();
        for round in 0..rounds {
            for (channel, _, weight) in &weighted {
                if *weight > round {
                    slots.push(*channel);
                }
            }
        }
        Self { slots }
    }

    pub fn slots(&self) -> &[Channel] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Distinct scheduled channels, in first-appearance order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut seen = Vec::new();
        for c in &self.slots {
            if !seen.contains(c) {
                seen.push(*c);
            }
        }
        seen
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.slots.contains(&channel)
    }
}

/// Outcome of a channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelection {
    /// A slot on this channel is free (and, via the limiter, reserved).
    Available(Channel),
    /// Every eligible channel is exhausted; try again after `wait`.
    Unavailable { wait: Duration },
    /// No scheduled channel passes the eligibility filter.
    Unreachable,
}

/// Cursor over a [`RotationSchedule`].
#[derive(Debug)]
pub struct ChannelRotator {
    schedule: RotationSchedule,
    cursor: usize,
    min_wait: Duration,
}

impl ChannelRotator {
    pub fn new(schedule: RotationSchedule) -> Self {
        Self {
            schedule,
            cursor: 0,
            min_wait: MIN_WAIT,
        }
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }

    pub fn schedule(&self) -> &RotationSchedule {
        &self.schedule
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Scan at most one full cycle from the cursor for an available,
    /// eligible channel. On success the cursor moves past the chosen slot.
    /// The cursor is never reset.
    pub fn next_available_at(
        &mut self,
        tracker: &mut QuotaTracker,
        now: Instant,
        eligible: impl Fn(Channel) -> bool,
    ) -> ChannelSelection {
        let len = self.schedule.len();
        if len == 0 {
            return ChannelSelection::Unreachable;
        }

        let mut any_eligible = false;
        for offset in 0..len {
            let idx = (self.cursor + offset) % len;
            let channel = self.schedule.slots[idx];
            if !eligible(channel) {
                continue;
            }
            any_eligible = true;
            if tracker.is_available_at(channel, now) {
                self.cursor = (idx + 1) % len;
                return ChannelSelection::Available(channel);
            }
        }

        if !any_eligible {
            return ChannelSelection::Unreachable;
        }

        let wait = self
            .schedule
            .channels()
            .into_iter()
            .filter(|c| eligible(*c))
            .filter_map(|c| tracker.time_until_available_at(c, now))
            .min()
            .unwrap_or(self.min_wait);

        ChannelSelection::Unavailable {
            wait: wait.max(self.min_wait),
        }
    }

    pub fn next_available(&mut self, tracker: &mut QuotaTracker) -> ChannelSelection {
        self.next_available_at(tracker, Instant::now(), |_| true)
    }
}
