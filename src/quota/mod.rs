//! Quota tracking, channel rotation and pacing.
//!
//! [`RateLimiter`] is the one shared handle over all three. Its state sits
//! behind a single async mutex, so selecting a channel and reserving its
//! slot happen together and concurrent dispatchers can never overshoot a
//! limit between "is it free?" and "send".

pub mod pacer;
pub mod rotator;
pub mod tracker;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::channels::{Channel, ChannelLimits};

pub use pacer::{AdaptivePacer, PaceBand, PacerConfig};
pub use rotator::{ChannelRotator, ChannelSelection, RotationSchedule};
pub use tracker::{QuotaTracker, Usage};

/// Per-channel headroom, as exposed on the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub channel: Channel,
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub hourly_remaining: u32,
    pub daily_remaining: u32,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub normalization: u32,
    pub min_wait: Duration,
    pub pacer: PacerConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            normalization: rotator::DEFAULT_NORMALIZATION,
            min_wait: rotator::MIN_WAIT,
            pacer: PacerConfig::default(),
        }
    }
}

struct LimiterState {
    tracker: QuotaTracker,
    rotator: ChannelRotator,
}

/// Shared rate limiter. Pass it around as `Arc<RateLimiter>`.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    pacer: AdaptivePacer,
}

impl RateLimiter {
    pub fn new(limits: &[(Channel, ChannelLimits)], config: LimiterConfig) -> Self {
        let schedule = RotationSchedule::build(limits, config.normalization);
        tracing::info!(
            slots = schedule.len(),
            channels = ?schedule.channels(),
            "Built rotation schedule"
        );
        Self {
            state: Mutex::new(LimiterState {
                tracker: QuotaTracker::new(limits.iter().copied()),
                rotator: ChannelRotator::new(schedule).with_min_wait(config.min_wait),
            }),
            pacer: AdaptivePacer::new(config.pacer),
        }
    }

    /// Select the next available channel and reserve a slot on it. The
    /// caller must follow up with [`record_send`](Self::record_send) or
    /// [`release`](Self::release).
    pub async fn next_available(&self) -> ChannelSelection {
        self.next_available_among(None).await
    }

    /// Like [`next_available`](Self::next_available), restricted to
    /// `eligible` channels when given.
    pub async fn next_available_among(&self, eligible: Option<&[Channel]>) -> ChannelSelection {
        let mut state = self.state.lock().await;
        let LimiterState { tracker, rotator } = &mut *state;
        let now = Instant::now();

        let selection = rotator.next_available_at(tracker, now, |c| {
            eligible.is_none_or(|set| set.contains(&c))
        });
        if let ChannelSelection::Available(channel) = selection {
            tracker.reserve_at(channel, now);
        }
        selection
    }

    pub async fn record_send(&self, channel: Channel) {
        self.state.lock().await.tracker.record_send(channel);
    }

    pub async fn release(&self, channel: Channel) {
        self.state.lock().await.tracker.release(channel);
    }

    pub async fn is_available(&self, channel: Channel) -> bool {
        self.state.lock().await.tracker.is_available(channel)
    }

    pub async fn remaining(&self, channel: Channel) -> Option<(u32, u32)> {
        self.state.lock().await.tracker.remaining(channel)
    }

    /// Pacing delay before sending on `channel`, from its hourly utilization.
    /// Only recorded sends count; the caller's own reservation does not.
    pub async fn delay_for(&self, channel: Channel) -> Duration {
        let (used, limit) = {
            let mut state = self.state.lock().await;
            let limit = state.tracker.limits(channel).map(|l| l.hourly).unwrap_or(0);
            let used = state
                .tracker
                .sent_at(channel, Instant::now())
                .map(|u| u.hourly)
                .unwrap_or(0);
            (used, limit)
        };
        self.pacer.delay_for_usage(used, limit)
    }

    /// Scheduled channels, in schedule order of first appearance.
    pub async fn channels(&self) -> Vec<Channel> {
        self.state.lock().await.rotator.schedule().channels()
    }

    pub async fn snapshot(&self) -> Vec<QuotaSnapshot> {
        let mut state = self.state.lock().await;
        let channels = state.rotator.schedule().channels();
        let now = Instant::now();
        channels
            .into_iter()
            .filter_map(|channel| {
                let limits = state.tracker.limits(channel)?;
                let (hourly_remaining, daily_remaining) =
                    state.tracker.remaining_at(channel, now)?;
                Some(QuotaSnapshot {
                    channel,
                    hourly_limit: limits.hourly,
                    daily_limit: limits.daily,
                    hourly_remaining,
                    daily_remaining,
                    available: hourly_remaining > 0 && daily_remaining > 0,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(pairs: &[(Channel, u32, u32)]) -> RateLimiter {
        let limits: Vec<_> = pairs
            .iter()
            .map(|(c, h, d)| (*c, ChannelLimits::new(*h, *d)))
            .collect();
        RateLimiter::new(
            &limits,
            LimiterConfig {
                pacer: PacerConfig::default().scaled(0.0),
                ..LimiterConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn selection_reserves_a_slot() {
        let rl = limiter(&[(Channel::Email, 1, 10)]);
        assert_eq!(
            rl.next_available().await,
            ChannelSelection::Available(Channel::Email)
        );
        // The reservation holds the only hourly slot.
        assert!(matches!(
            rl.next_available().await,
            ChannelSelection::Unavailable { .. }
        ));

        rl.release(Channel::Email).await;
        assert!(rl.is_available(Channel::Email).await);
    }

    #[tokio::test]
    async fn record_send_consumes_reservation() {
        let rl = limiter(&[(Channel::Email, 3, 10)]);
        let ChannelSelection::Available(c) = rl.next_available().await else {
            panic!("expected a channel");
        };
        rl.record_send(c).await;
        assert_eq!(rl.remaining(Channel::Email).await, Some((2, 9)));
    }

    #[tokio::test]
    async fn pacing_ignores_the_pending_reservation() {
        let fixed = |secs| (Duration::from_secs(secs), Duration::from_secs(secs));
        let rl = RateLimiter::new(
            &[(Channel::Generic, ChannelLimits::new(5, 50))],
            LimiterConfig {
                pacer: PacerConfig {
                    relaxed: fixed(1),
                    moderate: fixed(10),
                    busy: fixed(20),
                    saturated: fixed(30),
                    jitter: Duration::ZERO,
                    min_delay: Duration::ZERO,
                },
                ..LimiterConfig::default()
            },
        );
        rl.record_send(Channel::Generic).await;
        rl.record_send(Channel::Generic).await;
        assert_eq!(rl.delay_for(Channel::Generic).await, Duration::from_secs(1));

        // 2/5 sent: still relaxed once a slot is reserved for the next send.
        assert_eq!(
            rl.next_available().await,
            ChannelSelection::Available(Channel::Generic)
        );
        assert_eq!(rl.delay_for(Channel::Generic).await, Duration::from_secs(1));

        rl.record_send(Channel::Generic).await;
        assert_eq!(rl.delay_for(Channel::Generic).await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn reservation_only_exhaustion_waits_the_floor() {
        let rl = limiter(&[(Channel::Email, 1, 10)]);
        assert_eq!(
            rl.next_available().await,
            ChannelSelection::Available(Channel::Email)
        );
        assert_eq!(
            rl.next_available().await,
            ChannelSelection::Unavailable {
                wait: LimiterConfig::default().min_wait
            }
        );
    }

    #[tokio::test]
    async fn concurrent_selection_never_overshoots() {
        let rl = Arc::new(limiter(&[(Channel::Email, 5, 100), (Channel::Reddit, 3, 50)]));
        let mut handles = Vec::new();
        for _ in 0..40 {
            let rl = Arc::clone(&rl);
            handles.push(tokio::spawn(async move {
                match rl.next_available().await {
                    ChannelSelection::Available(c) => {
                        rl.record_send(c).await;
                        Some(c)
                    }
                    _ => None,
                }
            }));
        }

        let mut email = 0;
        let mut reddit = 0;
        for h in handles {
            match h.await.unwrap() {
                Some(Channel::Email) => email += 1,
                Some(Channel::Reddit) => reddit += 1,
                _ => {}
            }
        }
        assert_eq!(email, 5);
        assert_eq!(reddit, 3);
    }

    #[tokio::test]
    async fn eligible_subset_is_respected() {
        let rl = limiter(&[(Channel::Email, 5, 150), (Channel::Twitter, 5, 100)]);
        for _ in 0..3 {
            assert_eq!(
                rl.next_available_among(Some(&[Channel::Twitter])).await,
                ChannelSelection::Available(Channel::Twitter)
            );
        }
        assert_eq!(
            rl.next_available_among(Some(&[Channel::Reddit])).await,
            ChannelSelection::Unreachable
        );
    }

    #[tokio::test]
    async fn snapshot_reports_headroom() {
        let rl = limiter(&[(Channel::Email, 2, 10), (Channel::Reddit, 1, 5)]);
        rl.record_send(Channel::Reddit).await;

        let snap = rl.snapshot().await;
        assert_eq!(snap.len(), 2);
        let reddit = snap.iter().find(|s| s.channel == Channel::Reddit).unwrap();
        assert_eq!(reddit.hourly_remaining, 0);
        assert_eq!(reddit.daily_remaining, 4);
        assert!(!reddit.available);
        let email = snap.iter().find(|s| s.channel == Channel::Email).unwrap();
        assert!(email.available);
    }

    #[tokio::test]
    async fn delay_uses_scaled_pacer() {
        let rl = limiter(&[(Channel::Email, 2, 10)]);
        assert_eq!(rl.delay_for(Channel::Email).await, Duration::ZERO);
    }
}
