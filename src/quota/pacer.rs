//! Adaptive inter-send delay.
//!
//! The busier a channel is in its hourly window, the longer we wait before
//! the next send on it.

use std::time::Duration;

use rand::Rng;

/// Utilization band of a channel's hourly window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceBand {
    /// < 50 %
    Relaxed,
    /// 50–70 %
    Moderate,
    /// 70–90 %
    Busy,
    /// >= 90 %
    Saturated,
}

impl PaceBand {
    pub fn for_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            Self::Relaxed
        } else if utilization < 0.7 {
            Self::Moderate
        } else if utilization < 0.9 {
            Self::Busy
        } else {
            Self::Saturated
        }
    }
}

/// Delay ranges per band, plus jitter and a floor.
#[derive(Debug, Clone, PartialEq)]
pub struct PacerConfig {
    pub relaxed: (Duration, Duration),
    pub moderate: (Duration, Duration),
    pub busy: (Duration, Duration),
    pub saturated: (Duration, Duration),
    pub jitter: Duration,
    pub min_delay: Duration,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            relaxed: (Duration::from_millis(1_500), Duration::from_secs(4)),
            moderate: (Duration::from_secs(4), Duration::from_secs(8)),
            busy: (Duration::from_secs(8), Duration::from_secs(15)),
            saturated: (Duration::from_secs(15), Duration::from_secs(30)),
            jitter: Duration::from_millis(500),
            min_delay: Duration::from_millis(500),
        }
    }
}

impl PacerConfig {
    /// Every duration multiplied by `factor`. `scaled(0.0)` collapses all
    /// delays to zero, which is handy in tests.
    pub fn scaled(&self, factor: f64) -> Self {
        let s = |d: Duration| d.mul_f64(factor.max(0.0));
        Self {
            relaxed: (s(self.relaxed.0), s(self.relaxed.1)),
            moderate: (s(self.moderate.0), s(self.moderate.1)),
            busy: (s(self.busy.0), s(self.busy.1)),
            saturated: (s(self.saturated.0), s(self.saturated.1)),
            jitter: s(self.jitter),
            min_delay: s(self.min_delay),
        }
    }

    fn range(&self, band: PaceBand) -> (Duration, Duration) {
        match band {
            PaceBand::Relaxed => self.relaxed,
            PaceBand::Moderate => self.moderate,
            PaceBand::Busy => self.busy,
            PaceBand::Saturated => self.saturated,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptivePacer {
    config: PacerConfig,
}

impl AdaptivePacer {
    pub fn new(config: PacerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Delay for `used` sends against an hourly `limit`.
    pub fn delay_for_usage(&self, used: u32, limit: u32) -> Duration {
        let utilization = if limit == 0 {
            1.0
        } else {
            f64::from(used) / f64::from(limit)
        };
        self.delay_for_utilization(utilization, &mut rand::thread_rng())
    }

    pub fn delay_for_utilization(&self, utilization: f64, rng: &mut impl Rng) -> Duration {
        let (lo, hi) = self.config.range(PaceBand::for_utilization(utilization));
        let base = if hi > lo {
            rng.gen_range(lo.as_secs_f64()..=hi.as_secs_f64())
        } else {
            lo.as_secs_f64()
        };

        let jitter = self.config.jitter.as_secs_f64();
        let jittered = if jitter > 0.0 {
            base + rng.gen_range(-jitter..=jitter)
        } else {
            base
        };

        Duration::from_secs_f64(jittered.max(0.0)).max(self.config.min_delay)
    }
}
