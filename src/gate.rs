//! Per-channel admission control.
//!
//! The board pushes readings at whatever cadence its own timers run;
//! the host-side gate enforces the configured minimum interval between
//! stored samples so the buffers never fill faster than the user asked
//! for. Decisions use monotonic [`Instant`]s, so wall-clock adjustments
//! never starve or flood a channel.

use crate::config::AcquisitionConfig;
use crate::core::Channel;
use std::time::{Duration, Instant};

/// Gate for a single channel.
#[derive(Clone, Debug)]
pub struct ChannelGate {
    interval: Duration,
    last_admitted: Option<Instant>,
}

impl ChannelGate {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last_admitted: None,
        }
    }

    /// Admit a sample at `now` if at least one interval has elapsed since
    /// the last admitted sample. The first sample is always admitted.
    pub fn admit(&mut self, now: Instant) -> bool {
        let ok = match self.last_admitted {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if ok {
            self.last_admitted = Some(now);
        }
        ok
    }

    /// Change the interval. The admission clock restarts, so the next
    /// sample after a reconfigure is always admitted.
    pub fn reconfigure(&mut self, interval_ms: u64) {
        self.interval = Duration::from_millis(interval_ms);
        self.last_admitted = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// All four channel gates, indexed by [`Channel::index`].
#[derive(Clone, Debug)]
pub struct SampleGate {
    gates: [ChannelGate; 4],
}

impl SampleGate {
    pub fn from_config(cfg: &AcquisitionConfig) -> Self {
        Self {
            gates: Channel::ALL.map(|ch| ChannelGate::new(cfg.interval_ms(ch))),
        }
    }

    pub fn admit(&mut self, channel: Channel, now: Instant) -> bool {
        self.gates[channel.index()].admit(now)
    }

    pub fn reconfigure(&mut self, channel: Channel, interval_ms: u64) {
        self.gates[channel.index()].reconfigure(interval_ms);
    }

    pub fn interval(&self, channel: Channel) -> Duration {
        self.gates[channel.index()].interval()
    }
}
