//! Simulated sensor source for development without hardware.
//!
//! Generates a bounded random walk per channel at each channel's configured
//! interval. The output feeds the same gate-and-buffer path as the serial
//! reader, so consumers cannot tell (and should not care) which source is
//! active.

use crate::config::AcquisitionConfig;
use crate::core::{Channel, Reading};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Plausible value range per channel, matching what the real sensors emit.
fn value_range(channel: Channel) -> (f64, f64) {
    match channel {
        Channel::Distance => (10.0, 150.0),
        Channel::Light => (0.0, 100.0),
        Channel::Temperature => (15.0, 40.0),
        Channel::Intensity => (0.0, 1_000.0),
    }
}

#[derive(Debug)]
struct SimChannel {
    channel: Channel,
    interval: Duration,
    next_sample: Instant,
    value: f64,
}

/// Deterministic-friendly generator of fake readings.
#[derive(Debug)]
pub struct SimulatedSource {
    channels: [SimChannel; 4],
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(cfg: &AcquisitionConfig, now: Instant) -> Self {
        Self::with_rng(cfg, now, StdRng::from_entropy())
    }

    /// Seeded constructor for reproducible tests.
    pub fn with_seed(cfg: &AcquisitionConfig, now: Instant, seed: u64) -> Self {
        Self::with_rng(cfg, now, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cfg: &AcquisitionConfig, now: Instant, rng: StdRng) -> Self {
        let channels = Channel::ALL.map(|channel| {
            let (lo, hi) = value_range(channel);
            SimChannel {
                channel,
                interval: Duration::from_millis(cfg.interval_ms(channel)),
                next_sample: now,
                value: (lo + hi) / 2.0,
            }
        });
        Self { channels, rng }
    }

    /// Produce every reading due at or before `now`, one per due channel.
    pub fn tick(&mut self, now: Instant) -> Vec<Reading> {
        let mut out = Vec::new();
        for ch in &mut self.channels {
            if now < ch.next_sample {
                continue;
            }
            let (lo, hi) = value_range(ch.channel);
            let step = (hi - lo) * 0.03;
            ch.value = (ch.value + self.rng.gen_range(-step..=step)).clamp(lo, hi);
            out.push(Reading::now(ch.channel, ch.value));

            ch.next_sample += ch.interval;
            if ch.next_sample <= now {
                // Fell behind (long interval change or a stalled thread);
                // snap forward instead of emitting a burst.
                ch.next_sample = now + ch.interval;
            }
        }
        out
    }

    /// Adopt new intervals. Due times restart from `now`.
    pub fn reconfigure(&mut self, cfg: &AcquisitionConfig, now: Instant) {
        for ch in &mut self.channels {
            ch.interval = Duration::from_millis(cfg.interval_ms(ch.channel));
            ch.next_sample = now;
        }
    }
}
