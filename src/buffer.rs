//! Time-windowed sample storage.
//!
//! Each channel keeps a rolling window of readings no older than the
//! configured retention. Eviction is age-based, not count-based: a slow
//! channel keeps few points, a fast one many, and both forget at the same
//! rate. All shared access goes through a single mutex around the whole
//! [`ChannelStore`], so a snapshot always sees gate decisions and buffer
//! contents from the same moment.

use crate::config::AcquisitionConfig;
use crate::core::{Channel, Reading};
use crate::gate::SampleGate;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Rolling window of readings for one channel.
#[derive(Debug)]
pub struct TimeWindowBuffer {
    entries: VecDeque<(Instant, Reading)>,
    retention: Duration,
}

impl TimeWindowBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
        }
    }

    /// Append a reading observed at `at` and evict anything that has aged
    /// out relative to it. Entries arrive in receive order, so timestamps
    /// are monotonically non-decreasing.
    pub fn append(&mut self, at: Instant, reading: Reading) {
        debug_assert!(
            self.entries.back().is_none_or(|(t, _)| *t <= at),
            "appends must be in receive order"
        );
        self.entries.push_back((at, reading));
        self.evict_older_than(at);
    }

    /// Drop entries older than the retention window relative to `now`.
    pub fn evict_older_than(&mut self, now: Instant) {
        while let Some((t, _)) = self.entries.front() {
            if now.duration_since(*t) > self.retention {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Change the retention window. Takes effect on the next eviction.
    pub fn set_retention(&mut self, retention: Duration) {
        self.retention = retention;
    }
}

/// Gate plus buffers for all channels, behind one lock.
#[derive(Debug)]
pub struct ChannelStore {
    gate: SampleGate,
    buffers: [TimeWindowBuffer; 4],
}

impl ChannelStore {
    pub fn from_config(cfg: &AcquisitionConfig) -> Self {
        let retention = cfg.retention_window();
        Self {
            gate: SampleGate::from_config(cfg),
            buffers: Channel::ALL.map(|_| TimeWindowBuffer::new(retention)),
        }
    }

    /// Offer a reading to the gate; store it if admitted. Returns whether
    /// the reading was stored.
    pub fn ingest(&mut self, reading: Reading, now: Instant) -> bool {
        let channel = reading.channel;
        if !self.gate.admit(channel, now) {
            return false;
        }
        self.buffers[channel.index()].append(now, reading);
        true
    }

    /// Age out stale entries on every channel. Called on reader idle so
    /// windows shrink even when no new data arrives.
    pub fn evict_all(&mut self, now: Instant) {
        for buf in &mut self.buffers {
            buf.evict_older_than(now);
        }
    }

    pub fn snapshot(&self, channel: Channel) -> Vec<Reading> {
        self.buffers[channel.index()].snapshot()
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.buffers[channel.index()].len()
    }

    /// Reconfigure gates and retention in one step. `clear_history` drops
    /// all buffered readings, used when the time unit changes and old
    /// points are no longer comparable.
    pub fn apply_config(&mut self, cfg: &AcquisitionConfig, clear_history: bool) {
        for ch in Channel::ALL {
            self.gate.reconfigure(ch, cfg.interval_ms(ch));
        }
        let retention = cfg.retention_window();
        for buf in &mut self.buffers {
            buf.set_retention(retention);
            if clear_history {
                buf.clear();
            }
        }
    }
}

/// Shared handle used by the reader thread, the simulator, and consumers.
pub type SharedStore = Arc<Mutex<ChannelStore>>;

/// Lock the store, recovering from a poisoned mutex. A panic in a reader
/// thread must not wedge every consumer for the rest of the process.
pub fn lock_store(store: &SharedStore) -> std::sync::MutexGuard<'_, ChannelStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
