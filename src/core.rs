//! Core data types for the acquisition engine.
//!
//! Everything here is a plain value: readings, channels, time units, the
//! connection lifecycle state, and outbound command envelopes. The modules
//! that move data around ([`crate::connection`], [`crate::engine`]) own the
//! machinery; this module owns the vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One logical sensor stream.
///
/// `Distance` and `Light` are the two channels the original board variant
/// exposes; `Temperature` and `Intensity` arrive from later firmware
/// variants and are inbound-only (no outbound timer commands exist for
/// them).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Distance,
    Light,
    Temperature,
    Intensity,
}

impl Channel {
    /// All channels, in stable order. Used to index per-channel arrays.
    pub const ALL: [Channel; 4] = [
        Channel::Distance,
        Channel::Light,
        Channel::Temperature,
        Channel::Intensity,
    ];

    /// Stable index into per-channel arrays.
    pub fn index(self) -> usize {
        match self {
            Channel::Distance => 0,
            Channel::Light => 1,
            Channel::Temperature => 2,
            Channel::Intensity => 3,
        }
    }

    /// Physical unit for values on this channel (SI-ish notation).
    pub fn unit(self) -> &'static str {
        match self {
            Channel::Distance => "cm",
            Channel::Light => "%",
            Channel::Temperature => "°C",
            Channel::Intensity => "lx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Distance => "distance",
            Channel::Light => "light",
            Channel::Temperature => "temperature",
            Channel::Intensity => "intensity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Granularity in which sampling-interval values are expressed.
///
/// The scale factors mirror the firmware's own timer arithmetic, so a local
/// gate and the board's hardware timers agree on what "T1:5 in minutes"
/// means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Millis,
    Seconds,
    Minutes,
}

impl TimeUnit {
    /// Milliseconds per one interval unit.
    pub fn scale_ms(self) -> u64 {
        match self {
            TimeUnit::Millis => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
        }
    }

    /// Letter used by the `TU:` wire command.
    pub fn wire_letter(self) -> char {
        match self {
            TimeUnit::Millis => 'm',
            TimeUnit::Seconds => 's',
            TimeUnit::Minutes => 'M',
        }
    }

    /// Inverse of [`TimeUnit::wire_letter`], for parsing STATUS echoes.
    pub fn from_wire(letter: char) -> Option<Self> {
        match letter {
            'm' => Some(TimeUnit::Millis),
            's' => Some(TimeUnit::Seconds),
            'M' => Some(TimeUnit::Minutes),
            _ => None,
        }
    }

    /// Interval in milliseconds for a configured value, floored at 1 ms.
    ///
    /// The floor matches the firmware, which clamps its timer reload value
    /// the same way so the period is never zero.
    pub fn interval_ms(self, value: u32) -> u64 {
        (u64::from(value) * self.scale_ms()).max(1)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Millis => f.write_str("ms"),
            TimeUnit::Seconds => f.write_str("s"),
            TimeUnit::Minutes => f.write_str("min"),
        }
    }
}

/// A single decoded sensor reading. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub channel: Channel,
    pub value: f64,
    /// Wall-clock receive time. Window arithmetic uses a monotonic instant
    /// captured alongside this; see [`crate::buffer::TimeWindowBuffer`].
    pub received_at: DateTime<Utc>,
}

impl Reading {
    pub fn now(channel: Channel, value: f64) -> Self {
        Self {
            channel,
            value,
            received_at: Utc::now(),
        }
    }
}

/// Diagnostic line from the device. Never fed to the sample gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    /// `OK:` command acknowledgement.
    Ok(String),
    /// `INFO:` free-form notice (includes STATUS echoes).
    Info(String),
    /// `ERROR:` device-side complaint.
    Error(String),
    /// `DEBUG:` firmware chatter.
    Debug(String),
}

impl StatusEvent {
    pub fn text(&self) -> &str {
        match self {
            StatusEvent::Ok(t)
            | StatusEvent::Info(t)
            | StatusEvent::Error(t)
            | StatusEvent::Debug(t) => t,
        }
    }
}

/// Connection lifecycle state, owned by the engine and observable by
/// everyone else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Acquiring,
    Stopping,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Acquiring => "acquiring",
            ConnectionState::Stopping => "stopping",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One outbound command plus the pause required after sending it.
///
/// The device needs settling time between configuration commands; the
/// connection manager honors these sequentially and never pipelines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    /// Command text without the trailing `\r\n`.
    pub text: String,
    pub settle: Duration,
}

impl PendingCommand {
    pub fn new(text: impl Into<String>, settle: Duration) -> Self {
        Self {
            text: text.into(),
            settle,
        }
    }
}
