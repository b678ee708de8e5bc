//! Strongly-typed configuration for the acquisition engine.
//!
//! Configuration is loaded from an optional TOML file plus environment
//! variables prefixed with `SERIALDAQ_`, with compiled-in defaults for
//! every field:
//!
//! ```toml
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! time_unit = "seconds"
//! retention_window_secs = 60
//!
//! [distance]
//! interval = 1
//! filter_enabled = true
//! filter_samples = 10
//! ```
//!
//! Validation is a separate step from parsing: values that parse fine but
//! are logically out of bounds (a zero interval, a filter window larger
//! than the firmware's buffer) are rejected before any command is built.

use crate::core::{Channel, TimeUnit};
use crate::error::{DaqError, DaqResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on filter sample counts; the firmware's averaging buffer
/// holds 50 samples.
pub const MAX_FILTER_SAMPLES: u8 = 50;

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud() -> u32 {
    9_600
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_retention() -> u64 {
    60
}

fn default_interval() -> u32 {
    1
}

fn default_filter_samples() -> u8 {
    10
}

/// Per-channel acquisition settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Sampling period, expressed in the configured [`TimeUnit`].
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Firmware-side moving-average filter toggle.
    #[serde(default)]
    pub filter_enabled: bool,
    /// Samples per filter window (1..=[`MAX_FILTER_SAMPLES`]).
    #[serde(default = "default_filter_samples")]
    pub filter_samples: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            filter_enabled: false,
            filter_samples: default_filter_samples(),
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Serial port path (e.g., "/dev/ttyACM0", "COM3").
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Granularity for every `interval` value below.
    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,
    /// Maximum age of buffered readings, in seconds.
    #[serde(default = "default_retention")]
    pub retention_window_secs: u64,
    #[serde(default)]
    pub distance: ChannelConfig,
    #[serde(default)]
    pub light: ChannelConfig,
    #[serde(default)]
    pub temperature: ChannelConfig,
    #[serde(default)]
    pub intensity: ChannelConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud(),
            time_unit: default_time_unit(),
            retention_window_secs: default_retention(),
            distance: ChannelConfig::default(),
            light: ChannelConfig::default(),
            temperature: ChannelConfig::default(),
            intensity: ChannelConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Load configuration from an optional TOML file plus `SERIALDAQ_`
    /// environment overrides (e.g. `SERIALDAQ_BAUD_RATE=115200`).
    pub fn load(path: Option<&Path>) -> DaqResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("SERIALDAQ").separator("__"))
            .build()?;
        let cfg: AcquisitionConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn channel(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Distance => &self.distance,
            Channel::Light => &self.light,
            Channel::Temperature => &self.temperature,
            Channel::Intensity => &self.intensity,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelConfig {
        match channel {
            Channel::Distance => &mut self.distance,
            Channel::Light => &mut self.light,
            Channel::Temperature => &mut self.temperature,
            Channel::Intensity => &mut self.intensity,
        }
    }

    /// Effective sampling interval for a channel, in milliseconds.
    pub fn interval_ms(&self, channel: Channel) -> u64 {
        self.time_unit.interval_ms(self.channel(channel).interval)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_secs)
    }

    /// Reject logically invalid values before they reach the device or the
    /// gate. Engine state is untouched by a failed validation.
    pub fn validate(&self) -> DaqResult<()> {
        if self.baud_rate == 0 {
            return Err(DaqError::ConfigValidation("baud_rate must be > 0".into()));
        }
        if self.retention_window_secs == 0 {
            return Err(DaqError::ConfigValidation(
                "retention_window_secs must be > 0".into(),
            ));
        }
        for ch in Channel::ALL {
            let c = self.channel(ch);
            if c.interval == 0 {
                return Err(DaqError::ConfigValidation(format!(
                    "{ch} interval must be >= 1"
                )));
            }
            if c.filter_samples == 0 || c.filter_samples > MAX_FILTER_SAMPLES {
                return Err(DaqError::ConfigValidation(format!(
                    "{ch} filter_samples must be in 1..={MAX_FILTER_SAMPLES}"
                )));
            }
        }
        Ok(())
    }
}

/// Partial configuration change, applied atomically by the engine.
///
/// Fields left unset keep their current value. A set `time_unit` that
/// differs from the active one additionally clears all buffered history,
/// because timestamps are not comparable across a granularity change.
#[derive(Clone, Debug, Default)]
pub struct ConfigUpdate {
    pub time_unit: Option<TimeUnit>,
    pub intervals: Vec<(Channel, u32)>,
    pub filter_enabled: Vec<(Channel, bool)>,
    pub filter_samples: Vec<(Channel, u8)>,
}

impl ConfigUpdate {
    pub fn time_unit(unit: TimeUnit) -> Self {
        Self {
            time_unit: Some(unit),
            ..Self::default()
        }
    }

    pub fn interval(channel: Channel, value: u32) -> Self {
        Self {
            intervals: vec![(channel, value)],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time_unit.is_none()
            && self.intervals.is_empty()
            && self.filter_enabled.is_empty()
            && self.filter_samples.is_empty()
    }

    /// Fold this update into `cfg`. Returns true when the time unit
    /// actually changed.
    pub fn apply(&self, cfg: &mut AcquisitionConfig) -> bool {
        let mut unit_changed = false;
        if let Some(unit) = self.time_unit {
            unit_changed = unit != cfg.time_unit;
            cfg.time_unit = unit;
        }
        for &(ch, value) in &self.intervals {
            cfg.channel_mut(ch).interval = value;
        }
        for &(ch, on) in &self.filter_enabled {
            cfg.channel_mut(ch).filter_enabled = on;
        }
        for &(ch, n) in &self.filter_samples {
            cfg.channel_mut(ch).filter_samples = n;
        }
        unit_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = AcquisitionConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.baud_rate, 9_600);
        assert_eq!(cfg.interval_ms(Channel::Distance), 1_000);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = AcquisitionConfig::default();
        cfg.light.interval = 0;
        assert!(matches!(
            cfg.validate(),
            Err(DaqError::ConfigValidation(_))
        ));
    }

    #[test]
    fn filter_samples_bounds_rejected() {
        let mut cfg = AcquisitionConfig::default();
        cfg.distance.filter_samples = 0;
        assert!(cfg.validate().is_err());
        cfg.distance.filter_samples = MAX_FILTER_SAMPLES + 1;
        assert!(cfg.validate().is_err());
        cfg.distance.filter_samples = MAX_FILTER_SAMPLES;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn update_reports_unit_change() {
        let mut cfg = AcquisitionConfig::default();
        assert!(!ConfigUpdate::interval(Channel::Distance, 5).apply(&mut cfg));
        assert_eq!(cfg.distance.interval, 5);

        assert!(ConfigUpdate::time_unit(TimeUnit::Minutes).apply(&mut cfg));
        // Same unit again is not a change.
        assert!(!ConfigUpdate::time_unit(TimeUnit::Minutes).apply(&mut cfg));
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "port = \"COM7\"\ntime_unit = \"minutes\"\n\n[light]\ninterval = 3"
        )
        .unwrap();

        let cfg = AcquisitionConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.port, "COM7");
        assert_eq!(cfg.time_unit, TimeUnit::Minutes);
        assert_eq!(cfg.light.interval, 3);
        // Untouched fields keep defaults.
        assert_eq!(cfg.distance.interval, 1);
        assert_eq!(cfg.interval_ms(Channel::Light), 180_000);
    }
}
