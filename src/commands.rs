//! Outbound configuration commands and STATUS echo parsing.
//!
//! The board is configured through short ASCII commands, one per line.
//! Ordering matters: the firmware interprets `T1:`/`T2:` values in the
//! currently active time unit, so `TU:` must land first. Each command gets
//! a settle pause because the firmware reprograms hardware timers in its
//! command handler and drops input arriving during the reload; the unit
//! change reprograms both timers and needs the longer pause.
//!
//! Only the distance and light channels have firmware-side timers and
//! filters; temperature and intensity are push-only streams with no
//! outbound commands.

use crate::config::AcquisitionConfig;
use crate::core::{Channel, PendingCommand, TimeUnit};
use std::time::Duration;

/// Pause after `TU:`; the firmware reloads both sampling timers.
pub const UNIT_SETTLE: Duration = Duration::from_millis(150);
/// Pause after every other configuration command.
pub const VALUE_SETTLE: Duration = Duration::from_millis(50);

/// Build the full synchronization sequence for a configuration.
///
/// Order: time unit, both timer periods, both filter toggles, both filter
/// window sizes, then a `STATUS` query so the device echoes back what it
/// actually applied.
pub fn build_command_sequence(cfg: &AcquisitionConfig) -> Vec<PendingCommand> {
    let mut seq = Vec::with_capacity(8);
    seq.push(PendingCommand::new(
        format!("TU:{}", cfg.time_unit.wire_letter()),
        UNIT_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("T1:{}", cfg.distance.interval),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("T2:{}", cfg.light.interval),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("FT:{}", u8::from(cfg.distance.filter_enabled)),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("FL:{}", u8::from(cfg.light.filter_enabled)),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("ST:{}", cfg.distance.filter_samples),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new(
        format!("SL:{}", cfg.light.filter_samples),
        VALUE_SETTLE,
    ));
    seq.push(PendingCommand::new("STATUS", VALUE_SETTLE));
    seq
}

/// Parsed `INFO:STATUS:` echo from the device.
///
/// Wire form: `STATUS:T1=5,T2=1,TU=s,FT=1,FP=0,ST=10,SP=10,RUN=1`.
/// The firmware's echo keys differ from the command names: `FT`/`FP` are
/// the two filter enables (set by `FT:`/`FL:`), `ST`/`SP` the two filter
/// window sizes (set by `ST:`/`SL:`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceStatus {
    pub t1: u32,
    pub t2: u32,
    pub time_unit: TimeUnit,
    pub filter_distance: bool,
    pub filter_light: bool,
    pub samples_distance: u8,
    pub samples_light: u8,
    pub running: bool,
}

impl DeviceStatus {
    /// Parse the payload of an `INFO:` line. Returns `None` when the line
    /// is not a STATUS echo or a field is missing or malformed.
    pub fn parse(info_payload: &str) -> Option<Self> {
        let body = info_payload.strip_prefix("STATUS:")?;
        let mut t1 = None;
        let mut t2 = None;
        let mut tu = None;
        let mut ft = None;
        let mut fp = None;
        let mut st = None;
        let mut sp = None;
        let mut run = None;
        for pair in body.split(',') {
            let (key, value) = pair.trim().split_once('=')?;
            match key {
                "T1" => t1 = value.parse::<u32>().ok(),
                "T2" => t2 = value.parse::<u32>().ok(),
                "TU" => tu = value.chars().next().and_then(TimeUnit::from_wire),
                "FT" => ft = Some(value == "1"),
                "FP" => fp = Some(value == "1"),
                "ST" => st = value.parse::<u8>().ok(),
                "SP" => sp = value.parse::<u8>().ok(),
                "RUN" => run = Some(value == "1"),
                _ => {} // unknown keys from newer firmware are fine
            }
        }
        Some(Self {
            t1: t1?,
            t2: t2?,
            time_unit: tu?,
            filter_distance: ft?,
            filter_light: fp?,
            samples_distance: st?,
            samples_light: sp?,
            running: run?,
        })
    }

    /// Whether the echoed state matches what we asked for. Used to log a
    /// warning when the device silently clamped or ignored a value.
    pub fn matches(&self, cfg: &AcquisitionConfig) -> bool {
        self.t1 == cfg.distance.interval
            && self.t2 == cfg.light.interval
            && self.time_unit == cfg.time_unit
            && self.filter_distance == cfg.channel(Channel::Distance).filter_enabled
            && self.filter_light == cfg.channel(Channel::Light).filter_enabled
            && self.samples_distance == cfg.distance.filter_samples
            && self.samples_light == cfg.light.filter_samples
    }
}

/// Check an `INFO:` payload against the active configuration.
///
/// Returns `None` for ordinary info chatter, `Some(true)` when the payload
/// is a STATUS echo agreeing with `cfg`, `Some(false)` when the device
/// reports something else (it clamps rather than rejects, so a mismatch
/// means a value was silently adjusted).
pub fn confirm_status_echo(info_payload: &str, cfg: &AcquisitionConfig) -> Option<bool> {
    DeviceStatus::parse(info_payload).map(|status| status.matches(cfg))
}
