//! End-to-end tests driving the engine against the simulated source.

use serial_daq::config::{AcquisitionConfig, ConfigUpdate};
use serial_daq::core::{Channel, ConnectionState, TimeUnit};
use serial_daq::AcquisitionEngine;
use std::thread;
use std::time::Duration;

fn fast_config() -> AcquisitionConfig {
    let mut cfg = AcquisitionConfig::default();
    cfg.time_unit = TimeUnit::Millis;
    cfg.distance.interval = 20;
    cfg.light.interval = 20;
    cfg.temperature.interval = 20;
    cfg.intensity.interval = 20;
    cfg.retention_window_secs = 60;
    cfg
}

fn plausible_range(channel: Channel) -> (f64, f64) {
    match channel {
        Channel::Distance => (10.0, 150.0),
        Channel::Light => (0.0, 100.0),
        Channel::Temperature => (15.0, 40.0),
        Channel::Intensity => (0.0, 1_000.0),
    }
}

#[test]
fn simulated_run_fills_every_channel() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    engine.start_simulated().unwrap();
    assert_eq!(engine.state(), ConnectionState::Acquiring);

    thread::sleep(Duration::from_millis(300));

    for channel in Channel::ALL {
        let readings = engine.snapshot(channel);
        assert!(
            !readings.is_empty(),
            "no readings on {channel} after 300ms at 20ms intervals"
        );
        let (lo, hi) = plausible_range(channel);
        for r in &readings {
            assert_eq!(r.channel, channel);
            assert!(r.value >= lo && r.value <= hi, "{r:?} out of range");
        }
        // Oldest first.
        for pair in readings.windows(2) {
            assert!(pair[0].received_at <= pair[1].received_at);
        }
    }
    assert_eq!(engine.decode_errors(), 0);

    engine.stop();
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

#[test]
fn stop_is_idempotent() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    // Before any start.
    engine.stop();
    assert_eq!(engine.state(), ConnectionState::Disconnected);

    engine.start_simulated().unwrap();
    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

#[test]
fn restart_after_stop_works() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    engine.start_simulated().unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop();

    engine.start_simulated().unwrap();
    assert_eq!(engine.state(), ConnectionState::Acquiring);
    thread::sleep(Duration::from_millis(100));
    assert!(!engine.snapshot(Channel::Distance).is_empty());
    engine.stop();
}

#[test]
fn interval_update_applies_while_running() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    engine.start_simulated().unwrap();
    thread::sleep(Duration::from_millis(100));

    // Slow the distance channel way down; same unit, so history survives.
    let before = engine.snapshot(Channel::Distance).len();
    assert!(before > 0);
    engine
        .update_config(&ConfigUpdate::interval(Channel::Distance, 10_000))
        .unwrap();
    assert!(engine.snapshot(Channel::Distance).len() >= before);
    assert_eq!(engine.current_config().distance.interval, 10_000);

    engine.stop();
}

#[test]
fn time_unit_change_clears_history() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    engine.start_simulated().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(!engine.snapshot(Channel::Light).is_empty());

    engine
        .update_config(&ConfigUpdate::time_unit(TimeUnit::Minutes))
        .unwrap();

    // History was dropped; with minute-scale intervals at most the single
    // first-admission sample per channel can have landed since.
    let after = engine.snapshot(Channel::Light).len();
    assert!(after <= 1, "expected cleared history, found {after} readings");
    assert_eq!(engine.current_config().time_unit, TimeUnit::Minutes);

    engine.stop();
}

#[test]
fn dropping_the_engine_stops_the_source() {
    let mut engine = AcquisitionEngine::new(fast_config()).unwrap();
    engine.start_simulated().unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(engine);
    // Nothing to assert beyond "drop returns"; a hung join would stall
    // the test harness here.
}
