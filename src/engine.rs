//! Acquisition lifecycle and the public engine facade.
//!
//! [`AcquisitionEngine`] is the one object consumers hold. It owns the
//! shared store, tracks the connection state machine, and drives either a
//! physical serial link or the simulated source through the same ingest
//! path. All methods take `&mut self` except snapshots and state queries,
//! which only need the shared handles.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Acquiring -> Stopping -> Disconnected
//!                      |             |            |
//!                      +-------------+------------+--> Error --> (start again)
//! ```

use crate::buffer::{lock_store, ChannelStore, SharedStore};
#[cfg(feature = "serial")]
use crate::commands::build_command_sequence;
use crate::config::{AcquisitionConfig, ConfigUpdate};
#[cfg(feature = "serial")]
use crate::connection::ConnectionManager;
use crate::core::{Channel, ConnectionState, Reading};
use crate::error::{DaqError, DaqResult};
use crate::sim::SimulatedSource;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Simulator tick granularity. Short enough that millisecond intervals
/// stay usable, long enough to keep the thread mostly asleep.
const SIM_TICK: Duration = Duration::from_millis(10);

/// State shared between the engine facade and its worker threads.
pub(crate) struct EngineShared {
    state: Mutex<ConnectionState>,
    run: AtomicBool,
    last_error: Mutex<Option<String>>,
    decode_errors: AtomicU64,
    config_epoch: AtomicU64,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            run: AtomicBool::new(false),
            last_error: Mutex::new(None),
            decode_errors: AtomicU64::new(0),
            config_epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn set_state(&self, new: ConnectionState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != new {
            debug!("state {} -> {}", *guard, new);
            *guard = new;
        }
    }

    pub(crate) fn running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, on: bool) {
        self.run.store(on, Ordering::Release);
    }

    /// Record a fatal session failure: remember the message, flip to the
    /// error state, and ask every worker to stop.
    pub(crate) fn fail(&self, message: String) {
        warn!("session failed: {message}");
        match self.last_error.lock() {
            Ok(mut guard) => *guard = Some(message),
            Err(poisoned) => *poisoned.into_inner() = Some(message),
        }
        self.set_state(ConnectionState::Error);
        self.set_running(false);
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn count_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    fn bump_config(&self) {
        self.config_epoch.fetch_add(1, Ordering::Release);
    }

    fn config_epoch(&self) -> u64 {
        self.config_epoch.load(Ordering::Acquire)
    }
}

/// Join a worker thread, but give up after `wait`. Returns whether the
/// thread actually finished. A detached thread exits on its next check of
/// the run flag; blocking a caller on it buys nothing.
pub(crate) fn join_bounded(handle: JoinHandle<()>, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().is_ok()
}

/// Facade over the whole acquisition pipeline.
pub struct AcquisitionEngine {
    store: SharedStore,
    shared: Arc<EngineShared>,
    config: Arc<Mutex<AcquisitionConfig>>,
    #[cfg(feature = "serial")]
    link: Option<ConnectionManager>,
    sim: Option<JoinHandle<()>>,
}

impl AcquisitionEngine {
    pub fn new(config: AcquisitionConfig) -> DaqResult<Self> {
        config.validate()?;
        let store = Arc::new(Mutex::new(ChannelStore::from_config(&config)));
        Ok(Self {
            store,
            shared: Arc::new(EngineShared::new()),
            config: Arc::new(Mutex::new(config)),
            #[cfg(feature = "serial")]
            link: None,
            sim: None,
        })
    }

    /// Connect to the configured port, push the configuration to the
    /// device, and start streaming.
    #[cfg(feature = "serial")]
    pub fn start(&mut self) -> DaqResult<()> {
        self.guard_idle()?;
        let cfg = self.current_config();

        self.shared.set_state(ConnectionState::Connecting);
        self.shared.set_running(true);
        lock_store(&self.store).apply_config(&cfg, true);

        let link = match ConnectionManager::connect(
            &cfg.port,
            cfg.baud_rate,
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            Arc::clone(&self.shared),
        ) {
            Ok(link) => link,
            Err(e) => {
                // Caller decides whether to fall back to the simulator.
                self.shared.fail(e.to_string());
                return Err(e);
            }
        };
        self.shared.set_state(ConnectionState::Connected);

        link.send_sequence(&build_command_sequence(&cfg));
        if let Err(e) = link.start_acquisition() {
            // Dropping the link joins the reader; the error state tells the
            // caller this session is dead, same as a failed open.
            self.shared.fail(e.to_string());
            return Err(e);
        }
        self.link = Some(link);
        self.shared.set_state(ConnectionState::Acquiring);
        info!("acquiring from {}", cfg.port);
        Ok(())
    }

    #[cfg(not(feature = "serial"))]
    pub fn start(&mut self) -> DaqResult<()> {
        Err(DaqError::SerialFeatureDisabled)
    }

    /// Start the simulated source instead of a physical board. Readings
    /// flow through the same gate and buffers as serial data.
    pub fn start_simulated(&mut self) -> DaqResult<()> {
        self.guard_idle()?;
        let cfg = self.current_config();

        self.shared.set_state(ConnectionState::Connecting);
        self.shared.set_running(true);
        lock_store(&self.store).apply_config(&cfg, true);

        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.shared);
        let config = Arc::clone(&self.config);
        let sim = thread::Builder::new()
            .name("sim-source".to_string())
            .spawn(move || sim_loop(cfg, store, config, shared))
            .map_err(DaqError::Io)?;

        self.sim = Some(sim);
        self.shared.set_state(ConnectionState::Acquiring);
        info!("acquiring from simulated source");
        Ok(())
    }

    /// Stop streaming and release the transport. Safe to call at any time,
    /// including before any start and repeatedly.
    pub fn stop(&mut self) {
        if self.shared.state() == ConnectionState::Disconnected
            && self.sim.is_none()
            && !self.has_link()
        {
            return;
        }
        self.shared.set_state(ConnectionState::Stopping);

        #[cfg(feature = "serial")]
        if let Some(mut link) = self.link.take() {
            link.stop_acquisition();
            link.shutdown();
        }

        self.shared.set_running(false);
        if let Some(handle) = self.sim.take() {
            if !join_bounded(handle, Duration::from_millis(500)) {
                warn!("simulated source slow to exit, detaching");
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        info!("acquisition stopped");
    }

    /// Apply a partial configuration change atomically.
    ///
    /// Rejected with [`DaqError::EngineBusy`] during lifecycle transitions.
    /// On success the gates adopt the new intervals immediately; a time
    /// unit change also clears buffered history, and an active serial link
    /// gets the full command sequence re-sent.
    pub fn update_config(&mut self, update: &ConfigUpdate) -> DaqResult<()> {
        match self.shared.state() {
            ConnectionState::Connecting | ConnectionState::Stopping => {
                return Err(DaqError::EngineBusy)
            }
            _ => {}
        }
        if update.is_empty() {
            return Ok(());
        }

        // Validate on a copy so a rejected update leaves no trace.
        let mut candidate = self.current_config();
        let unit_changed = update.apply(&mut candidate);
        candidate.validate()?;

        {
            let mut guard = match self.config.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = candidate.clone();
        }
        lock_store(&self.store).apply_config(&candidate, unit_changed);
        if unit_changed {
            info!("time unit changed to {}, history cleared", candidate.time_unit);
        }

        #[cfg(feature = "serial")]
        if let Some(link) = &self.link {
            link.send_sequence(&build_command_sequence(&candidate));
        }
        self.shared.bump_config();
        Ok(())
    }

    /// Copy of one channel's current window, oldest first. Ages the
    /// buffers first so a quiet channel never shows stale points.
    pub fn snapshot(&self, channel: Channel) -> Vec<Reading> {
        let mut store = lock_store(&self.store);
        store.evict_all(Instant::now());
        store.snapshot(channel)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Count of malformed lines dropped since the engine was created.
    pub fn decode_errors(&self) -> u64 {
        self.shared.decode_errors()
    }

    pub fn current_config(&self) -> AcquisitionConfig {
        match self.config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn guard_idle(&self) -> DaqResult<()> {
        match self.shared.state() {
            ConnectionState::Disconnected | ConnectionState::Error => Ok(()),
            _ => Err(DaqError::EngineBusy),
        }
    }

    #[cfg(feature = "serial")]
    fn has_link(&self) -> bool {
        self.link.is_some()
    }

    #[cfg(not(feature = "serial"))]
    fn has_link(&self) -> bool {
        false
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Simulated-source thread body. Mirrors the serial reader: produce,
/// ingest through the gate, keep windows aged.
fn sim_loop(
    initial: AcquisitionConfig,
    store: SharedStore,
    config: Arc<Mutex<AcquisitionConfig>>,
    shared: Arc<EngineShared>,
) {
    let mut source = SimulatedSource::new(&initial, Instant::now());
    let mut seen_epoch = shared.config_epoch();

    while shared.running() {
        let epoch = shared.config_epoch();
        if epoch != seen_epoch {
            seen_epoch = epoch;
            let cfg = match config.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            source.reconfigure(&cfg, Instant::now());
        }

        let now = Instant::now();
        let readings = source.tick(now);
        {
            let mut store = lock_store(&store);
            for reading in readings {
                store.ingest(reading, now);
            }
            store.evict_all(now);
        }
        thread::sleep(SIM_TICK);
    }
    debug!("simulated source exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeUnit;

    fn sim_config() -> AcquisitionConfig {
        let mut cfg = AcquisitionConfig::default();
        cfg.time_unit = TimeUnit::Millis;
        cfg.distance.interval = 20;
        cfg.light.interval = 20;
        cfg.temperature.interval = 20;
        cfg.intensity.interval = 20;
        cfg
    }

    #[test]
    fn new_engine_is_disconnected() {
        let engine = AcquisitionEngine::new(sim_config()).unwrap();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.snapshot(Channel::Distance).is_empty());
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let mut cfg = sim_config();
        cfg.distance.interval = 0;
        assert!(AcquisitionEngine::new(cfg).is_err());
    }

    #[test]
    fn second_start_is_rejected_while_acquiring() {
        let mut engine = AcquisitionEngine::new(sim_config()).unwrap();
        engine.start_simulated().unwrap();
        assert!(matches!(
            engine.start_simulated(),
            Err(DaqError::EngineBusy)
        ));
        engine.stop();
    }

    #[test]
    fn session_failure_escalates_to_error_state() {
        let mut engine = AcquisitionEngine::new(sim_config()).unwrap();
        engine.start_simulated().unwrap();
        // Both start-time and mid-session transport failures go through
        // fail(): the state must flip to Error, not linger mid-machine.
        engine
            .shared
            .fail("serial write failed: broken pipe".to_string());
        assert_eq!(engine.state(), ConnectionState::Error);
        assert!(engine.last_error().unwrap().contains("broken pipe"));
        assert!(!engine.shared.running());
        engine.stop();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn error_state_allows_a_fresh_start() {
        let mut engine = AcquisitionEngine::new(sim_config()).unwrap();
        engine.shared.fail("failed to open serial port".to_string());
        assert_eq!(engine.state(), ConnectionState::Error);
        engine.start_simulated().unwrap();
        assert_eq!(engine.state(), ConnectionState::Acquiring);
        engine.stop();
    }

    #[test]
    fn update_during_stopping_or_connecting_is_busy() {
        let engine = AcquisitionEngine::new(sim_config()).unwrap();
        engine.shared.set_state(ConnectionState::Connecting);
        let mut engine = engine;
        let update = ConfigUpdate::interval(Channel::Distance, 5);
        assert!(matches!(
            engine.update_config(&update),
            Err(DaqError::EngineBusy)
        ));
    }

    #[test]
    fn rejected_update_leaves_config_untouched() {
        let mut engine = AcquisitionEngine::new(sim_config()).unwrap();
        let before = engine.current_config();
        let update = ConfigUpdate::interval(Channel::Distance, 0);
        assert!(engine.update_config(&update).is_err());
        assert_eq!(engine.current_config(), before);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut engine = AcquisitionEngine::new(sim_config()).unwrap();
        engine.update_config(&ConfigUpdate::default()).unwrap();
        assert_eq!(engine.current_config(), sim_config());
    }
}
