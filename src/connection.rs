//! Serial transport and the reader thread.
//!
//! One `ConnectionManager` owns one open port. The port handle is cloned:
//! the original stays behind a mutex for outbound commands, the clone moves
//! into a dedicated reader thread that polls for bytes, reassembles lines,
//! decodes them, and feeds the shared store. Reads never block commands and
//! commands never block reads.
//!
//! Failure policy: a failed open is retried once after a short delay (USB
//! CDC ports often need a beat after enumeration); a failure mid-read is
//! fatal to the session and flips the engine into the error state.

use crate::buffer::{lock_store, SharedStore};
use crate::commands::confirm_status_echo;
use crate::config::AcquisitionConfig;
use crate::core::{ConnectionState, PendingCommand, StatusEvent};
use crate::decoder::{decode_line, Decoded, LineAccumulator};
use crate::engine::EngineShared;
use crate::error::{DaqError, DaqResult};
use log::{debug, info, warn};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delay before the single open retry.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(200);
/// Reader sleep when the OS buffer is empty.
const IDLE_POLL: Duration = Duration::from_millis(20);
/// How long `shutdown` waits for the reader thread before detaching.
pub(crate) const JOIN_WAIT: Duration = Duration::from_millis(500);

/// Read timeout on the port itself; the reader mostly sleeps on
/// `bytes_to_read`, so this only bounds the final blocking read.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct ConnectionManager {
    port_name: String,
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    reader: Option<JoinHandle<()>>,
    shared: Arc<EngineShared>,
}

impl ConnectionManager {
    /// Open the port and spawn the reader thread.
    pub fn connect(
        port_name: &str,
        baud_rate: u32,
        store: SharedStore,
        config: Arc<Mutex<AcquisitionConfig>>,
        shared: Arc<EngineShared>,
    ) -> DaqResult<Self> {
        let port = open_port(port_name, baud_rate)?;
        let reader_port = port.try_clone().map_err(|e| DaqError::TransportOpen {
            port: port_name.to_string(),
            reason: format!("clone for reader failed: {e}"),
        })?;
        info!("opened {port_name} at {baud_rate} baud");

        let thread_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || reader_loop(reader_port, store, config, thread_shared))
            .map_err(DaqError::Io)?;

        Ok(Self {
            port_name: port_name.to_string(),
            writer: Arc::new(Mutex::new(port)),
            reader: Some(reader),
            shared,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Send one command and wait out its settle pause.
    pub fn send_command(&self, cmd: &PendingCommand) -> DaqResult<()> {
        debug!("-> {}", cmd.text);
        self.write_bytes(format!("{}\r\n", cmd.text).as_bytes())?;
        thread::sleep(cmd.settle);
        Ok(())
    }

    /// Send a configuration sequence in order. Individual write failures
    /// are logged and skipped; the device re-echoes its real state via the
    /// trailing STATUS query, so one lost command is recoverable.
    pub fn send_sequence(&self, commands: &[PendingCommand]) {
        for cmd in commands {
            if let Err(e) = self.send_command(cmd) {
                warn!("command '{}' failed: {e}", cmd.text);
            }
        }
    }

    pub fn start_acquisition(&self) -> DaqResult<()> {
        debug!("-> a (start streaming)");
        self.write_bytes(b"a\r\n")
    }

    /// Best effort: by the time we stop, the link may already be gone.
    pub fn stop_acquisition(&self) {
        debug!("-> b (stop streaming)");
        if let Err(e) = self.write_bytes(b"b\r\n") {
            warn!("stop command failed: {e}");
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> DaqResult<()> {
        let mut port = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(|e| DaqError::TransportWrite(e.to_string()))
    }

    /// Stop the reader thread and release the port. Idempotent.
    pub fn shutdown(&mut self) {
        self.shared.set_running(false);
        if let Some(handle) = self.reader.take() {
            if crate::engine::join_bounded(handle, JOIN_WAIT) {
                debug!("reader thread for {} joined", self.port_name);
            } else {
                // Detached; it will exit on its next poll of the run flag.
                warn!("reader thread for {} slow to exit, detaching", self.port_name);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Open with one retry. On Unix the port is opened non-exclusively so a
/// monitoring tool holding the device open does not block us.
fn open_port(port_name: &str, baud_rate: u32) -> DaqResult<Box<dyn SerialPort>> {
    match try_open(port_name, baud_rate) {
        Ok(port) => Ok(port),
        Err(first) => {
            debug!("open of {port_name} failed ({first}), retrying once");
            thread::sleep(OPEN_RETRY_DELAY);
            try_open(port_name, baud_rate).map_err(|e| DaqError::TransportOpen {
                port: port_name.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(unix)]
fn try_open(port_name: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(READ_TIMEOUT)
        .open_native()?;
    port.set_exclusive(false)?;
    Ok(Box::new(port))
}

#[cfg(not(unix))]
fn try_open(port_name: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    serialport::new(port_name, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
}

/// Reader thread body: poll, reassemble, decode, ingest.
fn reader_loop(
    mut port: Box<dyn SerialPort>,
    store: SharedStore,
    config: Arc<Mutex<AcquisitionConfig>>,
    shared: Arc<EngineShared>,
) {
    let mut acc = LineAccumulator::new();
    let mut chunk = [0u8; 512];

    while shared.running() {
        let available = match port.bytes_to_read() {
            Ok(n) => n,
            Err(e) => {
                shared.fail(format!("serial poll failed: {e}"));
                break;
            }
        };

        if available == 0 {
            // Keep windows aging even when the board is quiet.
            lock_store(&store).evict_all(Instant::now());
            thread::sleep(IDLE_POLL);
            continue;
        }

        let n = match port.read(&mut chunk) {
            Ok(0) => {
                shared.fail("serial port closed (EOF)".to_string());
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                shared.fail(format!("serial read failed: {e}"));
                break;
            }
        };

        for line in acc.push(&chunk[..n]) {
            match decode_line(&line) {
                Ok(Decoded::Reading(reading)) => {
                    lock_store(&store).ingest(reading, Instant::now());
                }
                Ok(Decoded::Status(event)) => handle_status(&event, &config),
                Ok(Decoded::Empty) => {}
                Err(e) => {
                    shared.count_decode_error();
                    debug!("dropped line: {e}");
                }
            }
        }
    }

    if shared.state() == ConnectionState::Error {
        warn!("reader thread exiting after link failure");
    } else {
        debug!("reader thread exiting");
    }
}

/// Log device chatter; STATUS echoes additionally get checked against the
/// active configuration so a silently clamped value is visible.
fn handle_status(event: &StatusEvent, config: &Arc<Mutex<AcquisitionConfig>>) {
    match event {
        StatusEvent::Ok(t) => debug!("device ok: {t}"),
        StatusEvent::Info(t) => {
            info!("device: {t}");
            let cfg = match config.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            match confirm_status_echo(t, &cfg) {
                Some(true) => debug!("device confirmed configuration"),
                Some(false) => warn!("device status differs from requested configuration: {t}"),
                None => {}
            }
        }
        StatusEvent::Error(t) => warn!("device error: {t}"),
        StatusEvent::Debug(t) => debug!("device debug: {t}"),
    }
}
