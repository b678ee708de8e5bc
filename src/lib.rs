//! Acquisition engine for a serial-attached sensor board.
//!
//! The board streams `TAG:VALUE` ASCII lines at 9600 baud; this crate owns
//! everything between the raw byte stream and the consumer that draws or
//! logs the data.
//!
//! # Data Flow
//!
//! ```text
//! serial link --> reader thread --> decoder --> gate --> buffers --> snapshot()
//!                      ^                                    ^
//!                      |                                    |
//!               ConnectionManager                   SimulatedSource
//! ```
//!
//! Consumers drive the engine through [`engine::AcquisitionEngine`]: start an
//! acquisition against a physical port (or the simulated source when no board
//! is attached), snapshot the per-channel buffers on their own refresh
//! cadence, and stop when done.

pub mod buffer;
pub mod commands;
pub mod config;
#[cfg(feature = "serial")]
pub mod connection;
pub mod core;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod gate;
pub mod sim;

pub use engine::AcquisitionEngine;
pub use error::{DaqError, DaqResult};
