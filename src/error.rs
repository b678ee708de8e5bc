//! Custom error types for the acquisition engine.
//!
//! A single `thiserror` enum covers the whole taxonomy:
//!
//! - **`Decode`**: a malformed wire line. Always local — logged, counted,
//!   and dropped by the reader; never escalates.
//! - **`TransportOpen`**: the port could not be opened even after the
//!   retry. Surfaces to the caller, who decides whether to fall back to
//!   the simulated source.
//! - **`TransportWrite`**: a best-effort outbound write failed. Logged;
//!   a command sequence continues unless the link is confirmed gone.
//! - **`LinkLost`**: a mid-read failure. Fatal to the current session;
//!   the engine moves to the `Error` state and the reader thread exits.
//! - **`ConfigValidation`**: a value outside allowed bounds, rejected
//!   before any command is built; engine state is untouched.
//! - **`EngineBusy`**: a configuration update or start arrived while a
//!   lifecycle transition was in flight. Rejected, not queued.

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("malformed line: {0}")]
    Decode(String),

    #[error("failed to open serial port '{port}': {reason}")]
    TransportOpen { port: String, reason: String },

    #[error("serial write failed: {0}")]
    TransportWrite(String),

    #[error("serial link lost: {0}")]
    LinkLost(String),

    #[error("configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine is busy with a lifecycle transition")]
    EngineBusy,

    #[error("serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Decode("unknown tag 'FOO'".to_string());
        assert_eq!(err.to_string(), "malformed line: unknown tag 'FOO'");

        let err = DaqError::TransportOpen {
            port: "/dev/ttyACM0".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }
}
