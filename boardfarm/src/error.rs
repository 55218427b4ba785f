//! Error types for boardfarm.
//!
//! Errors are layered the same way the harness is: the console layer,
//! the device layer, inventory loading and the device manager. Every
//! error can be classified into one of the harness error kinds with
//! [`Error::kind`], which is what fatal reports print.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for boardfarm operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Console-level errors (spawn, timeout, EOF).
    #[error("Console error: {0}")]
    Console(#[from] ConsoleError),

    /// Device-level errors (boot, configuration, helpers).
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Inventory loading errors.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Device manager lookup errors.
    #[error("{0}")]
    Manager(#[from] ManagerError),

    /// A use case could not produce the expected outcome.
    #[error("Use case failed: {0}")]
    UseCase(String),

    /// Catch-all for violated harness invariants.
    #[error("{0}")]
    Boardfarm(String),
}

/// Console errors: everything that can go wrong while driving a child process.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The child process could not be spawned.
    #[error("Failed to spawn '{command}' for console '{console}': {message}")]
    SpawnFailed {
        console: String,
        command: String,
        message: String,
    },

    /// No expected pattern was seen before the deadline.
    #[error("Timeout on console '{console}' after {timeout:?} waiting for {patterns}")]
    Timeout {
        console: String,
        timeout: Duration,
        patterns: String,
    },

    /// The child closed its side of the terminal.
    #[error("EOF on console '{console}'")]
    Eof { console: String },

    /// The console was already closed.
    #[error("Console '{console}' is closed")]
    Closed { console: String },

    /// `expect` was called with nothing to wait for.
    #[error("expect() called with an empty pattern list on console '{console}'")]
    EmptyPatternList { console: String },

    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// I/O error while writing to or reading from the child.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Device-level errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// SCP session failed.
    #[error("SCP to '{device}' failed: {message}")]
    Scp { device: String, message: String },

    /// The device refused configuration.
    #[error("Configuration of '{device}' failed: {message}")]
    Configuration { device: String, message: String },

    /// The device did not reach a usable state.
    #[error("Boot of '{device}' failed: {message}")]
    Boot { device: String, message: String },

    /// Pre-test sanity failed.
    #[error("Contingency check on '{device}' failed: {message}")]
    Contingency { device: String, message: String },

    /// The operation is not available on this device class.
    #[error("'{operation}' is not supported by '{device}'")]
    NotSupported { device: String, operation: String },

    /// No console registered under the given role.
    #[error("Device '{device}' has no console named '{role}'")]
    UnknownConsole { device: String, role: String },

    /// A command produced output that could not be interpreted.
    #[error("Unexpected output from '{device}' for '{command}': {output}")]
    UnexpectedOutput {
        device: String,
        command: String,
        output: String,
    },

    /// tshark could not find the capture file.
    #[error("Capture file '{path}' not found on '{device}'")]
    CaptureFileNotFound { device: String, path: String },

    /// tshark rejected the display filter.
    #[error("Invalid display filter '{filter}' on '{device}'")]
    InvalidFilter { device: String, filter: String },
}

/// Inventory loading errors.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Failed to read the inventory file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed JSON.
    #[error("Malformed inventory: {0}")]
    Json(#[from] serde_json::Error),

    /// A record is missing a mandatory field.
    #[error("Device record #{index} is missing '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// Two records share a name.
    #[error("Duplicate device name '{name}'")]
    DuplicateName { name: String },

    /// No registered device class for the record's type.
    #[error("Unknown device type '{device_type}' for device '{name}'")]
    UnknownType { name: String, device_type: String },

    /// The record names an unknown connection type.
    #[error("Unknown connection type '{connection_type}' for device '{name}'")]
    UnknownConnectionType {
        name: String,
        connection_type: String,
    },

    /// The selected board is not part of the inventory.
    #[error("Board '{name}' not found in inventory")]
    UnknownBoard { name: String },

    /// A device record carries invalid values.
    #[error("Invalid record for '{name}': {message}")]
    InvalidRecord { name: String, message: String },
}

/// Device manager errors.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// More than one device satisfies a template when exactly one was asked for.
    #[error("More than 1 {template} devices found")]
    MultipleDevices { template: String },

    /// No device satisfies a template.
    #[error("No {template} device found")]
    NoDevice { template: String },

    /// No device with the given name.
    #[error("No device named '{name}'")]
    UnknownDevice { name: String },

    /// A device with this name is already registered.
    #[error("Device '{name}' is already registered")]
    AlreadyRegistered { name: String },
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        ConsoleError::InvalidPattern(e).into()
    }
}

impl Error {
    /// Classify the error into one of the harness error kinds.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Console(ConsoleError::Timeout { .. }) => "Timeout",
            Error::Console(ConsoleError::EmptyPatternList { .. })
            | Error::Console(ConsoleError::InvalidPattern(_)) => "BoardfarmException",
            Error::Console(_) => "TransportFailure",
            Error::Device(DeviceError::Scp { .. }) => "SCPFailure",
            Error::Device(DeviceError::Configuration { .. }) => "ConfigurationFailure",
            Error::Device(DeviceError::Boot { .. }) => "DeviceBootFailure",
            Error::Device(DeviceError::Contingency { .. }) => "ContingencyCheckError",
            Error::Device(DeviceError::NotSupported { .. }) => "NotSupportedError",
            Error::Device(_) => "BoardfarmException",
            Error::Inventory(_) => "BoardfarmException",
            Error::Manager(_) => "ValueError",
            Error::UseCase(_) => "UseCaseFailure",
            Error::Boardfarm(_) => "BoardfarmException",
        }
    }

    /// Only timeouts leave the console in a usable state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Console(ConsoleError::Timeout { .. }))
    }

    /// True for the console failures a recovery path is allowed to swallow.
    pub fn is_transport_or_timeout(&self) -> bool {
        matches!(
            self,
            Error::Console(
                ConsoleError::Timeout { .. }
                    | ConsoleError::Eof { .. }
                    | ConsoleError::Closed { .. }
                    | ConsoleError::SpawnFailed { .. }
                    | ConsoleError::Io(_)
            )
        )
    }
}

/// Result type alias using boardfarm's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let timeout: Error = ConsoleError::Timeout {
            console: "console".into(),
            timeout: Duration::from_secs(1),
            patterns: "[prompt]".into(),
        }
        .into();
        assert_eq!(timeout.kind(), "Timeout");
        assert!(timeout.is_recoverable());
        assert!(timeout.is_transport_or_timeout());

        let eof: Error = ConsoleError::Eof {
            console: "console".into(),
        }
        .into();
        assert_eq!(eof.kind(), "TransportFailure");
        assert!(!eof.is_recoverable());

        let scp: Error = DeviceError::Scp {
            device: "lan".into(),
            message: "exit status 1".into(),
        }
        .into();
        assert_eq!(scp.kind(), "SCPFailure");
        assert!(!scp.is_transport_or_timeout());
    }

    #[test]
    fn test_manager_message() {
        let err: Error = ManagerError::MultipleDevices {
            template: "LAN".into(),
        }
        .into();
        assert_eq!(err.to_string(), "More than 1 LAN devices found");
        assert_eq!(err.kind(), "ValueError");
    }
}
