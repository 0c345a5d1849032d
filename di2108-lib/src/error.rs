use std::io;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `di2108-lib` library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("USB device not found. Is the DATAQ DI-2108 connected?")]
    DeviceNotFound,

    #[error("DI-2108 interface is already claimed by another session")]
    DeviceBusy,

    #[error("USB error: {0}")]
    Usb(#[source] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("Timeout after {timeout:?} during {operation}")]
    Timeout { operation: &'static str, timeout: Duration },

    #[error("Protocol mismatch: expected echo starting with {expected:?}, got {actual:?}")]
    ProtocolMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Slot {slot} needs {required} bytes but the block holds {available}")]
    DecodeOutOfRange {
        slot: usize,
        required: usize,
        available: usize,
    },

    #[error("No sample block has been captured yet")]
    NoData,

    #[error("No scan is active; call start() first")]
    ScanNotActive,

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// True for the retryable "nothing arrived before the deadline" case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
