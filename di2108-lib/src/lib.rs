pub mod calibration;
pub mod command;
pub mod constants;
pub mod device;
pub mod error;
pub mod probe;
pub mod sample;
pub mod scan;
pub mod session;
pub mod transport;
pub mod types;

// Re-export the session types for easy access
pub use calibration::{CalibrationModel, CalibrationPoint, CalibrationRecorder};
pub use command::Command;
pub use device::{DeviceSummary, UsbTransport, list_devices};
pub use error::{Error, Result};
pub use probe::DistanceProbe;
pub use sample::{AnalogReading, SampleBlock};
pub use scan::ScanState;
pub use session::{Di2108, SessionConfig, sample_rate_hz};
pub use transport::Transport;
pub use types::{Channel, FilterMode, FilterTarget, LedColor, PacketSize, RateRange, ScanList, ScanListEntry, ScanMode};
