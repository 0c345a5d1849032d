// Protocol constants for the DATAQ DI-2108

use std::time::Duration;

/// DATAQ Instruments vendor ID
pub const VID: u16 = 0x0683;

/// DI-2108 product ID
pub const PID: u16 = 0x2108;

/// The only interface exposed by the instrument
pub const INTERFACE: u8 = 0;

pub const ENDPOINT_OUT: u8 = 0x01;
pub const ENDPOINT_IN: u8 = 0x81;

/// Every command line ends with a single carriage return
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Trailing byte that marks the last packet of an echo
pub const ECHO_SENTINEL: u8 = 0x00;

/// Bounded wait for a command echo
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(400);

/// Default wait for one block of scan data
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay after a USB reset before the interface is claimed
pub const RESET_SETTLE: Duration = Duration::from_millis(50);

/// Literal payload of `info 0` on a healthy connection
pub const VENDOR_SIGNATURE: &str = "DATAQ";

/// Base clock of the sample rate divisor (Hz)
pub const SAMPLE_CLOCK_HZ: u32 = 60_000_000;

/// Number of positions in the scan list
pub const SCAN_LIST_CAPACITY: usize = 12;

/// Width of one sample slot in a data block (bytes)
pub const SLOT_WIDTH: usize = 2;

/// Analog inputs span ±10 V over the signed 16-bit range
pub const FULL_SCALE_VOLTS: f64 = 10.0;
pub const FULL_SCALE_COUNTS: f64 = 32768.0;

pub const SRATE_MIN: u16 = 375;
pub const DEC_MIN: u16 = 1;
pub const DEC_MAX: u16 = 512;

/// Seven digital ports, one bit each
pub const DIGITAL_PORT_MASK: u8 = 0x7F;

/// Highest `info` selector the firmware answers
pub const INFO_SELECTOR_MAX: u8 = 9;
