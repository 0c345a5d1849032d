//! Enumerated argument types of the DI-2108 command set and the scan list.
//!
//! Every table the firmware documents (packet sizes, scan modes, LED colours,
//! digital rate ranges) lives here as an enum with an explicit wire value, so
//! nothing else in the crate deals in magic numbers.

use crate::constants::{DIGITAL_PORT_MASK, SCAN_LIST_CAPACITY};
use crate::error::{Error, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

/// Byte size of each `ps` argument, indexed by the argument value.
const PACKET_SIZE_BYTES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

/// USB bulk chunk size used for every read until the next `ps` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketSize {
    #[strum(to_string = "16 bytes")]
    Bytes16 = 0,
    #[strum(to_string = "32 bytes")]
    Bytes32 = 1,
    #[default]
    #[strum(to_string = "64 bytes")]
    Bytes64 = 2,
    #[strum(to_string = "128 bytes")]
    Bytes128 = 3,
    #[strum(to_string = "256 bytes")]
    Bytes256 = 4,
    #[strum(to_string = "512 bytes")]
    Bytes512 = 5,
    #[strum(to_string = "1024 bytes")]
    Bytes1024 = 6,
    #[strum(to_string = "2048 bytes")]
    Bytes2048 = 7,
}

impl PacketSize {
    pub const ALL: [PacketSize; 8] = [
        PacketSize::Bytes16,
        PacketSize::Bytes32,
        PacketSize::Bytes64,
        PacketSize::Bytes128,
        PacketSize::Bytes256,
        PacketSize::Bytes512,
        PacketSize::Bytes1024,
        PacketSize::Bytes2048,
    ];

    /// The argument value sent with `ps`
    pub fn index(self) -> u8 {
        self.into()
    }

    /// Chunk length in bytes
    pub fn bytes(self) -> usize {
        PACKET_SIZE_BYTES[usize::from(self.index())]
    }

    /// Look up the packet size whose chunk length is exactly `bytes`.
    pub fn from_bytes(bytes: usize) -> Result<Self> {
        PACKET_SIZE_BYTES
            .iter()
            .position(|&size| size == bytes)
            .and_then(|index| PacketSize::try_from(index as u8).ok())
            .ok_or_else(|| Error::config(format!("{bytes} is not a supported packet size")))
    }
}

/// Clock source for a scan session (`start` argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ScanMode {
    /// Paced by `srate`/`dec`
    Normal = 0,
    /// Paced by edges on the "Ext Trig" input (D6)
    External = 2,
    /// One burst of the whole scan list at 1 kHz per channel
    Immediate = 3,
}

/// Acquisition mode of an analog channel (`filter` argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FilterMode {
    LastPoint = 0,
    #[strum(to_string = "CIC")]
    Cic = 1,
    Maximum = 2,
    Minimum = 3,
}

/// Which analog channels a `filter` command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Channel(u8),
    All,
}

impl fmt::Display for FilterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTarget::Channel(index) => write!(f, "{index}"),
            FilterTarget::All => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LedColor {
    Off = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Yellow = 6,
    White = 7,
}

impl LedColor {
    pub const ALL: [LedColor; 8] = [
        LedColor::Off,
        LedColor::Blue,
        LedColor::Green,
        LedColor::Cyan,
        LedColor::Red,
        LedColor::Magenta,
        LedColor::Yellow,
        LedColor::White,
    ];
}

/// Full-scale range of the digital rate channel. Sent in the high byte of
/// the `slist` configuration word.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum RateRange {
    #[strum(to_string = "50 kHz")]
    Hz50000 = 1,
    #[strum(to_string = "20 kHz")]
    Hz20000 = 2,
    #[strum(to_string = "10 kHz")]
    Hz10000 = 3,
    #[strum(to_string = "5 kHz")]
    Hz5000 = 4,
    #[strum(to_string = "2 kHz")]
    Hz2000 = 5,
    #[strum(to_string = "1 kHz")]
    Hz1000 = 6,
    #[strum(to_string = "500 Hz")]
    Hz500 = 7,
    #[strum(to_string = "200 Hz")]
    Hz200 = 8,
    #[strum(to_string = "100 Hz")]
    Hz100 = 9,
    #[strum(to_string = "50 Hz")]
    Hz50 = 10,
    #[strum(to_string = "20 Hz")]
    Hz20 = 11,
    #[strum(to_string = "10 Hz")]
    Hz10 = 12,
}

impl RateRange {
    pub fn as_hz(&self) -> u32 {
        match self {
            RateRange::Hz50000 => 50_000,
            RateRange::Hz20000 => 20_000,
            RateRange::Hz10000 => 10_000,
            RateRange::Hz5000 => 5_000,
            RateRange::Hz2000 => 2_000,
            RateRange::Hz1000 => 1_000,
            RateRange::Hz500 => 500,
            RateRange::Hz200 => 200,
            RateRange::Hz100 => 100,
            RateRange::Hz50 => 50,
            RateRange::Hz20 => 20,
            RateRange::Hz10 => 10,
        }
    }
}

/// Channel selector of one scan-list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Analog input 0-7
    Analog(u8),
    /// All seven digital inputs as one bitmask
    DigitalIn,
    /// Frequency on the rate input, scaled to the given range
    DigitalRate(RateRange),
    /// Onboard counter
    DigitalCount,
    /// Unused position
    Ignore,
}

impl Channel {
    pub const ANALOG_0: Channel = Channel::Analog(0);
    pub const ANALOG_1: Channel = Channel::Analog(1);
    pub const ANALOG_2: Channel = Channel::Analog(2);
    pub const ANALOG_3: Channel = Channel::Analog(3);
    pub const ANALOG_4: Channel = Channel::Analog(4);
    pub const ANALOG_5: Channel = Channel::Analog(5);
    pub const ANALOG_6: Channel = Channel::Analog(6);
    pub const ANALOG_7: Channel = Channel::Analog(7);

    const DIGITAL_IN: u16 = 8;
    const DIGITAL_RATE: u16 = 9;
    const DIGITAL_COUNT: u16 = 10;
    const IGNORE: u16 = 0xFF;

    /// Checked constructor for analog inputs.
    pub fn analog(index: u8) -> Result<Self> {
        let channel = Channel::Analog(index);
        channel.validate()?;
        Ok(channel)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Channel::Analog(index) if *index > 7 => {
                Err(Error::config(format!("analog channel {index} is out of range 0-7")))
            }
            _ => Ok(()),
        }
    }

    /// The configuration word sent as the second `slist` argument.
    pub fn config_word(&self) -> u16 {
        match self {
            Channel::Analog(index) => u16::from(*index),
            Channel::DigitalIn => Self::DIGITAL_IN,
            Channel::DigitalRate(range) => Self::DIGITAL_RATE | (u16::from(u8::from(*range)) << 8),
            Channel::DigitalCount => Self::DIGITAL_COUNT,
            Channel::Ignore => Self::IGNORE,
        }
    }

    pub fn is_analog(&self) -> bool {
        matches!(self, Channel::Analog(_))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Analog(index) => write!(f, "A{index}"),
            Channel::DigitalIn => f.write_str("DIN"),
            Channel::DigitalRate(range) => write!(f, "RATE({range})"),
            Channel::DigitalCount => f.write_str("COUNT"),
            Channel::Ignore => f.write_str("-"),
        }
    }
}

/// One registered scan-list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanListEntry {
    pub position: u8,
    pub channel: Channel,
}

impl ScanListEntry {
    pub fn new(position: u8, channel: Channel) -> Result<Self> {
        if usize::from(position) >= SCAN_LIST_CAPACITY {
            return Err(Error::config(format!(
                "scan list position {position} is out of range 0-{}",
                SCAN_LIST_CAPACITY - 1
            )));
        }
        channel.validate()?;
        Ok(Self { position, channel })
    }
}

/// Scan-list registrations in the order they were made.
///
/// The slot layout of a sample block follows registration order, not
/// position or channel number. Re-registering a position overwrites that
/// entry in place and keeps its slot. `Ignore` entries produce no slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanList {
    entries: Vec<ScanListEntry>,
}

impl ScanList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ScanListEntry) {
        match self.entries.iter_mut().find(|e| e.position == entry.position) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[ScanListEntry] {
        &self.entries
    }

    /// Entries that occupy a slot, in slot order.
    pub fn slots(&self) -> impl Iterator<Item = &ScanListEntry> {
        self.entries.iter().filter(|e| e.channel != Channel::Ignore)
    }

    pub fn slot_count(&self) -> usize {
        self.slots().count()
    }

    /// Slot index carrying `channel`, if registered.
    pub fn slot_of(&self, channel: Channel) -> Option<usize> {
        self.slots().position(|e| e.channel == channel)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Validate a seven-port digital bitmask (`dout`, `endo`).
pub(crate) fn check_port_mask(verb: &str, mask: u8) -> Result<()> {
    if mask & !DIGITAL_PORT_MASK != 0 {
        return Err(Error::config(format!(
            "{verb} mask {mask} exceeds the seven digital ports (max {DIGITAL_PORT_MASK})"
        )));
    }
    Ok(())
}
