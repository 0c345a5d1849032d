//! Decoding of raw scan data.
//!
//! A block is a run of 2-byte little-endian slots, one per scan-list
//! registration in registration order. Analog slots are signed 16-bit
//! counts spanning ±10 V.

use crate::constants::{FULL_SCALE_COUNTS, FULL_SCALE_VOLTS, SLOT_WIDTH};
use crate::error::{Error, Result};
use crate::types::Channel;
use bytes::{Buf, Bytes};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Convert a signed slot value to volts.
pub fn counts_to_volts(counts: i16) -> f64 {
    FULL_SCALE_VOLTS * f64::from(counts) / FULL_SCALE_COUNTS
}

/// One block read from the instrument during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    data: Bytes,
    layout: Arc<[Channel]>,
    scan_id: u64,
}

/// A decoded analog slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalogReading {
    pub slot: usize,
    pub channel: Channel,
    pub volts: f64,
}

impl SampleBlock {
    /// A block with no channel layout attached; only slot-index access works.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_layout(data, Arc::from(Vec::new()), 0)
    }

    pub(crate) fn with_layout(data: impl Into<Bytes>, layout: Arc<[Channel]>, scan_id: u64) -> Self {
        Self {
            data: data.into(),
            layout,
            scan_id,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Which `start` produced this block. Increases with every scan.
    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    /// Channels carried by the slots, in slot order.
    pub fn layout(&self) -> &[Channel] {
        &self.layout
    }

    /// Number of complete slots present in the data.
    pub fn slots_available(&self) -> usize {
        self.data.len() / SLOT_WIDTH
    }

    /// Unsigned slot value, low byte first.
    pub fn channel_value(&self, slot: usize) -> Result<u16> {
        let out_of_range = |required| Error::DecodeOutOfRange {
            slot,
            required,
            available: self.data.len(),
        };
        let offset = slot.checked_mul(SLOT_WIDTH).ok_or_else(|| out_of_range(usize::MAX))?;
        let required = offset.checked_add(SLOT_WIDTH).ok_or_else(|| out_of_range(usize::MAX))?;
        if required > self.data.len() {
            return Err(out_of_range(required));
        }
        let mut raw = &self.data[offset..required];
        Ok(raw.get_u16_le())
    }

    /// Slot value as two's complement.
    pub fn signed_value(&self, slot: usize) -> Result<i16> {
        self.channel_value(slot).map(|value| value as i16)
    }

    pub fn analog_volts(&self, slot: usize) -> Result<f64> {
        self.signed_value(slot).map(counts_to_volts)
    }

    /// Slot index of `channel` according to the scan list in force when the
    /// block was captured.
    pub fn slot_of(&self, channel: Channel) -> Option<usize> {
        self.layout.iter().position(|&c| c == channel)
    }

    /// Volts of an analog channel looked up by identity.
    pub fn volts_of(&self, channel: Channel) -> Result<f64> {
        if !channel.is_analog() {
            return Err(Error::config(format!("{channel} is not an analog channel")));
        }
        let slot = self
            .slot_of(channel)
            .ok_or_else(|| Error::config(format!("{channel} is not in the scan list")))?;
        self.analog_volts(slot)
    }

    /// Every analog slot of the layout that fits in the block.
    pub fn analog_readings(&self) -> Vec<AnalogReading> {
        self.layout
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.is_analog())
            .filter_map(|(slot, &channel)| {
                self.analog_volts(slot).ok().map(|volts| AnalogReading { slot, channel, volts })
            })
            .collect()
    }
}

impl fmt::Display for SampleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan {} ({} bytes):", self.scan_id, self.data.len())?;
        for (slot, channel) in self.layout.iter().enumerate() {
            match (channel.is_analog(), self.channel_value(slot)) {
                (true, Ok(raw)) => write!(f, " {channel}={:.4} V", counts_to_volts(raw as i16))?,
                (false, Ok(raw)) => write!(f, " {channel}={raw}")?,
                (_, Err(_)) => write!(f, " {channel}=?")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_signed_boundaries() {
        let block = SampleBlock::new(vec![0xFF, 0x7F, 0x00, 0x80, 0x00, 0x00]);
        assert_eq!(block.channel_value(0).unwrap(), 0x7FFF);
        assert_eq!(block.signed_value(1).unwrap(), -32768);
        assert!(approx(block.analog_volts(0).unwrap(), 10.0 * 32767.0 / 32768.0));
        assert!(approx(block.analog_volts(1).unwrap(), -10.0));
        assert!(approx(block.analog_volts(2).unwrap(), 0.0));
    }

    #[test]
    fn test_low_byte_first() {
        let block = SampleBlock::new(vec![0x34, 0x12]);
        assert_eq!(block.channel_value(0).unwrap(), 0x1234);
        let negative = SampleBlock::new(vec![0xFF, 0xFF]);
        assert_eq!(negative.signed_value(0).unwrap(), -1);
    }

    #[test]
    fn test_out_of_range_slot() {
        let block = SampleBlock::new(vec![0x00, 0x00, 0x01]);
        assert_eq!(block.slots_available(), 1);
        match block.channel_value(1) {
            Err(Error::DecodeOutOfRange {
                slot,
                required,
                available,
            }) => {
                assert_eq!(slot, 1);
                assert_eq!(required, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected DecodeOutOfRange, got {other:?}"),
        }
        assert!(SampleBlock::new(Bytes::new()).analog_volts(0).is_err());
    }

    #[test]
    fn test_huge_slot_index_does_not_overflow() {
        let block = SampleBlock::new(vec![0u8; 16]);
        for slot in [usize::MAX, usize::MAX / 2 + 1, usize::MAX / 2] {
            assert!(
                matches!(
                    block.channel_value(slot),
                    Err(Error::DecodeOutOfRange { available: 16, .. })
                ),
                "slot {slot}"
            );
        }
        assert!(block.analog_volts(usize::MAX).is_err());
    }

    #[test]
    fn test_layout_lookup() {
        let layout: Arc<[Channel]> = Arc::from(vec![Channel::ANALOG_3, Channel::DigitalIn, Channel::ANALOG_0]);
        // A3 = +5 V, DIN = 0x55, A0 = -5 V
        let block = SampleBlock::with_layout(vec![0x00, 0x40, 0x55, 0x00, 0x00, 0xC0], layout, 7);
        assert_eq!(block.scan_id(), 7);
        assert!(approx(block.volts_of(Channel::ANALOG_3).unwrap(), 5.0));
        assert!(approx(block.volts_of(Channel::ANALOG_0).unwrap(), -5.0));
        assert!(block.volts_of(Channel::DigitalIn).is_err());
        assert!(block.volts_of(Channel::ANALOG_1).is_err());

        let readings = block.analog_readings();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].channel, Channel::ANALOG_3);
        assert_eq!(readings[1].slot, 2);
        assert_eq!(block.to_string(), "scan 7 (6 bytes): A3=5.0000 V DIN=85 A0=-5.0000 V");
    }
}
