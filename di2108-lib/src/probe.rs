use crate::calibration::{CalibrationModel, CalibrationPoint, CalibrationRecorder};
use crate::device::UsbTransport;
use crate::error::{Error, Result};
use crate::session::{Di2108, SessionConfig};
use crate::transport::Transport;
use crate::types::{Channel, FilterMode, FilterTarget, LedColor, PacketSize, ScanMode};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Slowest scan rate the divisor allows
pub const PROBE_SRATE: u16 = 65535;

/// CIC window used to smooth each probe reading
pub const PROBE_DECIMATION: u16 = 128;

/// One-shot reader for a displacement sensor wired to a single analog
/// input, with a linear calibration from volts to distance.
pub struct DistanceProbe<T: Transport = UsbTransport> {
    session: Di2108<T>,
    channel: Channel,
    calibration: CalibrationModel,
}

impl DistanceProbe<UsbTransport> {
    pub async fn open(channel: Channel, config: SessionConfig) -> Result<Self> {
        let session = Di2108::open(config).await?;
        Self::configure(session, channel).await
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}

impl<T: Transport> DistanceProbe<T> {
    /// Program the instrument for slow, heavily filtered single-channel
    /// readings: the channel alone in the scan list, blue LED, minimum scan
    /// rate, CIC filter over 128 samples, 16-byte packets.
    pub async fn configure(mut session: Di2108<T>, channel: Channel) -> Result<Self> {
        let Channel::Analog(index) = channel else {
            return Err(Error::config(format!("probe channel {channel} is not analog")));
        };
        channel.validate()?;

        session.add_channel(0, channel).await?;
        session.led(LedColor::Blue).await?;
        session.srate(PROBE_SRATE).await?;
        session.filter(FilterTarget::Channel(index), FilterMode::Cic).await?;
        session.dec(PROBE_DECIMATION).await?;
        session.set_packet_size(PacketSize::Bytes16).await?;
        info!(%channel, "Probe configured");

        Ok(Self {
            session,
            channel,
            calibration: CalibrationModel::default(),
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn calibration(&self) -> CalibrationModel {
        self.calibration
    }

    pub fn set_calibration(&mut self, model: CalibrationModel) {
        self.calibration = model;
    }

    /// Replace the calibration with a fit of the points in `path`.
    pub fn load_calibration(&mut self, path: impl AsRef<Path>) -> Result<CalibrationModel> {
        self.calibration = CalibrationModel::load_csv(path)?;
        Ok(self.calibration)
    }

    pub fn session_mut(&mut self) -> &mut Di2108<T> {
        &mut self.session
    }

    pub fn into_session(self) -> Di2108<T> {
        self.session
    }

    /// Start a normal scan, wait for the first block, stop, and decode the
    /// probe channel.
    pub async fn read_volts(&mut self) -> Result<f64> {
        self.session.start(ScanMode::Normal).await?;
        let block = match self.session.wait_for_block().await {
            Ok(block) => block,
            Err(err) => {
                // Leave the instrument idle before reporting the failure
                if let Err(stop_err) = self.session.stop().await {
                    warn!("Failed to stop scan after read error: {stop_err}");
                }
                return Err(err);
            }
        };
        self.session.stop().await?;
        block.volts_of(self.channel)
    }

    /// Calibrated distance.
    pub async fn reading(&mut self) -> Result<f64> {
        let volts = self.read_volts().await?;
        let distance = self.calibration.volts_to_distance(volts);
        debug!(volts, distance, "Probe reading");
        Ok(distance)
    }

    /// Take a reading at a known distance and append it to `recorder`.
    pub async fn record_point<W: Write>(
        &mut self,
        distance: f64,
        recorder: &mut CalibrationRecorder<W>,
    ) -> Result<CalibrationPoint> {
        let volts = self.read_volts().await?;
        let point = CalibrationPoint::new(distance, volts);
        recorder.record(point)?;
        info!(distance, volts, "Recorded calibration point");
        Ok(point)
    }
}
