use crate::command::{Command, EchoAssembler};
use crate::constants::{COMMAND_TIMEOUT, DIGITAL_PORT_MASK, POLL_TIMEOUT, SAMPLE_CLOCK_HZ, VENDOR_SIGNATURE};
use crate::device::{DeviceSummary, UsbTransport};
use crate::error::{Error, Result};
use crate::scan::ScanController;
use crate::transport::Transport;
use crate::types::{Channel, FilterMode, FilterTarget, LedColor, PacketSize, ScanList, ScanListEntry};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on scan packets discarded while waiting for a `stop` echo.
const MAX_DRAINED_PACKETS: usize = 64;

/// Connection settings for a [`Di2108`] session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for a complete command echo
    pub command_timeout: Duration,
    /// Default wait per [`Di2108::read_block`] attempt
    pub poll_timeout: Duration,
    /// Packet size negotiated right after opening
    pub initial_packet_size: PacketSize,
    pub reset_on_open: bool,
    /// Pick a specific instrument when several are attached
    pub serial_number: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: COMMAND_TIMEOUT,
            poll_timeout: POLL_TIMEOUT,
            initial_packet_size: PacketSize::Bytes64,
            reset_on_open: true,
            serial_number: None,
        }
    }
}

impl SessionConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_packet_size(mut self, size: PacketSize) -> Self {
        self.initial_packet_size = size;
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Don't reset the device on open (resets can be disruptive on macOS)
    pub fn skip_reset(mut self) -> Self {
        self.reset_on_open = false;
        self
    }
}

/// Scan rate per scan-list element for a given `srate` divisor and `dec`
/// factor.
pub fn sample_rate_hz(srate: u16, dec: u16) -> f64 {
    f64::from(SAMPLE_CLOCK_HZ) / (f64::from(srate) * f64::from(dec.max(1)))
}

/// Turn a timeout into `None` and pass everything else through.
pub fn tolerate_timeout<R>(result: Result<R>, what: &str) -> Result<Option<R>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_timeout() => {
            warn!("{what}: {err}; continuing");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// A connection to one DATAQ DI-2108.
///
/// Owns the transport, the active packet size and the scan list. Every
/// operation takes `&mut self`, so commands are issued strictly one at a
/// time.
pub struct Di2108<T: Transport = UsbTransport> {
    pub(crate) transport: T,
    pub(crate) config: SessionConfig,
    pub(crate) packet_size: PacketSize,
    pub(crate) scan_list: ScanList,
    pub(crate) scan: ScanController,
}

impl Di2108<UsbTransport> {
    /// Open the first matching instrument and negotiate the initial
    /// packet size.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let transport = UsbTransport::open(config.serial_number.as_deref(), config.reset_on_open).await?;
        Self::with_transport(transport, config).await
    }

    pub fn device(&self) -> &DeviceSummary {
        self.transport.summary()
    }

    /// Stop any scan in progress, reset the instrument and hand the
    /// interface back to the kernel driver.
    pub async fn close(mut self) -> Result<()> {
        if self.scan.is_scanning() {
            self.stop().await?;
        }
        self.transport.close()
    }
}

impl<T: Transport> Di2108<T> {
    /// Wrap a transport without talking to the device. The packet size is
    /// assumed to be `config.initial_packet_size`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            packet_size: config.initial_packet_size,
            config,
            scan_list: ScanList::new(),
            scan: ScanController::default(),
        }
    }

    /// Wrap a transport and issue `ps` for the configured initial size.
    pub async fn with_transport(transport: T, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(transport, config);
        let size = session.config.initial_packet_size;
        session.set_packet_size(size).await?;
        Ok(session)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn packet_size(&self) -> PacketSize {
        self.packet_size
    }

    pub fn scan_list(&self) -> &ScanList {
        &self.scan_list
    }

    // --- framing ---

    pub(crate) async fn send(&mut self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        debug!(%command, "Sending command");
        let written = self.transport.write(frame.clone(), self.config.command_timeout).await?;
        if written != frame.len() {
            warn!(%command, written, expected = frame.len(), "Short command write");
        }
        Ok(())
    }

    /// Read one echo within the command deadline and correlate it with
    /// `expected`. With `skip_scan_data`, packets arriving before the echo
    /// that don't start with the verb are treated as leftover scan data.
    pub(crate) async fn read_echo(&mut self, expected: &str, verb: &str, skip_scan_data: bool) -> Result<String> {
        let limit = self.config.command_timeout;
        let deadline = Instant::now() + limit;
        let mut assembler = EchoAssembler::new(self.packet_size);
        let mut drained = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    operation: "command echo",
                    timeout: limit,
                });
            }
            let chunk = self.transport.read(self.packet_size.bytes(), remaining).await?;

            if skip_scan_data && assembler.packets() == 0 && !chunk.starts_with(verb.as_bytes()) {
                drained += 1;
                debug!(drained, len = chunk.len(), "Discarding scan data ahead of echo");
                if drained > MAX_DRAINED_PACKETS {
                    return Err(Error::ProtocolMismatch {
                        expected: expected.to_string(),
                        actual: String::from_utf8_lossy(&chunk).into_owned(),
                    });
                }
                continue;
            }

            if assembler.push(&chunk) {
                break;
            }
        }

        assembler.finish(Some(expected))
    }

    /// Send any echoing command and return the payload after the echo.
    pub async fn execute(&mut self, command: Command) -> Result<String> {
        if !command.expects_echo() {
            return Err(Error::config(format!("{command} never echoes; use start()")));
        }
        self.send(&command).await?;
        self.read_echo(&command.echo_prefix(), command.verb(), false).await
    }

    // --- device verbs ---

    /// Query one of the `info` fields (0-9).
    pub async fn info(&mut self, selector: u8) -> Result<String> {
        self.execute(Command::Info(selector)).await
    }

    /// Issue `ps`. True when the echo confirms the requested size.
    pub async fn ps(&mut self, size: PacketSize) -> Result<bool> {
        let command = Command::Ps(size);
        self.send(&command).await?;
        let echoed = self.read_echo(command.verb(), command.verb(), false).await?;
        Ok(echoed == size.index().to_string())
    }

    /// Register one scan-list position.
    pub async fn slist(&mut self, entry: ScanListEntry) -> Result<String> {
        let echo = self.execute(Command::Slist(entry)).await?;
        self.scan_list.register(entry);
        Ok(echo)
    }

    /// Set the sample rate divisor (375-65535).
    pub async fn srate(&mut self, divisor: u16) -> Result<String> {
        self.execute(Command::Srate(divisor)).await
    }

    pub async fn filter(&mut self, target: FilterTarget, mode: FilterMode) -> Result<String> {
        self.execute(Command::Filter { target, mode }).await
    }

    /// Set the decimation factor (1-512).
    pub async fn dec(&mut self, count: u16) -> Result<String> {
        self.execute(Command::Dec(count)).await
    }

    /// Set the moving-average factor.
    pub async fn ffl(&mut self, factor: u16) -> Result<String> {
        self.execute(Command::Ffl(factor)).await
    }

    pub async fn led(&mut self, color: LedColor) -> Result<String> {
        self.execute(Command::Led(color)).await
    }

    pub async fn dout(&mut self, mask: u8) -> Result<String> {
        self.execute(Command::Dout(mask)).await
    }

    /// Configure each digital port as input (0) or switch (1).
    pub async fn endo(&mut self, mask: u8) -> Result<String> {
        self.execute(Command::Endo(mask)).await
    }

    pub async fn din(&mut self) -> Result<String> {
        self.execute(Command::Din).await
    }

    /// Reset the onboard counter.
    pub async fn reset(&mut self) -> Result<String> {
        self.execute(Command::Reset).await
    }

    // --- derived operations ---

    pub async fn check_connection(&mut self) -> Result<bool> {
        Ok(self.info(0).await? == VENDOR_SIGNATURE)
    }

    pub async fn device_name(&mut self) -> Result<String> {
        self.info(1).await
    }

    /// Two hex bytes, e.g. `6516` for revision 1.01
    pub async fn firmware_revision(&mut self) -> Result<String> {
        self.info(2).await
    }

    /// Left-most 8 digits of the serial number
    pub async fn serial_number(&mut self) -> Result<String> {
        self.info(6).await
    }

    pub async fn sample_rate_divisor(&mut self) -> Result<u32> {
        let text = self.info(9).await?;
        text.parse().map_err(|_| Error::ProtocolMismatch {
            expected: "info 9 <integer>".to_string(),
            actual: text,
        })
    }

    /// Switch the packet size. The local size changes before `ps` goes out
    /// so the echo is already read in the new chunk size.
    pub async fn set_packet_size(&mut self, size: PacketSize) -> Result<bool> {
        info!(from = %self.packet_size, to = %size, "Setting packet size");
        self.packet_size = size;
        let agreed = self.ps(size).await?;
        if !agreed {
            warn!(%size, "Device did not confirm packet size");
        }
        Ok(agreed)
    }

    /// Register `channel` at `position` of the scan list.
    pub async fn add_channel(&mut self, position: u8, channel: Channel) -> Result<()> {
        let entry = ScanListEntry::new(position, channel)?;
        self.slist(entry).await?;
        Ok(())
    }

    /// State of the seven digital inputs.
    pub async fn digital_inputs(&mut self) -> Result<u8> {
        let text = self.din().await?;
        text.parse::<u8>()
            .ok()
            .filter(|value| value & !DIGITAL_PORT_MASK == 0)
            .ok_or(Error::ProtocolMismatch {
                expected: "din <0-127>".to_string(),
                actual: text,
            })
    }
}
