//! Scan sequencing: `start` → poll [`Di2108::read_data`] → `stop`.
//!
//! `start` is the one command the instrument never echoes, so it is a plain
//! state transition here. Reading hands out each [`SampleBlock`] by value,
//! tagged with the scan that produced it; the session keeps only a copy of
//! the latest one, and forgets it when a new scan starts.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::sample::SampleBlock;
use crate::session::{Di2108, tolerate_timeout};
use crate::transport::Transport;
use crate::types::{Channel, ScanMode};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning(ScanMode),
}

#[derive(Debug, Default)]
pub(crate) struct ScanController {
    state: ScanState,
    scan_id: u64,
    layout: Option<Arc<[Channel]>>,
    latest: Option<SampleBlock>,
}

impl ScanController {
    pub(crate) fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning(_))
    }

    fn begin(&mut self, mode: ScanMode, layout: Arc<[Channel]>) -> u64 {
        self.scan_id += 1;
        self.state = ScanState::Scanning(mode);
        self.layout = Some(layout);
        self.latest = None;
        self.scan_id
    }

    fn end(&mut self) {
        self.state = ScanState::Idle;
    }

    fn record(&mut self, data: Bytes) -> SampleBlock {
        let layout = self.layout.clone().unwrap_or_else(|| Arc::from(Vec::new()));
        let block = SampleBlock::with_layout(data, layout, self.scan_id);
        self.latest = Some(block.clone());
        // An immediate scan is a single burst
        if self.state == ScanState::Scanning(ScanMode::Immediate) {
            self.end();
        }
        block
    }
}

impl<T: Transport> Di2108<T> {
    pub fn scan_state(&self) -> ScanState {
        self.scan.state
    }

    /// Begin scanning the registered scan list. No echo is read. Starting
    /// again while already scanning restarts the scan.
    pub async fn start(&mut self, mode: ScanMode) -> Result<()> {
        let layout: Arc<[Channel]> = self.scan_list.slots().map(|entry| entry.channel).collect();
        if layout.is_empty() {
            warn!("Starting a scan with an empty scan list");
        }
        self.send(&Command::Start(mode)).await?;
        let scan_id = self.scan.begin(mode, layout);
        info!(%mode, scan_id, slots = self.scan_list.slot_count(), "Scan started");
        Ok(())
    }

    /// One bounded read of a packet-size block of scan data.
    ///
    /// `Ok(None)` means nothing arrived before `timeout`; callers can simply
    /// poll again. Transfer failures are still reported as errors.
    pub async fn read_data(&mut self, timeout: Duration) -> Result<Option<SampleBlock>> {
        if !self.scan.is_scanning() {
            return Err(Error::ScanNotActive);
        }
        let read = self.transport.read(self.packet_size.bytes(), timeout).await;
        match tolerate_scan_timeout(read)? {
            Some(data) if !data.is_empty() => {
                trace!(len = data.len(), "Scan data received");
                Ok(Some(self.scan.record(data)))
            }
            _ => Ok(None),
        }
    }

    /// [`read_data`](Self::read_data) with the configured poll timeout.
    pub async fn read_block(&mut self) -> Result<Option<SampleBlock>> {
        let timeout = self.config.poll_timeout;
        self.read_data(timeout).await
    }

    /// Poll until a block arrives.
    pub async fn wait_for_block(&mut self) -> Result<SampleBlock> {
        loop {
            if let Some(block) = self.read_block().await? {
                return Ok(block);
            }
        }
    }

    /// The most recent block of the current (or last) scan.
    pub fn latest_block(&self) -> Result<&SampleBlock> {
        self.scan.latest.as_ref().ok_or(Error::NoData)
    }

    /// Stop scanning. Safe to call when idle.
    ///
    /// A missing echo is tolerated and yields `Ok(None)`; an echo that
    /// doesn't correlate is still an error.
    pub async fn stop(&mut self) -> Result<Option<String>> {
        let was_scanning = self.scan.is_scanning();
        let command = Command::Stop;
        let sent = tolerate_timeout(self.send(&command).await, "stop command")?;
        self.scan.end();
        info!("Scan stopped");
        if sent.is_none() {
            return Ok(None);
        }

        let echo = self.read_echo(&command.echo_prefix(), command.verb(), was_scanning).await;
        tolerate_timeout(echo, "stop echo")
    }

    /// Take one last block (if any) and then stop.
    pub async fn stop_reading(&mut self) -> Result<Option<SampleBlock>> {
        let last = if self.scan.is_scanning() {
            let timeout = self.config.poll_timeout;
            self.read_data(timeout).await?
        } else {
            None
        };
        self.stop().await?;
        Ok(last)
    }
}

fn tolerate_scan_timeout(result: Result<Bytes>) -> Result<Option<Bytes>> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.is_timeout() => {
            debug!("No scan data yet");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
