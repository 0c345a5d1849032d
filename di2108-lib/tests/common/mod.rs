//! Shared test helpers: a scripted transport standing in for the USB
//! endpoint pair.
#![allow(dead_code)]

pub use bytes::Bytes;
pub use di2108_lib::*;
use nusb::transfer::TransferError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Chunk(Bytes),
    Timeout,
    Stall,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub writes: Vec<Bytes>,
    pub replies: VecDeque<Reply>,
    pub read_sizes: Vec<usize>,
    pub read_timeouts: Vec<Duration>,
    pub fail_writes: bool,
}

/// Records every write and answers reads from a queue. An empty queue
/// behaves like a silent device (timeout).
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes. Longer than the requested length, they are split
    /// across reads.
    pub fn reply(&self, bytes: impl AsRef<[u8]>) -> &Self {
        let chunk = Bytes::copy_from_slice(bytes.as_ref());
        self.state.borrow_mut().replies.push_back(Reply::Chunk(chunk));
        self
    }

    /// Queue the echo of a command line (without its terminator).
    pub fn echo(&self, line: &str) -> &Self {
        self.reply(format!("{line}\r"))
    }

    /// Queue an echo followed by a payload, as `info` answers.
    pub fn echo_with(&self, line: &str, payload: &str) -> &Self {
        self.reply(format!("{line} {payload}\r"))
    }

    pub fn timeout(&self) -> &Self {
        self.state.borrow_mut().replies.push_back(Reply::Timeout);
        self
    }

    /// Queue a failed bulk-IN transfer (endpoint stall).
    pub fn stall(&self) -> &Self {
        self.state.borrow_mut().replies.push_back(Reply::Stall);
        self
    }

    pub fn fail_writes(&self) {
        self.state.borrow_mut().fail_writes = true;
    }

    /// Written frames as text.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .borrow()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn last_write(&self) -> Option<String> {
        self.writes().pop()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }

    pub fn clear_reads(&self) {
        let mut state = self.state.borrow_mut();
        state.read_sizes.clear();
        state.read_timeouts.clear();
    }

    pub fn read_sizes(&self) -> Vec<usize> {
        self.state.borrow().read_sizes.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().replies.len()
    }
}

impl Transport for MockTransport {
    async fn write(&mut self, data: Bytes, timeout: Duration) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            return Err(Error::Timeout {
                operation: "bulk OUT",
                timeout,
            });
        }
        let len = data.len();
        state.writes.push(data);
        Ok(len)
    }

    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Bytes> {
        let mut state = self.state.borrow_mut();
        state.read_sizes.push(max_len);
        state.read_timeouts.push(timeout);
        match state.replies.pop_front() {
            Some(Reply::Chunk(mut chunk)) => {
                if chunk.len() > max_len {
                    let rest = chunk.split_off(max_len);
                    state.replies.push_front(Reply::Chunk(rest));
                }
                Ok(chunk)
            }
            Some(Reply::Stall) => Err(Error::Transfer(TransferError::Stall)),
            Some(Reply::Timeout) | None => Err(Error::Timeout {
                operation: "bulk IN",
                timeout,
            }),
        }
    }
}

/// Route library logs to the test harness; run with `RUST_LOG=debug` to
/// see the traffic.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A session whose initial `ps` has been acknowledged, with the write and
/// read logs cleared.
pub async fn connected(size: PacketSize) -> (Di2108<MockTransport>, MockTransport) {
    init_tracing();
    let mock = MockTransport::new();
    mock.echo(&format!("ps {}", size.index()));
    let config = SessionConfig::default().with_packet_size(size);
    let session = Di2108::with_transport(mock.clone(), config)
        .await
        .expect("initial ps should succeed");
    mock.clear_writes();
    mock.clear_reads();
    (session, mock)
}

/// Little-endian block with one signed value per slot.
pub fn block_bytes(values: &[i16], len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    data.resize(len.max(data.len()), 0);
    data
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
