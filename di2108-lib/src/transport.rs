use crate::error::Result;
use bytes::Bytes;
use std::time::Duration;

/// A duplex byte channel bound to one instrument: the bulk-OUT and bulk-IN
/// endpoint pair.
///
/// Both calls block the session until they complete or `timeout` elapses,
/// in which case they fail with [`Error::Timeout`](crate::Error::Timeout).
/// A session owns its transport exclusively; nothing else may issue
/// transfers on it.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send `data` in one bulk transfer. Returns the number of bytes written.
    async fn write(&mut self, data: Bytes, timeout: Duration) -> Result<usize>;

    /// Receive one bulk transfer of at most `max_len` bytes.
    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Bytes>;
}
