//! Message framing over a byte stream

use crate::error::PlcResult;
use bytes::{Buf, BytesMut};
use log::trace;
use plc_codec::ReadBuffer;

/// Verdict of a frame selector on the currently buffered bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResult {
    /// The first `n` bytes (n > 0) form one complete message
    ///
    /// `n` may exceed what is buffered so far; the accumulator then waits
    /// until all `n` bytes have arrived.
    Ready(usize),
    /// Not enough bytes to decide yet
    Incomplete,
    /// The first `k` bytes (k > 0) are garbage and must be dropped
    Resync(usize),
}

/// Protocol specific rule telling where the first message in a byte stream ends
///
/// Selectors are pure: they only inspect the slice and never keep state.
pub type FrameSelector = fn(&[u8]) -> FrameResult;

/// Receive-side byte accumulator shared by all stream transports
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: BytesMut,
}

impl FrameAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered bytes not yet handed out as a message
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Append freshly received bytes
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        trace!("Received {} bytes: {:02X?}", bytes.len(), bytes);
        self.buffer.extend_from_slice(bytes);
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to cut the next complete message out of the buffered bytes
    ///
    /// The selector only runs once at least `min_size` bytes are buffered.
    /// `Resync` verdicts are applied by dropping bytes and re-running the
    /// selector. A message is handed out only once all `n` bytes of a
    /// `Ready(n)` verdict are buffered, and it holds exactly those bytes.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no complete message is buffered yet.
    pub fn select(
        &mut self,
        min_size: usize,
        selector: FrameSelector,
    ) -> PlcResult<Option<ReadBuffer>> {
        loop {
            if self.buffer.is_empty() || self.buffer.len() < min_size {
                return Ok(None);
            }
            match selector(&self.buffer) {
                FrameResult::Ready(0) | FrameResult::Incomplete | FrameResult::Resync(0) => {
                    return Ok(None);
                }
                FrameResult::Ready(n) => {
                    if n > self.buffer.len() {
                        return Ok(None);
                    }
                    let message = self.buffer.split_to(n).freeze();
                    return Ok(Some(ReadBuffer::new(message)));
                }
                FrameResult::Resync(k) => {
                    let dropped = k.min(self.buffer.len());
                    trace!(
                        "Resynchronising: dropping {} bytes {:02X?}",
                        dropped,
                        &self.buffer[..dropped]
                    );
                    self.buffer.advance(dropped);
                }
            }
        }
    }
}
