//! Framing for the proxy protocol (type byte + 16-bit length)

use crate::frame::FrameResult;

pub const PROXY_HEADER_SIZE: usize = 3;

/// Find the end of the first proxy message
///
/// The big-endian length at offset 1 covers the whole message.
pub fn select_proxy(buffer: &[u8]) -> FrameResult {
    if buffer.len() < PROXY_HEADER_SIZE {
        return FrameResult::Incomplete;
    }
    match u16::from_be_bytes([buffer[1], buffer[2]]) as usize {
        0 => FrameResult::Resync(1),
        length => FrameResult::Ready(length),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_length() {
        assert_eq!(select_proxy(&[0x01, 0x00]), FrameResult::Incomplete);
        assert_eq!(select_proxy(&[0x01, 0x00, 0x05, 0xAA]), FrameResult::Ready(5));
        assert_eq!(select_proxy(&[0x01, 0x00, 0x00]), FrameResult::Resync(1));
    }
}
