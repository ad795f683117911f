//! TPKT (RFC 1006) framing used beneath COTP and S7

use crate::frame::FrameResult;

pub const TPKT_VERSION: u8 = 0x03;
pub const TPKT_HEADER_SIZE: usize = 4;
/// Largest packet accepted before the stream is considered corrupt
pub const TPKT_MAX_PACKET_SIZE: usize = 8192;

/// Find the end of the first TPKT packet
///
/// A buffer that does not start with the TPKT version byte, or whose length
/// field is implausible, is resynchronised onto the next `0x03 0x00` pair.
pub fn select_tpkt(buffer: &[u8]) -> FrameResult {
    match buffer.first() {
        None => return FrameResult::Incomplete,
        Some(&version) if version != TPKT_VERSION => return resync(buffer),
        Some(_) => {}
    }
    if buffer.len() < TPKT_HEADER_SIZE {
        return FrameResult::Incomplete;
    }
    let length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    if !(TPKT_HEADER_SIZE..=TPKT_MAX_PACKET_SIZE).contains(&length) {
        return resync(buffer);
    }
    FrameResult::Ready(length)
}

/// Drop everything before the next candidate packet start
///
/// Without a candidate the last byte is kept, as it may be the first half
/// of a start pair still in flight.
fn resync(buffer: &[u8]) -> FrameResult {
    let start = buffer
        .windows(2)
        .skip(1)
        .position(|pair| *pair == [TPKT_VERSION, 0x00])
        .map(|offset| offset + 1);
    match start {
        Some(offset) => FrameResult::Resync(offset),
        None if buffer.len() > 1 => FrameResult::Resync(buffer.len() - 1),
        None => FrameResult::Incomplete,
    }
}
