//! Modbus-TCP (MBAP header) framing

use crate::frame::FrameResult;

/// Transaction id, protocol id and length field
pub const MODBUS_TCP_HEADER_SIZE: usize = 6;

/// Find the end of the first Modbus-TCP ADU
///
/// The length field at offset 4 counts the unit id and the PDU, that is
/// every byte after the first six.
pub fn select_modbus_tcp(buffer: &[u8]) -> FrameResult {
    if buffer.len() < MODBUS_TCP_HEADER_SIZE {
        return FrameResult::Incomplete;
    }
    let length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
    FrameResult::Ready(length + MODBUS_TCP_HEADER_SIZE)
}
