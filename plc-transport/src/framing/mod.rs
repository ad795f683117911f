//! Frame selectors for the supported wire protocols
//!
//! Each selector is a plain `fn(&[u8]) -> FrameResult` and can be handed to
//! `Transport::select_message` directly.

pub mod modbus_tcp;
pub mod proxy;
pub mod tpkt;

pub use modbus_tcp::{MODBUS_TCP_HEADER_SIZE, select_modbus_tcp};
pub use proxy::{PROXY_HEADER_SIZE, select_proxy};
pub use tpkt::{TPKT_HEADER_SIZE, TPKT_MAX_PACKET_SIZE, TPKT_VERSION, select_tpkt};
