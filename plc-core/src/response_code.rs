//! Per-item response codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single item inside a read or write response
///
/// A failed item does not fail the whole execution: the remaining items
/// still carry their own codes and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok,
    NotFound,
    AccessDenied,
    InvalidAddress,
    InvalidDatatype,
    InvalidData,
    InternalError,
    RemoteBusy,
    RemoteError,
    Unsupported,
}

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }

    /// Get human-readable code name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::NotFound => "NOT_FOUND",
            ResponseCode::AccessDenied => "ACCESS_DENIED",
            ResponseCode::InvalidAddress => "INVALID_ADDRESS",
            ResponseCode::InvalidDatatype => "INVALID_DATATYPE",
            ResponseCode::InvalidData => "INVALID_DATA",
            ResponseCode::InternalError => "INTERNAL_ERROR",
            ResponseCode::RemoteBusy => "REMOTE_BUSY",
            ResponseCode::RemoteError => "REMOTE_ERROR",
            ResponseCode::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
