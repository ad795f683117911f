use std::fmt;
use thiserror::Error;

/// Main error type for plc4r operations
#[derive(Error, Debug)]
pub enum PlcError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Out of memory: unable to allocate {0} bytes")]
    NoMemory(usize),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Connection is already connected")]
    AlreadyConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Unknown transport: {0}")]
    UnknownTransport(String),

    #[error("No transport specified and driver '{0}' has no default transport")]
    UnspecifiedTransport(String),

    #[error("No driver registered")]
    NoDriverAvailable,

    #[error("No transport registered")]
    NoTransportAvailable,

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for plc4r operations
pub type PlcResult<T> = Result<T, PlcError>;

/// Stable return-code taxonomy exchanged at driver and transport boundaries
///
/// Every `PlcError` maps onto exactly one code. `Ok` and `Unfinished` never
/// come out of an error: they describe successful or still-pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Step succeeded / value available
    Ok,
    /// Not enough data yet, poll again
    Unfinished,
    /// Allocation failed, nothing was changed
    NoMemory,
    /// Address string or field could not be parsed
    InvalidAddress,
    /// Protocol invariant violated (type or size mismatch)
    InternalError,
    /// Buffer operation would exceed the buffer bounds
    OutOfRange,
    /// Connect attempted on a live connection
    AlreadyConnected,
    InvalidArgument,
    InvalidConnectionString,
    UnknownDriver,
    UnknownTransport,
    UnspecifiedTransport,
    NoDriverAvailable,
    NoTransportAvailable,
    NotConnected,
    NotImplemented,
    TransportError,
    ParseError,
}

impl ReturnCode {
    /// Get human-readable code name
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnCode::Ok => "OK",
            ReturnCode::Unfinished => "UNFINISHED",
            ReturnCode::NoMemory => "NO_MEMORY",
            ReturnCode::InvalidAddress => "INVALID_ADDRESS",
            ReturnCode::InternalError => "INTERNAL_ERROR",
            ReturnCode::OutOfRange => "OUT_OF_RANGE",
            ReturnCode::AlreadyConnected => "ALREADY_CONNECTED",
            ReturnCode::InvalidArgument => "INVALID_ARGUMENT",
            ReturnCode::InvalidConnectionString => "INVALID_CONNECTION_STRING",
            ReturnCode::UnknownDriver => "UNKNOWN_DRIVER",
            ReturnCode::UnknownTransport => "UNKNOWN_TRANSPORT",
            ReturnCode::UnspecifiedTransport => "UNSPECIFIED_TRANSPORT",
            ReturnCode::NoDriverAvailable => "NO_DRIVER_AVAILABLE",
            ReturnCode::NoTransportAvailable => "NO_TRANSPORT_AVAILABLE",
            ReturnCode::NotConnected => "NOT_CONNECTED",
            ReturnCode::NotImplemented => "NOT_IMPLEMENTED",
            ReturnCode::TransportError => "TRANSPORT_ERROR",
            ReturnCode::ParseError => "PARSE_ERROR",
        }
    }

    /// `Unfinished` is the keep-polling signal, not a failure
    pub fn is_unfinished(&self) -> bool {
        matches!(self, ReturnCode::Unfinished)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlcError {
    /// Map this error onto the boundary return-code taxonomy
    pub fn return_code(&self) -> ReturnCode {
        match self {
            PlcError::Transport(_) => ReturnCode::TransportError,
            PlcError::NoMemory(_) => ReturnCode::NoMemory,
            PlcError::InvalidAddress(_) => ReturnCode::InvalidAddress,
            PlcError::Internal(_) => ReturnCode::InternalError,
            PlcError::OutOfRange(_) => ReturnCode::OutOfRange,
            PlcError::AlreadyConnected => ReturnCode::AlreadyConnected,
            PlcError::InvalidArgument(_) => ReturnCode::InvalidArgument,
            PlcError::InvalidConnectionString(_) => ReturnCode::InvalidConnectionString,
            PlcError::UnknownDriver(_) => ReturnCode::UnknownDriver,
            PlcError::UnknownTransport(_) => ReturnCode::UnknownTransport,
            PlcError::UnspecifiedTransport(_) => ReturnCode::UnspecifiedTransport,
            PlcError::NoDriverAvailable => ReturnCode::NoDriverAvailable,
            PlcError::NoTransportAvailable => ReturnCode::NoTransportAvailable,
            PlcError::NotConnected(_) => ReturnCode::NotConnected,
            PlcError::UnknownConnection(_) => ReturnCode::InvalidArgument,
            PlcError::NotImplemented(_) => ReturnCode::NotImplemented,
            PlcError::Parse(_) => ReturnCode::ParseError,
        }
    }

    /// Shorthand for an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        PlcError::Internal(message.into())
    }
}
