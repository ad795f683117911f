//! Connection string parsing
//!
//! Format: `<protocol>[:<transport>]://<transport-connect-info>[?<key>=<value>&...]`
//!
//! Examples:
//! - `modbus-tcp://192.168.0.10` (transport taken from the driver default)
//! - `modbus-tcp:tcp://192.168.0.10:1502?unit-identifier=5`
//! - `simulated://plc`

use crate::error::{PlcError, PlcResult};
use plc_transport::Parameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decoded connection string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionString {
    pub protocol_code: String,
    /// `None` when the driver's default transport is to be used
    pub transport_code: Option<String>,
    pub transport_connect_info: String,
    pub parameters: Parameters,
}

impl ConnectionString {
    /// Parse a connection string
    ///
    /// # Errors
    ///
    /// `PlcError::InvalidConnectionString` if the string is empty, lacks the
    /// `://` separator or the connect info, or carries more than one `?`.
    pub fn parse(input: &str) -> PlcResult<Self> {
        let invalid = |reason: &str| {
            PlcError::InvalidConnectionString(format!("{}: '{}'", reason, input))
        };

        if input.is_empty() {
            return Err(invalid("Empty connection string"));
        }
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid("Missing '://'"))?;

        let (protocol_code, transport_code) = match scheme.split_once(':') {
            Some((protocol, transport)) => (protocol, Some(transport)),
            None => (scheme, None),
        };
        if protocol_code.is_empty() {
            return Err(invalid("Missing protocol code"));
        }
        if transport_code.is_some_and(|code| code.is_empty() || code.contains(':')) {
            return Err(invalid("Malformed transport code"));
        }

        let (connect_info, query) = match rest.split_once('?') {
            Some((info, query)) => (info, Some(query)),
            None => (rest, None),
        };
        if connect_info.is_empty() {
            return Err(invalid("Missing transport connect info"));
        }

        let mut parameters = Parameters::new();
        if let Some(query) = query {
            if query.contains('?') {
                return Err(invalid("More than one '?'"));
            }
            for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if key.is_empty() {
                    return Err(invalid("Parameter without a name"));
                }
                parameters.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self {
            protocol_code: protocol_code.to_string(),
            transport_code: transport_code.map(str::to_string),
            transport_connect_info: connect_info.to_string(),
            parameters,
        })
    }
}

impl FromStr for ConnectionString {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol_code)?;
        if let Some(transport) = &self.transport_code {
            write!(f, ":{}", transport)?;
        }
        write!(f, "://{}", self.transport_connect_info)?;
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", separator, key, value)?;
        }
        Ok(())
    }
}
