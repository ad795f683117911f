//! Modbus connection configuration and per-connection session state

use crate::error::{PlcError, PlcResult};
use crate::pdu::ModbusAdu;
use plc_transport::{Parameters, parse_parameter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default unit identifier addressed behind a gateway
pub const DEFAULT_UNIT_IDENTIFIER: u8 = 1;

/// Options taken from the connection string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusConfiguration {
    /// Unit id put into every MBAP header
    pub unit_identifier: u8,
}

impl Default for ModbusConfiguration {
    fn default() -> Self {
        Self {
            unit_identifier: DEFAULT_UNIT_IDENTIFIER,
        }
    }
}

impl ModbusConfiguration {
    /// Read the configuration from connection-string parameters
    ///
    /// # Errors
    ///
    /// `PlcError::InvalidArgument` if `unit-identifier` is not a number
    /// between 0 and 255.
    pub fn from_parameters(parameters: &Parameters) -> PlcResult<Self> {
        Ok(Self {
            unit_identifier: parse_parameter(
                parameters,
                "unit-identifier",
                DEFAULT_UNIT_IDENTIFIER,
            )?,
        })
    }
}

/// Driver state shared by the Tasks of one Modbus connection
///
/// Several Tasks can wait on the same transport. A frame taken off the
/// transport by one Task but answering another Task's transaction is
/// parked here until its owner picks it up.
#[derive(Debug, Default)]
pub struct ModbusSession {
    configuration: ModbusConfiguration,
    last_transaction_id: u16,
    outstanding: BTreeSet<u16>,
    parked: HashMap<u16, PlcResult<ModbusAdu>>,
}

impl ModbusSession {
    pub fn new(configuration: ModbusConfiguration) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    pub fn configuration(&self) -> &ModbusConfiguration {
        &self.configuration
    }

    pub fn unit_identifier(&self) -> u8 {
        self.configuration.unit_identifier
    }

    /// Allocate a transaction id not used by any request still in flight
    ///
    /// # Errors
    ///
    /// `PlcError::OutOfRange` if every id is in flight.
    pub fn begin_transaction(&mut self) -> PlcResult<u16> {
        for _ in 0..=u16::MAX {
            self.last_transaction_id = self.last_transaction_id.wrapping_add(1);
            if self.outstanding.insert(self.last_transaction_id) {
                return Ok(self.last_transaction_id);
            }
        }
        Err(PlcError::OutOfRange(
            "Every Modbus transaction id is in flight".to_string(),
        ))
    }

    /// Forget a transaction once its response arrived or its Task gave up
    pub fn end_transaction(&mut self, transaction_id: u16) {
        self.outstanding.remove(&transaction_id);
        self.parked.remove(&transaction_id);
    }

    pub fn is_outstanding(&self, transaction_id: u16) -> bool {
        self.outstanding.contains(&transaction_id)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Keep a decoded frame, or the reason it could not be decoded, for
    /// the Task owning `transaction_id`
    pub fn park(&mut self, transaction_id: u16, frame: PlcResult<ModbusAdu>) {
        self.parked.insert(transaction_id, frame);
    }

    /// Take a parked frame for `transaction_id`
    pub fn take_parked(&mut self, transaction_id: u16) -> Option<PlcResult<ModbusAdu>> {
        self.parked.remove(&transaction_id)
    }
}
