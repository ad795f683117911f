//! Per-connection memory of the simulated PLC

use crate::error::PlcResult;
use crate::field::{SimulatedDatatype, SimulatedField};
use plc_core::PlcValue;
use plc_transport::{Parameters, parse_parameter};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Length of randomly generated strings
const RANDOM_STRING_LENGTH: usize = 8;

/// Driver configuration of a simulated connection
///
/// Holds the values written to `STATE` fields and the generator behind
/// `RANDOM` fields. A `seed` connection parameter makes random reads
/// reproducible.
#[derive(Debug)]
pub struct SimulatedState {
    values: HashMap<String, PlcValue>,
    rng: StdRng,
    seed: Option<u64>,
}

impl SimulatedState {
    /// Create an empty state drawing random values from entropy
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Create an empty state with a reproducible random sequence
    pub fn with_seed(seed: u64) -> Self {
        Self {
            values: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Build the state from connection-string parameters
    ///
    /// # Errors
    ///
    /// `PlcError::InvalidArgument` if `seed` is not an unsigned integer.
    pub fn from_parameters(parameters: &Parameters) -> PlcResult<Self> {
        if !parameters.contains_key("seed") {
            return Ok(Self::new());
        }
        let seed: u64 = parse_parameter(parameters, "seed", 0)?;
        Ok(Self::with_seed(seed))
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Value last written under `name`
    pub fn get(&self, name: &str) -> Option<&PlcValue> {
        self.values.get(name)
    }

    /// Store a value under `name`, returning the previous one
    pub fn set(&mut self, name: impl Into<String>, value: PlcValue) -> Option<PlcValue> {
        self.values.insert(name.into(), value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Produce a random value for a field, a list if it has several elements
    pub fn random_value(&mut self, field: &SimulatedField) -> PlcValue {
        if field.num_elements == 1 {
            return self.random_scalar(field.datatype);
        }
        PlcValue::List(
            (0..field.num_elements)
                .map(|_| self.random_scalar(field.datatype))
                .collect(),
        )
    }

    fn random_scalar(&mut self, datatype: SimulatedDatatype) -> PlcValue {
        match datatype {
            SimulatedDatatype::Bool => PlcValue::Bool(self.rng.gen_bool(0.5)),
            SimulatedDatatype::Integer => PlcValue::Dint(self.rng.gen_range(i32::MIN..=i32::MAX)),
            SimulatedDatatype::Real => PlcValue::Real(self.rng.gen_range(-1000.0f32..1000.0)),
            SimulatedDatatype::String => PlcValue::String(
                (&mut self.rng)
                    .sample_iter(&Alphanumeric)
                    .take(RANDOM_STRING_LENGTH)
                    .map(char::from)
                    .collect(),
            ),
        }
    }
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self::new()
    }
}
