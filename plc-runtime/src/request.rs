//! Read and write requests

use crate::connection::ConnectionId;
use crate::error::{PlcError, PlcResult};
use plc_core::PlcValue;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Driver-specific decoded address
///
/// Drivers produce fields in `Driver::parse_address` and recover their own
/// concrete type with `downcast_field` when encoding a request.
pub trait PlcField: fmt::Debug + Any {
    fn as_any(&self) -> &dyn Any;

    /// Number of consecutive elements addressed
    fn num_elements(&self) -> usize {
        1
    }
}

/// Recover a driver's concrete field type
///
/// # Errors
///
/// `PlcError::Internal` if the field was produced by another driver.
pub fn downcast_field<T: PlcField>(field: &dyn PlcField) -> PlcResult<&T> {
    field.as_any().downcast_ref::<T>().ok_or_else(|| {
        PlcError::internal(format!(
            "Field {:?} is not a {}",
            field,
            std::any::type_name::<T>()
        ))
    })
}

/// One addressed item of a request
#[derive(Debug, Clone)]
pub struct RequestItem {
    /// Address string as given by the caller
    pub address: String,
    pub field: Rc<dyn PlcField>,
}

impl RequestItem {
    pub fn new(address: impl Into<String>, field: Rc<dyn PlcField>) -> Self {
        Self {
            address: address.into(),
            field,
        }
    }
}

/// Ordered list of items to read from one connection
#[derive(Debug, Clone)]
pub struct ReadRequest {
    connection_id: ConnectionId,
    items: Vec<RequestItem>,
}

impl ReadRequest {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            items: Vec::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn add_item(&mut self, address: impl Into<String>, field: Rc<dyn PlcField>) {
        self.items.push(RequestItem::new(address, field));
    }

    pub fn items(&self) -> &[RequestItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One item of a write request with the value to write
#[derive(Debug, Clone)]
pub struct WriteRequestItem {
    pub item: RequestItem,
    pub value: PlcValue,
}

/// Ordered list of items to write on one connection
#[derive(Debug, Clone)]
pub struct WriteRequest {
    connection_id: ConnectionId,
    items: Vec<WriteRequestItem>,
}

impl WriteRequest {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            items: Vec::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn add_item(&mut self, address: impl Into<String>, field: Rc<dyn PlcField>, value: PlcValue) {
        self.items.push(WriteRequestItem {
            item: RequestItem::new(address, field),
            value,
        });
    }

    pub fn items(&self) -> &[WriteRequestItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
