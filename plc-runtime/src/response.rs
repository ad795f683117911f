//! Read and write responses
//!
//! A response carries one entry per request item, in request order. Drivers
//! build responses with `assemble`, which walks the request items and the
//! decoded payload items in lock-step.

use crate::error::{PlcError, PlcResult};
use crate::request::{ReadRequest, RequestItem, WriteRequest};
use plc_core::{PlcValue, ResponseCode};

/// Result for one read item
#[derive(Debug, Clone)]
pub struct ReadResponseItem {
    pub item: RequestItem,
    pub code: ResponseCode,
    /// Decoded value, `None` unless `code` is `Ok`
    pub value: Option<PlcValue>,
}

/// Response to a `ReadRequest`
#[derive(Debug, Clone)]
pub struct ReadResponse {
    items: Vec<ReadResponseItem>,
}

impl ReadResponse {
    /// Pair each request item with its decoded payload item
    ///
    /// # Errors
    ///
    /// `PlcError::Internal` if the number of decoded items differs from the
    /// number of request items.
    pub fn assemble(
        request: &ReadRequest,
        decoded: Vec<(ResponseCode, Option<PlcValue>)>,
    ) -> PlcResult<Self> {
        check_item_count(request.len(), decoded.len())?;
        let items = request
            .items()
            .iter()
            .zip(decoded)
            .map(|(item, (code, value))| ReadResponseItem {
                item: item.clone(),
                code,
                value,
            })
            .collect();
        Ok(Self { items })
    }

    pub fn items(&self) -> &[ReadResponseItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First item read from `address`
    pub fn item(&self, address: &str) -> Option<&ReadResponseItem> {
        self.items.iter().find(|item| item.item.address == address)
    }

    /// Value read from `address`, if that item succeeded
    pub fn value(&self, address: &str) -> Option<&PlcValue> {
        self.item(address).and_then(|item| item.value.as_ref())
    }
}

/// Result for one write item
#[derive(Debug, Clone)]
pub struct WriteResponseItem {
    pub item: RequestItem,
    pub code: ResponseCode,
}

/// Response to a `WriteRequest`
#[derive(Debug, Clone)]
pub struct WriteResponse {
    items: Vec<WriteResponseItem>,
}

impl WriteResponse {
    /// Pair each request item with its response code
    ///
    /// # Errors
    ///
    /// `PlcError::Internal` on an item count mismatch.
    pub fn assemble(request: &WriteRequest, codes: Vec<ResponseCode>) -> PlcResult<Self> {
        check_item_count(request.len(), codes.len())?;
        let items = request
            .items()
            .iter()
            .zip(codes)
            .map(|(item, code)| WriteResponseItem {
                item: item.item.clone(),
                code,
            })
            .collect();
        Ok(Self { items })
    }

    pub fn items(&self) -> &[WriteResponseItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if every item was written
    pub fn all_ok(&self) -> bool {
        self.items.iter().all(|item| item.code.is_ok())
    }
}

fn check_item_count(requested: usize, decoded: usize) -> PlcResult<()> {
    if requested != decoded {
        return Err(PlcError::internal(format!(
            "Response carries {} items for a request of {} items",
            decoded, requested
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PlcField;
    use std::any::Any;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Tag;

    impl PlcField for Tag {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn read_request() -> ReadRequest {
        let mut request = ReadRequest::new(1);
        request.add_item("first", Rc::new(Tag));
        request.add_item("second", Rc::new(Tag));
        request
    }

    #[test]
    fn test_assemble_preserves_order() {
        let response = ReadResponse::assemble(
            &read_request(),
            vec![
                (ResponseCode::Ok, Some(PlcValue::Int(1))),
                (ResponseCode::NotFound, None),
            ],
        )
        .unwrap();
        assert_eq!(response.items()[0].item.address, "first");
        assert_eq!(response.items()[1].item.address, "second");
        assert_eq!(response.value("first"), Some(&PlcValue::Int(1)));
        assert_eq!(response.item("second").unwrap().code, ResponseCode::NotFound);
        assert_eq!(response.value("second"), None);
    }

    #[test]
    fn test_count_mismatch_is_internal_error() {
        let result = ReadResponse::assemble(&read_request(), vec![(ResponseCode::Ok, None)]);
        assert!(matches!(result, Err(PlcError::Internal(_))));

        let mut write = WriteRequest::new(1);
        write.add_item("x", Rc::new(Tag), PlcValue::Bool(false));
        let result = WriteResponse::assemble(&write, vec![ResponseCode::Ok, ResponseCode::Ok]);
        assert!(matches!(result, Err(PlcError::Internal(_))));
        assert!(WriteResponse::assemble(&write, vec![ResponseCode::Ok]).unwrap().all_ok());
    }
}
