//! Conversion between `PlcValue` and Modbus coil and register payloads

use crate::error::{PlcError, PlcResult};
use crate::field::{ModbusDataType, ModbusField};
use plc_codec::{ReadBuffer, WriteBuffer};
use plc_core::PlcValue;

/// Decode coil or discrete input states for a field
///
/// Bits are packed least significant bit first, starting at the first byte.
pub fn decode_bits(field: &ModbusField, data: &[u8]) -> PlcResult<PlcValue> {
    let needed = field.quantity.div_ceil(8);
    if data.len() < needed {
        return Err(PlcError::Parse(format!(
            "{} needs {} data bytes, response carries {}",
            field,
            needed,
            data.len()
        )));
    }
    let mut values: Vec<PlcValue> = (0..field.quantity)
        .map(|i| PlcValue::Bool((data[i / 8] >> (i % 8)) & 1 == 1))
        .collect();
    if field.quantity == 1 {
        return Ok(values.remove(0));
    }
    Ok(PlcValue::List(values))
}

/// Decode register contents for a field
pub fn decode_registers(field: &ModbusField, data: &[u8]) -> PlcResult<PlcValue> {
    let needed = field.wire_quantity() * 2;
    if data.len() != needed {
        return Err(PlcError::Parse(format!(
            "{} needs {} data bytes, response carries {}",
            field,
            needed,
            data.len()
        )));
    }
    let mut buffer = ReadBuffer::from_slice(data);
    let mut values = Vec::with_capacity(field.quantity);
    for _ in 0..field.quantity {
        values.push(read_element(&mut buffer, field.data_type)?);
    }
    if field.quantity == 1 {
        return Ok(values.remove(0));
    }
    Ok(PlcValue::List(values))
}

fn read_element(buffer: &mut ReadBuffer, data_type: ModbusDataType) -> PlcResult<PlcValue> {
    Ok(match data_type {
        ModbusDataType::Int => PlcValue::Int(buffer.read_signed_16(16)?),
        ModbusDataType::Uint => PlcValue::Uint(buffer.read_unsigned_16(16)?),
        ModbusDataType::Word => PlcValue::from_u16_bits(buffer.read_unsigned_16(16)?),
        ModbusDataType::Dint => PlcValue::Dint(buffer.read_signed_32(32)?),
        ModbusDataType::Udint => PlcValue::Udint(buffer.read_unsigned_32(32)?),
        ModbusDataType::Dword => PlcValue::from_u32_bits(buffer.read_unsigned_32(32)?),
        ModbusDataType::Lint => PlcValue::Lint(buffer.read_signed_64(64)?),
        ModbusDataType::Ulint => PlcValue::Ulint(buffer.read_unsigned_64(64)?),
        ModbusDataType::Real => PlcValue::Real(buffer.read_float(32)?),
        ModbusDataType::Lreal => PlcValue::Lreal(buffer.read_double(64)?),
        ModbusDataType::Bool => {
            return Err(PlcError::internal("BOOL is not stored in registers"));
        }
    })
}

/// Encode coil states for a write, least significant bit first
///
/// # Errors
///
/// `PlcError::InvalidArgument` if the value is not a `Bool`, or a list of
/// exactly `quantity` of them.
pub fn encode_bits(field: &ModbusField, value: &PlcValue) -> PlcResult<Vec<u8>> {
    let elements = elements_of(field, value)?;
    let mut packed = vec![0u8; field.quantity.div_ceil(8)];
    for (i, element) in elements.iter().enumerate() {
        let bit = element.as_bool().ok_or_else(|| mismatch(field, element))?;
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    Ok(packed)
}

/// Encode register contents for a write, big endian
///
/// # Errors
///
/// `PlcError::InvalidArgument` if an element has the wrong type or does not
/// fit the field's data type.
pub fn encode_registers(field: &ModbusField, value: &PlcValue) -> PlcResult<Vec<u8>> {
    let elements = elements_of(field, value)?;
    let mut buffer = WriteBuffer::new(field.wire_quantity() * 2)?;
    for element in elements {
        write_element(&mut buffer, field, element)?;
    }
    Ok(buffer.into_bytes().to_vec())
}

fn write_element(buffer: &mut WriteBuffer, field: &ModbusField, value: &PlcValue) -> PlcResult<()> {
    match field.data_type {
        ModbusDataType::Int => buffer.write_signed_16(16, integer(field, value)?),
        ModbusDataType::Uint => buffer.write_unsigned_16(16, integer(field, value)?),
        ModbusDataType::Word => buffer.write_unsigned_16(16, bit_string(field, value, 16)? as u16),
        ModbusDataType::Dint => buffer.write_signed_32(32, integer(field, value)?),
        ModbusDataType::Udint => buffer.write_unsigned_32(32, integer(field, value)?),
        ModbusDataType::Dword => buffer.write_unsigned_32(32, bit_string(field, value, 32)? as u32),
        ModbusDataType::Lint => buffer.write_signed_64(64, integer(field, value)?),
        ModbusDataType::Ulint => buffer.write_unsigned_64(64, integer(field, value)?),
        ModbusDataType::Real => {
            let v = value.as_f64().ok_or_else(|| mismatch(field, value))?;
            buffer.write_float(32, v as f32)
        }
        ModbusDataType::Lreal => {
            let v = value.as_f64().ok_or_else(|| mismatch(field, value))?;
            buffer.write_double(64, v)
        }
        ModbusDataType::Bool => Err(PlcError::internal("BOOL is not stored in registers")),
    }
}

/// Split a write value into the field's elements
fn elements_of<'a>(field: &ModbusField, value: &'a PlcValue) -> PlcResult<Vec<&'a PlcValue>> {
    if field.quantity == 1 {
        return Ok(vec![value]);
    }
    match value {
        PlcValue::List(items) if items.len() == field.quantity => Ok(items.iter().collect()),
        _ => Err(PlcError::InvalidArgument(format!(
            "{} expects a list of {} values",
            field, field.quantity
        ))),
    }
}

fn integer<T: TryFrom<i128>>(field: &ModbusField, value: &PlcValue) -> PlcResult<T> {
    value
        .as_integer()
        .filter(|_| value.as_bool().is_none())
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(field, value))
}

/// An integer, or a list of `width` booleans, most significant bit first
fn bit_string(field: &ModbusField, value: &PlcValue, width: usize) -> PlcResult<u64> {
    if let PlcValue::List(bits) = value {
        if bits.len() != width {
            return Err(mismatch(field, value));
        }
        return bits.iter().try_fold(0u64, |word, bit| {
            let bit = bit.as_bool().ok_or_else(|| mismatch(field, value))?;
            Ok::<u64, PlcError>((word << 1) | bit as u64)
        });
    }
    let word: u64 = integer(field, value)?;
    if width < 64 && word >> width != 0 {
        return Err(mismatch(field, value));
    }
    Ok(word)
}

fn mismatch(field: &ModbusField, value: &PlcValue) -> PlcError {
    PlcError::InvalidArgument(format!(
        "{} ({}) does not fit {}",
        value,
        value.value_type().name(),
        field
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(address: &str) -> ModbusField {
        ModbusField::parse(address).unwrap()
    }

    #[test]
    fn test_coils_pack_lsb_first() {
        let coils = field("coil:20[10]");
        let values = PlcValue::List(
            [true, false, true, true, false, false, true, true, true, false]
                .into_iter()
                .map(PlcValue::Bool)
                .collect(),
        );
        let packed = encode_bits(&coils, &values).unwrap();
        assert_eq!(packed, [0xCD, 0x01]);
        assert_eq!(decode_bits(&coils, &packed).unwrap(), values);
    }

    #[test]
    fn test_single_coil_is_scalar() {
        let coil = field("coil:1");
        assert_eq!(decode_bits(&coil, &[0x01]).unwrap(), PlcValue::Bool(true));
        assert_eq!(encode_bits(&coil, &PlcValue::Bool(true)).unwrap(), [0x01]);
        assert!(encode_bits(&coil, &PlcValue::Int(1)).is_err());
    }

    #[test]
    fn test_decode_registers_by_type() {
        let data = [0xFF, 0xFE, 0x00, 0x02];
        assert_eq!(
            decode_registers(&field("holding-register:1:INT[2]"), &data).unwrap(),
            PlcValue::List(vec![PlcValue::Int(-2), PlcValue::Int(2)])
        );
        assert_eq!(
            decode_registers(&field("holding-register:1:DINT"), &data).unwrap(),
            PlcValue::Dint(-131070)
        );
        assert_eq!(
            decode_registers(&field("input-register:1:REAL"), &1.5f32.to_be_bytes()).unwrap(),
            PlcValue::Real(1.5)
        );
        assert!(decode_registers(&field("holding-register:1:DINT"), &data[..2]).is_err());
    }

    #[test]
    fn test_word_is_a_bit_string() {
        let word = field("holding-register:1:WORD");
        let value = decode_registers(&word, &[0x80, 0x01]).unwrap();
        let bits = value.elements();
        assert_eq!(bits.len(), 16);
        assert_eq!(bits[0], &PlcValue::Bool(true));
        assert_eq!(bits[15], &PlcValue::Bool(true));
        assert_eq!(encode_registers(&word, &value).unwrap(), [0x80, 0x01]);
        assert_eq!(encode_registers(&word, &PlcValue::Uint(0x8001)).unwrap(), [0x80, 0x01]);
    }

    #[test]
    fn test_encode_registers() {
        let registers = field("holding-register:1:INT[2]");
        let value = PlcValue::List(vec![PlcValue::Dint(-2), PlcValue::Usint(2)]);
        assert_eq!(encode_registers(&registers, &value).unwrap(), [0xFF, 0xFE, 0x00, 0x02]);

        let lreal = field("holding-register:1:LREAL");
        assert_eq!(
            encode_registers(&lreal, &PlcValue::Lreal(-0.5)).unwrap(),
            (-0.5f64).to_be_bytes()
        );
    }

    #[test]
    fn test_encode_rejects_mismatches() {
        let int = field("holding-register:1:INT");
        assert!(encode_registers(&int, &PlcValue::Dint(70000)).is_err());
        assert!(encode_registers(&int, &PlcValue::Bool(true)).is_err());
        assert!(encode_registers(&int, &PlcValue::String("1".into())).is_err());

        let pair = field("holding-register:1:UINT[2]");
        assert!(encode_registers(&pair, &PlcValue::Uint(1)).is_err());
        assert!(encode_registers(&field("holding-register:1:UINT"), &PlcValue::Int(-1)).is_err());
    }
}
