//! Report line decoder
//!
//! Turns one framed line (terminator already stripped) into a typed
//! [`DecodedRecord`]. Decoding is all-or-nothing: a line either produces a
//! complete record, is reported as unrecognized, or fails — never a
//! partially populated record.

use crate::error::DecodeError;
use crate::record::{DecodedRecord, FieldType, Tag, Value};

/// Outcome of decoding one line
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Fully decoded record
    Record(DecodedRecord),
    /// Tag is not one of the known reports; callers discard silently
    Unrecognized,
}

/// Decode one report line
///
/// `line` is the raw bytes of a single line with its terminator stripped.
/// Lines that are too short to carry a tag, or whose tag is unknown, are
/// [`Decoded::Unrecognized`] rather than errors.
pub fn decode(line: &[u8]) -> Result<Decoded, DecodeError> {
    let text = std::str::from_utf8(line).map_err(|_| DecodeError::InvalidEncoding)?;

    // get() instead of slicing: a multi-byte char straddling byte 3 must
    // read as an unknown tag, not a panic
    let tag = match text.get(..3).and_then(Tag::from_str) {
        Some(tag) => tag,
        None => return Ok(Decoded::Unrecognized),
    };

    let spec = tag.spec();
    let tokens: Vec<&str> = text[3..].split_ascii_whitespace().collect();
    if tokens.len() != spec.fields.len() {
        return Err(DecodeError::FieldCountMismatch {
            tag: tag.as_str(),
            expected: spec.fields.len(),
            actual: tokens.len(),
        });
    }

    let mut values = Vec::with_capacity(tokens.len());
    for (token, (name, field_type)) in tokens.iter().zip(spec.fields) {
        values.push(decode_field(tag, name, *field_type, token)?);
    }

    Ok(Decoded::Record(DecodedRecord::new(tag, values)))
}

fn decode_field(
    tag: Tag,
    field: &'static str,
    field_type: FieldType,
    token: &str,
) -> Result<Value, DecodeError> {
    let invalid = || DecodeError::InvalidToken {
        tag: tag.as_str(),
        field,
        kind: field_type.name(),
        token: token.to_string(),
    };

    match field_type {
        FieldType::Unsigned => {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let value = u64::from_str_radix(token, 16).map_err(|_| invalid())?;
            Ok(Value::Unsigned(value))
        }
        FieldType::Float => {
            // exactly the hex encoding of 4 big-endian IEEE-754 bytes
            if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let bits = u32::from_str_radix(token, 16).map_err(|_| invalid())?;
            Ok(Value::Float(f32::from_bits(bits)))
        }
        FieldType::Text => Ok(Value::Text(token.to_string())),
    }
}
