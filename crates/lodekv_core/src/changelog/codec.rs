//! CBOR encoding of change records.
//!
//! A record is a 7-element array:
//!
//! ```text
//! [revision, physical_ms, logical, node_id, op, key, value | null]
//! ```
//!
//! `op` is 1 for SET and 2 for DEL; `key` and `value` are byte strings.

use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeRecord, HybridTimestamp, Op};
use bytes::Bytes;
use ciborium::value::{Integer, Value};

const FIELDS: usize = 7;

/// Serializes a record into a log payload.
///
/// # Errors
///
/// Returns a codec error if CBOR serialization fails.
pub fn encode(record: &ChangeRecord) -> CoreResult<Vec<u8>> {
    let value = Value::Array(vec![
        Value::Integer(record.revision.into()),
        Value::Integer(record.timestamp.physical_ms.into()),
        Value::Integer(record.timestamp.logical.into()),
        Value::Text(record.timestamp.node_id.clone()),
        Value::Integer(record.op.code().into()),
        Value::Bytes(record.key.to_vec()),
        record
            .value
            .as_ref()
            .map_or(Value::Null, |v| Value::Bytes(v.to_vec())),
    ]);

    let mut out = Vec::with_capacity(32 + record.key.len() + record.value.as_ref().map_or(0, Bytes::len));
    ciborium::ser::into_writer(&value, &mut out)?;
    Ok(out)
}

/// Parses a log payload back into a record.
///
/// # Errors
///
/// Returns a codec error for anything other than a well-formed 7-element
/// record array.
pub fn decode(payload: &[u8]) -> CoreResult<ChangeRecord> {
    let value: Value = ciborium::de::from_reader(payload)?;
    let Value::Array(fields) = value else {
        return Err(CoreError::codec("change record is not an array"));
    };
    let fields: [Value; FIELDS] = fields
        .try_into()
        .map_err(|_| CoreError::codec("change record must have 7 fields"))?;
    let [revision, physical, logical, node, op, key, value] = fields;

    let op = integer::<u8>(op, "op")?;
    let op = Op::from_code(op).ok_or_else(|| CoreError::codec(format!("unknown op code {op}")))?;

    let value = match (op, value) {
        (Op::Set, Value::Bytes(v)) => Some(Bytes::from(v)),
        (Op::Set, _) => return Err(CoreError::codec("SET record without a byte value")),
        (Op::Del, _) => None,
    };

    Ok(ChangeRecord {
        revision: integer(revision, "revision")?,
        timestamp: HybridTimestamp {
            physical_ms: integer(physical, "physical_ms")?,
            logical: integer(logical, "logical")?,
            node_id: text(node, "node_id")?,
        },
        op,
        key: Bytes::from(byte_string(key, "key")?),
        value,
    })
}

pub(crate) fn integer<T: TryFrom<Integer>>(value: Value, field: &str) -> CoreResult<T> {
    match value {
        Value::Integer(i) => {
            T::try_from(i).map_err(|_| CoreError::codec(format!("{field} is out of range")))
        }
        _ => Err(CoreError::codec(format!("{field} must be an integer"))),
    }
}

pub(crate) fn text(value: Value, field: &str) -> CoreResult<String> {
    match value {
        Value::Text(s) => Ok(s),
        _ => Err(CoreError::codec(format!("{field} must be text"))),
    }
}

pub(crate) fn byte_string(value: Value, field: &str) -> CoreResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(CoreError::codec(format!("{field} must be a byte string"))),
    }
}
