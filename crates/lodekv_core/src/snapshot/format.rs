//! CBOR layout of `snapshot.cbor`.
//!
//! ```text
//! [ last_log_offset,
//!   [ [key, value | null, physical_ms, logical, node_id], ... ],
//!   [ [lease_id, expire_at_ms, ttl_ms, packed_keys], ... ]      ; optional
//! ]
//! ```
//!
//! The lease section is present only when a lease backend reported at least
//! one active lease at checkpoint time; readers accept both the two- and three-element forms.

use crate::changelog::codec::{byte_string, integer, text};
use crate::error::{CoreError, CoreResult};
use crate::lease::{pack_keys, unpack_keys, LeaseSnapshotEntry};
use crate::types::{HybridTimestamp, KvItem};
use bytes::Bytes;
use ciborium::value::Value;

/// Decoded contents of a checkpoint blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBlob {
    /// Log sequence number covered by the checkpoint.
    pub last_log_offset: u64,
    /// Every item, tombstones included. Revisions are not stored.
    pub items: Vec<KvItem>,
    /// Lease section, if one was written.
    pub leases: Option<Vec<LeaseSnapshotEntry>>,
}

/// Serializes a checkpoint blob.
///
/// # Errors
///
/// Returns a codec error if CBOR serialization or key packing fails.
pub fn encode(blob: &SnapshotBlob) -> CoreResult<Vec<u8>> {
    let items = blob
        .items
        .iter()
        .map(|item| {
            Value::Array(vec![
                Value::Bytes(item.key.to_vec()),
                item.value.as_ref().map_or(Value::Null, |v| Value::Bytes(v.to_vec())),
                Value::Integer(item.timestamp.physical_ms.into()),
                Value::Integer(item.timestamp.logical.into()),
                Value::Text(item.timestamp.node_id.clone()),
            ])
        })
        .collect();

    let mut root = vec![
        Value::Integer(blob.last_log_offset.into()),
        Value::Array(items),
    ];

    if let Some(leases) = &blob.leases {
        let leases = leases
            .iter()
            .map(|lease| {
                Ok(Value::Array(vec![
                    Value::Integer(lease.lease_id.into()),
                    Value::Integer(lease.expire_at_ms.into()),
                    Value::Integer(lease.ttl_ms.into()),
                    Value::Bytes(pack_keys(&lease.keys)?),
                ]))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        root.push(Value::Array(leases));
    }

    let mut out = Vec::new();
    ciborium::ser::into_writer(&Value::Array(root), &mut out)?;
    Ok(out)
}

/// Parses a checkpoint blob. Items come back with revision 0.
///
/// # Errors
///
/// Returns a codec error if the blob is not a complete, well-formed
/// checkpoint.
pub fn decode(data: &[u8]) -> CoreResult<SnapshotBlob> {
    let root: Value = ciborium::de::from_reader(data)?;
    let mut root = array(root, "snapshot")?.into_iter();
    if !(2..=3).contains(&root.len()) {
        return Err(CoreError::codec(format!(
            "snapshot must have 2 or 3 sections, found {}",
            root.len()
        )));
    }

    let last_log_offset = integer(next(&mut root, "last_log_offset")?, "last_log_offset")?;
    let items = array(next(&mut root, "items")?, "items")?
        .into_iter()
        .map(decode_item)
        .collect::<CoreResult<Vec<_>>>()?;
    let leases = root
        .next()
        .map(|section| {
            array(section, "leases")?
                .into_iter()
                .map(decode_lease)
                .collect::<CoreResult<Vec<_>>>()
        })
        .transpose()?;

    Ok(SnapshotBlob {
        last_log_offset,
        items,
        leases,
    })
}

fn decode_item(value: Value) -> CoreResult<KvItem> {
    let fields: [Value; 5] = array(value, "item")?
        .try_into()
        .map_err(|_| CoreError::codec("snapshot item must have 5 fields"))?;
    let [key, value, physical, logical, node] = fields;

    let value = match value {
        Value::Null => None,
        Value::Bytes(v) => Some(Bytes::from(v)),
        _ => return Err(CoreError::codec("snapshot value must be bytes or null")),
    };

    Ok(KvItem {
        key: Bytes::from(byte_string(key, "key")?),
        value,
        timestamp: HybridTimestamp {
            physical_ms: integer(physical, "physical_ms")?,
            logical: integer(logical, "logical")?,
            node_id: text(node, "node_id")?,
        },
        revision: 0,
    })
}

fn decode_lease(value: Value) -> CoreResult<LeaseSnapshotEntry> {
    let fields: [Value; 4] = array(value, "lease")?
        .try_into()
        .map_err(|_| CoreError::codec("snapshot lease must have 4 fields"))?;
    let [lease_id, expire_at_ms, ttl_ms, packed] = fields;

    Ok(LeaseSnapshotEntry {
        lease_id: integer(lease_id, "lease_id")?,
        expire_at_ms: integer(expire_at_ms, "expire_at_ms")?,
        ttl_ms: integer(ttl_ms, "ttl_ms")?,
        keys: unpack_keys(&byte_string(packed, "packed_keys")?)?,
    })
}

fn array(value: Value, what: &str) -> CoreResult<Vec<Value>> {
    match value {
        Value::Array(values) => Ok(values),
        _ => Err(CoreError::codec(format!("{what} must be an array"))),
    }
}

fn next(it: &mut impl Iterator<Item = Value>, what: &str) -> CoreResult<Value> {
    it.next()
        .ok_or_else(|| CoreError::codec(format!("snapshot is missing {what}")))
}
