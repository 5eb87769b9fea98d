//! Core value types: timestamps, change records and stored items.

use bytes::Bytes;
use std::fmt;

/// A hybrid logical clock reading.
///
/// Ordered lexicographically by `(physical_ms, logical, node_id)`, which
/// gives a total order even across nodes whose wall clocks agree. The
/// derived `Ord` relies on that field order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HybridTimestamp {
    /// Wall-clock component in milliseconds since the Unix epoch.
    pub physical_ms: i64,
    /// Counter disambiguating events within one millisecond.
    pub logical: i32,
    /// Identifier of the node that produced the reading.
    pub node_id: String,
}

impl HybridTimestamp {
    /// Creates a timestamp.
    pub fn new(physical_ms: i64, logical: i32, node_id: impl Into<String>) -> Self {
        Self {
            physical_ms,
            logical,
            node_id: node_id.into(),
        }
    }
}

impl fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.physical_ms, self.logical, self.node_id)
    }
}

/// Kind of mutation carried by a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Store a value.
    Set,
    /// Replace the value with a tombstone.
    Del,
}

impl Op {
    /// Wire code used in the log encoding.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Set => 1,
            Self::Del => 2,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Set),
            2 => Some(Self::Del),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Set => "SET",
            Self::Del => "DEL",
        })
    }
}

/// One mutation as it travels through the log, the store and replication.
///
/// `value` is present exactly when `op` is [`Op::Set`]. The revision is
/// assigned by the change log on append; records built by callers carry 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Log-assigned revision, or 0 before append.
    pub revision: u64,
    /// When and where the change was made.
    pub timestamp: HybridTimestamp,
    /// SET or DEL.
    pub op: Op,
    /// Affected key.
    pub key: Bytes,
    /// New value; `None` for deletes.
    pub value: Option<Bytes>,
}

impl ChangeRecord {
    /// A SET record awaiting a revision.
    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>, timestamp: HybridTimestamp) -> Self {
        Self {
            revision: 0,
            timestamp,
            op: Op::Set,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// A DEL record awaiting a revision.
    pub fn delete(key: impl Into<Bytes>, timestamp: HybridTimestamp) -> Self {
        Self {
            revision: 0,
            timestamp,
            op: Op::Del,
            key: key.into(),
            value: None,
        }
    }

    /// Returns the record stamped with `revision`.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns true for deletes.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// The state of one key in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvItem {
    /// The key.
    pub key: Bytes,
    /// Current value, or `None` for a tombstone.
    pub value: Option<Bytes>,
    /// Timestamp of the winning write.
    pub timestamp: HybridTimestamp,
    /// Revision of the winning write; 0 when restored from a snapshot.
    pub revision: u64,
}

impl KvItem {
    /// Returns true if the key has been deleted.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// The record that recreates this item when applied.
    #[must_use]
    pub fn into_record(self) -> ChangeRecord {
        ChangeRecord {
            revision: self.revision,
            timestamp: self.timestamp,
            op: if self.value.is_some() { Op::Set } else { Op::Del },
            key: self.key,
            value: self.value,
        }
    }
}

/// A delete, or a set that carries no value, becomes a tombstone.
impl From<&ChangeRecord> for KvItem {
    fn from(record: &ChangeRecord) -> Self {
        Self {
            key: record.key.clone(),
            value: match record.op {
                Op::Set => record.value.clone(),
                Op::Del => None,
            },
            timestamp: record.timestamp.clone(),
            revision: record.revision,
        }
    }
}
