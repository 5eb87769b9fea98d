//! Checkpoint hook for the lease layer.
//!
//! Lease management lives outside this crate. When one is attached, the
//! snapshot manager asks it for its leases on checkpoint and hands them
//! back on load, carrying the attached keys in a compact packed buffer.

use crate::error::{CoreError, CoreResult};
use bytes::Bytes;

/// One lease as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSnapshotEntry {
    /// Lease identifier.
    pub lease_id: i64,
    /// Absolute expiry time in milliseconds since the Unix epoch.
    pub expire_at_ms: i64,
    /// Granted time-to-live in milliseconds.
    pub ttl_ms: i64,
    /// Keys attached to the lease.
    pub keys: Vec<Bytes>,
}

/// Lease state provider consulted by the snapshot manager.
pub trait LeaseSnapshotBackend: Send + Sync {
    /// Returns every live lease.
    fn export_leases(&self) -> Vec<LeaseSnapshotEntry>;

    /// Replaces lease state with the entries from a checkpoint.
    fn restore_leases(&self, entries: Vec<LeaseSnapshotEntry>);
}

/// Packs keys into `count | offsets[count] | key bytes`, all integers as
/// little-endian `i32`. Offset `i` is the absolute start of key `i`; each key
/// ends where the next begins, the last at the end of the buffer.
///
/// # Errors
///
/// Returns a codec error if the packed buffer would exceed `i32::MAX` bytes.
pub fn pack_keys<K: AsRef<[u8]>>(keys: &[K]) -> CoreResult<Vec<u8>> {
    let header = 4 + 4 * keys.len();
    let total = header + keys.iter().map(|k| k.as_ref().len()).sum::<usize>();
    let too_large = || CoreError::codec("packed lease keys exceed i32 range");
    i32::try_from(total).map_err(|_| too_large())?;

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(keys.len() as i32).to_le_bytes());
    let mut offset = header;
    for key in keys {
        buf.extend_from_slice(&(offset as i32).to_le_bytes());
        offset += key.as_ref().len();
    }
    for key in keys {
        buf.extend_from_slice(key.as_ref());
    }
    Ok(buf)
}

/// Reverses [`pack_keys`].
///
/// # Errors
///
/// Returns a codec error if the header or offsets are inconsistent with the
/// buffer length.
pub fn unpack_keys(buf: &[u8]) -> CoreResult<Vec<Bytes>> {
    let count = read_i32(buf, 0)?;
    let count = usize::try_from(count).map_err(|_| CoreError::codec("negative packed key count"))?;
    let header = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .filter(|&n| n <= buf.len())
        .ok_or_else(|| CoreError::codec("packed key table exceeds buffer"))?;

    let offsets = (0..count)
        .map(|i| {
            let off = read_i32(buf, 4 + 4 * i)?;
            usize::try_from(off).map_err(|_| CoreError::codec("negative packed key offset"))
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let mut keys = Vec::with_capacity(count);
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(buf.len());
        if start < header || start > end || end > buf.len() {
            return Err(CoreError::codec(format!("packed key {i} out of bounds")));
        }
        keys.push(Bytes::copy_from_slice(&buf[start..end]));
    }
    Ok(keys)
}

fn read_i32(buf: &[u8], at: usize) -> CoreResult<i32> {
    buf.get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(i32::from_le_bytes)
        .ok_or_else(|| CoreError::codec("truncated packed keys"))
}
