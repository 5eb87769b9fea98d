//! Byte-level access to a single segment file.

use crate::error::StorageResult;

/// An append-only byte store holding the frames of one log segment.
///
/// Backends know nothing about frames, sequence numbers or checksums; the
/// [`crate::frame`] module owns that interpretation. The log only ever
/// appends, reads back, and cuts a torn tail off with [`truncate`].
///
/// [`truncate`]: StorageBackend::truncate
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current length, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Callers are expected to
    /// truncate back to the returned offset's predecessor on failure.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current length in bytes; the offset of the next append.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true when nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Discards every byte at or after `new_len`.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_len` is larger than the current length or
    /// the truncation fails.
    fn truncate(&mut self, new_len: u64) -> StorageResult<()>;
}
