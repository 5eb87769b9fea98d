//! Record framing for segment files.
//!
//! Every record is laid out as:
//!
//! ```text
//! | seq: u64 LE | len: u32 LE | payload (len bytes) | crc64: u64 LE |
//! ```
//!
//! The checksum is CRC-64/ECMA-182 over the 12 header bytes followed by the
//! payload. A frame whose length field exceeds [`MAX_RECORD_SIZE`], whose
//! bytes run past the readable end, or whose checksum does not match marks
//! the start of a torn tail.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crc::{Crc, CRC_64_ECMA_182};

/// Size of the `seq` + `len` header.
pub const HEADER_LEN: usize = 12;

/// Size of the trailing checksum.
pub const CRC_LEN: usize = 8;

/// Bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CRC_LEN;

/// Largest payload accepted on append or trusted on read (100 MiB).
pub const MAX_RECORD_SIZE: usize = 100 * 1024 * 1024;

/// Checksum used for every frame.
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Encodes one frame.
///
/// # Errors
///
/// Returns [`StorageError::RecordTooLarge`] if the payload exceeds
/// [`MAX_RECORD_SIZE`].
pub fn encode(seq: u64, payload: &[u8]) -> StorageResult<Vec<u8>> {
    if payload.len() > MAX_RECORD_SIZE {
        return Err(StorageError::RecordTooLarge {
            len: payload.len(),
            max: MAX_RECORD_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);

    let crc = CRC64.checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// A decoded, checksum-verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number stamped by the log.
    pub seq: u64,
    /// Offset of the frame's first header byte.
    pub offset: u64,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Offset just past this frame.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + (FRAME_OVERHEAD + self.payload.len()) as u64
    }
}

/// Result of reading at one offset.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, valid frame.
    Frame(Frame),
    /// Clean end of the readable range.
    End,
    /// The bytes at `offset` do not form a valid frame.
    Torn {
        /// Where the invalid tail starts.
        offset: u64,
        /// What failed.
        reason: String,
    },
}

/// Sequential frame reader over a backend.
///
/// Only bytes below `limit` are considered, which lets a reader work from a
/// length captured under the writer's lock while appends continue.
pub struct FrameReader<'a> {
    backend: &'a dyn StorageBackend,
    offset: u64,
    limit: u64,
}

impl<'a> FrameReader<'a> {
    /// Reads every frame the backend currently holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend length cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> StorageResult<Self> {
        let limit = backend.len()?;
        Ok(Self::with_limit(backend, limit))
    }

    /// Reads frames that lie entirely below `limit`.
    #[must_use]
    pub fn with_limit(backend: &'a dyn StorageBackend, limit: u64) -> Self {
        Self {
            backend,
            offset: 0,
            limit,
        }
    }

    /// Offset of the next frame; after a torn read, the last valid boundary.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures; malformed bytes are reported
    /// as [`FrameRead::Torn`] and do not advance the reader.
    pub fn next_frame(&mut self) -> StorageResult<FrameRead> {
        let offset = self.offset;
        let remaining = self.limit.saturating_sub(offset);
        if remaining == 0 {
            return Ok(FrameRead::End);
        }
        if remaining < HEADER_LEN as u64 {
            return Ok(torn(offset, format!("{remaining} trailing bytes")));
        }

        let header = self.backend.read_at(offset, HEADER_LEN)?;
        let seq = u64::from_le_bytes(header[0..8].try_into().map_err(corrupt_slice)?);
        let len = u32::from_le_bytes(header[8..12].try_into().map_err(corrupt_slice)?) as usize;

        if len > MAX_RECORD_SIZE {
            return Ok(torn(offset, format!("length {len} exceeds limit")));
        }
        let frame_len = (FRAME_OVERHEAD + len) as u64;
        if frame_len > remaining {
            return Ok(torn(
                offset,
                format!("frame needs {frame_len} bytes, {remaining} available"),
            ));
        }

        let rest = self.backend.read_at(offset + HEADER_LEN as u64, len + CRC_LEN)?;
        let (payload, crc_bytes) = rest.split_at(len);
        let stored = u64::from_le_bytes(crc_bytes.try_into().map_err(corrupt_slice)?);

        let mut digest = CRC64.digest();
        digest.update(&header);
        digest.update(payload);
        let computed = digest.finalize();
        if stored != computed {
            return Ok(torn(
                offset,
                format!("crc mismatch: stored {stored:016x}, computed {computed:016x}"),
            ));
        }

        self.offset = offset + frame_len;
        Ok(FrameRead::Frame(Frame {
            seq,
            offset,
            payload: payload.to_vec(),
        }))
    }
}

fn torn(offset: u64, reason: String) -> FrameRead {
    FrameRead::Torn { offset, reason }
}

fn corrupt_slice(_: std::array::TryFromSliceError) -> StorageError {
    StorageError::Corrupted("short frame slice".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;

    fn image(frames: &[(u64, &[u8])]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(seq, payload)| encode(*seq, payload).unwrap())
            .collect()
    }

    fn read_all(backend: &InMemoryBackend) -> (Vec<Frame>, Option<u64>) {
        let mut reader = FrameReader::new(backend).unwrap();
        let mut frames = Vec::new();
        loop {
            match reader.next_frame().unwrap() {
                FrameRead::Frame(f) => frames.push(f),
                FrameRead::End => return (frames, None),
                FrameRead::Torn { offset, .. } => return (frames, Some(offset)),
            }
        }
    }

    #[test]
    fn frame_layout_matches_header_payload_crc() {
        let bytes = encode(7, b"abc").unwrap();
        assert_eq!(bytes.len(), FRAME_OVERHEAD + 3);
        assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(&bytes[12..15], b"abc");
        let crc = CRC64.checksum(&bytes[..15]);
        assert_eq!(&bytes[15..], &crc.to_le_bytes());
    }

    #[test]
    fn reads_consecutive_frames() {
        let backend = InMemoryBackend::with_data(image(&[(1, b"one"), (2, b""), (3, b"three")]));
        let (frames, torn_at) = read_all(&backend);

        assert!(torn_at.is_none());
        assert_eq!(frames.iter().map(|f| f.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(frames[1].payload, b"");
        assert_eq!(frames[2].payload, b"three");
        assert_eq!(frames[2].end(), backend.len().unwrap());
    }

    #[test]
    fn partial_tail_is_torn_at_frame_start() {
        let mut bytes = image(&[(1, b"one"), (2, b"two")]);
        let boundary = encode(1, b"one").unwrap().len() as u64;
        bytes.truncate(bytes.len() - 3);

        let (frames, torn_at) = read_all(&InMemoryBackend::with_data(bytes));
        assert_eq!(frames.len(), 1);
        assert_eq!(torn_at, Some(boundary));
    }

    #[test]
    fn oversized_length_field_is_torn() {
        let mut bytes = encode(1, b"x").unwrap();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());

        let (frames, torn_at) = read_all(&InMemoryBackend::with_data(bytes));
        assert!(frames.is_empty());
        assert_eq!(torn_at, Some(0));
    }

    #[test]
    fn limit_hides_frames_written_later() {
        let first = encode(1, b"one").unwrap();
        let limit = first.len() as u64;
        let backend = InMemoryBackend::with_data(image(&[(1, b"one"), (2, b"two")]));

        let mut reader = FrameReader::with_limit(&backend, limit);
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::Frame(_)));
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::End));
    }

    #[test]
    fn oversized_payload_is_rejected_on_encode() {
        let payload = vec![0u8; MAX_RECORD_SIZE + 1];
        assert!(matches!(
            encode(1, &payload),
            Err(StorageError::RecordTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn any_single_bit_flip_is_detected(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            bit in any::<prop::sample::Index>(),
        ) {
            let mut bytes = encode(42, &payload).unwrap();
            let bit = bit.index(bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);

            let (frames, torn_at) = read_all(&InMemoryBackend::with_data(bytes));
            prop_assert!(frames.is_empty());
            prop_assert_eq!(torn_at, Some(0));
        }
    }
}
