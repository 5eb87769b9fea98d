//! # lodekv storage
//!
//! The durable layer of lodekv: a segmented, append-only log of opaque
//! records.
//!
//! Records are framed with a sequence number, a length and a CRC-64 so that
//! a crash mid-write leaves a detectable torn tail, which is cut off on the
//! next open. Segments rotate at a size threshold and whole segments are
//! dropped once a checkpoint covers them.
//!
//! This crate does not interpret payloads; revision numbering and the
//! change-record encoding live in `lodekv_core`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lodekv_storage::{SegmentedLog, StorageError};
//!
//! let log = SegmentedLog::open("wal", 0)?;
//! let seq = log.append(b"hello")?;
//! log.scan_from(seq - 1, usize::MAX, |seq, payload| {
//!     println!("{seq}: {payload:?}");
//!     Ok::<(), StorageError>(())
//! })?;
//! # Ok::<(), StorageError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
pub mod frame;
pub mod fsutil;
mod log;
mod manifest;
mod memory;
pub mod segment;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use log::{LogOptions, SegmentedLog, DEFAULT_SEGMENT_SIZE};
pub use manifest::{LogManifest, MANIFEST_FILE};
pub use memory::InMemoryBackend;
pub use segment::SegmentMeta;
