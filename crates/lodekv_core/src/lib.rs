//! # lodekv core
//!
//! A replicated key-value engine for one node:
//!
//! - a revision-numbered change log on top of `lodekv_storage`
//! - a radix trie indexing live keys for prefix queries
//! - a last-writer-wins store ordered by hybrid logical clocks
//! - checkpoints that let old log segments be deleted
//!
//! [`Engine`] wires these together over a locked data directory. The
//! pieces are public so a replication layer can drive the store directly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lodekv_core::{Config, Engine};
//!
//! let engine = Engine::open(Config::new("data"))?;
//! let rev = engine.compare_and_set("lock/leader", 0, "node-a")?;
//! assert!(rev.is_some());
//! for record in engine.read_after(0)? {
//!     println!("{} {} {:?}", record.revision, record.op, record.key);
//! }
//! # Ok::<(), lodekv_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod changelog;
pub mod clock;
mod config;
pub mod dir;
mod engine;
mod error;
pub mod index;
pub mod lease;
pub mod snapshot;
pub mod store;
mod types;

pub use changelog::ChangeLog;
pub use clock::{HybridClock, TimestampSource};
pub use config::{Config, SnapshotSchedulerOptions};
pub use engine::{Engine, EngineHooks, EngineStats, RecoveryReport};
pub use error::{CoreError, CoreResult};
pub use index::RadixKeyIndex;
pub use lease::{LeaseSnapshotBackend, LeaseSnapshotEntry};
pub use snapshot::{SnapshotManager, SnapshotMeta, SnapshotScheduler};
pub use store::{ChangeFeed, ChangePublisher, NoopPublisher, ReplicatedKvStore};
pub use types::{ChangeRecord, HybridTimestamp, KvItem, Op};

/// Crate version, recorded by tooling.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
