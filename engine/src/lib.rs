//! # Quotesync Engine
//!
//! Deterministic core of a local-first quote collection that mirrors itself
//! against a remote service.
//!
//! This crate owns the record model, the reconciliation of local state with a
//! remote snapshot, the retry policy for unsent writes, and the persisted
//! encoding. It performs no network IO and holds no clock: every operation
//! that needs the current time takes it as an argument.
//!
//! ## Design Principles
//!
//! - **No network**: the remote mirror lives in the client crate
//! - **Deterministic**: the same local state and snapshot always merge the same way
//! - **Fail-soft persistence**: a broken storage backend never loses in-memory state
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a quote with:
//! - An identifier tagged by [`Origin`] (`local-…` or `srv-…`)
//! - Text and category
//! - An `updatedAt` timestamp
//! - A `synced` flag and push retry bookkeeping
//!
//! ### Reconciliation
//!
//! [`merge`] folds a remote snapshot into the local collection. For every id
//! the remote mirror reports, the remote content wins.
//!
//! ### Retry
//!
//! [`RetryPolicy`] decides per cycle whether a pending record is pushed,
//! left to back off, or abandoned.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use quotesync_engine::{MemoryStorage, Record, RecordId, RecordStore};
//!
//! let mut store = RecordStore::open(MemoryStorage::new());
//! store.add_local("Simplicity is prerequisite for reliability.", "engineering", Utc::now())?;
//!
//! let snapshot = vec![Record::new_remote(
//!     RecordId::remote(1),
//!     "sunt aut facere",
//!     "quia et suscipit",
//!     Utc::now(),
//! )];
//! let summary = store.merge_remote(&snapshot);
//!
//! assert_eq!(summary.additions, 1);
//! assert_eq!(store.pending().len(), 1);
//! # Ok::<(), quotesync_engine::Error>(())
//! ```

pub mod error;
pub mod reconcile;
pub mod record;
pub mod retry;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use reconcile::{merge, MergeAction, MergeResult, MergeSummary};
pub use record::{Origin, PushState, Record, RecordId, LOCAL_PREFIX, REMOTE_PREFIX};
pub use retry::{PushDecision, RetryPolicy};
pub use snapshot::DEFAULT_CATEGORY;
pub use store::{
    AckSummary, MemoryStorage, PendingPush, PushOutcome, QueryBuilder, RecordStore, Storage,
    ALL_CATEGORIES, FILTER_KEY, RECORDS_KEY,
};

/// Wall-clock instant used throughout the engine.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
