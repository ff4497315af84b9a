//! Keyed store contracts and the SQLite-backed implementation.
//!
//! Every operation that matters for correctness (quality acceptance,
//! handled-file marking, desired-episode insertion) is a single atomic
//! statement against the backing store, never a read followed by a write.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{HandledFileStore, QualityStore, ShowStore, StoreError};
