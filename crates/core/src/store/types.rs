//! Store traits and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Episode, Name, QualityDecision, QualityTier, State};

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Episodes keyed by [`Name`].
pub trait ShowStore: Send + Sync {
    fn get(&self, name: &Name) -> Result<Option<Episode>, StoreError>;

    /// Idempotent insert-or-replace keyed by the episode name.
    fn upsert(&self, episode: &Episode) -> Result<(), StoreError>;

    /// Inserts the episode only if no record exists for its name.
    /// Returns whether a record was inserted.
    fn insert_if_absent(&self, episode: &Episode) -> Result<bool, StoreError>;

    /// All episodes in the given state, in [`Name`] order.
    fn list_by_state(&self, state: State) -> Result<Vec<Episode>, StoreError>;
}

/// Quality decisions keyed by [`Name`].
pub trait QualityStore: Send + Sync {
    /// Reads a decision without creating one.
    fn get(&self, name: &Name) -> Result<Option<QualityDecision>, StoreError>;

    /// Returns the existing decision, or atomically creates one with
    /// `first_seen_at = now`.
    fn get_or_create(&self, name: &Name, now: DateTime<Utc>)
        -> Result<QualityDecision, StoreError>;

    /// Compare-and-set of the accepted tier.
    ///
    /// Returns `false` when the decision was already accepted (or does not
    /// exist); exactly one concurrent caller can observe `true`.
    fn set_accepted(
        &self,
        name: &Name,
        tier: QualityTier,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Set of filenames already processed by the download directory pipeline.
pub trait HandledFileStore: Send + Sync {
    fn contains(&self, filename: &str) -> Result<bool, StoreError>;

    /// Returns `false` if the filename was already marked.
    fn mark_handled(&self, filename: &str) -> Result<bool, StoreError>;
}
