//! Quality arbitration.
//!
//! Decides whether a discovered `(episode, quality)` pair should be
//! downloaded. Primary-tier releases are accepted immediately; a
//! secondary-tier release is only accepted once the primary window for
//! that episode has elapsed. Each episode is accepted at most once.

mod quality_arbiter;
mod types;

pub use quality_arbiter::QualityArbiter;
pub use types::{ArbiterConfig, RejectReason, Verdict};
