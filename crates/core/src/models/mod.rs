//! Value types shared by every stage of the pipeline.
//!
//! These types are immutable: state transitions build a new value instead of
//! mutating an existing one.

mod episode;
mod item;
mod name;
mod quality;

pub use episode::{Episode, State};
pub use item::{DiscoveredItem, FeedItem, Identified};
pub use name::{Name, NameAndQuality};
pub use quality::{Quality, QualityDecision, QualityTier, QualityTiers};
