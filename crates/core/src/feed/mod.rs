//! Feed polling.
//!
//! This module provides:
//! - `FeedParser` / `SearchParser` traits for pluggable sources
//! - `FeedScheduler`, a generic poller with deduplication and fan-out
//! - `ParserRegistry`, mapping configured source names to constructors
//! - built-in `rss` and `jackett` parsers

mod jackett;
mod registry;
mod rss;
mod scheduler;
mod types;

pub use jackett::JackettSearchParser;
pub use registry::{FeedParserFactory, ParserRegistry, SearchParserFactory};
pub use rss::RssParser;
pub use scheduler::{FeedScheduler, PollReport, SchedulerConfig};
pub use types::{FeedParser, ItemListener, ParserError, ParserSettings, SearchParser};
