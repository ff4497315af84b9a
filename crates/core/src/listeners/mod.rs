//! Subscribers wired between the schedulers, the arbiter and the library.

mod calendar;
mod downloadable;
mod library;

pub use calendar::CalendarListener;
pub use downloadable::{DownloadableItemListener, ItemOutcome};
pub use library::{LibraryListener, ReconcileOutcome};
