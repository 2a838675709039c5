//! In-memory feed caches and their background refresh schedules.
//!
//! # Lifecycle
//!
//! 1. [`FeedSet::from_config`] builds one [`FeedCache`] per feed (no I/O)
//! 2. [`FeedSet::initial_pull`] fills every cache once before serving
//! 3. [`FeedSet::start_schedules`] attaches a [`RefreshSchedule`] per cache
//!
//! Request handlers only ever call [`FeedCache::items`], which returns the
//! most recent successful snapshot without touching the network.

mod feed_cache;
mod feed_set;
mod schedule;
#[cfg(test)]
pub(crate) mod testing;

pub use feed_cache::{FeedCache, FeedStatus, RefreshOutcome, Snapshot};
pub use feed_set::{shutdown_schedules, FeedSet};
pub use schedule::{RefreshSchedule, ScheduleState};
