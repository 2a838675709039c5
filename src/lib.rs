//! Feed cache and refresh scheduler for a personalized dashboard backend.
//!
//! News, events, video listings, and promoted instant launches are fetched
//! from their upstreams in the background, normalized into [`feed::Item`]s,
//! and held in per-feed caches. Request handlers read those caches through
//! the [`aggregate::Aggregator`] and never wait on an upstream.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod feed;
pub mod util;
