//! Feed retrieval and parsing for the dashboard's content feeds.
//!
//! - **Items**: the normalized [`Item`] every feed kind produces
//! - **Parsing**: RSS/Atom documents, video listings, and the instant-launch
//!   JSON listing, each turned into items with a kind set by the caller
//! - **Fetching**: HTTP retrieval with a bounded timeout, retries for
//!   transient upstream errors, and a response size ceiling
//!
//! # Example
//!
//! ```ignore
//! use dashfeed::feed::{Fetcher, FetchPolicy};
//!
//! let fetcher = Fetcher::news(client, url, FetchPolicy::default());
//! let items = fetcher.fetch_items().await?;
//! ```

mod fetcher;
mod instant_launch;
mod item;
mod parser;

pub use fetcher::{
    fetch_bytes, Fetch, FetchError, FetchPolicy, Fetcher, MAX_BACKOFF, MAX_RETRIES,
};
pub use instant_launch::parse_instant_launches;
pub use item::{newest_first, sort_newest_first, Item, ItemKind};
pub use parser::{parse_syndication, parse_video_listing, ParseResult};
