//! Request-time aggregation of cached feeds and other dashboard sections.
//!
//! Feed reads come straight from the caches and never touch the network.
//! Additional sections (apps, analyses, and the like) are supplied by
//! [`DashboardSource`] implementations owned by the serving layer; each runs
//! under its own timeout, and a failing one is reported in `errors` instead
//! of failing the whole response.

use crate::cache::{FeedCache, FeedSet};
use crate::feed::{Fetch, Fetcher, Item};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Items per feed when the caller does not ask for a specific number.
pub const DEFAULT_LIMIT: usize = 10;

const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// One section of the dashboard could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{section} unavailable: {reason}")]
pub struct PartialAggregationError {
    pub section: String,
    pub reason: String,
}

/// A non-feed dashboard section, e.g. the user's recent analyses.
pub trait DashboardSource: Send + Sync {
    /// Key the section is stored under in the response.
    fn name(&self) -> &str;

    fn load(&self, limit: usize) -> BoxFuture<'_, anyhow::Result<serde_json::Value>>;
}

/// The four feeds, each newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsView {
    pub news: Vec<Item>,
    pub events: Vec<Item>,
    pub videos: Vec<Item>,
    /// Never truncated.
    pub instant_launches: Vec<Item>,
}

/// Complete dashboard payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub feeds: FeedsView,
    #[serde(flatten)]
    pub sections: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PartialAggregationError>,
}

/// Read-only fan-out over the feed caches plus any extra sections.
pub struct Aggregator<F = Fetcher> {
    feeds: FeedSet<F>,
    sources: Vec<Arc<dyn DashboardSource>>,
    source_timeout: Duration,
}

impl<F: Fetch> Aggregator<F> {
    pub fn new(feeds: FeedSet<F>) -> Self {
        Self {
            feeds,
            sources: Vec::new(),
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DashboardSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Reads every feed concurrently. News, events, and videos are each
    /// truncated to `limit` independently; instant launches are returned
    /// whole.
    pub async fn feeds(&self, limit: usize) -> (FeedsView, Vec<PartialAggregationError>) {
        let (news, events, videos, instant_launches) = futures::join!(
            read_feed(&self.feeds.news, Some(limit)),
            read_feed(&self.feeds.events, Some(limit)),
            read_feed(&self.feeds.videos, Some(limit)),
            read_feed(&self.feeds.instant_launches, None),
        );

        let mut errors = Vec::new();
        let mut take = |result: Result<Vec<Item>, PartialAggregationError>| {
            result.unwrap_or_else(|e| {
                tracing::warn!(section = %e.section, error = %e.reason, "Feed read failed");
                errors.push(e);
                Vec::new()
            })
        };

        let view = FeedsView {
            news: take(news),
            events: take(events),
            videos: take(videos),
            instant_launches: take(instant_launches),
        };
        (view, errors)
    }

    /// Builds the full dashboard: all feeds plus every registered section.
    pub async fn dashboard(&self, limit: usize) -> Dashboard {
        let sections = join_all(
            self.sources
                .iter()
                .map(|source| load_section(source.as_ref(), limit, self.source_timeout)),
        );
        let ((feeds, mut errors), loaded) = futures::join!(self.feeds(limit), sections);

        let mut sections = BTreeMap::new();
        for result in loaded {
            match result {
                Ok((name, value)) => {
                    sections.insert(name, value);
                }
                Err(e) => {
                    tracing::warn!(section = %e.section, error = %e.reason, "Dashboard section failed");
                    errors.push(e);
                }
            }
        }

        Dashboard {
            feeds,
            sections,
            errors,
        }
    }
}

async fn read_feed<F: Fetch>(
    cache: &FeedCache<F>,
    limit: Option<usize>,
) -> Result<Vec<Item>, PartialAggregationError> {
    catch_task_panic(async {
        let items = cache.items();
        let end = limit.map_or(items.len(), |l| l.min(items.len()));
        items[..end].to_vec()
    })
    .await
    .map_err(|reason| PartialAggregationError {
        section: cache.name().to_string(),
        reason,
    })
}

async fn load_section(
    source: &dyn DashboardSource,
    limit: usize,
    timeout: Duration,
) -> Result<(String, serde_json::Value), PartialAggregationError> {
    let name = source.name().to_string();
    let fail = |reason: String| PartialAggregationError {
        section: name.clone(),
        reason,
    };

    match tokio::time::timeout(timeout, catch_task_panic(source.load(limit))).await {
        Ok(Ok(Ok(value))) => Ok((name.clone(), value)),
        Ok(Ok(Err(e))) => Err(fail(format!("{e:#}"))),
        Ok(Err(panic_msg)) => Err(fail(format!("panicked: {panic_msg}"))),
        Err(_) => Err(fail(format!("timed out after {timeout:?}"))),
    }
}

/// Converts a panic inside `future` into an error message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        })
}
