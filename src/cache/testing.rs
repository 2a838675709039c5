//! Scripted fetcher for exercising caches and schedules without a network.

use crate::feed::{Fetch, FetchError, Item, ItemKind};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn item_at(title: &str, ts: Option<i64>) -> Item {
    Item::new(
        None,
        title.to_string(),
        format!("https://example.org/{title}"),
        ts.and_then(|t| Utc.timestamp_opt(t, 0).single()),
        String::new(),
        ItemKind::News,
    )
}

/// Replays a fixed list of results, one per call. Once the script runs out
/// every further call fails with a parse error, which leaves caches intact.
pub(crate) struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Vec<Item>, FetchError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new(script: Vec<Result<Vec<Item>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetch for ScriptedFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Item>, FetchError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Parse("script exhausted".into())));

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            next
        })
    }
}
