use crate::feed::{sort_newest_first, Fetch, FetchError, Fetcher, Item, ItemKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// One complete result of a successful refresh.
///
/// Snapshots are immutable; a refresh builds a new one and swaps the `Arc`,
/// so a reader holding a snapshot never sees it change underneath it.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Sorted newest first at the moment of the refresh.
    pub items: Arc<Vec<Item>>,
    /// `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// What happened to a refresh that was allowed to run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot was replaced with this many items.
    Replaced(usize),
    /// The fetch finished after its schedule was stopped; nothing was applied.
    Discarded,
}

/// Health view of one feed, used for status output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub name: String,
    pub kind: ItemKind,
    pub items: usize,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// In-memory cache of one feed's items.
///
/// Reads never perform I/O and never wait on a refresh. Refreshes are
/// serialized per cache; a failed refresh leaves the previous snapshot in
/// place.
pub struct FeedCache<F = Fetcher> {
    name: String,
    kind: ItemKind,
    fetcher: F,
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<String>>,
}

impl<F: Fetch> FeedCache<F> {
    /// Creates an empty cache. Performs no I/O.
    pub fn new(name: impl Into<String>, kind: ItemKind, fetcher: F) -> Self {
        Self {
            name: name.into(),
            kind,
            fetcher,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The most recent successful snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        // Only whole Arcs are ever stored, so a poisoned lock still holds a
        // complete snapshot.
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Current items, newest first. Empty until the first successful refresh.
    pub fn items(&self) -> Arc<Vec<Item>> {
        Arc::clone(&self.snapshot().items)
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.snapshot().refreshed_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> FeedStatus {
        let snapshot = self.snapshot();
        FeedStatus {
            name: self.name.clone(),
            kind: self.kind,
            items: snapshot.items.len(),
            last_refreshed_at: snapshot.refreshed_at,
            last_error: self.last_error(),
        }
    }

    /// Fetches the feed and replaces the snapshot on success.
    ///
    /// Waits for any refresh already in flight on this cache before starting.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] from the fetcher; the cached snapshot is
    /// left exactly as it was.
    pub async fn refresh(&self) -> Result<usize, FetchError> {
        let _guard = self.refresh_lock.lock().await;
        match self.refresh_locked(|| true).await? {
            RefreshOutcome::Replaced(count) => Ok(count),
            RefreshOutcome::Discarded => Ok(0),
        }
    }

    /// Scheduler entry point: skips instead of queueing when a refresh is
    /// already running, and drops the result if `still_wanted` turns false
    /// while the fetch is in flight.
    ///
    /// Returns `None` when the refresh was skipped.
    pub(crate) async fn try_refresh<C>(
        &self,
        still_wanted: C,
    ) -> Option<Result<RefreshOutcome, FetchError>>
    where
        C: Fn() -> bool + Send,
    {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            tracing::debug!(feed = %self.name, "Refresh already in flight, skipping tick");
            return None;
        };
        Some(self.refresh_locked(still_wanted).await)
    }

    async fn refresh_locked<C>(&self, still_wanted: C) -> Result<RefreshOutcome, FetchError>
    where
        C: Fn() -> bool + Send,
    {
        let started = Instant::now();
        let result = self.fetcher.fetch().await;

        if !still_wanted() {
            tracing::debug!(
                feed = %self.name,
                ok = result.is_ok(),
                "Refresh finished after stop, discarding result"
            );
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(mut items) => {
                sort_newest_first(&mut items);
                let count = items.len();
                self.replace(items);
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
                tracing::debug!(
                    feed = %self.name,
                    items = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Feed refreshed"
                );
                Ok(RefreshOutcome::Replaced(count))
            }
            Err(e) => {
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
                Err(e)
            }
        }
    }

    fn replace(&self, items: Vec<Item>) {
        let next = Arc::new(Snapshot {
            items: Arc::new(items),
            refreshed_at: Some(Utc::now()),
        });
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }
}

impl<F> std::fmt::Debug for FeedCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCache")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
