use crate::cache::feed_cache::{FeedCache, FeedStatus};
use crate::cache::schedule::RefreshSchedule;
use crate::config::Config;
use crate::feed::{Fetch, Fetcher, ItemKind};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// The dashboard's four feed caches, constructed once at startup and shared
/// with request handlers for the life of the process.
#[derive(Debug)]
pub struct FeedSet<F = Fetcher> {
    pub news: Arc<FeedCache<F>>,
    pub events: Arc<FeedCache<F>>,
    pub videos: Arc<FeedCache<F>>,
    pub instant_launches: Arc<FeedCache<F>>,
}

impl<F> Clone for FeedSet<F> {
    fn clone(&self) -> Self {
        Self {
            news: Arc::clone(&self.news),
            events: Arc::clone(&self.events),
            videos: Arc::clone(&self.videos),
            instant_launches: Arc::clone(&self.instant_launches),
        }
    }
}

impl FeedSet<Fetcher> {
    /// Builds one cache per configured feed. Performs no I/O.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let policy = config.fetch_policy;
        let il = &config.instant_launches;

        Self::new(
            Fetcher::news(client.clone(), config.news.url.clone(), policy),
            Fetcher::events(client.clone(), config.events.url.clone(), policy),
            Fetcher::video(client.clone(), config.videos.url.clone(), policy),
            Fetcher::instant_launches(
                client,
                il.source.url.clone(),
                il.launch_url_base.clone(),
                policy,
            ),
        )
    }
}

impl<F: Fetch> FeedSet<F> {
    pub fn new(news: F, events: F, videos: F, instant_launches: F) -> Self {
        Self {
            news: Arc::new(FeedCache::new("news", ItemKind::News, news)),
            events: Arc::new(FeedCache::new("events", ItemKind::Event, events)),
            videos: Arc::new(FeedCache::new("videos", ItemKind::Video, videos)),
            instant_launches: Arc::new(FeedCache::new(
                "instant_launches",
                ItemKind::InstantLaunch,
                instant_launches,
            )),
        }
    }

    pub fn caches(&self) -> [&Arc<FeedCache<F>>; 4] {
        [
            &self.news,
            &self.events,
            &self.videos,
            &self.instant_launches,
        ]
    }

    /// Refreshes every feed once, concurrently, and waits for all of them.
    ///
    /// Failures are logged and leave that feed empty; they never abort
    /// startup. Returns how many feeds loaded successfully.
    pub async fn initial_pull(&self) -> usize {
        let results = join_all(self.caches().map(|cache| async move {
            let result = cache.refresh().await;
            match &result {
                Ok(count) => {
                    tracing::info!(feed = %cache.name(), items = count, "Initial pull complete");
                }
                Err(e) => {
                    tracing::warn!(
                        feed = %cache.name(),
                        error = %e,
                        "Initial pull failed, feed starts empty"
                    );
                }
            }
            result.is_ok()
        }))
        .await;

        results.into_iter().filter(|ok| *ok).count()
    }

    /// Starts one independent schedule per feed.
    pub fn start_schedules(&self, period: Duration) -> Vec<RefreshSchedule<F>> {
        self.caches()
            .into_iter()
            .map(|cache| {
                let mut schedule = RefreshSchedule::new(Arc::clone(cache), period);
                schedule.start();
                schedule
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<FeedStatus> {
        self.caches().iter().map(|c| c.status()).collect()
    }
}

/// Stops every schedule and waits for in-flight refreshes to wind down.
pub async fn shutdown_schedules<F: Fetch>(schedules: Vec<RefreshSchedule<F>>) {
    join_all(schedules.into_iter().map(RefreshSchedule::shutdown)).await;
}
