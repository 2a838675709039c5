use crate::feed::instant_launch::parse_instant_launches;
use crate::feed::item::{Item, ItemKind};
use crate::feed::parser::{parse_syndication, parse_video_listing, ParseResult};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Hard ceiling on retries, whatever the policy asks for.
pub const MAX_RETRIES: u32 = 5;

/// Longest single backoff sleep between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors that can occur during one fetch of a feed.
///
/// A fetch error is never fatal: the cache keeps its previous snapshot and
/// the scheduler logs the error and tries again on the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Document could not be parsed, or every entry in it was unusable
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            FetchError::IncompleteResponse { .. } => true,
            FetchError::Network(_)
            | FetchError::Timeout(_)
            | FetchError::Parse(_)
            | FetchError::RateLimited(_)
            | FetchError::ResponseTooLarge => false,
        }
    }
}

/// Timeout and retry settings applied to every request a fetcher makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Upper bound on a single request, including reading the body.
    pub timeout: Duration,
    /// Retries for 5xx, 429, and truncated bodies, capped at [`MAX_RETRIES`].
    /// Other errors fail at once.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry up to [`MAX_BACKOFF`].
    pub retry_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_base: Duration::from_secs(1),
        }
    }
}

/// The single fetch capability every feed cache is driven by.
///
/// [`Fetcher`] is the production implementation; the trait exists so caches
/// and schedules can be exercised with scripted sources.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Item>, FetchError>>;
}

/// The fixed set of feed shapes the dashboard consumes.
#[derive(Debug, Clone)]
pub enum Fetcher {
    /// RSS/Atom document; `kind` is either [`ItemKind::News`] or [`ItemKind::Event`].
    Syndication {
        client: reqwest::Client,
        url: Url,
        kind: ItemKind,
        policy: FetchPolicy,
    },
    /// Video listing from a separate upstream.
    Video {
        client: reqwest::Client,
        url: Url,
        policy: FetchPolicy,
    },
    /// Promoted launches from the application-exposer service.
    InstantLaunch {
        client: reqwest::Client,
        url: Url,
        launch_url_base: Url,
        policy: FetchPolicy,
    },
}

impl Fetcher {
    pub fn news(client: reqwest::Client, url: Url, policy: FetchPolicy) -> Self {
        Fetcher::Syndication {
            client,
            url,
            kind: ItemKind::News,
            policy,
        }
    }

    pub fn events(client: reqwest::Client, url: Url, policy: FetchPolicy) -> Self {
        Fetcher::Syndication {
            client,
            url,
            kind: ItemKind::Event,
            policy,
        }
    }

    pub fn video(client: reqwest::Client, url: Url, policy: FetchPolicy) -> Self {
        Fetcher::Video {
            client,
            url,
            policy,
        }
    }

    pub fn instant_launches(
        client: reqwest::Client,
        url: Url,
        launch_url_base: Url,
        policy: FetchPolicy,
    ) -> Self {
        Fetcher::InstantLaunch {
            client,
            url,
            launch_url_base,
            policy,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Fetcher::Syndication { kind, .. } => *kind,
            Fetcher::Video { .. } => ItemKind::Video,
            Fetcher::InstantLaunch { .. } => ItemKind::InstantLaunch,
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            Fetcher::Syndication { url, .. }
            | Fetcher::Video { url, .. }
            | Fetcher::InstantLaunch { url, .. } => url,
        }
    }

    /// Retrieves and parses the feed.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - a request exceeded `policy.timeout`
    /// - [`FetchError::HttpStatus`] - non-2xx response (5xx after retries)
    /// - [`FetchError::RateLimited`] - 429 response after max retries
    /// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
    /// - [`FetchError::Parse`] - unparseable document, or no usable entries
    pub async fn fetch_items(&self) -> Result<Vec<Item>, FetchError> {
        let ParseResult { items, skipped } = match self {
            Fetcher::Syndication {
                client,
                url,
                kind,
                policy,
            } => {
                let bytes = fetch_bytes(client, url, policy).await?;
                parse_syndication(&bytes, *kind, Some(url))
            }
            Fetcher::Video {
                client,
                url,
                policy,
            } => {
                let bytes = fetch_bytes(client, url, policy).await?;
                parse_video_listing(&bytes, Some(url))
            }
            Fetcher::InstantLaunch {
                client,
                url,
                launch_url_base,
                policy,
            } => {
                let bytes = fetch_bytes(client, url, policy).await?;
                parse_instant_launches(&bytes, launch_url_base)
            }
        }
        .map_err(|e| FetchError::Parse(format!("{e:#}")))?;

        if skipped > 0 {
            tracing::warn!(
                feed = %self.url(),
                kind = %self.kind(),
                skipped = skipped,
                kept = items.len(),
                "Malformed entries skipped"
            );
        }

        Ok(items)
    }
}

impl Fetch for Fetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Item>, FetchError>> {
        Box::pin(self.fetch_items())
    }
}

/// GETs `url` with the policy's timeout and retry rules and returns the body.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &Url,
    policy: &FetchPolicy,
) -> Result<Vec<u8>, FetchError> {
    let max_retries = policy.max_retries.min(MAX_RETRIES);
    let mut retry_count = 0;

    loop {
        let attempt = tokio::time::timeout(policy.timeout, fetch_once(client, url))
            .await
            .map_err(|_| FetchError::Timeout(policy.timeout))
            .and_then(|r| r);

        match attempt {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && retry_count < max_retries => {
                let delay = backoff_delay(policy.retry_base, retry_count);
                tracing::warn!(
                    feed = %url,
                    error = %e,
                    retry = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Transient fetch error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(FetchError::HttpStatus(429)) => {
                return Err(FetchError::RateLimited(max_retries))
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry))
        .min(MAX_BACKOFF)
}

async fn fetch_once(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

/// Streams the body into memory, refusing anything over `limit` bytes.
///
/// When the server declared a Content-Length, a body that ends early or a
/// stream that breaks before that many bytes arrived is reported as
/// [`FetchError::IncompleteResponse`] so the caller can retry it.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }

    let incomplete = |received: usize| {
        declared
            .filter(|&expected| (received as u64) < expected)
            .map(|expected| FetchError::IncompleteResponse { expected, received })
    };

    let mut body = Vec::with_capacity(declared.map_or(0, |len| len as usize));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return Err(incomplete(body.len()).unwrap_or(FetchError::Network(e))),
        };
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    match incomplete(body.len()) {
        Some(err) => Err(err),
        None => Ok(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title><link>https://example.org/1</link></item>
</channel></rss>"#;

    fn quick_policy() -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_base: Duration::from_millis(10),
        }
    }

    fn news_fetcher(server: &MockServer) -> Fetcher {
        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        Fetcher::news(reqwest::Client::new(), url, quick_policy())
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let items = news_fetcher(&mock_server).fetch_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::News);
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        match news_fetcher(&mock_server).fetch_items().await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&mock_server)
            .await;

        match news_fetcher(&mock_server).fetch_items().await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let items = news_fetcher(&mock_server).fetch_items().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_429_exhausts_into_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        match news_fetcher(&mock_server).fetch_items().await {
            Err(FetchError::RateLimited(2)) => {}
            other => panic!("Expected RateLimited(2), got {:?}", other),
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(40));
        assert_eq!(backoff_delay(Duration::from_secs(1), 20), MAX_BACKOFF);
        // Shift amounts past the integer width must not overflow
        assert_eq!(backoff_delay(Duration::from_secs(1), 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::from_secs(1), u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_retry_count_is_capped() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        let policy = FetchPolicy {
            max_retries: 40,
            retry_base: Duration::from_millis(1),
            ..quick_policy()
        };

        match fetch_bytes(&reqwest::Client::new(), &url, &policy).await {
            Err(FetchError::HttpStatus(503)) => {}
            other => panic!("Expected HttpStatus(503), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1]))
            .expect(1) // Not retried
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        match fetch_bytes(&reqwest::Client::new(), &url, &quick_policy()).await {
            Err(FetchError::ResponseTooLarge) => {}
            other => panic!("Expected ResponseTooLarge, got {:?}", other),
        }
    }

    /// Serves a response whose body stops short of its Content-Length, then
    /// closes the connection. Returns the URL and a count of connections.
    async fn truncating_server(declared: u64, body: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n{body}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (Url::parse(&format!("http://{addr}/feed")).unwrap(), hits)
    }

    #[tokio::test]
    async fn test_truncated_body_is_incomplete_and_retried() {
        let (url, hits) = truncating_server(1000, "<rss>").await;

        match fetch_bytes(&reqwest::Client::new(), &url, &quick_policy()).await {
            Err(FetchError::IncompleteResponse { expected, received }) => {
                assert_eq!(expected, 1000);
                assert!(received < 1000);
            }
            other => panic!("Expected IncompleteResponse, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3); // Initial request + 2 retries
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        let policy = FetchPolicy {
            timeout: Duration::from_millis(100),
            ..quick_policy()
        };
        let fetcher = Fetcher::news(reqwest::Client::new(), url, policy);

        match fetcher.fetch_items().await {
            Err(FetchError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        match news_fetcher(&mock_server).fetch_items().await {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_success() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let items = news_fetcher(&mock_server).fetch_items().await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_instant_launch_fetcher_builds_links() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instantlaunches/full"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"id": "abc", "quick_launch_name": "Jupyter"}]"#),
            )
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/instantlaunches/full", mock_server.uri())).unwrap();
        let base = Url::parse("https://de.example.org/instantlaunch/").unwrap();
        let fetcher =
            Fetcher::instant_launches(reqwest::Client::new(), url, base, quick_policy());

        let items = fetcher.fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://de.example.org/instantlaunch/abc");
        assert_eq!(items[0].kind, ItemKind::InstantLaunch);
    }

    #[test]
    fn test_fetcher_reports_kind() {
        let client = reqwest::Client::new();
        let url = Url::parse("https://example.org/feed").unwrap();
        let policy = FetchPolicy::default();
        assert_eq!(
            Fetcher::news(client.clone(), url.clone(), policy).kind(),
            ItemKind::News
        );
        assert_eq!(
            Fetcher::events(client.clone(), url.clone(), policy).kind(),
            ItemKind::Event
        );
        assert_eq!(Fetcher::video(client, url, policy).kind(), ItemKind::Video);
    }
}
