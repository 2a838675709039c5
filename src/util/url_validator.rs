use thiserror::Error;
use url::Url;

/// Errors produced while turning a raw entry link into an absolute URL.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// The link was empty or whitespace.
    #[error("Empty link")]
    Empty,
    /// The link could not be parsed, even relative to the document URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The link uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Resolves an entry link into an absolute http(s) URL.
///
/// Relative links are joined onto `base` (the URL the document was fetched
/// from) when one is given; without a base they are rejected.
///
/// # Examples
///
/// ```
/// use dashfeed::util::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.org/news/feed").unwrap();
/// let link = resolve_link("/posts/1", Some(&base)).unwrap();
/// assert_eq!(link.as_str(), "https://example.org/posts/1");
///
/// assert!(resolve_link("mailto:someone@example.org", None).is_err());
/// ```
pub fn resolve_link(raw: &str, base: Option<&Url>) -> Result<Url, LinkError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LinkError::Empty);
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(raw)?,
            None => return Err(LinkError::InvalidUrl(url::ParseError::RelativeUrlWithoutBase)),
        },
        Err(e) => return Err(LinkError::InvalidUrl(e)),
    };

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(LinkError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Joins a feed path onto a base URL.
///
/// Unlike [`Url::join`], a base without a trailing slash keeps its last path
/// segment, so `https://host/api` + `feeds/news` yields
/// `https://host/api/feeds/news`. A path that is itself an absolute URL
/// replaces the base.
pub fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute);
    }

    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}

/// Appends `segment` to `base` as a single percent-encoded path segment.
///
/// Slashes, colons and the like inside `segment` are escaped, so the result
/// always stays under `base`. A trailing empty segment on `base` is replaced.
pub fn push_segment(base: &Url, segment: &str) -> Result<Url, LinkError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(LinkError::Empty);
    }
    if !matches!(base.scheme(), "http" | "https") {
        return Err(LinkError::UnsupportedScheme(base.scheme().to_owned()));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| LinkError::UnsupportedScheme(base.scheme().to_owned()))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
