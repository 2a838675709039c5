//! Small helpers shared by the fetchers and configuration.
//!
//! - **Link resolution**: turn raw entry links into absolute http(s) URLs
//! - **Path joining**: combine a configured base URL with a feed path
//! - **Text cleanup**: strip markup and control characters from summaries

mod text;
mod url_validator;

pub use text::{clean_text, strip_markup};
pub use url_validator::{join_path, push_segment, resolve_link, LinkError};
