use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One video entry of the subscription feed.
///
/// Identity is the canonical `url`. Items are replaced wholesale on every
/// successful sync and never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Item {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "publishedTime")]
    pub published_time: Option<String>,
}

impl Item {
    pub fn new<U: Into<String>, T: Into<String>>(url: U, title: T) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Ordered feed items as of the last successful sync. Order is feed order.
pub type Snapshot = Vec<Item>;

/// Opaque session credential sent with every feed request.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Source of raw feed page bodies for one sync cycle.
pub trait FeedSource: Send + Sync {
    /// Fetches every page needed to fill `visible_rows` rows and returns the
    /// bodies in page order. Fails as a whole if any single page fails.
    fn fetch_pages(&self, token: &SessionToken, visible_rows: usize) -> Result<Vec<String>>;
}

pub fn index_of(items: &[Item], url: &str) -> Option<usize> {
    items.iter().position(|item| item.url == url)
}
