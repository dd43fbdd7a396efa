//! Extraction of feed items from subscription page HTML.
//!
//! Parsing goes through html5ever (via `scraper`), which recovers from
//! malformed markup the way browsers do, so this module never fails: broken
//! input yields whatever well-formed watch anchors could be recovered, or an
//! empty list.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::data::Item;

const WATCH_PATH: &str = "/watch";
const LOCKUP_CLASS: &str = "yt-lockup";

static ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href][title]").expect("valid anchor selector"));
static DURATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".video-time").expect("valid duration selector"));
static USERNAME: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".yt-lockup-byline a, .yt-user-name").expect("valid username selector")
});
static VERIFIED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".yt-channel-title-icon-verified").expect("valid verified selector")
});
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".yt-lockup-description").expect("valid description selector"));
static META_ENTRY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".yt-lockup-meta-info li").expect("valid meta selector"));

/// Turns the concatenated HTML of all fetched pages into feed items.
pub struct Parser {
    base: Option<Url>,
}

impl Parser {
    /// `base_url` is joined with relative hrefs to build canonical item URLs.
    pub fn new(base_url: &str) -> Self {
        Self {
            base: Url::parse(base_url).ok(),
        }
    }

    /// Items appear in document order. Anchors repeating an already seen URL
    /// are skipped so that every URL is unique within the result.
    pub fn parse(&self, html: &str) -> Vec<Item> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in document.select(&ANCHOR) {
            let element = anchor.value();
            let (Some(href), Some(title)) = (element.attr("href"), element.attr("title")) else {
                continue;
            };
            let title = title.trim();
            if title.is_empty() {
                continue;
            }
            let Some(url) = self.canonical_watch_url(href) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let mut item = Item::new(url, title);
            if let Some(lockup) = enclosing_lockup(anchor) {
                enrich(&mut item, lockup);
            }
            items.push(item);
        }

        items
    }

    fn canonical_watch_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.starts_with(WATCH_PATH) {
            return match &self.base {
                Some(base) => base.join(href).ok().map(String::from),
                None => Some(href.to_string()),
            };
        }
        let absolute = Url::parse(href).ok()?;
        if matches!(absolute.scheme(), "http" | "https") && absolute.path().starts_with(WATCH_PATH)
        {
            return Some(absolute.into());
        }
        None
    }
}

fn enclosing_lockup(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().classes().any(|class| class == LOCKUP_CLASS))
}

fn enrich(item: &mut Item, lockup: ElementRef<'_>) {
    item.duration = first_text(lockup, &DURATION);
    item.username = first_text(lockup, &USERNAME);
    item.description = first_text(lockup, &DESCRIPTION);
    if item.username.is_some() {
        item.verified = Some(lockup.select(&VERIFIED).next().is_some());
    }

    let mut meta = lockup.select(&META_ENTRY).map(element_text);
    item.published_time = meta.next().flatten();
    item.views = meta.next().flatten();
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().and_then(element_text)
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
