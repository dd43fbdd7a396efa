use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{COOKIE, USER_AGENT};
use serde::Deserialize;

use crate::data::{FeedSource, SessionToken};
use crate::debug::debug_log;

pub const SUBSCRIPTIONS_PATH: &str = "/feed/subscriptions";
pub const PAGED_FEED_PATH: &str = "/feed_ajax?feed_name=subscriptions&action_load_system_feed=1";

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request for page {page} failed: {source}")]
    Transport {
        page: usize,
        #[source]
        source: reqwest::Error,
    },
    #[error("page {page} returned HTTP {status}")]
    Status { page: usize, status: u16 },
    #[error("page {page} returned a malformed envelope: {source}")]
    Envelope {
        page: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("worker fetching page {page} panicked")]
    Worker { page: usize },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub page_size: usize,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

#[derive(Deserialize)]
struct Envelope {
    content_html: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
    page_size: usize,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }
        if config.page_size == 0 {
            bail!("feed client page size must be positive");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path and query for a 1-based page number.
    pub fn page_path(&self, page: usize) -> String {
        if page < 2 {
            SUBSCRIPTIONS_PATH.to_string()
        } else {
            format!("{}&paging={}", PAGED_FEED_PATH, (page - 1) * self.page_size)
        }
    }

    /// Fetches one page and returns its HTML. Pages after the first arrive
    /// wrapped in a JSON envelope which is unwrapped here.
    pub fn fetch_page(&self, page: usize, token: &SessionToken) -> Result<String, FeedError> {
        let url = format!("{}{}", self.base_url, self.page_path(page));
        debug_log(format!("feed: GET {url}"));
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(COOKIE, token.as_str())
            .send()
            .map_err(|source| FeedError::Transport { page, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                page,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|source| FeedError::Transport { page, source })?;
        if page < 2 {
            return Ok(body);
        }
        unwrap_envelope(page, &body)
    }
}

fn unwrap_envelope(page: usize, body: &str) -> Result<String, FeedError> {
    serde_json::from_str::<Envelope>(body)
        .map(|envelope| envelope.content_html)
        .map_err(|source| FeedError::Envelope { page, source })
}

/// Number of pages needed to fill `visible_rows` rows, never less than one.
pub fn page_count(visible_rows: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    visible_rows.div_ceil(page_size).max(1)
}

impl FeedSource for Client {
    fn fetch_pages(&self, token: &SessionToken, visible_rows: usize) -> Result<Vec<String>> {
        let pages = page_count(visible_rows, self.page_size);
        let results: Vec<Result<String, FeedError>> = thread::scope(|scope| {
            let handles: Vec<_> = (1..=pages)
                .map(|page| scope.spawn(move || self.fetch_page(page, token)))
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(idx, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(FeedError::Worker { page: idx + 1 }))
                })
                .collect()
        });

        let mut bodies = Vec::with_capacity(results.len());
        for result in results {
            bodies.push(result?);
        }
        Ok(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(ClientConfig {
            base_url: "https://www.youtube.com/".into(),
            user_agent: "subtube-test".into(),
            page_size: 16,
            timeout: Duration::from_secs(1),
            http_client: None,
        })
        .unwrap()
    }

    #[test]
    fn first_page_uses_primary_endpoint() {
        let client = client();
        assert_eq!(client.base_url(), "https://www.youtube.com");
        assert_eq!(client.page_path(1), "/feed/subscriptions");
    }

    #[test]
    fn later_pages_use_offset_paging() {
        let client = client();
        assert_eq!(
            client.page_path(2),
            "/feed_ajax?feed_name=subscriptions&action_load_system_feed=1&paging=16"
        );
        assert!(client.page_path(3).ends_with("&paging=32"));
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(22, 16), 2);
        assert_eq!(page_count(16, 16), 1);
        assert_eq!(page_count(17, 16), 2);
        assert_eq!(page_count(0, 16), 1);
    }

    #[test]
    fn envelope_is_unwrapped() {
        let html = unwrap_envelope(2, r#"{"content_html":"<a href=\"/watch?v=a\">"}"#).unwrap();
        assert_eq!(html, "<a href=\"/watch?v=a\">");
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        let err = unwrap_envelope(2, "<html>not json</html>").unwrap_err();
        assert!(matches!(err, FeedError::Envelope { page: 2, .. }));
    }

    #[test]
    fn rejects_empty_user_agent() {
        let result = Client::new(ClientConfig {
            base_url: "https://www.youtube.com".into(),
            user_agent: " ".into(),
            page_size: 16,
            timeout: Duration::from_secs(1),
            http_client: None,
        });
        assert!(result.is_err());
    }

    fn serve(responses: usize, status: u16) -> (String, thread::JoinHandle<Vec<(String, Option<String>)>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind test server");
        let base = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..responses {
                let request = server.recv().expect("request");
                let url = request.url().to_string();
                let cookie = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Cookie"))
                    .map(|header| header.value.as_str().to_string());
                let body = if url.starts_with(SUBSCRIPTIONS_PATH) {
                    "<p>one</p>".to_string()
                } else {
                    r#"{"content_html":"<p>two</p>"}"#.to_string()
                };
                seen.push((url, cookie));
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
            seen
        });
        (base, handle)
    }

    fn local_client(base_url: String) -> Client {
        Client::new(ClientConfig {
            base_url,
            user_agent: "subtube-test".into(),
            page_size: 16,
            timeout: Duration::from_secs(5),
            http_client: None,
        })
        .unwrap()
    }

    #[test]
    fn fetches_every_page_with_session_cookie() {
        let (base, server) = serve(2, 200);
        let client = local_client(base);
        let pages = client
            .fetch_pages(&SessionToken::new("SID=1; HSID=2"), 20)
            .unwrap();
        assert_eq!(pages, vec!["<p>one</p>", "<p>two</p>"]);

        let seen = server.join().unwrap();
        assert!(seen
            .iter()
            .all(|(_, cookie)| cookie.as_deref() == Some("SID=1; HSID=2")));
        assert!(seen.iter().any(|(url, _)| url.ends_with("&paging=16")));
    }

    #[test]
    fn http_error_fails_the_page() {
        let (base, server) = serve(1, 500);
        let client = local_client(base);
        let err = client
            .fetch_page(1, &SessionToken::new("SID=1"))
            .unwrap_err();
        assert!(matches!(err, FeedError::Status { page: 1, status: 500 }));
        server.join().unwrap();
    }
}
