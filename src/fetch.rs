//! Sitemap discovery and fetching.
//!
//! [`HttpFetcher`] builds a [`RawSitemap`] tree for a homepage:
//!
//! 1. `robots.txt` is fetched and every `Sitemap:` line becomes a child of a
//!    `robots_txt_index` node.
//! 2. A handful of well-known sitemap paths not already declared are probed;
//!    the ones that parse are added to the root.
//! 3. Every sitemap is fetched and parsed: `<sitemapindex>` documents recurse,
//!    `<urlset>` documents (including the Google News extension) and plain
//!    text lists become leaves.
//!
//! A sub-sitemap that fails to fetch or parse becomes an
//! [`RawSitemap::Invalid`] node; only an unreachable host fails the whole
//! fetch. Gzip-compressed, RSS and Atom sitemaps are not understood and end
//! up invalid.
//!
//! At most `crawl.max_nodes` sitemaps are requested and nesting stops at
//! `crawl.max_depth`; sitemaps beyond either bound are left out of the tree
//! rather than failing it. Bodies over `crawl.max_sitemap_bytes` are
//! abandoned while streaming.

use async_trait::async_trait;
use quick_xml::events::Event;
use reqwest::{StatusCode, Url};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::config::CrawlConfig;
use crate::models::SitemapKind;
use crate::normalize::{RawNewsStory, RawPage, RawSitemap};

/// Paths probed when `robots.txt` does not declare them.
const WELL_KNOWN_PATHS: &[&str] = &[
    "sitemap.xml",
    "sitemap_index.xml",
    "sitemap-index.xml",
    "sitemap.txt",
    "sitemap/sitemap.xml",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid homepage url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::InvalidUrl { .. } | FetchError::TooLarge { .. } => false,
        }
    }
}

/// Source of raw sitemap trees.
#[async_trait]
pub trait SitemapFetcher: Send + Sync {
    /// Build the raw sitemap tree for a site's homepage.
    async fn fetch_tree(&self, homepage: &str) -> Result<RawSitemap, FetchError>;
}

/// HTTP implementation of [`SitemapFetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    max_depth: usize,
    max_sitemaps: usize,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            max_depth: config.max_depth,
            max_sitemaps: config.max_nodes,
            max_body_bytes: config.max_sitemap_bytes,
        })
    }

    /// GET `url` as text, retrying transient failures with exponential
    /// backoff (1s, 2s, 4s, ...).
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() => {
                    tracing::debug!(url, attempt, error = %e, "transient fetch failure");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "no attempt made".to_string(),
        }))
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_body_bytes,
        };

        let mut response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(too_large());
            }
        }

        // Content-Length may be absent or wrong; enforce the cap as we read.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Fetch one sitemap and, for indexes, everything beneath it.
    ///
    /// `None` means the sitemap was not requested: it is nested too deep,
    /// was already fetched, or the `max_sitemaps` budget is spent. Every
    /// request counts toward the budget, failed ones included.
    fn fetch_sitemap<'a>(
        &'a self,
        url: String,
        depth: usize,
        visited: &'a mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = Option<RawSitemap>> + Send + 'a>> {
        Box::pin(async move {
            if depth > self.max_depth {
                tracing::debug!(url = %url, limit = self.max_depth, "sitemap nested too deep, skipped");
                return None;
            }
            if visited.contains(&url) {
                return None;
            }
            if visited.len() >= self.max_sitemaps {
                tracing::debug!(url = %url, limit = self.max_sitemaps, "sitemap budget spent, skipped");
                return None;
            }
            visited.insert(url.clone());

            let body = match self.get_text(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "sitemap fetch failed");
                    return Some(invalid(url, e.to_string()));
                }
            };

            let node = match parse_sitemap_document(&body) {
                Ok(ParsedSitemap::Index(locs)) => {
                    let mut sub_sitemaps = Vec::with_capacity(locs.len());
                    for loc in locs {
                        if let Some(child) = self.fetch_sitemap(loc, depth + 1, &mut *visited).await {
                            sub_sitemaps.push(child);
                        }
                    }
                    RawSitemap::Index {
                        url,
                        kind: SitemapKind::XmlIndex,
                        sub_sitemaps,
                    }
                }
                Ok(ParsedSitemap::XmlPages(pages)) => RawSitemap::Pages {
                    url,
                    kind: SitemapKind::XmlPages,
                    pages,
                },
                Ok(ParsedSitemap::TextPages(pages)) => RawSitemap::Pages {
                    url,
                    kind: SitemapKind::TextPages,
                    pages,
                },
                Err(reason) => {
                    tracing::warn!(url = %url, reason = %reason, "sitemap parse failed");
                    invalid(url, reason)
                }
            };
            Some(node)
        })
    }
}

fn invalid(url: String, reason: String) -> RawSitemap {
    RawSitemap::Invalid { url, reason }
}

#[async_trait]
impl SitemapFetcher for HttpFetcher {
    async fn fetch_tree(&self, homepage: &str) -> Result<RawSitemap, FetchError> {
        let invalid_url = |reason: String| FetchError::InvalidUrl {
            url: homepage.to_string(),
            reason,
        };
        let parsed = Url::parse(homepage).map_err(|e| invalid_url(e.to_string()))?;
        let base = parsed.join("/").map_err(|e| invalid_url(e.to_string()))?;
        let join = |path: &str| base.join(path).map(|u| u.to_string());

        let mut visited = HashSet::new();
        let mut sub_sitemaps = Vec::new();

        let robots_url = join("robots.txt").map_err(|e| invalid_url(e.to_string()))?;
        match self.get_text(&robots_url).await {
            Ok(body) => {
                let declared = parse_robots_sitemaps(&body);
                if !declared.is_empty() {
                    let mut children = Vec::with_capacity(declared.len());
                    for loc in declared {
                        if let Some(child) = self.fetch_sitemap(loc, 2, &mut visited).await {
                            children.push(child);
                        }
                    }
                    sub_sitemaps.push(RawSitemap::Index {
                        url: robots_url,
                        kind: SitemapKind::RobotsTxtIndex,
                        sub_sitemaps: children,
                    });
                }
            }
            // The host is unreachable; nothing else will work either.
            Err(e @ FetchError::Transport { .. }) => return Err(e),
            Err(e) => tracing::debug!(url = %robots_url, error = %e, "no robots.txt"),
        }

        for path in WELL_KNOWN_PATHS.iter().copied() {
            let Ok(url) = join(path) else { continue };
            if visited.contains(&url) {
                continue;
            }
            match self.fetch_sitemap(url, 1, &mut visited).await {
                None | Some(RawSitemap::Invalid { .. }) => {}
                Some(node) => sub_sitemaps.push(node),
            }
        }

        if visited.len() >= self.max_sitemaps {
            tracing::warn!(
                homepage,
                limit = self.max_sitemaps,
                "sitemap budget reached, further sitemaps skipped"
            );
        }

        tracing::info!(
            homepage,
            sitemaps = visited.len(),
            "sitemap tree fetched"
        );

        Ok(RawSitemap::Index {
            url: base.to_string(),
            kind: SitemapKind::WebsiteIndex,
            sub_sitemaps,
        })
    }
}

/// `Sitemap:` declarations of a robots.txt, in order, without duplicates.
pub fn parse_robots_sitemaps(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (key, value) = line.split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("sitemap") {
                return None;
            }
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSitemap {
    /// `<sitemapindex>`: locations of nested sitemaps.
    Index(Vec<String>),
    /// `<urlset>` entries.
    XmlPages(Vec<RawPage>),
    /// One URL per line.
    TextPages(Vec<RawPage>),
}

/// Parse a sitemap body as XML or, failing the leading `<`, as plain text.
pub fn parse_sitemap_document(body: &str) -> Result<ParsedSitemap, String> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('<') {
        parse_xml_sitemap(trimmed)
    } else {
        parse_text_sitemap(trimmed)
    }
}

fn parse_text_sitemap(body: &str) -> Result<ParsedSitemap, String> {
    let pages: Vec<RawPage> = body
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(|line| RawPage {
            url: line.to_string(),
            ..Default::default()
        })
        .collect();
    if pages.is_empty() {
        return Err("not a sitemap: no XML and no URL lines".to_string());
    }
    Ok(ParsedSitemap::TextPages(pages))
}

/// Incremental state of the XML walk.
#[derive(Default)]
struct XmlState {
    root: Option<String>,
    path: Vec<String>,
    text: String,
    locs: Vec<String>,
    pages: Vec<RawPage>,
    page: Option<RawPage>,
    news: Option<RawNewsStory>,
}

impl XmlState {
    fn start(&mut self, name: String) {
        if self.root.is_none() {
            self.root = Some(name.clone());
        }
        match name.as_str() {
            "url" if self.path.len() == 1 => self.page = Some(RawPage::default()),
            "news" if self.page.is_some() => self.news = Some(RawNewsStory::default()),
            _ => {}
        }
        self.path.push(name);
        self.text.clear();
    }

    fn end(&mut self) {
        let text = std::mem::take(&mut self.text).trim().to_string();
        let Some(name) = self.path.last().cloned() else {
            return;
        };
        let parent = self
            .path
            .len()
            .checked_sub(2)
            .and_then(|i| self.path.get(i))
            .map(String::as_str);

        match (parent, name.as_str()) {
            (Some("sitemap"), "loc") if self.path.len() == 3 => {
                if !text.is_empty() {
                    self.locs.push(text);
                }
            }
            (Some("url"), field) if self.path.len() == 3 => {
                if let Some(page) = self.page.as_mut() {
                    let value = Some(text).filter(|t| !t.is_empty());
                    match field {
                        "loc" => page.url = value.unwrap_or_default(),
                        "lastmod" => page.last_modified = value,
                        "changefreq" => page.change_frequency = value,
                        "priority" => page.priority = value,
                        "news" => page.news_story = self.news.take(),
                        _ => {}
                    }
                }
            }
            (Some("news"), field) => {
                if let Some(news) = self.news.as_mut() {
                    let value = Some(text.clone()).filter(|t| !t.is_empty());
                    match field {
                        "title" => news.title = text,
                        "publication_date" => news.publish_date = value,
                        "access" => news.access = value,
                        "genres" => news.genres = split_list(&text),
                        "keywords" => news.keywords = split_list(&text),
                        "stock_tickers" => news.stock_tickers = split_list(&text),
                        _ => {}
                    }
                }
            }
            (Some("publication"), field) => {
                if let Some(news) = self.news.as_mut() {
                    let value = Some(text).filter(|t| !t.is_empty());
                    match field {
                        "name" => news.publication_name = value,
                        "language" => news.publication_language = value,
                        _ => {}
                    }
                }
            }
            (_, "url") if self.path.len() == 2 => {
                if let Some(page) = self.page.take() {
                    if !page.url.is_empty() {
                        self.pages.push(page);
                    }
                }
            }
            _ => {}
        }
        self.path.pop();
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_xml_sitemap(body: &str) -> Result<ParsedSitemap, String> {
    let mut reader = quick_xml::Reader::from_str(body);
    let mut state = XmlState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                state.start(name);
            }
            Ok(Event::End(_)) => state.end(),
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                state.text.push_str(&text);
            }
            Ok(Event::CData(c)) => {
                state.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    match state.root.as_deref() {
        Some("sitemapindex") => Ok(ParsedSitemap::Index(state.locs)),
        Some("urlset") => Ok(ParsedSitemap::XmlPages(state.pages)),
        Some(other) => Err(format!("unsupported sitemap root element <{}>", other)),
        None => Err("empty XML document".to_string()),
    }
}
