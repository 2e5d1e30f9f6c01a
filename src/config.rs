//! TOML configuration.
//!
//! ```toml
//! output_dir = "data"
//!
//! [[sites]]
//! name = "example.com"
//! url = "https://example.com/"
//!
//! [crawl]
//! concurrency = 4
//!
//! [diff]
//! first_crawl = "empty"
//! ```
//!
//! Everything except `sites` has a default.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::diff::{DiffField, DiffOptions, FirstCrawlPolicy};
use crate::models::Site;
use crate::normalize::NormalizeLimits;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sites: Vec<Site>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub diff: DiffConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sites crawled at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deepest sitemap nesting followed; the homepage root is level 0.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Most sitemap nodes fetched and normalized per site.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Largest sitemap body downloaded; bigger ones become invalid.
    #[serde(default = "default_max_sitemap_bytes")]
    pub max_sitemap_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            max_sitemap_bytes: default_max_sitemap_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl CrawlConfig {
    pub fn limits(&self) -> NormalizeLimits {
        NormalizeLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_concurrency() -> usize {
    4
}
fn default_max_depth() -> usize {
    10
}
fn default_max_nodes() -> usize {
    5000
}
fn default_max_sitemap_bytes() -> usize {
    // Sitemap protocol limit for an uncompressed file.
    50 * 1024 * 1024
}
fn default_user_agent() -> String {
    format!("sitemap-gazer/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiffConfig {
    #[serde(default)]
    pub first_crawl: FirstCrawlPolicy,
    #[serde(default = "DiffField::default_set")]
    pub compare: Vec<DiffField>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            first_crawl: FirstCrawlPolicy::default(),
            compare: DiffField::default_set(),
        }
    }
}

impl DiffConfig {
    pub fn options(&self) -> DiffOptions {
        DiffOptions {
            first_crawl: self.first_crawl,
            fields: self.compare.clone(),
        }
    }
}

impl Config {
    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sites.is_empty() {
        bail!("at least one [[sites]] entry is required");
    }

    let mut names = HashSet::new();
    for site in &config.sites {
        validate_site_name(&site.name)?;
        if !names.insert(site.name.as_str()) {
            bail!("duplicate site name: '{}'", site.name);
        }
        let url = reqwest::Url::parse(&site.url)
            .with_context(|| format!("site '{}' has an invalid url: {}", site.name, site.url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!(
                "site '{}' url must be http or https, got '{}'",
                site.name,
                url.scheme()
            );
        }
    }

    if config.crawl.concurrency == 0 {
        bail!("crawl.concurrency must be > 0");
    }
    if config.crawl.max_depth == 0 {
        bail!("crawl.max_depth must be > 0");
    }
    if config.crawl.max_nodes == 0 {
        bail!("crawl.max_nodes must be > 0");
    }
    if config.crawl.max_sitemap_bytes == 0 {
        bail!("crawl.max_sitemap_bytes must be > 0");
    }
    if config.diff.compare.is_empty() {
        bail!("diff.compare must name at least one field");
    }

    Ok(())
}

/// Site names become directory names under `output_dir`.
fn validate_site_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("site name must not be empty");
    }
    if name == "." || name == ".." {
        bail!("site name '{}' is not a valid directory name", name);
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        bail!("site name '{}' must not contain path separators", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[sites]]
name = "example.com"
url = "https://example.com/"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.output_dir, PathBuf::from("data"));
        assert_eq!(config.crawl.concurrency, 4);
        assert_eq!(config.crawl.max_sitemap_bytes, 50 * 1024 * 1024);
        assert_eq!(config.diff.first_crawl, FirstCrawlPolicy::Empty);
        assert_eq!(config.diff.compare, DiffField::default_set());
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
output_dir = "/var/lib/gazer"

[[sites]]
name = "a.com"
url = "https://a.com/"

[[sites]]
name = "b.org"
url = "http://b.org/"

[crawl]
timeout_secs = 5
max_retries = 0
concurrency = 2
max_depth = 3
max_nodes = 50
user_agent = "test-agent"

[diff]
first_crawl = "all_added"
compare = ["last_modified", "news_story"]
"#,
        )
        .unwrap();
        assert_eq!(config.sites[1].name, "b.org");
        assert_eq!(config.crawl.limits().max_nodes, 50);
        assert_eq!(config.crawl.user_agent, "test-agent");
        let options = config.diff.options();
        assert_eq!(options.first_crawl, FirstCrawlPolicy::AllAdded);
        assert_eq!(
            options.fields,
            vec![DiffField::LastModified, DiffField::NewsStory]
        );
        assert!(config.site("a.com").is_some());
        assert!(config.site("c.com").is_none());
    }

    #[test]
    fn test_rejects_bad_sites() {
        assert!(parse_config("sites = []").is_err());
        let dup = format!("{}{}", MINIMAL, MINIMAL);
        assert!(parse_config(&dup).is_err());
        assert!(parse_config(
            r#"
[[sites]]
name = "../escape"
url = "https://example.com/"
"#
        )
        .is_err());
        assert!(parse_config(
            r#"
[[sites]]
name = "ftp"
url = "ftp://example.com/"
"#
        )
        .is_err());
        assert!(parse_config(
            r#"
[[sites]]
name = "bad"
url = "not a url"
"#
        )
        .is_err());
    }

    #[test]
    fn test_rejects_bad_limits() {
        let zero = format!("{}\n[crawl]\nconcurrency = 0\n", MINIMAL);
        assert!(parse_config(&zero).is_err());
        let no_body = format!("{}\n[crawl]\nmax_sitemap_bytes = 0\n", MINIMAL);
        assert!(parse_config(&no_body).is_err());
        let unknown = format!("{}\n[diff]\ncompare = [\"title\"]\n", MINIMAL);
        assert!(parse_config(&unknown).is_err());
        let empty = format!("{}\n[diff]\ncompare = []\n", MINIMAL);
        assert!(parse_config(&empty).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/gazer.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
