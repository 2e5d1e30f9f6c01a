//! Filesystem [`SnapshotStore`].
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/<site_name>/<YYYYMMDD_HHMMSS>/sitemap.json
//! <root>/<site_name>/<YYYYMMDD_HHMMSS>/diff.json
//! ```
//!
//! Both files are pretty-printed JSON. A snapshot is assembled in a hidden
//! `.<YYYYMMDD_HHMMSS>.partial` directory and renamed into place, so an
//! interrupted write never shows up as a snapshot.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{Diff, SitemapNode, Site, Snapshot};

use super::{format_timestamp, order_and_limit, parse_timestamp, SnapshotRef, SnapshotStore};

pub const SITEMAP_FILE: &str = "sitemap.json";
pub const DIFF_FILE: &str = "diff.json";
const STAGING_SUFFIX: &str = ".partial";

/// Snapshot store rooted at an output directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn site_dir(&self, site_name: &str) -> PathBuf {
        self.root.join(site_name)
    }

    pub fn snapshot_dir(&self, site_name: &str, timestamp: &NaiveDateTime) -> PathBuf {
        self.site_dir(site_name).join(format_timestamp(timestamp))
    }

    fn staging_dir(&self, site_name: &str, timestamp: &NaiveDateTime) -> PathBuf {
        self.site_dir(site_name)
            .join(format!(".{}{}", format_timestamp(timestamp), STAGING_SUFFIX))
    }

    /// Names of the immediate subdirectories of the root, sorted.
    ///
    /// Each one is a site as far as maintenance is concerned.
    pub fn site_names(&self) -> Result<Vec<String>> {
        let mut names = immediate_dirs(&self.root)?;
        names.sort();
        Ok(names)
    }
}

/// Names of immediate subdirectories of `dir`. Symlinks are not followed.
fn immediate_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let walker = WalkDir::new(dir).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

impl SnapshotStore for FsStore {
    fn write_at(
        &self,
        site: &Site,
        timestamp: NaiveDateTime,
        tree: &SitemapNode,
    ) -> Result<Snapshot> {
        let site_dir = self.site_dir(&site.name);
        std::fs::create_dir_all(&site_dir)
            .with_context(|| format!("Failed to create {}", site_dir.display()))?;

        let dir = self.snapshot_dir(&site.name, &timestamp);
        if dir.exists() {
            bail!("Snapshot already exists: {}", dir.display());
        }

        let staging = self.staging_dir(&site.name, &timestamp);
        if staging.exists() {
            // Left over from an interrupted write.
            std::fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to remove {}", staging.display()))?;
        }
        std::fs::create_dir(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        let written = write_json(&staging.join(SITEMAP_FILE), tree).and_then(|()| {
            std::fs::rename(&staging, &dir).with_context(|| {
                format!("Failed to move {} to {}", staging.display(), dir.display())
            })
        });
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                tracing::warn!(path = %staging.display(), error = %cleanup, "failed to remove partial snapshot");
            }
            return Err(e);
        }

        Ok(Snapshot {
            site: site.clone(),
            timestamp,
            tree: tree.clone(),
        })
    }

    fn list_snapshots(&self, site_name: &str, limit: Option<usize>) -> Result<Vec<SnapshotRef>> {
        let site_dir = self.site_dir(site_name);
        if !site_dir.is_dir() {
            return Ok(Vec::new());
        }
        let refs = immediate_dirs(&site_dir)?
            .into_iter()
            .filter_map(|name| parse_timestamp(&name))
            .map(|timestamp| SnapshotRef {
                site_name: site_name.to_string(),
                timestamp,
            })
            .collect();
        Ok(order_and_limit(refs, limit))
    }

    fn read_snapshot(&self, site: &Site, timestamp: NaiveDateTime) -> Result<Snapshot> {
        let path = self.snapshot_dir(&site.name, &timestamp).join(SITEMAP_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let tree: SitemapNode = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
        Ok(Snapshot {
            site: site.clone(),
            timestamp,
            tree,
        })
    }

    fn write_diff(&self, site_name: &str, timestamp: NaiveDateTime, diff: &Diff) -> Result<()> {
        let dir = self.snapshot_dir(site_name, &timestamp);
        if !dir.is_dir() {
            bail!("No snapshot at {}", dir.display());
        }
        write_json(&dir.join(DIFF_FILE), diff)
    }

    fn read_diff(&self, site_name: &str, timestamp: NaiveDateTime) -> Option<Diff> {
        let path = self.snapshot_dir(site_name, &timestamp).join(DIFF_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(diff) => Some(diff),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable diff, ignoring");
                None
            }
        }
    }

    fn delete_snapshot(&self, site_name: &str, timestamp: NaiveDateTime) -> Result<()> {
        let dir = self.snapshot_dir(site_name, &timestamp);
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Page, SitemapKind};
    use crate::store::parse_timestamp;
    use tempfile::TempDir;

    fn site() -> Site {
        Site {
            name: "example.com".into(),
            url: "https://example.com/".into(),
        }
    }

    fn tree(urls: &[&str]) -> SitemapNode {
        SitemapNode::Leaf {
            url: "https://example.com/sitemap.xml".into(),
            kind: SitemapKind::XmlPages,
            pages: urls
                .iter()
                .map(|u| Page {
                    url: u.to_string(),
                    priority: Some(0.5),
                    last_modified: None,
                    change_frequency: None,
                    news_story: None,
                })
                .collect(),
        }
    }

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_write_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let snap = store
            .write_at(&site(), ts("20250101_120000"), &tree(&["https://example.com/a"]))
            .unwrap();
        assert_eq!(snap.timestamp, ts("20250101_120000"));
        let path = tmp
            .path()
            .join("example.com")
            .join("20250101_120000")
            .join("sitemap.json");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\n  \"url\""), "expected pretty JSON: {}", content);
    }

    #[test]
    fn test_write_refuses_existing_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        store.write_at(&site(), ts("20250101_120000"), &tree(&[])).unwrap();
        assert!(store
            .write_at(&site(), ts("20250101_120000"), &tree(&[]))
            .is_err());
    }

    #[test]
    fn test_leftover_partial_write_is_not_a_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let t = ts("20250101_120000");
        let staging = tmp.path().join("example.com").join(".20250101_120000.partial");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join(SITEMAP_FILE), "{truncated").unwrap();

        assert!(store.list_snapshots("example.com", None).unwrap().is_empty());
        assert!(store.latest("example.com").unwrap().is_none());

        let written = store
            .write_at(&site(), t, &tree(&["https://example.com/a"]))
            .unwrap();
        assert!(!staging.exists());
        assert_eq!(store.read_snapshot(&site(), t).unwrap(), written);
        let names: Vec<String> = store
            .list_snapshots("example.com", None)
            .unwrap()
            .iter()
            .map(|r| r.dir_name())
            .collect();
        assert_eq!(names, vec!["20250101_120000"]);
    }

    #[test]
    fn test_list_ignores_garbage_and_orders_newest_first() {
        let tmp = TempDir::new().unwrap();
        let site_dir = tmp.path().join("example.com");
        for name in ["20250102_000000", "20250101_000000", "not-a-timestamp"] {
            std::fs::create_dir_all(site_dir.join(name)).unwrap();
        }
        std::fs::write(site_dir.join("20250103_000000"), "a file, not a dir").unwrap();

        let store = FsStore::new(tmp.path());
        let names: Vec<String> = store
            .list_snapshots("example.com", None)
            .unwrap()
            .iter()
            .map(|r| r.dir_name())
            .collect();
        assert_eq!(names, vec!["20250102_000000", "20250101_000000"]);

        let limited = store.list_snapshots("example.com", Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].dir_name(), "20250102_000000");
    }

    #[test]
    fn test_list_missing_site_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        assert!(store.list_snapshots("nobody", None).unwrap().is_empty());
    }

    #[test]
    fn test_read_back_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let written = store
            .write_at(&site(), ts("20250101_120000"), &tree(&["https://example.com/a"]))
            .unwrap();
        let read = store.read_snapshot(&site(), ts("20250101_120000")).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn test_diff_round_trip_and_missing() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let t = ts("20250101_120000");
        store.write_at(&site(), t, &tree(&[])).unwrap();
        assert!(store.read_diff("example.com", t).is_none());

        let diff = Diff {
            pages: tree(&["https://example.com/new"]).pages().into_iter().cloned().collect(),
            ..Default::default()
        };
        store.write_diff("example.com", t, &diff).unwrap();
        let back = store.read_diff("example.com", t).unwrap();
        assert_eq!(back.pages, diff.pages);
    }

    #[test]
    fn test_unreadable_diff_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let t = ts("20250101_120000");
        store.write_at(&site(), t, &tree(&[])).unwrap();
        std::fs::write(store.snapshot_dir("example.com", &t).join(DIFF_FILE), "{oops").unwrap();
        assert!(store.read_diff("example.com", t).is_none());
    }

    #[test]
    fn test_delete_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let t = ts("20250101_120000");
        store.write_at(&site(), t, &tree(&[])).unwrap();
        store.delete_snapshot("example.com", t).unwrap();
        assert!(store.list_snapshots("example.com", None).unwrap().is_empty());
        assert!(store.delete_snapshot("example.com", t).is_err());
    }

    #[test]
    fn test_site_names() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("b.com")).unwrap();
        std::fs::create_dir_all(tmp.path().join("a.com")).unwrap();
        std::fs::write(tmp.path().join("README.md"), "x").unwrap();
        let store = FsStore::new(tmp.path());
        assert_eq!(store.site_names().unwrap(), vec!["a.com", "b.com"]);
    }
}
