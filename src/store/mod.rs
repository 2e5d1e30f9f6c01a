//! Snapshot storage abstraction.
//!
//! The [`SnapshotStore`] trait covers every storage operation the crawl
//! pipeline and retention manager need, so the filesystem layout can be
//! swapped for [`memory::InMemoryStore`] in tests.
//!
//! Snapshots are addressed by `(site name, timestamp)`. Timestamps have
//! second resolution and are rendered as `YYYYMMDD_HHMMSS`; anything that
//! does not parse in that format is not a snapshot.
//!
//! Implementations must be `Send + Sync` so crawl tasks can share one store.

pub mod fs;
pub mod memory;

use anyhow::Result;
use chrono::{NaiveDateTime, Timelike, Utc};

use crate::models::{Diff, SitemapNode, Site, Snapshot};

/// Directory-name format of a snapshot timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parse a snapshot directory name. Returns `None` for anything else.
pub fn parse_timestamp(name: &str) -> Option<NaiveDateTime> {
    // chrono accepts a few lenient forms (e.g. fewer digits), so pin the width.
    if name.len() != 15 {
        return None;
    }
    NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC time truncated to whole seconds.
pub fn now_timestamp() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Reference to a stored snapshot without its tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotRef {
    pub site_name: String,
    pub timestamp: NaiveDateTime,
}

impl SnapshotRef {
    /// The snapshot's directory name.
    pub fn dir_name(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Abstract snapshot storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`write_at`](SnapshotStore::write_at) | Persist a tree under a new timestamp |
/// | [`list_snapshots`](SnapshotStore::list_snapshots) | Newest-first snapshot enumeration |
/// | [`read_snapshot`](SnapshotStore::read_snapshot) | Load a stored tree |
/// | [`write_diff`](SnapshotStore::write_diff) | Attach a diff to a snapshot |
/// | [`read_diff`](SnapshotStore::read_diff) | Load a snapshot's diff, if any |
/// | [`delete_snapshot`](SnapshotStore::delete_snapshot) | Remove a snapshot and its diff |
pub trait SnapshotStore: Send + Sync {
    /// Persist `tree` as a new snapshot of `site` taken at `timestamp`.
    ///
    /// Fails if a snapshot with the same timestamp already exists.
    fn write_at(
        &self,
        site: &Site,
        timestamp: NaiveDateTime,
        tree: &SitemapNode,
    ) -> Result<Snapshot>;

    /// List snapshots of `site_name`, newest first, at most `limit` entries.
    ///
    /// Entries whose names are not timestamps are skipped silently. A site
    /// with no storage yet has no snapshots.
    fn list_snapshots(&self, site_name: &str, limit: Option<usize>) -> Result<Vec<SnapshotRef>>;

    fn read_snapshot(&self, site: &Site, timestamp: NaiveDateTime) -> Result<Snapshot>;

    fn write_diff(&self, site_name: &str, timestamp: NaiveDateTime, diff: &Diff) -> Result<()>;

    /// Load the diff stored next to a snapshot.
    ///
    /// A missing or unreadable diff is `None`: consumers treat it as
    /// nothing to report.
    fn read_diff(&self, site_name: &str, timestamp: NaiveDateTime) -> Option<Diff>;

    fn delete_snapshot(&self, site_name: &str, timestamp: NaiveDateTime) -> Result<()>;

    /// Persist `tree` as a snapshot taken now.
    fn write(&self, site: &Site, tree: &SitemapNode) -> Result<Snapshot> {
        self.write_at(site, now_timestamp(), tree)
    }

    /// The newest snapshot of `site_name`, if any.
    fn latest(&self, site_name: &str) -> Result<Option<SnapshotRef>> {
        Ok(self.list_snapshots(site_name, Some(1))?.into_iter().next())
    }
}

/// Sort newest first and apply `limit`.
pub(crate) fn order_and_limit(mut refs: Vec<SnapshotRef>, limit: Option<usize>) -> Vec<SnapshotRef> {
    refs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = limit {
        refs.truncate(limit);
    }
    refs
}
