//! In-memory [`SnapshotStore`] for tests.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. Individual snapshots can be
//! marked undeletable to exercise best-effort retention.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDateTime;

use crate::models::{Diff, SitemapNode, Site, Snapshot};

use super::{order_and_limit, SnapshotRef, SnapshotStore};

struct StoredSnapshot {
    tree: SitemapNode,
    diff: Option<Diff>,
}

type Key = (String, NaiveDateTime);

/// In-memory snapshot store.
pub struct InMemoryStore {
    snapshots: RwLock<BTreeMap<Key, StoredSnapshot>>,
    locked: RwLock<HashSet<Key>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(BTreeMap::new()),
            locked: RwLock::new(HashSet::new()),
        }
    }

    /// Make `delete_snapshot` fail for this snapshot.
    pub fn lock_snapshot(&self, site_name: &str, timestamp: NaiveDateTime) {
        if let Ok(mut locked) = self.locked.write() {
            locked.insert((site_name.to_string(), timestamp));
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

impl SnapshotStore for InMemoryStore {
    fn write_at(
        &self,
        site: &Site,
        timestamp: NaiveDateTime,
        tree: &SitemapNode,
    ) -> Result<Snapshot> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        let key = (site.name.clone(), timestamp);
        if snapshots.contains_key(&key) {
            bail!("Snapshot already exists: {}/{}", site.name, timestamp);
        }
        snapshots.insert(
            key,
            StoredSnapshot {
                tree: tree.clone(),
                diff: None,
            },
        );
        Ok(Snapshot {
            site: site.clone(),
            timestamp,
            tree: tree.clone(),
        })
    }

    fn list_snapshots(&self, site_name: &str, limit: Option<usize>) -> Result<Vec<SnapshotRef>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        let refs = snapshots
            .keys()
            .filter(|(name, _)| name == site_name)
            .map(|(name, timestamp)| SnapshotRef {
                site_name: name.clone(),
                timestamp: *timestamp,
            })
            .collect();
        Ok(order_and_limit(refs, limit))
    }

    fn read_snapshot(&self, site: &Site, timestamp: NaiveDateTime) -> Result<Snapshot> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        let stored = snapshots
            .get(&(site.name.clone(), timestamp))
            .ok_or_else(|| anyhow!("No snapshot {}/{}", site.name, timestamp))?;
        Ok(Snapshot {
            site: site.clone(),
            timestamp,
            tree: stored.tree.clone(),
        })
    }

    fn write_diff(&self, site_name: &str, timestamp: NaiveDateTime, diff: &Diff) -> Result<()> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        let stored = snapshots
            .get_mut(&(site_name.to_string(), timestamp))
            .ok_or_else(|| anyhow!("No snapshot {}/{}", site_name, timestamp))?;
        // Mirror the on-disk format: only `pages` survives.
        stored.diff = Some(Diff {
            pages: diff.pages.clone(),
            ..Default::default()
        });
        Ok(())
    }

    fn read_diff(&self, site_name: &str, timestamp: NaiveDateTime) -> Option<Diff> {
        let snapshots = self.snapshots.read().ok()?;
        snapshots
            .get(&(site_name.to_string(), timestamp))
            .and_then(|s| s.diff.clone())
    }

    fn delete_snapshot(&self, site_name: &str, timestamp: NaiveDateTime) -> Result<()> {
        let key = (site_name.to_string(), timestamp);
        if self.locked.read().map_err(poisoned)?.contains(&key) {
            bail!("Snapshot {}/{} is locked", site_name, timestamp);
        }
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        snapshots
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| anyhow!("No snapshot {}/{}", site_name, timestamp))
    }
}
