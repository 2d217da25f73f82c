//! Held-Paths Monitor (spec §4.8): the safety core of watch mode.
//!
//! Grounded line-for-line on `sml_sync/watch_sync.py`'s `TimestampDatabase`
//! and `HeldFilesMonitor`. The remote timestamp database is mutated only
//! from the Uploader thread (spec §5), so `HeldPathsMonitor` is not
//! `Sync` by design — callers own it exclusively.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{ChangeEventType, Difference, DifferenceType, FsChangeEvent, FsObject, FsObjectType, HeldPathSet};
use crate::tree_differ;

/// Looks up the current remote mtime for one relative path. `Ok(None)`
/// means the path does not exist remotely (ENOENT), which callers treat
/// as "not changed" rather than an error (spec §4.8).
pub trait RemoteMtimeSource {
    fn remote_mtime(&self, relative_path: &str) -> anyhow::Result<Option<DateTime<Utc>>>;
}

/// A path -> timestamp map. Not safe for concurrent mutation; ownership
/// is exclusive to the Held-Paths Monitor thread (spec §3).
#[derive(Debug, Default, Clone)]
pub struct TimestampDatabase {
    data: HashMap<String, DateTime<Utc>>,
}

impl TimestampDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fs_objects(objects: &[FsObject]) -> Self {
        let mut data = HashMap::new();
        for obj in objects {
            if let Some(attrs) = obj.file_attrs() {
                data.insert(obj.path.clone(), attrs.last_modified);
            }
        }
        Self { data }
    }

    pub fn get(&self, path: &str) -> Option<DateTime<Utc>> {
        self.data.get(path).copied()
    }

    pub fn remove(&mut self, path: &str) {
        self.data.remove(path);
    }

    /// Only ever advances a path's recorded timestamp forward.
    pub fn update_if_newer(&mut self, path: &str, timestamp: DateTime<Utc>) {
        let should_update = match self.data.get(path) {
            Some(existing) => timestamp > *existing,
            None => true,
        };
        if should_update {
            self.data.insert(path.to_string(), timestamp);
        }
    }
}

/// The outcome of one `HeldPathsMonitor::should_sync` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub should_sync: bool,
    /// True only when this call newly added a path to the held set;
    /// callers republish `HELD_FILES_CHANGED` exactly when this is true.
    pub newly_held: bool,
}

pub struct HeldPathsMonitor<R: RemoteMtimeSource> {
    remote: R,
    remote_timestamps: TimestampDatabase,
    held_paths: HeldPathSet,
}

impl<R: RemoteMtimeSource> HeldPathsMonitor<R> {
    /// Builds the monitor from the initial local/remote listings taken at
    /// watch-mode entry, computing the initial held set per spec §4.8:
    /// hold `RightOnly`/`TypeDifferent` paths outright, and hold
    /// `AttrsDifferent` paths only where the remote side is strictly
    /// newer than the local side.
    pub fn new(remote: R, local_tree: &[FsObject], remote_tree: &[FsObject]) -> Self {
        let remote_timestamps = TimestampDatabase::from_fs_objects(remote_tree);
        let held_paths = initial_held_paths(local_tree, remote_tree);
        Self {
            remote,
            remote_timestamps,
            held_paths,
        }
    }

    pub fn held_paths(&self) -> &HeldPathSet {
        &self.held_paths
    }

    /// Returns whether an event should be synced, and whether new drift
    /// was detected and added to the held set during this call. Callers
    /// must only republish `HELD_FILES_CHANGED` when `newly_held` is true
    /// — an already-held path short-circuits with `newly_held: false`.
    pub fn should_sync(&mut self, event: &FsChangeEvent) -> anyhow::Result<SyncDecision> {
        if self.held_paths.contains(&event.path) {
            return Ok(SyncDecision {
                should_sync: false,
                newly_held: false,
            });
        }

        if let Some(dest) = event.dest_path() {
            let src_changed = self.has_path_changed(&event.path)?;
            let dest_changed = self.has_path_changed(dest)?;
            if src_changed {
                self.held_paths.insert(event.path.clone());
            }
            if dest_changed {
                self.held_paths.insert(dest.to_string());
            }
            return Ok(SyncDecision {
                should_sync: !src_changed && !dest_changed,
                newly_held: src_changed || dest_changed,
            });
        }

        if self.has_path_changed(&event.path)? {
            self.held_paths.insert(event.path.clone());
            return Ok(SyncDecision {
                should_sync: false,
                newly_held: true,
            });
        }
        Ok(SyncDecision {
            should_sync: true,
            newly_held: false,
        })
    }

    /// True if a held-set addition happened that callers must republish
    /// as `HELD_FILES_CHANGED`; call this right after `should_sync`
    /// returns to decide whether to publish.
    pub fn has_path_changed(&self, path: &str) -> anyhow::Result<bool> {
        let last_known = self.remote_timestamps.get(path);
        match self.remote.remote_mtime(path)? {
            None => Ok(false),
            Some(current) => Ok(Some(current) != last_known),
        }
    }

    /// Called only once a sync for `event` actually completed.
    pub fn has_synced(&mut self, event: &FsChangeEvent) -> anyhow::Result<()> {
        match event.event_type {
            ChangeEventType::Deleted => {
                self.remote_timestamps.remove(&event.path);
            }
            ChangeEventType::Moved => {
                self.remote_timestamps.remove(&event.path);
                if let Some(dest) = event.dest_path() {
                    if let Some(ts) = self.remote.remote_mtime(dest)? {
                        self.remote_timestamps.update_if_newer(dest, ts);
                    }
                }
            }
            ChangeEventType::Created | ChangeEventType::Modified => {
                if let Some(ts) = self.remote.remote_mtime(&event.path)? {
                    self.remote_timestamps.update_if_newer(&event.path, ts);
                }
            }
        }
        Ok(())
    }
}

fn initial_held_paths(local_tree: &[FsObject], remote_tree: &[FsObject]) -> HeldPathSet {
    let mut held = HeldPathSet::new();
    for diff in tree_differ::compare(local_tree, remote_tree) {
        match diff.difference_type {
            DifferenceType::RightOnly | DifferenceType::TypeDifferent => {
                held.insert(diff.path().to_string());
            }
            DifferenceType::AttrsDifferent => {
                let Difference { left, right, .. } = &diff;
                if let (Some(left), Some(right)) = (left, right) {
                    if left.obj_type == FsObjectType::File && right.obj_type == FsObjectType::File {
                        let local_mtime = left.file_attrs().unwrap().last_modified;
                        let remote_mtime = right.file_attrs().unwrap().last_modified;
                        if remote_mtime > local_mtime {
                            held.insert(diff.path().to_string());
                        }
                    }
                }
            }
            DifferenceType::LeftOnly => {}
        }
    }
    held
}
