//! Subscription registry
//!
//! Maps backend subscription ids to the directory each one watches. Only the
//! watcher thread touches it.

use crate::error::{Result, WatchError};
use crate::platform::SubscriptionId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    dirs: HashMap<SubscriptionId, PathBuf>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the directory for `id`
    pub fn put(&mut self, id: SubscriptionId, dir: PathBuf) {
        self.dirs.insert(id, dir);
    }

    /// Resolve `id` to its directory
    ///
    /// A miss means the event is stale and should be ignored.
    pub fn get(&self, id: SubscriptionId) -> Result<&Path> {
        self.dirs
            .get(&id)
            .map(PathBuf::as_path)
            .ok_or(WatchError::NotFound(id))
    }

    /// Forget `id`; no-op if absent
    pub fn remove(&mut self, id: SubscriptionId) -> Option<PathBuf> {
        self.dirs.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Number of live subscriptions watching `dir`
    pub fn subscriptions_for(&self, dir: &Path) -> usize {
        self.dirs.values().filter(|p| p.as_path() == dir).count()
    }

    pub fn contains_path(&self, dir: &Path) -> bool {
        self.subscriptions_for(dir) > 0
    }

    /// All watched directories, in no particular order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.dirs.values().map(PathBuf::as_path)
    }
}
