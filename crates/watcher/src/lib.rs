//! Recursive directory tree watching
//!
//! This crate watches whole directory trees on a background thread:
//! - Every directory under each root gets its own subscription
//! - Directories created later are picked up while the session runs
//! - Events are delivered to a callback, one batch per directory per wake-up
//! - Sessions stop cooperatively through a [`WatchHandle`]

pub mod config;
pub mod error;
pub mod platform;
pub mod registry;
pub mod session;
pub mod tree;

use std::path::{Path, PathBuf};

// Re-exports
pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use platform::{Backend, Interrupter, SubscriptionId, Wakeup};
pub use registry::SubscriptionRegistry;
pub use session::{ExitReason, SessionState, WatchHandle, WatchSession};
pub use tree::TreeWatcher;

/// A single change observed inside a watched directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// Type of change
    pub kind: EventKind,
    /// Entry name, relative to the directory the batch belongs to
    pub name: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Type of file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Entry created (or moved in)
    Created,
    /// Entry modified
    Modified,
    /// Entry deleted (or moved out)
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// Callback invoked for every batch of changes in a watched directory
///
/// Runs on the watcher thread. A slow callback holds up the whole session,
/// and a panicking one ends it.
pub trait OnChange: Send + 'static {
    fn on_change(&mut self, dir: &Path, events: &[ChangeEvent]);
}

impl<F> OnChange for F
where
    F: FnMut(&Path, &[ChangeEvent]) + Send + 'static,
{
    fn on_change(&mut self, dir: &Path, events: &[ChangeEvent]) {
        self(dir, events)
    }
}

/// Watch `roots` and call `callback` for every change under them
pub fn watch<C, I, P>(callback: C, roots: I) -> Result<WatchHandle>
where
    C: OnChange,
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    WatchSession::new(roots).start(callback)
}

/// Watch the single directory formed by joining `segments`
///
/// `watch_segments(cb, &["/tmp", "a", "b"])` watches `/tmp/a/b`.
pub fn watch_segments<C, S>(callback: C, segments: &[S]) -> Result<WatchHandle>
where
    C: OnChange,
    S: AsRef<Path>,
{
    WatchSession::from_segments(segments).start(callback)
}
