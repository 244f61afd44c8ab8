//! Error types for tree watching

use crate::platform::SubscriptionId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// Directory tree could not be walked (missing root, permission denied)
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The notification backend refused to watch a directory
    #[error("failed to subscribe to {}: {source}", .path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("notification backend error: {0}")]
    Notify(#[from] notify::Error),

    #[error("notification session disconnected")]
    Disconnected,

    /// Lookup of a subscription that was never registered or already removed
    #[error("unknown subscription {0}")]
    NotFound(SubscriptionId),

    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Whether this error came from setting up coverage of a tree
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            WatchError::Walk { .. }
                | WatchError::NotADirectory(_)
                | WatchError::Subscribe { .. }
                | WatchError::Spawn(_)
                | WatchError::Io(_)
        )
    }
}
