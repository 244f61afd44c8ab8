//! Notification backends
//!
//! The tree watcher only needs four things from the OS facility underneath
//! it: per-directory subscriptions, a blocking "next batch" call, re-arming
//! of a subscription after its batch was handled, and a way to close the
//! session. [`Backend`] is that seam; [`native::NotifyBackend`] implements it
//! on top of the `notify` crate.

pub mod native;

pub use native::NotifyBackend;

use crate::error::Result;
use crate::ChangeEvent;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Opaque handle for one directory subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of one blocking wait on a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// Events for a single subscription, in the order the backend saw them
    Batch {
        id: SubscriptionId,
        events: Vec<ChangeEvent>,
    },
    /// The wait was interrupted through an [`Interrupter`]
    Interrupted,
}

/// Wakes a thread blocked in [`Backend::take`]
#[derive(Clone)]
pub struct Interrupter {
    wake: Arc<dyn Fn() + Send + Sync>,
}

impl Interrupter {
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            wake: Arc::new(wake),
        }
    }

    pub fn interrupt(&self) {
        (self.wake)()
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter").finish_non_exhaustive()
    }
}

/// A file change notification session
///
/// Owned by exactly one watcher thread for its whole lifetime.
pub trait Backend: Send + 'static {
    /// Watch `dir` (non-recursively) for created, modified and deleted entries
    ///
    /// Subscribing a directory that is already subscribed returns its
    /// existing id.
    fn subscribe(&mut self, dir: &Path) -> Result<SubscriptionId>;

    /// Block until a subscription has pending events or the wait is interrupted
    ///
    /// A subscription that was returned here is not reported again until it
    /// has been re-armed.
    fn take(&mut self) -> Result<Wakeup>;

    /// Re-arm `id` for further events
    ///
    /// Returns `false` once the subscription can no longer deliver events
    /// (directory removed or unwatchable); the backend forgets it.
    fn rearm(&mut self, id: SubscriptionId) -> bool;

    /// Handle that unblocks a pending [`Backend::take`] from another thread
    fn interrupter(&self) -> Interrupter;

    /// Release the session
    fn close(&mut self) -> Result<()>;
}
