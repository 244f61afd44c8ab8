//! Tree registration and the monitoring loop

use crate::error::{Result, WatchError};
use crate::platform::{Backend, SubscriptionId, Wakeup};
use crate::registry::SubscriptionRegistry;
use crate::session::{ExitReason, SessionState, Shared};
use crate::{ChangeEvent, EventKind, OnChange};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

/// Watches every directory under a set of roots
///
/// Build one with [`TreeWatcher::new`], register its roots, then hand it to
/// a thread running [`TreeWatcher::run`].
pub struct TreeWatcher<B: Backend, C: OnChange> {
    backend: B,
    callback: C,
    roots: Vec<PathBuf>,
    registry: SubscriptionRegistry,
    shared: Arc<Shared>,
}

impl<B: Backend, C: OnChange> TreeWatcher<B, C> {
    pub fn new(backend: B, callback: C, roots: Vec<PathBuf>) -> Self {
        Self {
            backend,
            callback,
            roots,
            registry: SubscriptionRegistry::new(),
            shared: Arc::new(Shared::new()),
        }
    }

    /// Register every configured root
    pub fn register_roots(&mut self) -> Result<()> {
        let roots = self.roots.clone();
        for root in &roots {
            if root.exists() && !root.is_dir() {
                return Err(WatchError::NotADirectory(root.clone()));
            }
            self.register_tree(root)?;
        }
        info!(
            "Watching {} directories under {} roots",
            self.registry.len(),
            roots.len()
        );
        Ok(())
    }

    /// Subscribe `root` and every directory below it
    ///
    /// Symbolic links are not followed, so a link to a directory is not
    /// watched.
    pub fn register_tree(&mut self, root: &Path) -> Result<()> {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|source| WatchError::Walk {
                path: root.to_path_buf(),
                source,
            })?;

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.into_path();
            let id = self.backend.subscribe(&dir)?;
            debug!("Registered {} as {}", dir.display(), id);
            self.registry.put(id, dir);
        }
        Ok(())
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the loop until cancelled, drained or failed, then close the backend
    pub fn run(mut self) -> ExitReason {
        self.shared.set_state(SessionState::Running);

        let reason = self.pump();
        match &reason {
            ExitReason::Failed(e) => error!("Watcher stopped: {}", e),
            ExitReason::CallbackPanicked(msg) => error!("Watcher callback panicked: {}", msg),
            other => info!("Watcher stopped: {:?}", other),
        }

        if let Err(e) = self.backend.close() {
            debug!("Ignoring backend close failure: {}", e);
        }
        self.shared.set_state(SessionState::Stopped);
        reason
    }

    fn pump(&mut self) -> ExitReason {
        if self.registry.is_empty() {
            return ExitReason::Drained;
        }

        loop {
            if self.shared.stop_requested() {
                return ExitReason::Cancelled;
            }

            let (id, events) = match self.backend.take() {
                Ok(Wakeup::Batch { id, events }) => (id, events),
                Ok(Wakeup::Interrupted) => continue,
                Err(e) => return ExitReason::Failed(e),
            };

            if let Err(reason) = self.dispatch(id, &events) {
                return reason;
            }

            if !self.backend.rearm(id) {
                if let Some(dir) = self.registry.remove(id) {
                    debug!("Subscription {} for {} exhausted", id, dir.display());
                }
                if self.registry.is_empty() {
                    return ExitReason::Drained;
                }
            }
        }
    }

    /// Deliver one batch and extend coverage to new directories
    fn dispatch(
        &mut self,
        id: SubscriptionId,
        events: &[ChangeEvent],
    ) -> std::result::Result<(), ExitReason> {
        let dir = match self.registry.get(id) {
            Ok(dir) => dir.to_path_buf(),
            Err(e) => {
                trace!("Dropping {} events: {}", events.len(), e);
                return Ok(());
            }
        };
        trace!("{} events in {}", events.len(), dir.display());

        let callback = &mut self.callback;
        panic::catch_unwind(AssertUnwindSafe(|| callback.on_change(&dir, events)))
            .map_err(|payload| ExitReason::CallbackPanicked(panic_message(payload.as_ref())))?;

        for event in events.iter().filter(|e| e.kind == EventKind::Created) {
            let child = dir.join(&event.name);
            if !child.is_dir() {
                continue;
            }
            if let Err(e) = self.register_tree(&child) {
                warn!("Could not watch new directory {}: {}", child.display(), e);
            }
        }
        Ok(())
    }
}

impl<B: Backend, C: OnChange> fmt::Debug for TreeWatcher<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeWatcher")
            .field("roots", &self.roots)
            .field("registry", &self.registry)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
