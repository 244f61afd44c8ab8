//! Session facade and lifecycle handle

use crate::config::{self, WatchConfig};
use crate::error::{Result, WatchError};
use crate::platform::{Backend, Interrupter, NotifyBackend};
use crate::tree::TreeWatcher;
use crate::OnChange;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

/// Lifecycle of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    StopRequested,
    Stopped,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Starting,
            1 => SessionState::Running,
            _ => SessionState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Starting => 0,
            SessionState::Running => 1,
            // Never stored; derived from the stop flag
            SessionState::StopRequested => 1,
            SessionState::Stopped => 2,
        }
    }
}

/// Why the watcher thread exited
#[derive(Debug)]
pub enum ExitReason {
    /// Stop was requested through the handle
    Cancelled,
    /// No subscriptions left (every watched directory is gone)
    Drained,
    /// The notification backend failed
    Failed(WatchError),
    /// The callback panicked with this message
    CallbackPanicked(String),
    /// The watcher thread itself panicked outside the callback
    Panicked(String),
}

impl ExitReason {
    /// Cancelled or drained
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::Cancelled | ExitReason::Drained)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Cancelled => f.write_str("stopped on request"),
            ExitReason::Drained => f.write_str("nothing left to watch"),
            ExitReason::Failed(e) => write!(f, "failed: {}", e),
            ExitReason::CallbackPanicked(msg) => write!(f, "callback panicked: {}", msg),
            ExitReason::Panicked(msg) => write!(f, "watcher thread panicked: {}", msg),
        }
    }
}

/// State shared between the watcher thread and its handle
///
/// The handle only writes `stop`; the watcher thread only writes `state`.
#[derive(Debug)]
pub(crate) struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Starting.as_u8()),
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn state(&self) -> SessionState {
        match SessionState::from_u8(self.state.load(Ordering::Acquire)) {
            SessionState::Stopped => SessionState::Stopped,
            _ if self.stop_requested() => SessionState::StopRequested,
            other => other,
        }
    }
}

/// Builder for a watch session
#[derive(Debug, Clone)]
pub struct WatchSession {
    roots: Vec<PathBuf>,
    thread_name: String,
}

impl WatchSession {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            thread_name: WatchConfig::default().thread_name,
        }
    }

    /// Session over the single path made by joining `segments`
    pub fn from_segments<S: AsRef<Path>>(segments: &[S]) -> Self {
        let roots = if segments.is_empty() {
            Vec::new()
        } else {
            vec![segments.iter().collect::<PathBuf>()]
        };
        Self::new(roots)
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.roots.iter().cloned()).thread_name(config.thread_name.clone())
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Start watching with the platform's native backend
    pub fn start<C: OnChange>(self, callback: C) -> Result<WatchHandle> {
        if self.roots.is_empty() {
            return Ok(WatchHandle::idle());
        }
        let backend = NotifyBackend::new()?;
        self.start_with_backend(backend, callback)
    }

    /// Start watching with a caller-supplied backend
    ///
    /// All roots are registered before this returns. If any of them cannot be
    /// walked or subscribed, or the thread name is unusable, the error is
    /// returned and no thread is started.
    pub fn start_with_backend<B, C>(self, backend: B, callback: C) -> Result<WatchHandle>
    where
        B: Backend,
        C: OnChange,
    {
        if self.roots.is_empty() {
            return Ok(WatchHandle::idle());
        }
        config::validate_thread_name(&self.thread_name)?;

        let mut watcher = TreeWatcher::new(backend, callback, self.roots);
        watcher.register_roots()?;

        let shared = watcher.shared();
        let interrupter = watcher.backend().interrupter();

        // std threads never keep the process alive once main returns
        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || watcher.run())
            .map_err(WatchError::Spawn)?;

        info!("Started watcher thread {}", self.thread_name);
        Ok(WatchHandle {
            shared,
            interrupter: Some(interrupter),
            thread: Some(thread),
        })
    }
}

/// Handle to a running watch session
///
/// Dropping the handle detaches the thread; call
/// [`WatchHandle::request_stop`] and [`WatchHandle::await_termination`] to
/// shut it down.
pub struct WatchHandle {
    shared: Arc<Shared>,
    interrupter: Option<Interrupter>,
    thread: Option<JoinHandle<ExitReason>>,
}

impl WatchHandle {
    /// Handle for a session with nothing to watch
    fn idle() -> Self {
        let shared = Arc::new(Shared::new());
        shared.set_state(SessionState::Stopped);
        Self {
            shared,
            interrupter: None,
            thread: None,
        }
    }

    /// Ask the watcher to stop
    ///
    /// Returns immediately. A callback in progress finishes first.
    pub fn request_stop(&self) {
        self.shared.request_stop();
        if let Some(interrupter) = &self.interrupter {
            interrupter.interrupt();
        }
    }

    /// Block until the watcher thread has exited and released its backend
    ///
    /// Callback panics are caught inside the loop; a panic that escapes the
    /// thread (backend or loop) is reported as [`ExitReason::Panicked`].
    pub fn await_termination(mut self) -> ExitReason {
        let Some(thread) = self.thread.take() else {
            return ExitReason::Drained;
        };
        thread.join().unwrap_or_else(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            ExitReason::Panicked(msg)
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Whether a background thread was started at all
    pub fn is_idle(&self) -> bool {
        self.thread.is_none()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("state", &self.state())
            .field(
                "thread",
                &self.thread.as_ref().and_then(|t| t.thread().name()),
            )
            .finish()
    }
}
