//! `notify`-based backend
//!
//! Each subscribed directory is watched non-recursively. Raw `notify` events
//! arrive on a crossbeam channel and are sorted into per-subscription buckets,
//! so one wake-up always carries the events of exactly one directory.

use super::{Backend, Interrupter, SubscriptionId, Wakeup};
use crate::error::{Result, WatchError};
use crate::{ChangeEvent, EventKind};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Message on the backend channel
#[derive(Debug)]
enum Signal {
    Fs(notify::Result<notify::Event>),
    Wake,
}

/// Backend over the platform's recommended `notify` watcher
pub struct NotifyBackend {
    /// `None` once closed
    watcher: Option<RecommendedWatcher>,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    next_id: u64,

    /// Raw and canonical forms of every subscribed directory
    by_path: HashMap<PathBuf, SubscriptionId>,
    by_id: HashMap<SubscriptionId, PathBuf>,

    /// Events not yet handed out, per subscription
    pending: HashMap<SubscriptionId, Vec<ChangeEvent>>,
    /// Subscriptions with something to report, in signal order
    ready: VecDeque<SubscriptionId>,
    /// Handed out by `take`, waiting for `rearm`
    taken: HashSet<SubscriptionId>,
    /// Directory itself was removed or moved away
    invalid: HashSet<SubscriptionId>,
}

impl NotifyBackend {
    pub fn new() -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let events_tx = tx.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = events_tx.send(Signal::Fs(res));
        })?;

        Ok(Self {
            watcher: Some(watcher),
            tx,
            rx,
            next_id: 0,
            by_path: HashMap::new(),
            by_id: HashMap::new(),
            pending: HashMap::new(),
            ready: VecDeque::new(),
            taken: HashSet::new(),
            invalid: HashSet::new(),
        })
    }

    /// Feed one signal into the buckets; `true` if it was a wake request
    fn absorb(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::Wake => true,
            Signal::Fs(Ok(event)) => {
                for (kind, path) in translate(&event) {
                    self.route(kind, &path);
                }
                false
            }
            Signal::Fs(Err(err)) => {
                warn!("Dropping notification error: {}", err);
                false
            }
        }
    }

    fn route(&mut self, kind: EventKind, path: &Path) {
        // inotify reports removal of a watched directory both to its parent
        // and to the directory itself; only the first report is kept.
        if kind == EventKind::Deleted {
            if let Some(id) = self.lookup(path) {
                if !self.invalid.insert(id) {
                    return;
                }
                trace!("Subscription {} lost its directory {}", id, path.display());
                self.signal(id);
            }
        }

        let Some(name) = path.file_name() else {
            return;
        };
        match path.parent().and_then(|parent| self.lookup(parent)) {
            Some(parent_id) => {
                self.pending
                    .entry(parent_id)
                    .or_default()
                    .push(ChangeEvent::new(kind, name));
                self.signal(parent_id);
            }
            None => trace!("No subscription for {}", path.display()),
        }
    }

    fn lookup(&self, path: &Path) -> Option<SubscriptionId> {
        if let Some(id) = self.by_path.get(path) {
            return Some(*id);
        }
        let canonical = path.canonicalize().ok()?;
        self.by_path.get(&canonical).copied()
    }

    fn signal(&mut self, id: SubscriptionId) {
        if !self.taken.contains(&id) && !self.ready.contains(&id) {
            self.ready.push_back(id);
        }
    }

    fn forget(&mut self, id: SubscriptionId) {
        self.pending.remove(&id);
        self.invalid.remove(&id);
        self.ready.retain(|queued| *queued != id);
        self.by_path.retain(|_, mapped| *mapped != id);

        let Some(dir) = self.by_id.remove(&id) else {
            return;
        };
        // The path may have been subscribed again under a fresh id
        if self.by_path.contains_key(&dir) {
            return;
        }
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.unwatch(&dir) {
                debug!("Unwatch of {} failed: {}", dir.display(), e);
            }
        }
    }
}

impl fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("open", &self.watcher.is_some())
            .field("subscriptions", &self.by_id)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl Backend for NotifyBackend {
    fn subscribe(&mut self, dir: &Path) -> Result<SubscriptionId> {
        if let Some(&id) = self.by_path.get(dir) {
            if !self.invalid.contains(&id) {
                return Ok(id);
            }
        }

        let watcher = self.watcher.as_mut().ok_or(WatchError::Disconnected)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                path: dir.to_path_buf(),
                source,
            })?;

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.by_path.insert(dir.to_path_buf(), id);
        if let Ok(canonical) = dir.canonicalize() {
            if canonical != dir {
                self.by_path.insert(canonical, id);
            }
        }
        self.by_id.insert(id, dir.to_path_buf());

        Ok(id)
    }

    fn take(&mut self) -> Result<Wakeup> {
        loop {
            loop {
                match self.rx.try_recv() {
                    Ok(signal) => {
                        if self.absorb(signal) {
                            return Ok(Wakeup::Interrupted);
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Err(WatchError::Disconnected),
                }
            }

            if let Some(id) = self.ready.pop_front() {
                self.taken.insert(id);
                let events = self.pending.remove(&id).unwrap_or_default();
                return Ok(Wakeup::Batch { id, events });
            }

            let signal = self.rx.recv().map_err(|_| WatchError::Disconnected)?;
            if self.absorb(signal) {
                return Ok(Wakeup::Interrupted);
            }
        }
    }

    fn rearm(&mut self, id: SubscriptionId) -> bool {
        self.taken.remove(&id);

        let usable = match self.by_id.get(&id) {
            Some(dir) => !self.invalid.contains(&id) && dir.is_dir(),
            None => return false,
        };
        if !usable {
            self.forget(id);
            return false;
        }

        if self.pending.get(&id).is_some_and(|events| !events.is_empty()) {
            self.signal(id);
        }
        true
    }

    fn interrupter(&self) -> Interrupter {
        let tx = self.tx.clone();
        Interrupter::new(move || {
            let _ = tx.send(Signal::Wake);
        })
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the watcher stops its event thread and releases the OS handles
        self.watcher.take();
        self.by_path.clear();
        self.by_id.clear();
        self.pending.clear();
        self.ready.clear();
        Ok(())
    }
}

/// Map one `notify` event onto change kinds per affected path
fn translate(event: &notify::Event) -> Vec<(EventKind, PathBuf)> {
    use notify::EventKind as Raw;

    let all = |kind: EventKind| -> Vec<(EventKind, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };

    match event.kind {
        Raw::Create(_) => all(EventKind::Created),
        Raw::Remove(_) => all(EventKind::Deleted),
        Raw::Modify(ModifyKind::Name(RenameMode::From)) => all(EventKind::Deleted),
        Raw::Modify(ModifyKind::Name(RenameMode::To)) => all(EventKind::Created),
        // inotify also reports the `From` and `To` halves of a paired rename;
        // no other backend emits `Both`
        Raw::Modify(ModifyKind::Name(RenameMode::Both)) => Vec::new(),
        // Backends that cannot tell the direction of a rename
        Raw::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    EventKind::Created
                } else {
                    EventKind::Deleted
                };
                (kind, p.clone())
            })
            .collect(),
        Raw::Modify(_) => all(EventKind::Modified),
        Raw::Access(_) | Raw::Any | Raw::Other => Vec::new(),
    }
}
