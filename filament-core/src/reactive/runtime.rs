//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and the ownership tree and decides
//! when owners re-run.
//!
//! # How It Works
//!
//! 1. Signals and memos register a *source* node; effects, memos and roots
//!    register an *owner* node. Both live in slab arenas and are addressed
//!    by [`SourceId`] / [`OwnerId`] handles, so parent/child and
//!    subscriber/dependency links are plain ids rather than shared pointers.
//!
//! 2. When a source is read while an owner is observing, the runtime records
//!    the edge in both directions: the owner's dependency set and the
//!    source's subscriber set.
//!
//! 3. When a source changes, the runtime:
//!    a. Snapshots its subscriber set
//!    b. Marks memo subscribers dirty and walks on to *their* subscribers
//!    c. Queues effect subscribers in the batch scheduler
//!    d. Memos stay lazy: they recompute on next read
//!
//! 4. Running an owner first tears down what its previous run built
//!    (subscriptions, child owners, cleanups), then re-executes it inside a
//!    fresh [`ReactiveContext`].
//!
//! # Threading
//!
//! The runtime is thread-local. Reactive handles are `!Send`, so a graph
//! never crosses threads and no locking is needed. All state sits behind
//! `Cell`/`RefCell`, and no borrow is ever held while user code runs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexSet;
use slab::Slab;
use smallvec::SmallVec;

use super::batch::BatchScheduler;
use super::context::ReactiveContext;
use super::effect::Cleanup;
use super::snapshot::SnapshotTable;
use super::subscriber::{OwnerId, SignalId, SourceId};
use crate::config::RuntimeConfig;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Run `f` against the current thread's runtime.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

/// Like [`with_runtime`], but a no-op once the runtime has been torn down.
///
/// Used from `Drop` impls, which may run during thread-local destruction.
pub(crate) fn try_with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
    RUNTIME.try_with(f).ok()
}

pub(crate) type EffectFn = Rc<RefCell<dyn FnMut() -> Option<Cleanup>>>;

/// What an owner node computes.
pub(crate) enum OwnerKind {
    /// Owns children, never runs.
    Root,
    /// Eager side effect, re-run by the scheduler.
    Effect(EffectFn),
    /// Lazy derivation; `source` is the node its readers subscribe to.
    Memo { source: SourceId, dirty: bool },
}

pub(crate) struct OwnerNode {
    serial: u64,
    kind: OwnerKind,
    parent: Option<OwnerId>,
    children: IndexSet<OwnerId>,
    /// Dependency set, rebuilt on every run.
    sources: IndexSet<SourceId>,
    /// Cleanups from the last run, in registration order.
    cleanups: Vec<Cleanup>,
    running: bool,
    /// Set when the owner is notified while running.
    rerun: bool,
}

pub(crate) struct SourceNode {
    serial: u64,
    subscribers: IndexSet<OwnerId>,
    disposed: bool,
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    owners: RefCell<Slab<OwnerNode>>,
    sources: RefCell<Slab<SourceNode>>,
    next_serial: Cell<u64>,
    next_signal_id: Cell<u64>,
    config: RefCell<RuntimeConfig>,
    pub(crate) scheduler: BatchScheduler,
    pub(crate) snapshots: RefCell<SnapshotTable>,
}

fn owner_node(owners: &Slab<OwnerNode>, id: OwnerId) -> Option<&OwnerNode> {
    owners.get(id.slot).filter(|node| node.serial == id.serial)
}

fn owner_node_mut(owners: &mut Slab<OwnerNode>, id: OwnerId) -> Option<&mut OwnerNode> {
    owners.get_mut(id.slot).filter(|node| node.serial == id.serial)
}

fn source_node(sources: &Slab<SourceNode>, id: SourceId) -> Option<&SourceNode> {
    sources.get(id.slot).filter(|node| node.serial == id.serial)
}

fn source_node_mut(sources: &mut Slab<SourceNode>, id: SourceId) -> Option<&mut SourceNode> {
    sources.get_mut(id.slot).filter(|node| node.serial == id.serial)
}

/// Run teardown code outside every owner, so reads inside a cleanup never
/// subscribe whichever owner happens to be running.
fn run_cleanups(cleanups: impl IntoIterator<Item = Cleanup>) {
    let _scope = ReactiveContext::enter_scope(None);
    for cleanup in cleanups {
        cleanup.run();
    }
}

/// Clears an owner's running flag even if its body panics.
struct RunningGuard<'a> {
    rt: &'a Runtime,
    id: OwnerId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Some(node) = owner_node_mut(&mut self.rt.owners.borrow_mut(), self.id) {
            node.running = false;
        }
    }
}

impl Runtime {
    fn new() -> Self {
        Self {
            owners: RefCell::new(Slab::new()),
            sources: RefCell::new(Slab::new()),
            next_serial: Cell::new(0),
            next_signal_id: Cell::new(0),
            config: RefCell::new(RuntimeConfig::default()),
            scheduler: BatchScheduler::new(),
            snapshots: RefCell::new(SnapshotTable::default()),
        }
    }

    fn serial(&self) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        serial
    }

    pub(crate) fn config(&self) -> RuntimeConfig {
        self.config.borrow().clone()
    }

    pub(crate) fn set_config(&self, config: RuntimeConfig) {
        *self.config.borrow_mut() = config;
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    pub(crate) fn create_source(&self) -> SourceId {
        let serial = self.serial();
        let slot = self.sources.borrow_mut().insert(SourceNode {
            serial,
            subscribers: IndexSet::new(),
            disposed: false,
        });
        SourceId { slot, serial }
    }

    /// The id the next signal will get.
    pub(crate) fn peek_signal_id(&self) -> SignalId {
        SignalId(self.next_signal_id.get())
    }

    pub(crate) fn next_signal_id(&self) -> SignalId {
        let id = self.next_signal_id.get();
        self.next_signal_id.set(id + 1);
        SignalId(id)
    }

    /// Record that the current observer, if any, depends on `source`.
    pub(crate) fn track(&self, source: SourceId) {
        let Some(observer) = ReactiveContext::current_observer() else {
            return;
        };

        {
            let mut sources = self.sources.borrow_mut();
            match source_node_mut(&mut sources, source) {
                Some(node) if !node.disposed => {
                    node.subscribers.insert(observer);
                }
                _ => return,
            }
        }

        if let Some(node) = owner_node_mut(&mut self.owners.borrow_mut(), observer) {
            node.sources.insert(source);
        }
    }

    pub(crate) fn subscriber_count(&self, source: SourceId) -> usize {
        source_node(&self.sources.borrow(), source).map_or(0, |node| node.subscribers.len())
    }

    /// Drop every subscriber of `source`; later writes reach nobody and
    /// later reads no longer subscribe.
    pub(crate) fn dispose_source(&self, source: SourceId) {
        let subscribers = {
            let mut sources = self.sources.borrow_mut();
            let Some(node) = source_node_mut(&mut sources, source) else {
                return;
            };
            node.disposed = true;
            std::mem::take(&mut node.subscribers)
        };
        self.forget_source(source, subscribers);
    }

    /// Remove `source` from the arena entirely.
    pub(crate) fn remove_source(&self, source: SourceId) {
        let removed = {
            let mut sources = self.sources.borrow_mut();
            if source_node(&sources, source).is_none() {
                return;
            }
            sources.remove(source.slot)
        };
        self.forget_source(source, removed.subscribers);
    }

    fn forget_source(&self, source: SourceId, subscribers: IndexSet<OwnerId>) {
        let mut owners = self.owners.borrow_mut();
        for owner in subscribers {
            if let Some(node) = owner_node_mut(&mut owners, owner) {
                node.sources.shift_remove(&source);
            }
        }
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Mark everything downstream of `source` stale: memos become dirty,
    /// effects are queued in the scheduler.
    ///
    /// Memos that are already dirty are still walked: a reader may have
    /// subscribed since they were marked (a computation that unwound, say).
    /// Each source is visited at most once per call.
    pub(crate) fn notify(&self, source: SourceId) {
        let mut stack: SmallVec<[SourceId; 4]> = SmallVec::new();
        let mut visited: IndexSet<SourceId> = IndexSet::new();
        stack.push(source);

        while let Some(source) = stack.pop() {
            if !visited.insert(source) {
                continue;
            }
            // Snapshot first: queued owners may (un)subscribe while we walk.
            let subscribers: SmallVec<[OwnerId; 8]> =
                match source_node(&self.sources.borrow(), source) {
                    Some(node) => node.subscribers.iter().copied().collect(),
                    None => continue,
                };

            for owner in subscribers {
                let queue = {
                    let mut owners = self.owners.borrow_mut();
                    let Some(node) = owner_node_mut(&mut owners, owner) else {
                        continue;
                    };
                    match &mut node.kind {
                        OwnerKind::Memo { source, dirty } => {
                            *dirty = true;
                            stack.push(*source);
                            false
                        }
                        OwnerKind::Effect(_) if node.running => {
                            tracing::warn!(
                                owner = ?owner,
                                "effect triggered itself while running; deferring re-run"
                            );
                            node.rerun = true;
                            false
                        }
                        OwnerKind::Effect(_) => true,
                        OwnerKind::Root => false,
                    }
                };
                if queue {
                    self.scheduler.enqueue(owner);
                }
            }
        }
    }

    /// Notify downstream of `source`, then flush if the scheduler allows.
    pub(crate) fn propagate(&self, source: SourceId) {
        self.notify(source);
        self.flush_if_idle();
    }

    // ------------------------------------------------------------------
    // Owners
    // ------------------------------------------------------------------

    /// Insert a new owner. A dead or absent `parent` yields a root-level owner.
    pub(crate) fn create_owner(&self, parent: Option<OwnerId>, kind: OwnerKind) -> OwnerId {
        let serial = self.serial();
        let mut owners = self.owners.borrow_mut();
        let parent = parent.filter(|parent| owner_node(&owners, *parent).is_some());

        let slot = owners.insert(OwnerNode {
            serial,
            kind,
            parent,
            children: IndexSet::new(),
            sources: IndexSet::new(),
            cleanups: Vec::new(),
            running: false,
            rerun: false,
        });
        let id = OwnerId { slot, serial };

        if let Some(parent) = parent.and_then(|parent| owner_node_mut(&mut owners, parent)) {
            parent.children.insert(id);
        }
        id
    }

    pub(crate) fn owner_exists(&self, id: OwnerId) -> bool {
        owner_node(&self.owners.borrow(), id).is_some()
    }

    pub(crate) fn owner_parent(&self, id: OwnerId) -> Option<OwnerId> {
        owner_node(&self.owners.borrow(), id).and_then(|node| node.parent)
    }

    pub(crate) fn child_count(&self, id: OwnerId) -> usize {
        owner_node(&self.owners.borrow(), id).map_or(0, |node| node.children.len())
    }

    pub(crate) fn dependency_count(&self, id: OwnerId) -> usize {
        owner_node(&self.owners.borrow(), id).map_or(0, |node| node.sources.len())
    }

    pub(crate) fn depends_on(&self, id: OwnerId, source: SourceId) -> bool {
        owner_node(&self.owners.borrow(), id).is_some_and(|node| node.sources.contains(&source))
    }

    pub(crate) fn is_running(&self, id: OwnerId) -> bool {
        owner_node(&self.owners.borrow(), id).is_some_and(|node| node.running)
    }

    /// Register an extra cleanup on `id`. Returns the cleanup if the owner is gone.
    pub(crate) fn add_cleanup(&self, id: OwnerId, cleanup: Cleanup) -> Option<Cleanup> {
        match owner_node_mut(&mut self.owners.borrow_mut(), id) {
            Some(node) => {
                node.cleanups.push(cleanup);
                None
            }
            None => Some(cleanup),
        }
    }

    /// Check and clear a memo's dirty flag. `None` if the memo was disposed.
    pub(crate) fn take_memo_dirty(&self, id: OwnerId) -> Option<bool> {
        let mut owners = self.owners.borrow_mut();
        match owner_node_mut(&mut owners, id).map(|node| &mut node.kind) {
            Some(OwnerKind::Memo { dirty, .. }) => Some(std::mem::take(dirty)),
            _ => None,
        }
    }

    /// A memo's dirty flag, left untouched. `None` if the memo was disposed.
    pub(crate) fn memo_dirty(&self, id: OwnerId) -> Option<bool> {
        match owner_node(&self.owners.borrow(), id).map(|node| &node.kind) {
            Some(OwnerKind::Memo { dirty, .. }) => Some(*dirty),
            _ => None,
        }
    }

    pub(crate) fn mark_memo_dirty(&self, id: OwnerId) {
        if let Some(OwnerKind::Memo { dirty, .. }) =
            owner_node_mut(&mut self.owners.borrow_mut(), id).map(|node| &mut node.kind)
        {
            *dirty = true;
        }
    }

    /// Re-run the stored function of effect `id`.
    pub(crate) fn run_effect(&self, id: OwnerId) {
        let run = match owner_node(&self.owners.borrow(), id).map(|node| &node.kind) {
            Some(OwnerKind::Effect(run)) => Rc::clone(run),
            _ => return,
        };
        self.run_owner(id, || (&mut *run.borrow_mut())());
    }

    /// Run `body` as owner `id`.
    ///
    /// Tears down the previous run, installs `id` as the current observer,
    /// runs `body`, and stores the cleanup it returns. Returns `false`
    /// without running when the owner is disposed or already running; in
    /// the latter case the owner is flagged for a re-run once it finishes.
    pub(crate) fn run_owner(&self, id: OwnerId, body: impl FnOnce() -> Option<Cleanup>) -> bool {
        {
            let mut owners = self.owners.borrow_mut();
            let Some(node) = owner_node_mut(&mut owners, id) else {
                return false;
            };
            if node.running {
                node.rerun = true;
                return false;
            }
            node.running = true;
        }

        let guard = RunningGuard { rt: self, id };
        self.cleanup_owner(id);

        tracing::trace!(owner = ?id, "running owner");
        let cleanup = {
            let _ctx = ReactiveContext::enter(id);
            body()
        };

        let (orphaned, rerun) = {
            let mut owners = self.owners.borrow_mut();
            match owner_node_mut(&mut owners, id) {
                Some(node) => {
                    node.cleanups.extend(cleanup);
                    (None, std::mem::take(&mut node.rerun))
                }
                // Disposed from inside its own run.
                None => (cleanup, false),
            }
        };
        drop(guard);

        run_cleanups(orphaned);
        if rerun {
            self.scheduler.enqueue(id);
            self.flush_if_idle();
        }
        true
    }

    /// Undo the previous run of `id`: unsubscribe from every source,
    /// dispose every child, then run the stored cleanups.
    fn cleanup_owner(&self, id: OwnerId) {
        let (sources, children, cleanups) = {
            let mut owners = self.owners.borrow_mut();
            let Some(node) = owner_node_mut(&mut owners, id) else {
                return;
            };
            (
                std::mem::take(&mut node.sources),
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.cleanups),
            )
        };

        self.unsubscribe(id, &sources);
        for child in children {
            self.dispose_owner(child);
        }
        run_cleanups(cleanups);
    }

    fn unsubscribe(&self, owner: OwnerId, from: &IndexSet<SourceId>) {
        let mut sources = self.sources.borrow_mut();
        for source in from {
            if let Some(node) = source_node_mut(&mut sources, *source) {
                node.subscribers.shift_remove(&owner);
            }
        }
    }

    /// Dispose `id` and its whole subtree.
    ///
    /// Walks the subtree iteratively and tears nodes down in reverse
    /// pre-order, so every child is gone before its parent unsubscribes and
    /// runs its cleanups. Disposed owners leave the arena, so any stale
    /// handle or queued notification for them becomes a no-op.
    pub(crate) fn dispose_owner(&self, id: OwnerId) {
        let order = {
            let mut owners = self.owners.borrow_mut();
            let Some(parent) = owner_node(&owners, id).map(|node| node.parent) else {
                return;
            };
            if let Some(parent) = parent.and_then(|parent| owner_node_mut(&mut owners, parent)) {
                parent.children.shift_remove(&id);
            }

            let mut order = Vec::new();
            let mut stack = vec![id];
            while let Some(next) = stack.pop() {
                if let Some(node) = owner_node(&owners, next) {
                    order.push(next);
                    stack.extend(node.children.iter().rev().copied());
                }
            }
            order
        };

        for owner in order.into_iter().rev() {
            let node = {
                let mut owners = self.owners.borrow_mut();
                if owner_node(&owners, owner).is_none() {
                    continue;
                }
                owners.remove(owner.slot)
            };
            self.scheduler.forget(owner);
            self.unsubscribe(owner, &node.sources);
            if let OwnerKind::Memo { source, .. } = node.kind {
                self.remove_source(source);
            }
            run_cleanups(node.cleanups);
            tracing::debug!(owner = ?owner, "disposed owner");
            // Remaining fields (the effect closure) drop here, outside any borrow.
        }
    }

    #[cfg(test)]
    pub(crate) fn owner_count(&self) -> usize {
        self.owners.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }
}
