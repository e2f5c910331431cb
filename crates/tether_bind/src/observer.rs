//! Render observers
//!
//! An [`Observer`] owns a render closure. Each [`render`](Observer::render)
//! runs it under a fresh tracking session and then makes the observer's
//! subscriptions match exactly what that pass read: listeners on nodes that
//! are no longer read are removed, listeners on newly read nodes are added.
//!
//! When any subscribed node notifies, the observer becomes dirty and calls
//! its invalidation hook once. It stays dirty, and silent, until the next
//! render.
//!
//! Output that defers work (see [`LazyList`](crate::LazyList)) keeps
//! recording into the render's session after `render` returns. Call
//! [`commit`](Observer::commit) once the consumer is done with the output to
//! pick those reads up.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::{
    runtime, tracker, AccessSet, DeferredContent, Listener, NodeId, NodeRef, ObservableNode,
    TrackingSession,
};

type Hook = Rc<dyn Fn()>;
type Sink<R> = Rc<dyn Fn(R)>;

/// A render closure bound to the nodes it reads
pub struct Observer<R> {
    inner: Rc<ObserverInner<R>>,
}

pub(crate) struct ObserverInner<R> {
    /// Identity in logs and dispose errors; never notified
    node: ObservableNode,
    render: Box<dyn Fn() -> R>,
    sink: RefCell<Option<Sink<R>>>,
    on_invalidate: RefCell<Option<Hook>>,
    listener: Listener,
    subscriptions: RefCell<AccessSet>,
    session: RefCell<Option<TrackingSession>>,
    dirty: Cell<bool>,
    disposed: Cell<bool>,
    renders: Cell<u64>,
}

/// Something a [`RebuildQueue`](crate::RebuildQueue) can re-render
pub(crate) trait Rebuild {
    fn is_dirty(&self) -> bool;
    fn rebuild(&self);
}

impl<R: DeferredContent + 'static> Observer<R> {
    /// Create an observer. Nothing runs until the first render.
    pub fn new(render: impl Fn() -> R + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ObserverInner<R>>| {
            let weak = weak.clone();
            ObserverInner {
                node: ObservableNode::new().with_label("observer"),
                render: Box::new(render),
                sink: RefCell::new(None),
                on_invalidate: RefCell::new(None),
                listener: Listener::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                }),
                subscriptions: RefCell::new(AccessSet::default()),
                session: RefCell::new(None),
                dirty: Cell::new(true),
                disposed: Cell::new(false),
                renders: Cell::new(0),
            }
        });
        Self { inner }
    }

    /// Deliver each [`rebuild`](Self::rebuild)'s output to `sink`
    pub fn with_sink(self, sink: impl Fn(R) + 'static) -> Self {
        *self.inner.sink.borrow_mut() = Some(Rc::new(sink));
        self
    }

    /// Call `hook` when the observer goes from clean to dirty
    pub fn on_invalidate(&self, hook: impl Fn() + 'static) {
        *self.inner.on_invalidate.borrow_mut() = Some(Rc::new(hook));
    }

    /// Run the render closure and resubscribe to what it read
    pub fn render(&self) -> R {
        self.inner.render()
    }

    /// Pick up reads made by deferred output since the last render and
    /// release the render's session
    pub fn commit(&self) {
        self.inner.commit();
    }

    /// Render, hand the output to the sink, then commit
    pub fn rebuild(&self) {
        self.inner.rebuild();
    }

    /// Id used for this observer in logs and errors
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Whether a subscribed node changed since the last render
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// How many times the render closure has run
    pub fn render_count(&self) -> u64 {
        self.inner.renders.get()
    }

    /// The nodes currently subscribed to, in first-read order
    pub fn subscriptions(&self) -> Vec<NodeRef> {
        self.inner.subscriptions.borrow().iter().copied().collect()
    }

    /// Unsubscribe from everything. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the observer has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub(crate) fn as_rebuild(&self) -> Weak<dyn Rebuild> {
        let weak: Weak<ObserverInner<R>> = Rc::downgrade(&self.inner);
        weak
    }
}

impl<R> ObserverInner<R> {
    fn invalidate(&self) {
        if self.disposed.get() || self.dirty.replace(true) {
            return;
        }
        tracing::trace!(observer = ?self.node.id(), "observer invalidated");
        let hook = self.on_invalidate.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Make subscriptions equal to `next`, skipping nodes disposed since
    /// they were read
    fn sync(&self, next: AccessSet) {
        let previous = self.subscriptions.take();
        let mut kept = AccessSet::default();
        let (mut added, mut removed) = (0usize, 0usize);

        for node in previous.difference(&next) {
            node.remove_listener(&self.listener);
            removed += 1;
        }
        for node in next {
            if previous.contains(&node) {
                kept.insert(node);
            } else if node.is_alive() {
                node.add_listener(self.listener.clone());
                kept.insert(node);
                added += 1;
            }
        }

        tracing::trace!(
            subscriptions = kept.len(),
            added,
            removed,
            "observer subscriptions synced"
        );
        *self.subscriptions.borrow_mut() = kept;
    }

    fn commit(&self) {
        let session = self.session.borrow_mut().take();
        if let Some(session) = session {
            if !self.disposed.get() {
                self.sync(session.accessed());
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let subscriptions = self.subscriptions.take();
        for node in &subscriptions {
            node.remove_listener(&self.listener);
        }
        let session = self.session.borrow_mut().take();
        let hook = self.on_invalidate.borrow_mut().take();
        drop((session, hook));
        self.node.dispose();
        tracing::trace!(
            observer = ?self.node.id(),
            subscriptions = subscriptions.len(),
            "observer disposed"
        );
    }
}

impl<R: DeferredContent> ObserverInner<R> {
    fn render(&self) -> R {
        if self.disposed.get() {
            runtime::dispose_violation(self.node.id(), "render");
            return tracker::untracked(|| (self.render)());
        }
        // Cleared first so writes made by the render itself leave it dirty.
        self.dirty.set(false);
        let tracked = tracker::track_with_context(|| (self.render)());
        self.renders.set(self.renders.get() + 1);

        if !self.disposed.get() {
            self.sync(tracked.accessed);
            *self.session.borrow_mut() = tracked.session;
        }
        tracked.value
    }

    fn rebuild(&self) {
        let output = self.render();
        let sink = self.sink.borrow().clone();
        match sink {
            Some(sink) => sink(output),
            None => drop(output),
        }
        self.commit();
    }
}

impl<R: DeferredContent> Rebuild for ObserverInner<R> {
    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn rebuild(&self) {
        ObserverInner::rebuild(self);
    }
}

impl<R> Drop for ObserverInner<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<R> fmt::Debug for Observer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.inner.node.id())
            .field("subscriptions", &self.inner.subscriptions.borrow().len())
            .field("dirty", &self.inner.dirty.get())
            .field("renders", &self.inner.renders.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}
