//! Computed values
//!
//! A [`ComputedValue<T>`] caches the result of a pure function over an
//! explicit list of dependency nodes. It subscribes to every dependency on
//! construction, computes eagerly, and on each dependency notification
//! recomputes and notifies its own listeners only if the result changed.
//!
//! Dependencies are declared, not inferred: the compute function always runs
//! with tracking suspended, so building or refreshing a computed value never
//! leaks reads into whatever session happens to be active.
//!
//! ```rust
//! use tether_core::{ComputedValue, Observable, ObservableValue};
//!
//! let a = ObservableValue::new(1);
//! let b = ObservableValue::new(2);
//! let sum = {
//!     let deps = [a.node_ref(), b.node_ref()];
//!     let (a, b) = (a.clone(), b.clone());
//!     ComputedValue::new(move || a.get() + b.get(), deps)
//! };
//!
//! assert_eq!(sum.get(), 3);
//! a.set(5);
//! assert_eq!(sum.get(), 7);
//! ```

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::node::{Listener, NodeId, NodeRef, Observable, ObservableNode, Subscription};
use crate::tracker;

/// A cached, dependency-driven derived value.
///
/// Cloning yields another handle to the same computation. Dropping the last
/// handle disposes it.
pub struct ComputedValue<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    node: ObservableNode,
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<T>>,
    /// Result computed while `cached` was borrowed by `with`
    pending: Cell<Option<T>>,
    dependencies: Vec<NodeRef>,
    listener: Listener,
    disposed: Cell<bool>,
    computations: Cell<u64>,
}

impl<T> Clone for ComputedValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: PartialEq + 'static> ComputedValue<T> {
    /// Create a computed value over `dependencies` and compute it once
    pub fn new<F, I>(compute: F, dependencies: I) -> Self
    where
        F: Fn() -> T + 'static,
        I: IntoIterator<Item = NodeRef>,
    {
        let dependencies: Vec<NodeRef> = dependencies.into_iter().collect();
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            ComputedInner {
                node: ObservableNode::new(),
                compute: Box::new(compute),
                cached: RefCell::new(None),
                pending: Cell::new(None),
                dependencies,
                listener: Listener::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_dependency_changed();
                    }
                }),
                disposed: Cell::new(false),
                computations: Cell::new(0),
            }
        });

        for dependency in &inner.dependencies {
            dependency.add_listener(inner.listener.clone());
        }
        let initial = inner.evaluate();
        *inner.cached.borrow_mut() = Some(initial);

        tracing::trace!(
            node = ?inner.node.id(),
            dependencies = inner.dependencies.len(),
            "computed value created"
        );

        Self { inner }
    }

    /// Attach a diagnostic label
    pub fn with_label(self, label: impl Into<Cow<'static, str>>) -> Self {
        self.inner.node.set_label(label);
        self
    }

    /// The backing node's id
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Read the cached value, recording the access in the current session
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the cached value, recording the access in the current session.
    ///
    /// If `f` writes to a dependency, the recomputed value is stored and
    /// listeners are notified once `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if !self.inner.disposed.get() {
            tracker::report_access(self.inner.node.node_ref());
        }
        let cached = self.inner.cached.borrow();
        let result = match cached.as_ref() {
            Some(value) => {
                let result = f(value);
                drop(cached);
                result
            }
            None => {
                drop(cached);
                let value = self.inner.evaluate();
                let result = f(&value);
                self.inner.cached.borrow_mut().get_or_insert(value);
                result
            }
        };
        self.inner.apply_pending();
        result
    }

    /// The declared dependencies, in subscription order
    pub fn dependencies(&self) -> &[NodeRef] {
        &self.inner.dependencies
    }

    /// How many times the compute function has run
    pub fn computation_count(&self) -> u64 {
        self.inner.computations.get()
    }

    /// Register `callback` for change notifications
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.node.subscribe(callback)
    }

    /// Unsubscribe from every dependency and clear listeners. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the value has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T> ComputedInner<T> {
    fn evaluate(&self) -> T {
        self.computations.set(self.computations.get() + 1);
        tracker::untracked(|| (self.compute)())
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for dependency in &self.dependencies {
            dependency.remove_listener(&self.listener);
        }
        self.node.dispose();
        tracing::trace!(node = ?self.node.id(), "computed value disposed");
    }
}

impl<T: PartialEq> ComputedInner<T> {
    fn on_dependency_changed(&self) {
        if self.disposed.get() {
            return;
        }
        let next = self.evaluate();
        if self.cached.try_borrow_mut().is_err() {
            self.pending.set(Some(next));
            return;
        }
        self.store(next);
    }

    fn apply_pending(&self) {
        if let Some(next) = self.pending.take() {
            self.store(next);
        }
    }

    fn store(&self, next: T) {
        let changed = self.cached.borrow().as_ref() != Some(&next);
        if changed {
            *self.cached.borrow_mut() = Some(next);
            self.node.notify();
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Observable for ComputedValue<T> {
    fn node_ref(&self) -> NodeRef {
        self.inner.node.node_ref()
    }
}

impl<T: fmt::Debug> fmt::Debug for ComputedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedValue")
            .field("id", &self.inner.node.id())
            .field("cached", &*self.inner.cached.borrow())
            .field("dependencies", &self.inner.dependencies.len())
            .finish()
    }
}
