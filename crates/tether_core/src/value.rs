//! Observable values
//!
//! [`ObservableValue<T>`] is a mutable cell that reports reads to the
//! dependency tracker and notifies its listeners only when a write actually
//! changes the value, as judged by its [`Equality`] strategy.
//!
//! ```rust
//! use tether_core::ObservableValue;
//!
//! let count = ObservableValue::new(0);
//! let _sub = count.subscribe(|| println!("changed"));
//!
//! assert!(!count.set(0)); // equal, no notification
//! assert!(count.set(1));
//! count.update(|n| n + 1);
//! assert_eq!(count.get(), 2);
//! ```

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::equality::{DeepEq, Equality};
use crate::node::{NodeId, NodeRef, Observable, ObservableNode, Subscription};
use crate::runtime;
use crate::tracker;

/// A mutable, equality-gated, trackable value.
///
/// Cloning yields another handle to the same value. The backing node is
/// disposed when the last handle is dropped or [`dispose`](Self::dispose) is
/// called.
pub struct ObservableValue<T> {
    inner: Rc<ValueInner<T>>,
}

struct ValueInner<T> {
    node: ObservableNode,
    value: RefCell<T>,
    equality: Equality<T>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: PartialEq + 'static> ObservableValue<T> {
    /// Create a value compared with `PartialEq`
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, Equality::partial_eq())
    }
}

impl<T: DeepEq + 'static> ObservableValue<T> {
    /// Create a value compared structurally with [`DeepEq`]
    pub fn deep(initial: T) -> Self {
        Self::with_equality(initial, Equality::deep())
    }
}

impl<T: 'static> ObservableValue<T> {
    /// Create a value with an explicit equality strategy
    pub fn with_equality(initial: T, equality: Equality<T>) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                node: ObservableNode::new(),
                value: RefCell::new(initial),
                equality,
            }),
        }
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

    /// Read the value, recording the access in the current session
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the value, recording the access in the current session.
    ///
    /// `f` must not write to this same value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.report_read();
        f(&self.inner.value.borrow())
    }

    /// Read the value without recording the access
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Write a value. Notifies and returns `true` only if it differs from
    /// the current one.
    pub fn set(&self, value: T) -> bool {
        if self.inner.node.is_disposed() {
            runtime::dispose_violation(self.id(), "set");
            return false;
        }

        let equal = self
            .inner
            .equality
            .is_equal(&self.inner.value.borrow(), &value);
        if equal {
            tracing::trace!(node = ?self.id(), "write skipped, value unchanged");
            return false;
        }

        let previous = self.inner.value.replace(value);
        drop(previous);
        self.inner.node.notify();
        true
    }

    /// Derive the next value from the current one, then [`set`](Self::set) it.
    ///
    /// `f` must not write to this same value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        if self.inner.node.is_disposed() {
            runtime::dispose_violation(self.id(), "update");
            return false;
        }
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Register `callback` for change notifications
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.node.subscribe(callback)
    }

    /// Clear all listeners. The last value stays readable.
    pub fn dispose(&self) {
        self.inner.node.dispose();
    }

    /// Whether the value has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.node.is_disposed()
    }

    fn report_read(&self) {
        if !self.inner.node.is_disposed() {
            tracker::report_access(self.inner.node.node_ref());
        }
    }
}

impl<T> Observable for ObservableValue<T> {
    fn node_ref(&self) -> NodeRef {
        self.inner.node.node_ref()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableValue")
            .field("id", &self.inner.node.id())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}
