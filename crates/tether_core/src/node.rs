//! Observable nodes - the base change-notification primitive
//!
//! An [`ObservableNode`] owns an ordered list of [`Listener`]s stored in the
//! thread-local runtime. Notifying a node invokes a snapshot of that list,
//! so listeners may subscribe or unsubscribe while a notification is running
//! without disturbing delivery to the listeners already captured.
//!
//! A listener that panics is caught, reported through the installed
//! [`crate::report::ErrorReporter`], and does not stop its siblings.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tether_core::node::{Listener, ObservableNode};
//!
//! let node = ObservableNode::new();
//! let hits = Rc::new(Cell::new(0));
//! let hits_clone = hits.clone();
//! let listener = Listener::new(move || hits_clone.set(hits_clone.get() + 1));
//!
//! node.add_listener(listener.clone());
//! node.notify();
//! node.remove_listener(&listener);
//! node.notify();
//!
//! assert_eq!(hits.get(), 1);
//! ```

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::error::{panic_message, CoreError};
use crate::runtime::{self, with_runtime, NodeSlot};

new_key_type! {
    /// Unique identifier for an observable node
    pub struct NodeId;
}

/// A change callback registered on a node.
///
/// Cloning is cheap and preserves identity: [`ObservableNode::remove_listener`]
/// matches listeners by the identity of the shared closure, not by behaviour.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn()>);

impl Listener {
    /// Wrap a callback
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Listener(Rc::new(callback))
    }

    /// Whether both handles refer to the same callback
    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Anything backed by an observable node
pub trait Observable {
    /// A copyable reference to the backing node
    fn node_ref(&self) -> NodeRef;
}

/// An owned observable node.
///
/// Dropping the node disposes it. Types built on top of a node own one
/// privately and forward only the operations they want to expose.
pub struct ObservableNode {
    id: NodeId,
    disposed: Cell<bool>,
}

impl ObservableNode {
    /// Create a node with no listeners
    pub fn new() -> Self {
        let id = with_runtime(|rt| {
            rt.nodes.borrow_mut().insert(NodeSlot {
                listeners: SmallVec::new(),
                label: None,
            })
        });
        Self {
            id,
            disposed: Cell::new(false),
        }
    }

    /// Attach a diagnostic label, used in logs and error reports
    pub fn with_label(self, label: impl Into<Cow<'static, str>>) -> Self {
        self.set_label(label);
        self
    }

    /// Replace the diagnostic label
    pub fn set_label(&self, label: impl Into<Cow<'static, str>>) {
        with_runtime(|rt| {
            if let Some(slot) = rt.nodes.borrow_mut().get_mut(self.id) {
                slot.label = Some(label.into());
            }
        });
    }

    /// This node's id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// A copyable reference to this node
    pub fn node_ref(&self) -> NodeRef {
        NodeRef { id: self.id }
    }

    /// Append a listener. Duplicates are kept and each is invoked.
    pub fn add_listener(&self, listener: Listener) {
        add_listener(self.id, listener);
    }

    /// Remove the first occurrence of `listener`. Returns whether one was found.
    pub fn remove_listener(&self, listener: &Listener) -> bool {
        remove_listener(self.id, listener)
    }

    /// Register `callback` and return a guard that removes it on drop
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.node_ref().subscribe(callback)
    }

    /// Invoke a snapshot of the current listeners in insertion order.
    ///
    /// No-op once the node is disposed.
    pub fn notify(&self) {
        notify(self.id);
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        listener_count(self.id)
    }

    /// Clear all listeners and release the node. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let slot = runtime::try_with_runtime(|rt| rt.nodes.borrow_mut().remove(self.id)).flatten();
        if slot.is_some() {
            tracing::trace!(node = ?self.id, "node disposed");
        }
        // Listener closures may own handles whose drop re-enters the runtime.
        drop(slot);
    }

    /// Whether [`dispose`](Self::dispose) has been called on this handle
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Default for ObservableNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObservableNode {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Observable for ObservableNode {
    fn node_ref(&self) -> NodeRef {
        ObservableNode::node_ref(self)
    }
}

impl fmt::Debug for ObservableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableNode")
            .field("id", &self.id)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

/// A copyable, non-owning reference to a node.
///
/// This is what tracking sessions record. It can manage listeners but cannot
/// notify or dispose the node it points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    id: NodeId,
}

impl NodeRef {
    /// The referenced node's id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether the referenced node has not been disposed
    pub fn is_alive(&self) -> bool {
        runtime::try_with_runtime(|rt| rt.nodes.borrow().contains_key(self.id)).unwrap_or(false)
    }

    /// Append a listener to the referenced node
    pub fn add_listener(&self, listener: Listener) {
        add_listener(self.id, listener);
    }

    /// Remove the first occurrence of `listener`
    pub fn remove_listener(&self, listener: &Listener) -> bool {
        remove_listener(self.id, listener)
    }

    /// Register `callback` and return a guard that removes it on drop
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let listener = Listener::new(callback);
        self.add_listener(listener.clone());
        Subscription {
            node: *self,
            listener: Some(listener),
        }
    }

    /// Number of listeners on the referenced node
    pub fn listener_count(&self) -> usize {
        listener_count(self.id)
    }

    /// The referenced node's label, if any
    pub fn label(&self) -> Option<String> {
        with_runtime(|rt| {
            rt.nodes
                .borrow()
                .get(self.id)
                .and_then(|slot| slot.label.as_deref().map(str::to_owned))
        })
    }
}

impl Observable for NodeRef {
    fn node_ref(&self) -> NodeRef {
        *self
    }
}

/// Removes its listener when dropped
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    node: NodeRef,
    listener: Option<Listener>,
}

impl Subscription {
    /// The node this subscription listens to
    pub fn node(&self) -> NodeRef {
        self.node
    }

    /// Remove the listener now
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered for the node's lifetime
    pub fn detach(mut self) {
        self.listener = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            remove_listener(self.node.id, &listener);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("active", &self.listener.is_some())
            .finish()
    }
}

// =============================================================================
// Arena operations shared by ObservableNode and NodeRef
// =============================================================================

fn add_listener(id: NodeId, listener: Listener) {
    let added = with_runtime(|rt| match rt.nodes.borrow_mut().get_mut(id) {
        Some(slot) => {
            slot.listeners.push(listener);
            true
        }
        None => false,
    });
    if !added {
        runtime::dispose_violation(id, "add_listener");
    }
}

fn remove_listener(id: NodeId, listener: &Listener) -> bool {
    let removed = runtime::try_with_runtime(|rt| {
        let mut nodes = rt.nodes.borrow_mut();
        let slot = nodes.get_mut(id)?;
        let index = slot.listeners.iter().position(|l| l.ptr_eq(listener))?;
        Some(slot.listeners.remove(index))
    })
    .flatten();
    removed.is_some()
}

fn listener_count(id: NodeId) -> usize {
    with_runtime(|rt| {
        rt.nodes
            .borrow()
            .get(id)
            .map(|slot| slot.listeners.len())
            .unwrap_or(0)
    })
}

fn notify(id: NodeId) {
    let snapshot = with_runtime(|rt| {
        let nodes = rt.nodes.borrow();
        let slot = nodes.get(id)?;
        rt.record_notification();
        Some((slot.listeners.clone(), slot.label.clone()))
    });
    let Some((listeners, label)) = snapshot else {
        return;
    };

    tracing::trace!(node = ?id, label = label.as_deref(), listeners = listeners.len(), "notify");

    for listener in &listeners {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener.call())) {
            let error = CoreError::ListenerPanicked {
                node: id,
                message: panic_message(payload.as_ref()),
            };
            let context = match label.as_deref() {
                Some(label) => format!("notifying listeners of `{label}`"),
                None => "notifying listeners".to_string(),
            };
            runtime::report_error(&error, &context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoreConfig, DisposePolicy};
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Listener) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| {
            let log = log_clone.clone();
            Listener::new(move || log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_notify_in_insertion_order() {
        let node = ObservableNode::new();
        let (log, make) = recorder();
        node.add_listener(make("a"));
        node.add_listener(make("b"));
        node.add_listener(make("c"));

        node.notify();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicates_each_invoked_and_removed_one_at_a_time() {
        let node = ObservableNode::new();
        let (log, make) = recorder();
        let listener = make("dup");
        node.add_listener(listener.clone());
        node.add_listener(listener.clone());

        node.notify();
        assert_eq!(log.borrow().len(), 2);

        assert!(node.remove_listener(&listener));
        assert_eq!(node.listener_count(), 1);
        node.notify();
        assert_eq!(log.borrow().len(), 3);

        assert!(node.remove_listener(&listener));
        assert!(!node.remove_listener(&listener));
    }

    #[test]
    fn test_remove_matches_identity_not_behaviour() {
        let node = ObservableNode::new();
        let (_, make) = recorder();
        node.add_listener(make("x"));
        // Same behaviour, different closure.
        assert!(!node.remove_listener(&make("x")));
        assert_eq!(node.listener_count(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_siblings() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let reports_clone = reports.clone();
        runtime::set_error_reporter(move |error: &CoreError, context: &str| {
            reports_clone
                .borrow_mut()
                .push((error.to_string(), context.to_string()));
        });

        let node = ObservableNode::new().with_label("counter");
        let (log, make) = recorder();
        node.add_listener(make("before"));
        node.add_listener(Listener::new(|| panic!("listener failed")));
        node.add_listener(make("after"));

        node.notify();

        assert_eq!(*log.borrow(), vec!["before", "after"]);
        let reports = reports.borrow();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].0.contains("listener failed"));
        assert_eq!(reports[0].1, "notifying listeners of `counter`");
    }

    #[test]
    fn test_listener_removing_itself_during_notify() {
        let node = Rc::new(ObservableNode::new());
        let (log, make) = recorder();

        let slot: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let node_clone = node.clone();
        let self_removing = Listener::new(move || {
            if let Some(me) = slot_clone.borrow().as_ref() {
                node_clone.remove_listener(me);
            }
        });
        *slot.borrow_mut() = Some(self_removing.clone());

        node.add_listener(self_removing);
        node.add_listener(make("second"));

        node.notify();
        assert_eq!(*log.borrow(), vec!["second"]);
        assert_eq!(node.listener_count(), 1);

        node.notify();
        assert_eq!(*log.borrow(), vec!["second", "second"]);

        // Break the Rc cycle through the slot.
        slot.borrow_mut().take();
    }

    #[test]
    fn test_listener_added_during_notify_waits_for_next_round() {
        let node = Rc::new(ObservableNode::new());
        let (log, make) = recorder();
        let late = make("late");

        let node_clone = node.clone();
        let added = Rc::new(Cell::new(false));
        let added_clone = added.clone();
        node.add_listener(Listener::new(move || {
            if !added_clone.replace(true) {
                node_clone.add_listener(late.clone());
            }
        }));
        node.add_listener(make("early"));

        node.notify();
        assert_eq!(*log.borrow(), vec!["early"]);

        node.notify();
        assert_eq!(*log.borrow(), vec!["early", "early", "late"]);
    }

    #[test]
    fn test_dispose_is_idempotent_and_silences_notify() {
        let node = ObservableNode::new();
        let (log, make) = recorder();
        let listener = make("a");
        node.add_listener(listener.clone());

        node.dispose();
        node.dispose();
        assert!(node.is_disposed());
        assert_eq!(node.listener_count(), 0);
        assert!(!node.node_ref().is_alive());

        node.notify();
        assert!(log.borrow().is_empty());
        assert!(!node.remove_listener(&listener));
    }

    #[test]
    #[should_panic(expected = "add_listener called on disposed node")]
    fn test_add_listener_after_dispose_panics_under_panic_policy() {
        runtime::configure(CoreConfig::default().with_dispose_policy(DisposePolicy::Panic));
        let node = ObservableNode::new();
        node.dispose();
        node.add_listener(Listener::new(|| {}));
    }

    #[test]
    fn test_add_listener_after_dispose_reported_under_ignore_policy() {
        runtime::configure(CoreConfig::default().with_dispose_policy(DisposePolicy::Ignore));
        let reported = Rc::new(Cell::new(0));
        let reported_clone = reported.clone();
        runtime::set_error_reporter(move |error: &CoreError, _: &str| {
            assert!(matches!(error, CoreError::UseAfterDispose { .. }));
            reported_clone.set(reported_clone.get() + 1);
        });

        let node = ObservableNode::new();
        node.dispose();
        node.add_listener(Listener::new(|| {}));
        assert_eq!(reported.get(), 1);
        assert_eq!(node.listener_count(), 0);
    }

    #[test]
    fn test_subscription_guard() {
        let node = ObservableNode::new();
        let hits = Rc::new(Cell::new(0));

        let hits_clone = hits.clone();
        let subscription = node.subscribe(move || hits_clone.set(hits_clone.get() + 1));
        node.notify();
        subscription.unsubscribe();
        node.notify();
        assert_eq!(hits.get(), 1);

        let hits_clone = hits.clone();
        node.subscribe(move || hits_clone.set(hits_clone.get() + 1))
            .detach();
        node.notify();
        assert_eq!(hits.get(), 2);
        assert_eq!(node.listener_count(), 1);
    }

    #[test]
    fn test_drop_disposes() {
        let node = ObservableNode::new();
        let node_ref = node.node_ref();
        assert!(node_ref.is_alive());
        drop(node);
        assert!(!node_ref.is_alive());
    }

    #[test]
    fn test_labels() {
        let node = ObservableNode::new().with_label("title");
        assert_eq!(node.node_ref().label().as_deref(), Some("title"));
        node.set_label(format!("title#{}", 2));
        assert_eq!(node.node_ref().label().as_deref(), Some("title#2"));
    }
}
