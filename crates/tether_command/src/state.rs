//! State shared by every command flavour

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_core::{tracker, NodeId, NodeRef, ObservableNode, Subscription};

/// Receives action failures instead of the caller
pub type ErrorHandler = Rc<dyn Fn(&anyhow::Error)>;

/// Permission predicate
type Predicate<P> = Box<dyn Fn(&P) -> bool>;

/// Node, permission and run state for one command
pub(crate) struct CommandState<P> {
    node: ObservableNode,
    can_execute: RefCell<Option<Predicate<P>>>,
    on_error: RefCell<Option<ErrorHandler>>,
    running: Cell<bool>,
}

impl<P> CommandState<P> {
    pub(crate) fn new() -> Self {
        Self {
            node: ObservableNode::new(),
            can_execute: RefCell::new(None),
            on_error: RefCell::new(None),
            running: Cell::new(false),
        }
    }

    pub(crate) fn set_can_execute(&self, predicate: impl Fn(&P) -> bool + 'static) {
        *self.can_execute.borrow_mut() = Some(Box::new(predicate));
    }

    pub(crate) fn set_error_handler(&self, handler: impl Fn(&anyhow::Error) + 'static) {
        *self.on_error.borrow_mut() = Some(Rc::new(handler));
    }

    pub(crate) fn set_label(&self, label: impl Into<Cow<'static, str>>) {
        self.node.set_label(label);
    }

    pub(crate) fn id(&self) -> NodeId {
        self.node.id()
    }

    pub(crate) fn node_ref(&self) -> NodeRef {
        self.node.node_ref()
    }

    /// Permission check for `execute`. Nothing it reads is recorded.
    pub(crate) fn permitted(&self, param: &P) -> bool {
        tracker::untracked(|| self.allowed(param))
    }

    /// Tracked permission check: records the command and the predicate's reads
    pub(crate) fn can_execute(&self, param: &P) -> bool {
        self.report_read();
        self.allowed(param)
    }

    /// The predicate is evaluated even while running so the reads it makes
    /// stay part of the caller's session.
    fn allowed(&self, param: &P) -> bool {
        let allowed = self
            .can_execute
            .borrow()
            .as_ref()
            .map_or(true, |predicate| predicate(param));
        allowed && !self.running.get()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.report_read();
        self.running.get()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.set(running);
        self.node.notify();
    }

    /// Route an action failure to the handler, or back to the caller
    pub(crate) fn fail(&self, error: anyhow::Error) -> anyhow::Result<()> {
        let handler = self.on_error.borrow().clone();
        match handler {
            Some(handler) => {
                tracing::debug!(command = ?self.id(), %error, "command failure handled");
                handler(&error);
                Ok(())
            }
            None => Err(error),
        }
    }

    pub(crate) fn notify(&self) {
        self.node.notify();
    }

    pub(crate) fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.node.subscribe(callback)
    }

    pub(crate) fn dispose(&self) {
        self.node.dispose();
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.node.is_disposed()
    }

    fn report_read(&self) {
        if !self.node.is_disposed() {
            tracker::report_access(self.node.node_ref());
        }
    }
}
