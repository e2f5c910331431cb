//! Synchronous commands
//!
//! A [`RelayCommandWithParam<P>`] pairs an action with an optional permission
//! predicate. [`RelayCommand`] is the same thing with no parameter.
//!
//! ```rust
//! use tether_command::RelayCommand;
//! use tether_core::ObservableValue;
//!
//! let enabled = ObservableValue::new(false);
//! let save = {
//!     let enabled = enabled.clone();
//!     RelayCommand::new(|| Ok(())).with_can_execute(move || enabled.get())
//! };
//!
//! assert!(!save.can_execute());
//! enabled.set(true);
//! assert!(save.can_execute());
//! save.execute().unwrap();
//! ```

use std::borrow::Cow;
use std::rc::Rc;

use tether_core::{runtime, tracker, NodeId, NodeRef, Observable, Subscription};

use crate::state::CommandState;

type Action<P> = Box<dyn Fn(P) -> anyhow::Result<()>>;

/// A synchronous command taking a parameter.
///
/// Cloning yields another handle to the same command.
pub struct RelayCommandWithParam<P> {
    inner: Rc<RelayInner<P>>,
}

struct RelayInner<P> {
    state: CommandState<P>,
    action: Action<P>,
}

impl<P> Clone for RelayCommandWithParam<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: 'static> RelayCommandWithParam<P> {
    /// Create an always-permitted command running `action`
    pub fn new(action: impl Fn(P) -> anyhow::Result<()> + 'static) -> Self {
        Self {
            inner: Rc::new(RelayInner {
                state: CommandState::new(),
                action: Box::new(action),
            }),
        }
    }

    /// Gate execution on `predicate`
    pub fn with_can_execute(self, predicate: impl Fn(&P) -> bool + 'static) -> Self {
        self.inner.state.set_can_execute(predicate);
        self
    }

    /// Deliver action failures to `handler` instead of returning them
    pub fn with_error_handler(self, handler: impl Fn(&anyhow::Error) + 'static) -> Self {
        self.inner.state.set_error_handler(handler);
        self
    }

    /// Attach a diagnostic label
    pub fn with_label(self, label: impl Into<Cow<'static, str>>) -> Self {
        self.inner.state.set_label(label);
        self
    }

    /// The backing node's id
    pub fn id(&self) -> NodeId {
        self.inner.state.id()
    }

    /// Whether `param` would be accepted. Records a read of this command.
    pub fn can_execute(&self, param: &P) -> bool {
        self.inner.state.can_execute(param)
    }

    /// Run the action if permitted.
    ///
    /// A rejected call is a silent no-op. A failure goes to the error handler
    /// when one is set, otherwise it is returned. Neither the predicate nor
    /// the action reports reads to the caller's session.
    pub fn execute(&self, param: P) -> anyhow::Result<()> {
        let state = &self.inner.state;
        if state.is_disposed() {
            runtime::dispose_violation(state.id(), "execute");
            return Ok(());
        }
        if !state.permitted(&param) {
            tracing::debug!(command = ?state.id(), "execute rejected");
            return Ok(());
        }
        match tracker::untracked(|| (self.inner.action)(param)) {
            Ok(()) => Ok(()),
            Err(error) => state.fail(error),
        }
    }

    /// Tell observers that permission may have changed
    pub fn notify_can_execute_changed(&self) {
        self.inner.state.notify();
    }

    /// Register `callback` for permission change notifications
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.state.subscribe(callback)
    }

    /// Clear all listeners. Idempotent.
    pub fn dispose(&self) {
        self.inner.state.dispose();
    }

    /// Whether the command has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.state.is_disposed()
    }
}

impl<P> Observable for RelayCommandWithParam<P> {
    fn node_ref(&self) -> NodeRef {
        self.inner.state.node_ref()
    }
}

/// A synchronous command with no parameter
#[derive(Clone)]
pub struct RelayCommand {
    command: RelayCommandWithParam<()>,
}

impl RelayCommand {
    /// Create an always-permitted command running `action`
    pub fn new(action: impl Fn() -> anyhow::Result<()> + 'static) -> Self {
        Self {
            command: RelayCommandWithParam::new(move |()| action()),
        }
    }

    /// Gate execution on `predicate`
    pub fn with_can_execute(self, predicate: impl Fn() -> bool + 'static) -> Self {
        Self {
            command: self.command.with_can_execute(move |_: &()| predicate()),
        }
    }

    /// Deliver action failures to `handler` instead of returning them
    pub fn with_error_handler(self, handler: impl Fn(&anyhow::Error) + 'static) -> Self {
        Self {
            command: self.command.with_error_handler(handler),
        }
    }

    /// Attach a diagnostic label
    pub fn with_label(self, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            command: self.command.with_label(label),
        }
    }

    /// The backing node's id
    pub fn id(&self) -> NodeId {
        self.command.id()
    }

    /// Whether the command would run. Records a read of this command.
    pub fn can_execute(&self) -> bool {
        self.command.can_execute(&())
    }

    /// Run the action if permitted
    pub fn execute(&self) -> anyhow::Result<()> {
        self.command.execute(())
    }

    /// Tell observers that permission may have changed
    pub fn notify_can_execute_changed(&self) {
        self.command.notify_can_execute_changed();
    }

    /// Register `callback` for change notifications
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.command.subscribe(callback)
    }

    /// Clear all listeners. Idempotent.
    pub fn dispose(&self) {
        self.command.dispose();
    }

    /// Whether the command has been disposed
    pub fn is_disposed(&self) -> bool {
        self.command.is_disposed()
    }
}

impl Observable for RelayCommand {
    fn node_ref(&self) -> NodeRef {
        self.command.node_ref()
    }
}
