//! Asynchronous commands
//!
//! An async command is not executable while a previous run is in flight.
//! Starting and finishing a run both notify the command's listeners, so a
//! bound button sees `can_execute` flip to `false` and back.
//!
//! The running flag is cleared before the outcome is handled: an error
//! handler, or a caller receiving the error, always observes an idle command.

use std::borrow::Cow;
use std::future::Future;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};
use tether_core::{runtime, tracker, NodeId, NodeRef, Observable, Subscription};

use crate::state::CommandState;

type AsyncAction<P> = Box<dyn Fn(P) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// An asynchronous command taking a parameter.
///
/// Cloning yields another handle to the same command.
pub struct AsyncRelayCommandWithParam<P> {
    inner: Rc<AsyncInner<P>>,
}

struct AsyncInner<P> {
    state: CommandState<P>,
    action: AsyncAction<P>,
}

impl<P> Clone for AsyncRelayCommandWithParam<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Clears the running flag when a run ends, including by cancellation or panic
struct RunningGuard<'a, P> {
    state: &'a CommandState<P>,
}

impl<'a, P> RunningGuard<'a, P> {
    fn start(state: &'a CommandState<P>) -> Self {
        state.set_running(true);
        tracing::debug!(command = ?state.id(), "command started");
        Self { state }
    }
}

impl<P> Drop for RunningGuard<'_, P> {
    fn drop(&mut self) {
        self.state.set_running(false);
        tracing::debug!(command = ?self.state.id(), "command finished");
    }
}

impl<P: 'static> AsyncRelayCommandWithParam<P> {
    /// Create an always-permitted command running `action`
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(P) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self {
            inner: Rc::new(AsyncInner {
                state: CommandState::new(),
                action: Box::new(move |param| action(param).boxed_local()),
            }),
        }
    }

    /// Gate execution on `predicate`, in addition to not running
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

    /// Whether `param` would be accepted now. `false` while a run is in
    /// flight. Records a read of this command.
    pub fn can_execute(&self, param: &P) -> bool {
        self.inner.state.can_execute(param)
    }

    /// Whether a run is in flight. Records a read of this command.
    pub fn is_running(&self) -> bool {
        self.inner.state.is_running()
    }

    /// Run the action if permitted.
    ///
    /// Permission is checked and the running flag raised on the first poll,
    /// with no suspension point between them, so overlapping calls never
    /// start a second run. The predicate and every poll of the action run
    /// untracked, whatever session the caller polls from.
    pub async fn execute(&self, param: P) -> anyhow::Result<()> {
        let state = &self.inner.state;
        if state.is_disposed() {
            runtime::dispose_violation(state.id(), "execute");
            return Ok(());
        }
        if !state.permitted(&param) {
            tracing::debug!(command = ?state.id(), "execute rejected");
            return Ok(());
        }

        let guard = RunningGuard::start(state);
        let mut action = tracker::untracked(|| (self.inner.action)(param));
        let result = future::poll_fn(|cx| tracker::untracked(|| action.as_mut().poll(cx))).await;
        drop(guard);

        match result {
            Ok(()) => Ok(()),
            Err(error) => state.fail(error),
        }
    }

    /// Tell observers that permission may have changed
    pub fn notify_can_execute_changed(&self) {
        self.inner.state.notify();
    }

    /// Register `callback` for permission and running-state notifications
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

impl<P> Observable for AsyncRelayCommandWithParam<P> {
    fn node_ref(&self) -> NodeRef {
        self.inner.state.node_ref()
    }
}

/// An asynchronous command with no parameter
#[derive(Clone)]
pub struct AsyncRelayCommand {
    command: AsyncRelayCommandWithParam<()>,
}

impl AsyncRelayCommand {
    /// Create an always-permitted command running `action`
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self {
            command: AsyncRelayCommandWithParam::new(move |()| action()),
        }
    }

    /// Gate execution on `predicate`, in addition to not running
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

    /// Whether the command would run now. `false` while a run is in flight.
    /// Records a read of this command.
    pub fn can_execute(&self) -> bool {
        self.command.can_execute(&())
    }

    /// Whether a run is in flight. Records a read of this command.
    pub fn is_running(&self) -> bool {
        self.command.is_running()
    }

    /// Run the action if permitted
    pub async fn execute(&self) -> anyhow::Result<()> {
        self.command.execute(()).await
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

impl Observable for AsyncRelayCommand {
    fn node_ref(&self) -> NodeRef {
        self.command.node_ref()
    }
}
