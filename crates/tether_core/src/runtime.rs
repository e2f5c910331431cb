//! Thread-local reactive runtime
//!
//! Owns every piece of shared mutable state the core needs: the node arena
//! holding listener lists, the tracking-session stack, the active
//! configuration and the error reporter. Each thread gets its own runtime,
//! so nothing here is locked.
//!
//! No `RefCell` borrow taken here is ever held while user code runs.
//! Listeners, compute functions and tracked closures are always invoked after
//! the relevant borrow has been released, which keeps re-entrant use safe.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::config::{CoreConfig, DisposePolicy};
use crate::error::CoreError;
use crate::node::{Listener, NodeId};
use crate::report::{ErrorReporter, TracingReporter};
use crate::tracker::TrackingSession;

/// Internal node storage
pub(crate) struct NodeSlot {
    /// Listeners in notification order
    pub(crate) listeners: SmallVec<[Listener; 4]>,
    /// Optional diagnostic label
    pub(crate) label: Option<Cow<'static, str>>,
}

/// Per-thread runtime state
pub(crate) struct Runtime {
    pub(crate) nodes: RefCell<SlotMap<NodeId, NodeSlot>>,
    /// Session stack; `None` frames suspend tracking (see `tracker::untracked`)
    pub(crate) sessions: RefCell<Vec<Option<TrackingSession>>>,
    /// True iff the top frame is a live session
    pub(crate) tracking: Cell<bool>,
    pub(crate) next_session_id: Cell<u64>,
    config: RefCell<CoreConfig>,
    reporter: RefCell<Rc<dyn ErrorReporter>>,
    notifications: Cell<u64>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            nodes: RefCell::new(SlotMap::with_key()),
            sessions: RefCell::new(Vec::new()),
            tracking: Cell::new(false),
            next_session_id: Cell::new(0),
            config: RefCell::new(CoreConfig::default()),
            reporter: RefCell::new(Rc::new(TracingReporter)),
            notifications: Cell::new(0),
        }
    }

    pub(crate) fn max_session_depth(&self) -> usize {
        self.config.borrow().max_session_depth
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.set(self.notifications.get() + 1);
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Run `f` against this thread's runtime
pub(crate) fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

/// Like [`with_runtime`], but returns `None` once the runtime has been torn
/// down at thread exit. Used on drop paths.
pub(crate) fn try_with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
    RUNTIME.try_with(f).ok()
}

/// Install a configuration for the current thread
pub fn configure(config: CoreConfig) {
    with_runtime(|rt| {
        tracing::debug!(?config, "runtime configured");
        *rt.config.borrow_mut() = config;
    });
}

/// The configuration active on the current thread
pub fn config() -> CoreConfig {
    with_runtime(|rt| rt.config.borrow().clone())
}

/// Install the error reporter for the current thread
pub fn set_error_reporter(reporter: impl ErrorReporter + 'static) {
    with_runtime(|rt| {
        *rt.reporter.borrow_mut() = Rc::new(reporter);
    });
}

/// Hand an error to the installed reporter
pub fn report_error(error: &CoreError, context: &str) {
    let reporter = try_with_runtime(|rt| Rc::clone(&rt.reporter.borrow()));
    match reporter {
        Some(reporter) => reporter.report(error, context),
        None => TracingReporter.report(error, context),
    }
}

/// Apply the configured [`DisposePolicy`] to an operation on a disposed node.
///
/// Types built on top of nodes call this when they are used after disposal.
pub fn dispose_violation(node: NodeId, operation: &'static str) {
    let error = CoreError::UseAfterDispose { node, operation };
    match config().dispose_policy {
        DisposePolicy::Panic => panic!("{error}"),
        DisposePolicy::Ignore => {
            tracing::warn!(?node, operation, "ignoring operation on disposed node");
            report_error(&error, operation);
        }
    }
}

/// Clear all runtime state on the current thread.
///
/// Existing handles become stale: their nodes are gone, so notifications are
/// dropped and disposal is a no-op. The arena is drained rather than replaced
/// so slot versions keep advancing and a stale id never matches a new node.
/// Intended for test isolation.
pub fn reset() {
    let (nodes, sessions) = with_runtime(|rt| {
        let nodes: Vec<_> = rt.nodes.borrow_mut().drain().collect();
        let sessions = std::mem::take(&mut *rt.sessions.borrow_mut());
        rt.tracking.set(false);
        rt.next_session_id.set(0);
        rt.notifications.set(0);
        *rt.config.borrow_mut() = CoreConfig::default();
        *rt.reporter.borrow_mut() = Rc::new(TracingReporter);
        (nodes, sessions)
    });
    // Listener closures may own handles whose drop re-enters the runtime.
    drop(nodes);
    drop(sessions);
    tracing::debug!("runtime reset");
}

/// Get statistics about the current thread's runtime
pub fn stats() -> RuntimeStats {
    with_runtime(|rt| {
        let nodes = rt.nodes.borrow();
        RuntimeStats {
            node_count: nodes.len(),
            listener_count: nodes.values().map(|slot| slot.listeners.len()).sum(),
            session_depth: rt.sessions.borrow().len(),
            notifications: rt.notifications.get(),
        }
    })
}

/// Statistics about the reactive runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Live (undisposed) nodes
    pub node_count: usize,
    /// Listeners registered across all live nodes
    pub listener_count: usize,
    /// Current tracking stack depth, suspended frames included
    pub session_depth: usize,
    /// Notifications issued on live nodes since the last reset
    pub notifications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Observable, ObservableNode};
    use crate::value::ObservableValue;

    #[test]
    fn test_stats_track_nodes_and_listeners() {
        let a = ObservableNode::new();
        let b = ObservableNode::new();
        a.add_listener(Listener::new(|| {}));
        a.add_listener(Listener::new(|| {}));
        b.add_listener(Listener::new(|| {}));

        let stats = stats();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.listener_count, 3);
        assert_eq!(stats.session_depth, 0);

        a.notify();
        b.dispose();
        let stats = super::stats();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.listener_count, 2);
        assert_eq!(stats.notifications, 1);
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let value = ObservableValue::new(1);
        let _sub = value.subscribe(|| panic!("should not run after reset"));

        reset();
        assert_eq!(stats().node_count, 0);

        // The node is gone, so the write stores the value but reaches nobody.
        assert!(value.set(2));
        assert_eq!(value.get(), 2);
        assert_eq!(stats().notifications, 0);
    }

    #[test]
    fn test_stale_handle_never_aliases_new_node() {
        let stale = ObservableValue::new(0);
        reset();

        let fresh = ObservableValue::new(0);
        assert_ne!(stale.id(), fresh.id());

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let _sub = fresh.subscribe(move || hits_clone.set(hits_clone.get() + 1));

        stale.set(1);
        assert_eq!(hits.get(), 0);

        drop(stale);
        assert!(fresh.node_ref().is_alive());
        fresh.set(1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_report_error_uses_installed_reporter() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        set_error_reporter(move |_: &CoreError, context: &str| {
            assert_eq!(context, "ctx");
            seen_clone.set(seen_clone.get() + 1);
        });

        report_error(
            &CoreError::UseAfterDispose {
                node: NodeId::default(),
                operation: "set",
            },
            "ctx",
        );
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_configure_round_trips() {
        let config = CoreConfig::default().with_max_session_depth(2);
        configure(config.clone());
        assert_eq!(super::config(), config);
    }
}
