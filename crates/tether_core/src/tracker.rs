//! Dependency tracking
//!
//! A stack of tracking sessions records which nodes are read while a render
//! or compute pass runs. Reads report themselves through [`report_access`];
//! only the session on top of the stack records them, so nested passes are
//! fully isolated from each other.
//!
//! ```rust
//! use tether_core::tracker;
//! use tether_core::ObservableValue;
//!
//! let a = ObservableValue::new(1);
//! let b = ObservableValue::new(2);
//!
//! let outer = tracker::track(|| {
//!     let x = a.get();
//!     let inner = tracker::track(|| b.get());
//!     assert_eq!(inner.accessed.len(), 1);
//!     x + a.get()
//! });
//!
//! assert_eq!(outer.value, 2);
//! assert_eq!(outer.accessed.len(), 1);
//! ```
//!
//! # Deferred callbacks
//!
//! Some render output contains callbacks that run after [`track`] has
//! returned, e.g. the item builder of a virtualized list. Such output
//! implements [`DeferredContent`]; [`track_with_context`] hands it the live
//! [`TrackingSession`], and callbacks wrapped with [`TrackingSession::wrap`]
//! re-enter that session whenever they run.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

use crate::node::NodeRef;
use crate::runtime::{try_with_runtime, with_runtime};

/// Nodes read during a session, deduplicated by identity
pub type AccessSet = IndexSet<NodeRef, FxBuildHasher>;

/// Result of a tracked call
#[derive(Debug)]
pub struct Tracked<R> {
    /// What the tracked function returned
    pub value: R,
    /// Nodes read while it ran
    pub accessed: AccessSet,
    /// Live session handle, for the context-retaining variants
    pub session: Option<TrackingSession>,
}

/// One activation of the tracker.
///
/// Cloning yields another handle to the same session. A session keeps
/// accepting reads for as long as any handle is used, including after the
/// call that created it has returned.
#[derive(Clone)]
pub struct TrackingSession {
    inner: Rc<SessionInner>,
}

struct SessionInner {
    id: u64,
    accessed: RefCell<AccessSet>,
}

impl TrackingSession {
    fn new() -> Self {
        let id = with_runtime(|rt| {
            let id = rt.next_session_id.get();
            rt.next_session_id.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(SessionInner {
                id,
                accessed: RefCell::new(AccessSet::default()),
            }),
        }
    }

    /// Session id, unique per thread until the runtime is reset
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Record a read directly on this session
    pub fn report(&self, node: NodeRef) {
        self.inner.accessed.borrow_mut().insert(node);
    }

    /// Snapshot of the nodes recorded so far
    pub fn accessed(&self) -> AccessSet {
        self.inner.accessed.borrow().clone()
    }

    /// Whether `node` has been recorded
    pub fn contains(&self, node: &NodeRef) -> bool {
        self.inner.accessed.borrow().contains(node)
    }

    /// Number of distinct nodes recorded
    pub fn len(&self) -> usize {
        self.inner.accessed.borrow().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.inner.accessed.borrow().is_empty()
    }

    /// Whether both handles refer to the same session
    pub fn ptr_eq(&self, other: &TrackingSession) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with this session on top of the stack.
    ///
    /// The session is popped again when `f` returns or unwinds.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = Frame::push(Some(self.clone()));
        f()
    }

    /// Wrap a deferred callback so every call re-enters this session
    pub fn wrap<A, R>(&self, f: impl Fn(A) -> R + 'static) -> impl Fn(A) -> R + 'static {
        let session = self.clone();
        move |arg| session.run(|| f(arg))
    }

    fn take_accessed(&self) -> AccessSet {
        self.inner.accessed.take()
    }
}

impl fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSession")
            .field("id", &self.inner.id)
            .field("accessed", &self.len())
            .finish()
    }
}

/// Render output that may run callbacks after tracking has returned.
///
/// `attach` receives the live session so those callbacks can be wrapped with
/// [`TrackingSession::wrap`]. The default implementation leaves the value
/// untouched, which is right for any output without deferred work.
pub trait DeferredContent: Sized {
    /// Bind deferred callbacks inside `self` to `session`
    fn attach(self, _session: &TrackingSession) -> Self {
        self
    }
}

macro_rules! impl_plain_content {
    ($($t:ty),* $(,)?) => {
        $(impl DeferredContent for $t {})*
    };
}

impl_plain_content!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
);

impl<T: DeferredContent> DeferredContent for Option<T> {
    fn attach(self, session: &TrackingSession) -> Self {
        self.map(|value| value.attach(session))
    }
}

impl<T: DeferredContent, E> DeferredContent for Result<T, E> {
    fn attach(self, session: &TrackingSession) -> Self {
        self.map(|value| value.attach(session))
    }
}

impl<T: DeferredContent> DeferredContent for Vec<T> {
    fn attach(self, session: &TrackingSession) -> Self {
        self.into_iter().map(|value| value.attach(session)).collect()
    }
}

impl<T: DeferredContent> DeferredContent for Box<T> {
    fn attach(self, session: &TrackingSession) -> Self {
        Box::new((*self).attach(session))
    }
}

impl<A: DeferredContent, B: DeferredContent> DeferredContent for (A, B) {
    fn attach(self, session: &TrackingSession) -> Self {
        (self.0.attach(session), self.1.attach(session))
    }
}

/// A pushed stack frame, popped on drop so unwinding never leaks a session
struct Frame;

impl Frame {
    fn push(session: Option<TrackingSession>) -> Frame {
        with_runtime(|rt| {
            let mut sessions = rt.sessions.borrow_mut();
            match &session {
                Some(session) => tracing::trace!(
                    session = session.id(),
                    depth = sessions.len() + 1,
                    "tracking session pushed"
                ),
                None => tracing::trace!(depth = sessions.len() + 1, "tracking suspended"),
            }
            rt.tracking.set(session.is_some());
            sessions.push(session);

            let max = rt.max_session_depth();
            if sessions.len() > max {
                tracing::warn!(
                    depth = sessions.len(),
                    max,
                    "tracking sessions nested deeper than configured maximum"
                );
            }
        });
        Frame
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let popped = try_with_runtime(|rt| {
            let mut sessions = rt.sessions.borrow_mut();
            let popped = sessions.pop();
            rt.tracking
                .set(matches!(sessions.last(), Some(Some(_))));
            tracing::trace!(depth = sessions.len(), "tracking frame popped");
            popped
        });
        drop(popped);
    }
}

/// Whether reads are currently being recorded. O(1).
pub fn is_tracking() -> bool {
    with_runtime(|rt| rt.tracking.get())
}

/// Current stack depth, suspended frames included
pub fn depth() -> usize {
    with_runtime(|rt| rt.sessions.borrow().len())
}

/// Record that `node` was read. No-op when nothing is tracking.
pub fn report_access(node: NodeRef) {
    with_runtime(|rt| {
        if !rt.tracking.get() {
            return;
        }
        if let Some(Some(session)) = rt.sessions.borrow().last() {
            session.report(node);
        }
    });
}

/// Snapshot of the current session's reads, or an empty set when untracked
pub fn capture_accessed() -> AccessSet {
    current_session()
        .map(|session| session.accessed())
        .unwrap_or_default()
}

/// Handle to the session on top of the stack, if any
pub fn current_session() -> Option<TrackingSession> {
    with_runtime(|rt| rt.sessions.borrow().last().cloned().flatten())
}

/// Run `f` in a fresh session and return what it read.
///
/// The session is popped even if `f` panics; the panic propagates unchanged.
/// Fallible work should return a `Result` instead, which keeps the accessed
/// set available alongside the error.
pub fn track<R>(f: impl FnOnce() -> R) -> Tracked<R> {
    let session = TrackingSession::new();
    let value = session.run(f);
    Tracked {
        value,
        accessed: session.take_accessed(),
        session: None,
    }
}

/// Like [`track`], but keeps the session alive and attaches it to the result
/// so deferred callbacks inside it keep recording into the same set.
pub fn track_with_context<R: DeferredContent>(f: impl FnOnce() -> R) -> Tracked<R> {
    let session = TrackingSession::new();
    let value = session.run(f).attach(&session);
    Tracked {
        value,
        accessed: session.accessed(),
        session: Some(session),
    }
}

/// Like [`track`], but returns the live session without attaching it
pub fn track_retained<R>(f: impl FnOnce() -> R) -> Tracked<R> {
    let session = TrackingSession::new();
    let value = session.run(f);
    Tracked {
        value,
        accessed: session.accessed(),
        session: Some(session),
    }
}

/// Run `f` with tracking suspended; its reads are attributed to nobody
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = Frame::push(None);
    f()
}

/// Drop every frame on the current thread's stack. For test isolation.
pub fn reset() {
    let sessions = with_runtime(|rt| {
        rt.tracking.set(false);
        std::mem::take(&mut *rt.sessions.borrow_mut())
    });
    drop(sessions);
}
