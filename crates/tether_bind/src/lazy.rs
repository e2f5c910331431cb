//! Virtualized item builders
//!
//! A [`LazyList`] describes `len` items without building them. Items are
//! produced on demand, typically as they scroll into view, long after the
//! render that returned the list has finished.
//!
//! When a list comes out of a context-retaining render it is rebound to that
//! render's session, so whatever an item builder reads is attributed to the
//! render that produced the list.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use tether_core::{DeferredContent, TrackingSession};

/// A fixed-length list whose items are built on demand
pub struct LazyList<T> {
    len: usize,
    builder: Rc<dyn Fn(usize) -> T>,
}

impl<T> Clone for LazyList<T> {
    fn clone(&self) -> Self {
        Self {
            len: self.len,
            builder: Rc::clone(&self.builder),
        }
    }
}

impl<T: 'static> LazyList<T> {
    /// A list of `len` items produced by `builder`
    pub fn new(len: usize, builder: impl Fn(usize) -> T + 'static) -> Self {
        Self {
            len,
            builder: Rc::new(builder),
        }
    }

    /// Number of items, built or not
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list has no items
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Build the item at `index`, or `None` past the end
    pub fn build(&self, index: usize) -> Option<T> {
        (index < self.len).then(|| (self.builder)(index))
    }

    /// Build the visible window `range`, clamped to the list
    pub fn build_range(&self, range: Range<usize>) -> Vec<T> {
        let end = range.end.min(self.len);
        (range.start.min(end)..end)
            .map(|index| (self.builder)(index))
            .collect()
    }
}

impl<T: 'static> DeferredContent for LazyList<T> {
    fn attach(self, session: &TrackingSession) -> Self {
        let builder = self.builder;
        tracing::trace!(session = session.id(), len = self.len, "lazy list bound to session");
        Self {
            len: self.len,
            builder: Rc::new(session.wrap(move |index| builder(index))),
        }
    }
}

impl<T> fmt::Debug for LazyList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyList").field("len", &self.len).finish()
    }
}
