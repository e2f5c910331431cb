//! Deferred rebuilds
//!
//! A [`RebuildQueue`] collects invalidated observers and re-renders them
//! later on the same thread, when the host loop calls [`flush`](RebuildQueue::flush).
//! Many writes between two flushes cost one rebuild per observer.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tether_core::DeferredContent;

use crate::observer::{Observer, Rebuild};

/// Same-thread scheduler for observer rebuilds.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct RebuildQueue {
    pending: Rc<RefCell<Vec<Weak<dyn Rebuild>>>>,
}

impl RebuildQueue {
    /// An empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `observer`'s invalidations into this queue.
    ///
    /// Replaces any invalidation hook the observer had.
    pub fn schedule<R: DeferredContent + 'static>(&self, observer: &Observer<R>) {
        let target = observer.as_rebuild();
        let pending = Rc::downgrade(&self.pending);
        observer.on_invalidate(move || {
            if let Some(pending) = pending.upgrade() {
                pending.borrow_mut().push(target.clone());
            }
        });
    }

    /// Number of observers waiting for the next flush
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether nothing is waiting for a flush
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Rebuild every observer queued so far and return how many ran.
    ///
    /// Observers invalidated while flushing wait for the next flush.
    /// Dropped observers are skipped.
    pub fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        if batch.is_empty() {
            return 0;
        }

        let mut rebuilt = 0;
        for target in &batch {
            let Some(observer) = target.upgrade() else {
                continue;
            };
            if observer.is_dirty() {
                observer.rebuild();
                rebuilt += 1;
            }
        }

        tracing::debug!(
            queued = batch.len(),
            rebuilt,
            deferred = self.len(),
            "rebuild queue flushed"
        );
        rebuilt
    }
}

impl std::fmt::Debug for RebuildQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tether_core::ObservableValue;

    fn watching(value: &ObservableValue<i32>) -> Observer<i32> {
        let value = value.clone();
        Observer::new(move || value.get())
    }

    #[test]
    fn test_many_writes_one_rebuild() {
        let queue = RebuildQueue::new();
        let a = ObservableValue::new(0);
        let observer = watching(&a);
        queue.schedule(&observer);
        observer.rebuild();

        a.set(1);
        a.set(2);
        a.set(3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush(), 1);
        assert_eq!(observer.render_count(), 2);
        assert!(!observer.is_dirty());
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_flush_rebuilds_each_observer() {
        let queue = RebuildQueue::new();
        let a = ObservableValue::new(0);
        let first = watching(&a);
        let second = watching(&a);
        queue.schedule(&first);
        queue.schedule(&second);
        first.rebuild();
        second.rebuild();

        a.set(1);
        assert_eq!(queue.flush(), 2);
        assert_eq!(first.render_count(), 2);
        assert_eq!(second.render_count(), 2);
    }

    #[test]
    fn test_invalidation_during_flush_waits_for_next_flush() {
        let queue = RebuildQueue::new();
        let source = ObservableValue::new(0);
        let mirror = ObservableValue::new(0);

        // Copies `source` into `mirror` whenever it rebuilds.
        let writer = {
            let (source, mirror) = (source.clone(), mirror.clone());
            Observer::new(move || source.get())
                .with_sink(move |value| {
                    mirror.set(value);
                })
        };
        let reader = watching(&mirror);
        queue.schedule(&writer);
        queue.schedule(&reader);
        writer.rebuild();
        reader.rebuild();

        source.set(7);
        assert_eq!(queue.flush(), 1);
        assert!(reader.is_dirty());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.flush(), 1);
        assert_eq!(reader.render(), 7);
    }

    #[test]
    fn test_dropped_observer_is_skipped() {
        let queue = RebuildQueue::new();
        let a = ObservableValue::new(0);
        let observer = watching(&a);
        queue.schedule(&observer);
        observer.rebuild();

        a.set(1);
        assert_eq!(queue.len(), 1);
        drop(observer);
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_manual_render_before_flush() {
        let queue = RebuildQueue::new();
        let a = ObservableValue::new(0);
        let observer = watching(&a);
        queue.schedule(&observer);
        observer.rebuild();

        a.set(1);
        observer.render();
        assert_eq!(queue.flush(), 0);

        let renders = Rc::new(Cell::new(0));
        let renders_clone = renders.clone();
        let counted = {
            let a = a.clone();
            Observer::new(move || {
                renders_clone.set(renders_clone.get() + 1);
                a.get()
            })
        };
        queue.schedule(&counted);
        counted.rebuild();
        a.set(2);
        a.set(3);
        queue.flush();
        assert_eq!(renders.get(), 2);
    }
}
