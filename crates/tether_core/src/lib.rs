//! Tether Core Runtime
//!
//! This crate provides the reactive primitives for the Tether binding layer:
//!
//! - **Observable Nodes**: listener lists with snapshot, panic-tolerant notification
//! - **Observable Values**: mutable cells that notify only on real changes
//! - **Computed Values**: cached values derived from explicit dependencies
//! - **Dependency Tracking**: a session stack that records what a render pass reads
//!
//! All state is thread-local; see [`runtime`] for configuration, error
//! reporting and statistics.
//!
//! # Example
//!
//! ```rust
//! use tether_core::{tracker, ComputedValue, Observable, ObservableValue};
//!
//! let first = ObservableValue::new(String::from("Ada"));
//! let last = ObservableValue::new(String::from("Lovelace"));
//!
//! let full = {
//!     let deps = [first.node_ref(), last.node_ref()];
//!     let (first, last) = (first.clone(), last.clone());
//!     ComputedValue::new(move || format!("{} {}", first.get(), last.get()), deps)
//! };
//!
//! // A render pass reads the computed value and learns its dependencies.
//! let render = tracker::track(|| full.get());
//! assert_eq!(render.value, "Ada Lovelace");
//! assert!(render.accessed.contains(&full.node_ref()));
//! ```

pub mod computed;
pub mod config;
pub mod equality;
pub mod error;
pub mod node;
pub mod report;
pub mod runtime;
pub mod tracker;
pub mod value;

pub use computed::ComputedValue;
pub use config::{CoreConfig, DisposePolicy};
pub use equality::{DeepEq, Equality};
pub use error::{CoreError, Result};
pub use node::{Listener, NodeId, NodeRef, Observable, ObservableNode, Subscription};
pub use report::{ErrorReporter, TracingReporter};
pub use runtime::RuntimeStats;
pub use tracker::{AccessSet, DeferredContent, Tracked, TrackingSession};
pub use value::ObservableValue;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_scenario_value_notifications() {
        let value = ObservableValue::new(0);
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(-1));
        let (hits_clone, seen_clone, value_clone) = (hits.clone(), seen.clone(), value.clone());
        let _sub = value.subscribe(move || {
            hits_clone.set(hits_clone.get() + 1);
            seen_clone.set(value_clone.get());
        });

        value.set(0);
        assert_eq!(hits.get(), 0);
        value.set(1);
        assert_eq!(hits.get(), 1);
        value.set(1);
        assert_eq!(hits.get(), 1);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_scenario_computed_sum() {
        let a = ObservableValue::new(1);
        let b = ObservableValue::new(2);
        let sum = {
            let deps = [a.node_ref(), b.node_ref()];
            let (a, b) = (a.clone(), b.clone());
            ComputedValue::new(move || a.get() + b.get(), deps)
        };
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let _sub = sum.subscribe(move || hits_clone.set(hits_clone.get() + 1));

        assert_eq!(sum.get(), 3);
        a.set(1);
        assert_eq!(hits.get(), 0);
        assert_eq!(sum.get(), 3);
        a.set(5);
        assert_eq!(hits.get(), 1);
        assert_eq!(sum.get(), 7);
    }

    #[test]
    fn test_scenario_independent_tracking() {
        let a = ObservableValue::new(1);
        let b = ObservableValue::new(2);

        let first = tracker::track(|| a.get());
        assert_eq!(first.accessed.iter().copied().collect::<Vec<_>>(), vec![a.node_ref()]);

        let second = tracker::track(|| b.get());
        assert_eq!(second.accessed.iter().copied().collect::<Vec<_>>(), vec![b.node_ref()]);
    }

    #[test]
    fn test_tracking_sees_mixed_node_kinds() {
        let a = ObservableValue::new(2);
        let raw = ObservableNode::new();
        let squared = {
            let deps = [a.node_ref()];
            let a = a.clone();
            ComputedValue::new(move || a.get() * a.get(), deps)
        };

        let tracked = tracker::track(|| {
            tracker::report_access(raw.node_ref());
            squared.get() + a.get()
        });
        assert_eq!(tracked.value, 6);
        assert_eq!(tracked.accessed.len(), 3);
        assert_eq!(runtime::stats().session_depth, 0);
    }
}
