//! Tether Bindings
//!
//! The consumer side of the reactive core: render closures that subscribe to
//! exactly the nodes they read and get rebuilt when any of them change.
//!
//! - [`Observer`]: runs a render under tracking and diffs its subscriptions
//! - [`LazyList`]: item builders that keep reporting reads after the render
//! - [`RebuildQueue`]: batches invalidated observers until the next flush
//!
//! # Example
//!
//! ```rust
//! use tether_bind::{Observer, RebuildQueue};
//! use tether_core::ObservableValue;
//!
//! let name = ObservableValue::new(String::from("world"));
//! let queue = RebuildQueue::new();
//!
//! let label = {
//!     let name = name.clone();
//!     Observer::new(move || format!("hello, {}", name.get()))
//!         .with_sink(|text| println!("{text}"))
//! };
//! queue.schedule(&label);
//! label.rebuild();
//!
//! name.set(String::from("tether"));
//! assert_eq!(queue.flush(), 1);
//! ```

pub mod lazy;
pub mod observer;
pub mod queue;

pub use lazy::LazyList;
pub use observer::Observer;
pub use queue::RebuildQueue;
