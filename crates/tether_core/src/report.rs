//! Error reporting hook
//!
//! The core never decides how errors are shown. Listener panics and
//! use-after-dispose violations are handed to the [`ErrorReporter`] installed
//! on the current thread (see [`crate::runtime::set_error_reporter`]). The
//! default reporter logs through `tracing`.

use crate::error::CoreError;

/// Receives errors the core cannot propagate to a caller
pub trait ErrorReporter {
    /// Report `error`; `context` describes where it happened
    fn report(&self, error: &CoreError, context: &str);
}

impl<F> ErrorReporter for F
where
    F: Fn(&CoreError, &str),
{
    fn report(&self, error: &CoreError, context: &str) {
        self(error, context)
    }
}

/// Reporter that logs each error at `error` level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &CoreError, context: &str) {
        tracing::error!(%context, "{}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_closure_reporter() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let reporter = move |error: &CoreError, context: &str| {
            seen_clone
                .borrow_mut()
                .push(format!("{context}: {error}"));
        };

        reporter.report(
            &CoreError::ListenerPanicked {
                node: NodeId::default(),
                message: "boom".into(),
            },
            "notify",
        );

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("notify: listener of node"));
        assert!(seen[0].ends_with("boom"));
    }

    #[test]
    fn test_tracing_reporter_does_not_panic() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        TracingReporter.report(
            &CoreError::UseAfterDispose {
                node: NodeId::default(),
                operation: "set",
            },
            "test",
        );
    }
}
