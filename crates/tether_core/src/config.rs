//! Runtime configuration
//!
//! Configuration is installed per thread with [`crate::runtime::configure`].
//! It can be built in code or loaded from TOML:
//!
//! ```rust
//! use tether_core::config::{CoreConfig, DisposePolicy};
//!
//! let config = CoreConfig::from_toml_str(
//!     r#"
//!     dispose_policy = "ignore"
//!     max_session_depth = 16
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.dispose_policy, DisposePolicy::Ignore);
//! assert_eq!(config.max_session_depth, 16);
//! ```

use serde::Deserialize;

use crate::error::Result;

/// What happens when a disposed node is written to or subscribed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposePolicy {
    /// Panic at the call site
    Panic,
    /// Log a warning, report the error and skip the operation
    Ignore,
}

impl Default for DisposePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            DisposePolicy::Panic
        } else {
            DisposePolicy::Ignore
        }
    }
}

/// Per-thread runtime configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Policy for writes and subscriptions on disposed nodes
    pub dispose_policy: DisposePolicy,
    /// Session nesting depth above which a warning is logged
    pub max_session_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dispose_policy: DisposePolicy::default(),
            max_session_depth: 64,
        }
    }
}

impl CoreConfig {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Set the dispose policy
    pub fn with_dispose_policy(mut self, policy: DisposePolicy) -> Self {
        self.dispose_policy = policy;
        self
    }

    /// Set the nesting warning threshold
    pub fn with_max_session_depth(mut self, depth: usize) -> Self {
        self.max_session_depth = depth;
        self
    }
}
