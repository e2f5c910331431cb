//! Tether Commands
//!
//! Observable action objects for binding buttons and menu items to view-model
//! behaviour. Every command is an observable node: reading
//! [`can_execute`](RelayCommand::can_execute) inside a tracked render makes the
//! render depend on the command, and the command notifies whenever its
//! permission may have changed.
//!
//! - [`RelayCommand`] / [`RelayCommandWithParam`]: synchronous actions
//! - [`AsyncRelayCommand`] / [`AsyncRelayCommandWithParam`]: asynchronous
//!   actions that block re-entry while in flight
//!
//! Actions report failure through [`anyhow::Result`]. A failure is handed to
//! the command's error handler when one is installed and returned from
//! `execute` otherwise.

pub mod async_relay;
pub mod relay;
mod state;

pub use async_relay::{AsyncRelayCommand, AsyncRelayCommandWithParam};
pub use relay::{RelayCommand, RelayCommandWithParam};
pub use state::ErrorHandler;
