//! RAII resource guards for automatic cleanup.
//!
//! This module provides guards that ensure resources are properly
//! released even on early returns and panics:
//!
//! - [`SocketGuard`] - Closes a socket exactly once
//! - [`ProgressTicker`] - Stops the link progress task

mod progress;
mod socket_guard;

pub use progress::ProgressTicker;
pub use socket_guard::SocketGuard;
