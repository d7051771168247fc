//! Collaborator implementations over the host operating system's network stack.
//!
//! Lets the runners be exercised against a real echo server without a
//! cellular modem. Non-IP transport is not available here.

mod error;
mod network;
mod socket;

pub use error::{HostError, Result};
pub use network::HostNetwork;
pub use socket::HostSocket;
