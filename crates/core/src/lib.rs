//! Domain types and collaborator traits for the cellular echo workspace.
//!
//! Everything the connector and sequencer need to talk about a network
//! attach and a socket echo lives here; the driver side is only ever seen
//! through [`NetworkInterface`] and [`Socket`].

pub mod domain;
pub mod error;
pub mod traits;

pub use domain::*;
pub use error::CoreError;
pub use traits::{NetworkEvent, NetworkInterface, ReadinessCallback, Socket, StatusCallback};
