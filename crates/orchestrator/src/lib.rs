pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod observer;
pub mod resources;
pub mod runner;
pub mod sequencer;
pub mod state_machine;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use config::EchoConfig;
pub use connector::{ConnectReport, Connector};
pub use dispatcher::{DispatchHandle, Dispatcher};
pub use error::{OrchestratorError, Result};
pub use observer::{classify, LinkState, StatusObserver, StatusSink, StepSignal};
pub use resources::{ProgressTicker, SocketGuard};
pub use runner::{BlockingRunner, RunReport, SteppedRunner};
pub use sequencer::{AsyncOrchestrator, PendingKind, PendingSocketOp, SequencerMessage};
pub use state_machine::PhaseMachine;
pub use transaction::EchoTransaction;
