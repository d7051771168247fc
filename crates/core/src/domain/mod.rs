mod code;
mod connection;
mod phase;
mod transaction;
mod transport;

pub use code::ErrorCode;
pub use connection::{
    CellularParameters, ConnectionState, LinkStatus, RetryBudget, StatusClass,
};
pub use phase::{RunMode, SequencerPhase};
pub use transaction::{TransactionOutcome, TransactionResult, ECHO_PAYLOAD};
pub use transport::TransportKind;
