use cellular_core::{ErrorCode, TransportKind};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Couldn't resolve {0}")]
    Resolve(String),

    #[error("{0} is not supported by the host stack")]
    Unsupported(TransportKind),

    #[error("Socket is not open")]
    NotOpen,

    #[error("Socket is already open")]
    AlreadyOpen,

    #[error("Socket has no peer")]
    NoPeer,

    #[error("Connect in progress")]
    InProgress,
}

impl HostError {
    /// Driver error code reported to callers of the collaborator traits.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(e) => io_code(e),
            Self::Resolve(_) => ErrorCode::DnsFailure,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::NotOpen => ErrorCode::NoSocket,
            Self::AlreadyOpen => ErrorCode::Parameter,
            Self::NoPeer => ErrorCode::NoAddress,
            Self::InProgress => ErrorCode::InProgress,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

fn io_code(error: &io::Error) -> ErrorCode {
    match error.kind() {
        io::ErrorKind::WouldBlock => ErrorCode::WouldBlock,
        io::ErrorKind::TimedOut => ErrorCode::Timeout,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected => ErrorCode::NoConnection,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorCode::ConnectionLost,
        io::ErrorKind::AddrInUse => ErrorCode::AddressInUse,
        io::ErrorKind::AddrNotAvailable => ErrorCode::NoAddress,
        io::ErrorKind::InvalidInput => ErrorCode::Parameter,
        io::ErrorKind::Unsupported => ErrorCode::Unsupported,
        io::ErrorKind::OutOfMemory => ErrorCode::NoMemory,
        _ => ErrorCode::DeviceError,
    }
}
