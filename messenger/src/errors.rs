use std::fmt::{self, Display};
use std::io;

use engine::GameError;
use logger::LoggerError;
use protocol::errors::ProtocolError;

/// Enum representing the possible errors of the connection-holding service.
#[derive(Debug)]
pub enum MessengerError {
    /// Input/output (I/O) error on a listener or a session stream.
    IoError(io::Error),
    /// Error related to lock acquisition.
    LockError,
    /// Error related to envelope encoding.
    ProtocolError(ProtocolError),
    /// Error raised by the engine while answering a request.
    EngineError(GameError),
    /// Error related to the logger.
    LoggerError(LoggerError),
    /// Error related to thread creation or handling.
    ThreadError(String),
}

impl Display for MessengerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessengerError::IoError(e) => write!(f, "I/O Error: {}", e),
            MessengerError::LockError => write!(f, "Failed to acquire lock"),
            MessengerError::ProtocolError(e) => write!(f, "Protocol Error: {}", e),
            MessengerError::EngineError(e) => write!(f, "Engine Error: {}", e),
            MessengerError::LoggerError(e) => write!(f, "Logger Error: {}", e),
            MessengerError::ThreadError(detail) => write!(f, "Thread Error: {}", detail),
        }
    }
}

impl From<io::Error> for MessengerError {
    fn from(error: io::Error) -> Self {
        MessengerError::IoError(error)
    }
}

impl<T> From<std::sync::PoisonError<T>> for MessengerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        MessengerError::LockError
    }
}

impl From<ProtocolError> for MessengerError {
    fn from(error: ProtocolError) -> Self {
        MessengerError::ProtocolError(error)
    }
}

impl From<GameError> for MessengerError {
    fn from(error: GameError) -> Self {
        MessengerError::EngineError(error)
    }
}

impl From<LoggerError> for MessengerError {
    fn from(error: LoggerError) -> Self {
        MessengerError::LoggerError(error)
    }
}
