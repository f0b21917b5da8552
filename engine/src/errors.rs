use std::fmt::{self, Display};
use std::io;

use logger::LoggerError;
use protocol::errors::ProtocolError;

use crate::{FlightId, GameId};

/// Enum representing the possible errors that can occur while running a game,
/// split between rule violations (shown to players) and operational failures.
#[derive(Debug)]
pub enum GameError {
    /// The flight has already left the gate.
    AlreadyDeparted,
    /// The flight already finished its lifecycle (arrived or cancelled).
    Finished,
    /// No seats left on the flight.
    FlightFull,
    /// The player tried to buy a ticket from somewhere they are not.
    NotAtDepartingAirport,
    /// The game clock is frozen.
    Paused,
    /// The request could not be scheduled as asked.
    SchedulingError(String),
    /// No game with that id in the repository.
    GameNotFound(GameId),
    /// No such player in the game.
    PlayerNotFound(String),
    /// No such airport in the game.
    AirportNotFound(String),
    /// No such flight in the game.
    FlightNotFound(FlightId),
    /// Error related to lock acquisition.
    LockError,
    /// A message could not be handed to the messenger.
    DeliveryError(String),
    /// Input/output (I/O) error.
    IoError(io::Error),
    /// Error related to the logger.
    LoggerError(LoggerError),
    /// Error related to envelope encoding.
    ProtocolError(ProtocolError),
    /// Error related to thread creation or handling.
    ThreadError(String),
}

impl Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::AlreadyDeparted => write!(f, "That flight has already departed"),
            GameError::Finished => write!(f, "That flight is no longer in play"),
            GameError::FlightFull => write!(f, "That flight is sold out"),
            GameError::NotAtDepartingAirport => {
                write!(f, "You are not at the departing airport")
            }
            GameError::Paused => write!(f, "The game is paused"),
            GameError::SchedulingError(detail) => write!(f, "Scheduling error: {}", detail),
            GameError::GameNotFound(id) => write!(f, "No game with id {}", id),
            GameError::PlayerNotFound(username) => write!(f, "No player named {}", username),
            GameError::AirportNotFound(code) => write!(f, "No airport with code {}", code),
            GameError::FlightNotFound(id) => write!(f, "No flight with id {}", id),
            GameError::LockError => write!(f, "Failed to acquire lock"),
            GameError::DeliveryError(detail) => write!(f, "Delivery error: {}", detail),
            GameError::IoError(e) => write!(f, "I/O Error: {}", e),
            GameError::LoggerError(e) => write!(f, "Logger Error: {}", e),
            GameError::ProtocolError(e) => write!(f, "Protocol Error: {}", e),
            GameError::ThreadError(detail) => write!(f, "Thread Error: {}", detail),
        }
    }
}

impl From<io::Error> for GameError {
    fn from(error: io::Error) -> Self {
        GameError::IoError(error)
    }
}

impl<T> From<std::sync::PoisonError<T>> for GameError {
    /// Conversion from a lock error (`PoisonError`) to `GameError`.
    fn from(_: std::sync::PoisonError<T>) -> Self {
        GameError::LockError
    }
}

impl From<LoggerError> for GameError {
    fn from(error: LoggerError) -> Self {
        GameError::LoggerError(error)
    }
}

impl From<ProtocolError> for GameError {
    fn from(error: ProtocolError) -> Self {
        GameError::ProtocolError(error)
    }
}
