pub mod airport;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod courier;
pub mod errors;
pub mod flight;
pub mod game;
pub mod message;
pub mod monkeywrench;
pub mod ops;
pub mod player;
pub mod repair;
pub mod scheduler;
pub mod store;
pub mod turn;

pub use errors::GameError;

/// Timestamps inside a game run on the scaled game clock, not wall time.
pub type GameTime = chrono::NaiveDateTime;

pub type GameId = u64;
pub type FlightId = u64;

/// Timestamp format used on the wire and in the console.
pub const TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
