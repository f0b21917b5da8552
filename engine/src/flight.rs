use chrono::{Duration, NaiveDateTime};

use crate::errors::GameError;
use crate::player::Player;
use crate::{FlightId, GameTime};

/// Represents the various statuses a flight can have.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Cancelled,
    Arrived,
}

impl FlightStatus {
    /// Converts the `FlightStatus` variant to its corresponding string representation.
    pub fn as_str(&self) -> &str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Arrived => "arrived",
        }
    }

    /// Creates a `FlightStatus` variant from a string slice.
    pub fn from_str(status: &str) -> Result<FlightStatus, GameError> {
        match status.to_lowercase().as_str() {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "delayed" => Ok(FlightStatus::Delayed),
            "cancelled" => Ok(FlightStatus::Cancelled),
            "arrived" => Ok(FlightStatus::Arrived),
            _ => Err(GameError::SchedulingError(
                "Invalid flight status".to_string(),
            )),
        }
    }
}

/// A scheduled hop between two airports. The arrival time is always derived
/// from the departure time plus the flight time; every mutation goes through
/// a setter so the two never drift apart.
#[derive(Debug, Clone)]
pub struct Flight {
    pub id: FlightId,
    pub number: u32,
    pub origin: String,
    pub destination: String,
    depart_time: NaiveDateTime,
    flight_time: i64,
    arrival_time: NaiveDateTime,
    pub status: FlightStatus,
    pub full: bool,
}

impl Flight {
    pub fn new(
        id: FlightId,
        number: u32,
        origin: &str,
        destination: &str,
        depart_time: NaiveDateTime,
        flight_time: i64,
    ) -> Self {
        Flight {
            id,
            number,
            origin: origin.to_string(),
            destination: destination.to_string(),
            depart_time,
            flight_time,
            arrival_time: depart_time + Duration::minutes(flight_time),
            status: FlightStatus::Scheduled,
            full: false,
        }
    }

    pub fn depart_time(&self) -> NaiveDateTime {
        self.depart_time
    }

    pub fn arrival_time(&self) -> NaiveDateTime {
        self.arrival_time
    }

    /// Flight time in game minutes.
    pub fn flight_time(&self) -> i64 {
        self.flight_time
    }

    pub fn set_depart_time(&mut self, depart_time: NaiveDateTime) {
        self.depart_time = depart_time;
        self.refresh_arrival();
    }

    pub fn set_flight_time(&mut self, flight_time: i64) {
        self.flight_time = flight_time;
        self.refresh_arrival();
    }

    /// Reroutes the flight mid-air to a new destination with a new duration.
    pub fn divert(&mut self, destination: &str, flight_time: i64) {
        self.destination = destination.to_string();
        self.set_flight_time(flight_time);
    }

    fn refresh_arrival(&mut self) {
        self.arrival_time = self.depart_time + Duration::minutes(self.flight_time);
    }

    /// A flight is in the air when it has not been cancelled and the clock
    /// sits inside its window: departure inclusive, arrival exclusive.
    pub fn in_flight(&self, now: GameTime) -> bool {
        self.status != FlightStatus::Cancelled && self.depart_time <= now && now < self.arrival_time
    }

    /// True once a live flight's arrival time has passed.
    pub fn has_landed(&self, now: GameTime) -> bool {
        self.status != FlightStatus::Cancelled && now >= self.arrival_time
    }

    /// Cancels a flight that has not yet left. Clearing the passengers is the
    /// game's job since the flight does not know who holds tickets.
    pub fn cancel(&mut self, now: GameTime) -> Result<(), GameError> {
        if self.depart_time <= now {
            return Err(GameError::AlreadyDeparted);
        }
        self.status = FlightStatus::Cancelled;
        Ok(())
    }

    /// Pushes the departure (and therefore the arrival) into the future.
    pub fn delay(&mut self, delay: Duration, now: GameTime) -> Result<(), GameError> {
        match self.status {
            FlightStatus::Cancelled | FlightStatus::Arrived => return Err(GameError::Finished),
            FlightStatus::Scheduled | FlightStatus::Delayed => {}
        }
        if self.depart_time <= now {
            return Err(GameError::AlreadyDeparted);
        }
        self.depart_time += delay;
        self.refresh_arrival();
        self.status = FlightStatus::Delayed;
        Ok(())
    }

    /// Whether the given player could buy a seat right now. Position checks
    /// live in the game; this covers the flight-side rules only.
    pub fn buyable(&self, player: &Player, now: GameTime) -> bool {
        !self.full
            && self.status != FlightStatus::Cancelled
            && self.depart_time > now
            && player.ticket != Some(self.id)
    }
}
