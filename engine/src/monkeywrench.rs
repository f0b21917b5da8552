use std::time::{Duration as StdDuration, Instant};

use chrono::Duration;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::GameConfig;
use crate::flight::FlightStatus;
use crate::game::Game;
use crate::message::{MessageTag, Outbox};
use crate::{FlightId, GameTime};

const DELAY_MINUTES: (i64, i64) = (20, 60);
const LATE_MINUTES: (i64, i64) = (10, 36);
const TAIL_WIND_MINUTES: (i64, i64) = (15, 28);
const TSA_WINDOW_MINUTES: i64 = 15;

/// The eleven ways the game ruins a traveler's day (or, rarely, saves it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrenchKind {
    CancelledFlight,
    DelayedFlight,
    AllFlightsFromAirportDelayed,
    AllFlightsFromAirportCancelled,
    DivertedFlight,
    MechanicalProblem,
    LateFlight,
    Hint,
    Tsa,
    FullFlight,
    TailWind,
}

impl WrenchKind {
    pub const ALL: [WrenchKind; 11] = [
        WrenchKind::CancelledFlight,
        WrenchKind::DelayedFlight,
        WrenchKind::AllFlightsFromAirportDelayed,
        WrenchKind::AllFlightsFromAirportCancelled,
        WrenchKind::DivertedFlight,
        WrenchKind::MechanicalProblem,
        WrenchKind::LateFlight,
        WrenchKind::Hint,
        WrenchKind::Tsa,
        WrenchKind::FullFlight,
        WrenchKind::TailWind,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            WrenchKind::CancelledFlight => "cancelled_flight",
            WrenchKind::DelayedFlight => "delayed_flight",
            WrenchKind::AllFlightsFromAirportDelayed => "all_flights_from_airport_delayed",
            WrenchKind::AllFlightsFromAirportCancelled => "all_flights_from_airport_cancelled",
            WrenchKind::DivertedFlight => "diverted_flight",
            WrenchKind::MechanicalProblem => "mechanical_problem",
            WrenchKind::LateFlight => "late_flight",
            WrenchKind::Hint => "hint",
            WrenchKind::Tsa => "tsa",
            WrenchKind::FullFlight => "full_flight",
            WrenchKind::TailWind => "tail_wind",
        }
    }
}

/// Picks which wrench gets thrown. Tests narrow the pool to force a kind.
pub struct WrenchFactory {
    kinds: Vec<WrenchKind>,
}

impl WrenchFactory {
    pub fn new() -> Self {
        WrenchFactory {
            kinds: WrenchKind::ALL.to_vec(),
        }
    }

    pub fn with_kinds(kinds: Vec<WrenchKind>) -> Self {
        WrenchFactory { kinds }
    }

    pub fn pick<R: Rng>(&self, rng: &mut R) -> WrenchKind {
        self.kinds[rng.gen_range(0..self.kinds.len())]
    }
}

impl Default for WrenchFactory {
    fn default() -> Self {
        WrenchFactory::new()
    }
}

/// Wall-clock alarm deciding when the next wrench lands. After each throw it
/// re-arms itself with a fresh random wait of one to `max_wait_secs` seconds.
pub struct WrenchTrigger {
    due_at: Instant,
    max_wait_secs: u64,
}

impl WrenchTrigger {
    pub fn new<R: Rng>(max_wait_secs: u64, rng: &mut R) -> Self {
        let mut trigger = WrenchTrigger {
            due_at: Instant::now(),
            max_wait_secs,
        };
        trigger.rearm(rng);
        trigger
    }

    pub fn due(&self) -> bool {
        Instant::now() >= self.due_at
    }

    pub fn rearm<R: Rng>(&mut self, rng: &mut R) {
        let wait = rng.gen_range(1..=self.max_wait_secs.max(1));
        self.due_at = Instant::now() + StdDuration::from_secs(wait);
    }
}

/// Applies one wrench to the game. Returns whether anything happened; a
/// wrench with no eligible target fizzles without a trace.
pub fn throw<R: Rng>(
    kind: WrenchKind,
    game: &mut Game,
    now: GameTime,
    config: &GameConfig,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    match kind {
        WrenchKind::CancelledFlight => cancel_random_flight(game, now, rng, outbox),
        WrenchKind::DelayedFlight => delay_random_flight(game, now, rng, outbox),
        WrenchKind::AllFlightsFromAirportDelayed => delay_whole_airport(game, now, rng, outbox),
        WrenchKind::AllFlightsFromAirportCancelled => cancel_whole_airport(game, now, rng, outbox),
        WrenchKind::DivertedFlight => divert_random_flight(game, now, config, rng, outbox),
        WrenchKind::MechanicalProblem => mechanical_problem(game, now, rng, outbox),
        WrenchKind::LateFlight => late_flight(game, now, rng, outbox),
        WrenchKind::Hint => hint_player(game, now, rng, outbox),
        WrenchKind::Tsa => tsa_screening(game, now, rng, outbox),
        WrenchKind::FullFlight => fill_random_flight(game, now, rng, outbox),
        WrenchKind::TailWind => tail_wind(game, now, rng, outbox),
    }
}

/// Flights that can still be tampered with at the gate.
fn future_flight_ids(game: &Game, now: GameTime) -> Vec<FlightId> {
    game.flights
        .iter()
        .filter(|f| {
            matches!(f.status, FlightStatus::Scheduled | FlightStatus::Delayed)
                && f.depart_time() > now
        })
        .map(|f| f.id)
        .collect()
}

/// Flights currently in the air.
fn airborne_flight_ids(game: &Game, now: GameTime) -> Vec<FlightId> {
    game.flights
        .iter()
        .filter(|f| f.in_flight(now))
        .map(|f| f.id)
        .collect()
}

fn flight_card(game: &Game, flight_id: FlightId) -> (u32, String) {
    match game.flight(flight_id) {
        Some(f) => {
            let city = game
                .city_of(&f.destination)
                .unwrap_or(f.destination.as_str())
                .to_string();
            (f.number, city)
        }
        None => (0, String::new()),
    }
}

fn cancel_random_flight<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let candidates = future_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let (number, city) = flight_card(game, flight_id);
    if game.cancel_flight(flight_id, now).is_err() {
        return false;
    }
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} to {} has been cancelled", number, city),
        false,
        now,
    );
    true
}

fn delay_random_flight<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let candidates = future_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let minutes = rng.gen_range(DELAY_MINUTES.0..=DELAY_MINUTES.1);
    if game
        .delay_flight(flight_id, Duration::minutes(minutes), now)
        .is_err()
    {
        return false;
    }
    let (number, city) = flight_card(game, flight_id);
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} to {} has been delayed {} minutes", number, city, minutes),
        false,
        now,
    );
    true
}

fn delay_whole_airport<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let origin = match pick_busy_airport(game, now, rng) {
        Some(code) => code,
        None => return false,
    };
    let minutes = rng.gen_range(DELAY_MINUTES.0..=DELAY_MINUTES.1);
    let ids: Vec<FlightId> = future_flight_ids(game, now)
        .into_iter()
        .filter(|id| game.flight(*id).map_or(false, |f| f.origin == origin))
        .collect();
    let mut delayed = 0;
    for id in ids {
        if game
            .delay_flight(id, Duration::minutes(minutes), now)
            .is_ok()
        {
            delayed += 1;
        }
    }
    if delayed == 0 {
        return false;
    }
    let city = game.city_of(&origin).unwrap_or(origin.as_str()).to_string();
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("All flights out of {} have been delayed {} minutes", city, minutes),
        false,
        now,
    );
    true
}

fn cancel_whole_airport<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let origin = match pick_busy_airport(game, now, rng) {
        Some(code) => code,
        None => return false,
    };
    let ids: Vec<FlightId> = future_flight_ids(game, now)
        .into_iter()
        .filter(|id| game.flight(*id).map_or(false, |f| f.origin == origin))
        .collect();
    let mut cancelled = 0;
    for id in ids {
        if game.cancel_flight(id, now).is_ok() {
            cancelled += 1;
        }
    }
    if cancelled == 0 {
        return false;
    }
    let city = game.city_of(&origin).unwrap_or(origin.as_str()).to_string();
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("All flights out of {} have been cancelled", city),
        false,
        now,
    );
    true
}

/// An airport with at least one flight still at the gate.
fn pick_busy_airport<R: Rng>(game: &Game, now: GameTime, rng: &mut R) -> Option<String> {
    let mut origins: Vec<String> = Vec::new();
    for id in future_flight_ids(game, now) {
        if let Some(flight) = game.flight(id) {
            if !origins.contains(&flight.origin) {
                origins.push(flight.origin.clone());
            }
        }
    }
    origins.choose(rng).cloned()
}

fn divert_random_flight<R: Rng>(
    game: &mut Game,
    now: GameTime,
    config: &GameConfig,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let candidates = airborne_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let (number, origin, old_destination) = match game.flight(flight_id) {
        Some(f) => (f.number, f.origin.clone(), f.destination.clone()),
        None => return false,
    };
    let alternates: Vec<String> = game
        .airports
        .iter()
        .map(|a| a.iata_code.clone())
        .filter(|code| *code != origin && *code != old_destination)
        .collect();
    let new_destination = match alternates.choose(rng) {
        Some(code) => code.clone(),
        None => return false,
    };
    let distance = match (game.airport(&origin), game.airport(&new_destination)) {
        (Some(from), Some(to)) => from.distance_to(to),
        _ => return false,
    };
    let mut flight_time = (distance / config.cruise_speed).round() as i64;
    if flight_time < config.min_flight_time {
        flight_time = config.min_flight_time;
    }
    if let Some(flight) = game.flight_mut(flight_id) {
        flight.divert(&new_destination, flight_time);
    }
    let city = game
        .city_of(&new_destination)
        .unwrap_or(new_destination.as_str())
        .to_string();
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} has been diverted to {}", number, city),
        false,
        now,
    );
    true
}

fn mechanical_problem<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let candidates = airborne_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let (number, origin, elapsed) = match game.flight(flight_id) {
        Some(f) => (
            f.number,
            f.origin.clone(),
            (now - f.depart_time()).num_minutes(),
        ),
        None => return false,
    };
    // Flying back takes as long as the way out did.
    if let Some(flight) = game.flight_mut(flight_id) {
        flight.divert(&origin, (elapsed * 2).max(1));
    }
    let city = game.city_of(&origin).unwrap_or(origin.as_str()).to_string();
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} has a mechanical problem and is returning to {}", number, city),
        false,
        now,
    );
    true
}

fn late_flight<R: Rng>(game: &mut Game, now: GameTime, rng: &mut R, outbox: &mut Outbox) -> bool {
    let candidates = airborne_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let minutes = rng.gen_range(LATE_MINUTES.0..=LATE_MINUTES.1);
    let number = match game.flight_mut(flight_id) {
        Some(flight) => {
            let extended = flight.flight_time() + minutes;
            flight.set_flight_time(extended);
            flight.number
        }
        None => return false,
    };
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} is running {} minutes late", number, minutes),
        false,
        now,
    );
    true
}

fn hint_player<R: Rng>(game: &mut Game, now: GameTime, rng: &mut R, outbox: &mut Outbox) -> bool {
    let candidates: Vec<(String, String, String)> = game
        .players
        .iter()
        .filter(|p| !p.ai && !p.finished())
        .filter_map(|p| {
            let airport = p.airport.clone()?;
            let goal = p.current_goal()?.city.clone();
            Some((p.username.clone(), airport, goal))
        })
        .collect();
    let (username, code, goal) = match candidates.choose(rng) {
        Some(entry) => entry.clone(),
        None => return false,
    };
    let airport = match game.airport(&code) {
        Some(a) => a,
        None => return false,
    };
    // Prefer a direct route; settle for one that connects through.
    let mut stepping_stone: Option<&String> = None;
    for dest in &airport.destinations {
        if game.city_of(dest) == Some(goal.as_str()) {
            stepping_stone = Some(dest);
            break;
        }
        if stepping_stone.is_none() {
            let connects = game.airport(dest).map_or(false, |next| {
                next.destinations
                    .iter()
                    .any(|two_out| game.city_of(two_out) == Some(goal.as_str()))
            });
            if connects {
                stepping_stone = Some(dest);
            }
        }
    }
    let via = match stepping_stone {
        Some(code) => game.city_of(code).unwrap_or(code.as_str()).to_string(),
        None => return false,
    };
    outbox.send(
        &username,
        MessageTag::MonkeyWrench,
        &format!("Word in the terminal is {} is the way to {}", via, goal),
        now,
    );
    true
}

fn tsa_screening<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let window = Duration::minutes(TSA_WINDOW_MINUTES);
    let candidates: Vec<String> = game
        .players
        .iter()
        .filter(|p| {
            p.ticket
                .and_then(|id| game.flight(id))
                .map_or(false, |f| f.depart_time() > now && f.depart_time() - now <= window)
        })
        .map(|p| p.username.clone())
        .collect();
    let username = match candidates.choose(rng) {
        Some(name) => name.clone(),
        None => return false,
    };
    let human = match game.player_mut(&username) {
        Some(player) => {
            player.ticket = None;
            !player.ai
        }
        None => return false,
    };
    if human {
        outbox.send(
            &username,
            MessageTag::MonkeyWrench,
            "TSA pulled you aside for extra screening and you missed your flight",
            now,
        );
    }
    true
}

fn fill_random_flight<R: Rng>(
    game: &mut Game,
    now: GameTime,
    rng: &mut R,
    outbox: &mut Outbox,
) -> bool {
    let candidates: Vec<FlightId> = future_flight_ids(game, now)
        .into_iter()
        .filter(|id| game.flight(*id).map_or(false, |f| !f.full))
        .collect();
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    if let Some(flight) = game.flight_mut(flight_id) {
        flight.full = true;
    }
    let (number, city) = flight_card(game, flight_id);
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} to {} is sold out", number, city),
        false,
        now,
    );
    true
}

fn tail_wind<R: Rng>(game: &mut Game, now: GameTime, rng: &mut R, outbox: &mut Outbox) -> bool {
    let candidates = airborne_flight_ids(game, now);
    let flight_id = match candidates.choose(rng) {
        Some(id) => *id,
        None => return false,
    };
    let minutes = rng.gen_range(TAIL_WIND_MINUTES.0..=TAIL_WIND_MINUTES.1);
    let number = match game.flight_mut(flight_id) {
        Some(flight) => {
            let shortened = (flight.flight_time() - minutes).max(1);
            flight.set_flight_time(shortened);
            flight.number
        }
        None => return false,
    };
    outbox.broadcast(
        game,
        MessageTag::MonkeyWrench,
        &format!("Flight {} caught a tail wind and will arrive {} minutes early", number, minutes),
        false,
        now,
    );
    true
}
