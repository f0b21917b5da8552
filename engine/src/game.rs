use chrono::Duration;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use crate::airport::Airport;
use crate::catalog;
use crate::clock::GameClock;
use crate::config::GameConfig;
use crate::errors::GameError;
use crate::flight::{Flight, FlightStatus};
use crate::message::{MessageTag, Outbox};
use crate::player::Player;
use crate::{FlightId, GameId, GameTime, TIME_FORMAT};

/// Lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    InProgress,
    Paused,
    GameOver,
}

impl GameState {
    pub fn as_str(&self) -> &str {
        match self {
            GameState::NotStarted => "not_started",
            GameState::InProgress => "in_progress",
            GameState::Paused => "paused",
            GameState::GameOver => "game_over",
        }
    }
}

/// An ordered target city shared by every player in the game.
#[derive(Debug, Clone)]
pub struct Goal {
    pub city: String,
    pub order: usize,
}

/// Record of a boarding, kept for the post-game story.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub username: String,
    pub flight: FlightId,
    pub at: GameTime,
}

/// One race: a sampled map, its flights, its players and its clock. All of it
/// is plain owned data; concurrency is the store's problem, not the game's.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameId,
    pub state: GameState,
    pub host: String,
    pub start_airport: String,
    pub airports: Vec<Airport>,
    pub flights: Vec<Flight>,
    pub players: Vec<Player>,
    pub goals: Vec<Goal>,
    pub purchases: Vec<Purchase>,
    pub clock: GameClock,
    next_flight_id: FlightId,
    flights_created: u64,
}

impl Game {
    /// Builds a fresh game: samples the map, wires routes, picks the start
    /// airport and the goal run, then seats the host and the house pilot.
    pub fn create<R: Rng>(
        host: &str,
        airport_count: usize,
        goal_count: usize,
        config: &GameConfig,
        rng: &mut R,
        outbox: &mut Outbox,
    ) -> Result<Game, GameError> {
        let master = catalog::master_airports();
        if airport_count < 2 || airport_count > master.len() {
            return Err(GameError::SchedulingError(format!(
                "airport count must be between 2 and {}",
                master.len()
            )));
        }
        if goal_count < 1 || goal_count >= airport_count {
            return Err(GameError::SchedulingError(format!(
                "goal count must be between 1 and {}",
                airport_count - 1
            )));
        }

        let mut airports: Vec<Airport> = master
            .choose_multiple(rng, airport_count)
            .cloned()
            .collect();
        wire_routes(&mut airports, config.destination_density, rng);

        let start_airport = airports
            .choose(rng)
            .map(|a| a.iata_code.clone())
            .ok_or_else(|| GameError::SchedulingError("empty airport sample".to_string()))?;
        let goals = pick_goals(&airports, &start_airport, goal_count, rng)?;

        let mut game = Game {
            id: 0,
            state: GameState::NotStarted,
            host: host.to_string(),
            start_airport,
            airports,
            flights: Vec::new(),
            players: Vec::new(),
            goals,
            purchases: Vec::new(),
            clock: GameClock::start(config.time_factor),
            next_flight_id: 1,
            flights_created: 0,
        };
        game.add_player(host, false)?;
        game.add_player(&config.ai_player_name, true)?;

        let start_city = game
            .city_of(&game.start_airport)
            .unwrap_or(&game.start_airport)
            .to_string();
        let route: Vec<&str> = game.goals.iter().map(|g| g.city.as_str()).collect();
        outbox.send(
            host,
            MessageTag::NewGame,
            &format!(
                "New game: race from {} through {}",
                start_city,
                route.join(", ")
            ),
            game.clock.now(),
        );
        Ok(game)
    }

    /// Seats a new player. Only possible before the race starts.
    pub fn add_player(&mut self, username: &str, ai: bool) -> Result<(), GameError> {
        if self.state != GameState::NotStarted {
            return Err(GameError::SchedulingError(
                "the game has already started".to_string(),
            ));
        }
        if self.players.iter().any(|p| p.username == username) {
            return Err(GameError::SchedulingError(format!(
                "{} already joined this game",
                username
            )));
        }
        let goal_cities: Vec<String> = self.goals.iter().map(|g| g.city.clone()).collect();
        self.players
            .push(Player::new(username, ai, &self.start_airport, &goal_cities));
        Ok(())
    }

    /// Starts the race and the clock.
    pub fn begin(&mut self, factor: i32, outbox: &mut Outbox) -> Result<(), GameError> {
        if self.state != GameState::NotStarted {
            return Err(GameError::SchedulingError(
                "the game has already started".to_string(),
            ));
        }
        self.clock = GameClock::start(factor);
        self.state = GameState::InProgress;
        let now = self.clock.now();
        outbox.broadcast(
            self,
            MessageTag::Default,
            "The race is on. Check the departures board and grab a seat",
            true,
            now,
        );
        Ok(())
    }

    /// Ends the game. Idempotent.
    pub fn end(&mut self, now: GameTime, outbox: &mut Outbox) {
        if self.state == GameState::GameOver {
            return;
        }
        self.state = GameState::GameOver;
        outbox.broadcast(self, MessageTag::GameOver, "The game is over", true, now);
    }

    pub fn pause(&mut self, outbox: &mut Outbox) -> Result<(), GameError> {
        if self.state != GameState::InProgress {
            return Err(GameError::SchedulingError(
                "only a running game can be paused".to_string(),
            ));
        }
        self.clock.pause();
        self.state = GameState::Paused;
        let now = self.clock.now();
        outbox.broadcast(self, MessageTag::Default, "The game is paused", true, now);
        Ok(())
    }

    pub fn resume(&mut self, outbox: &mut Outbox) -> Result<(), GameError> {
        if self.state != GameState::Paused {
            return Err(GameError::SchedulingError(
                "only a paused game can resume".to_string(),
            ));
        }
        self.clock.resume();
        self.state = GameState::InProgress;
        let now = self.clock.now();
        outbox.broadcast(self, MessageTag::Default, "The game has resumed", true, now);
        Ok(())
    }

    pub fn airport(&self, code: &str) -> Option<&Airport> {
        self.airports.iter().find(|a| a.iata_code == code)
    }

    pub fn city_of(&self, code: &str) -> Option<&str> {
        self.airport(code).map(|a| a.city.as_str())
    }

    pub fn player(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn player_mut(&mut self, username: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.username == username)
    }

    pub fn flight(&self, flight_id: FlightId) -> Option<&Flight> {
        self.flights.iter().find(|f| f.id == flight_id)
    }

    pub fn flight_mut(&mut self, flight_id: FlightId) -> Option<&mut Flight> {
        self.flights.iter_mut().find(|f| f.id == flight_id)
    }

    pub fn passengers_of(&self, flight_id: FlightId) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.ticket == Some(flight_id))
            .map(|p| p.username.clone())
            .collect()
    }

    /// Flights still leaving `code` at or after `now`, soonest first.
    pub fn future_flights_from(&self, code: &str, now: GameTime) -> Vec<&Flight> {
        let mut flights: Vec<&Flight> = self
            .flights
            .iter()
            .filter(|f| {
                f.origin == code && f.status != FlightStatus::Cancelled && f.depart_time() >= now
            })
            .collect();
        flights.sort_by_key(|f| f.depart_time());
        flights
    }

    /// The departures board for an airport. With `auto_create` set, an empty
    /// board is restocked first so nobody gets stranded.
    pub fn next_flights<R: Rng>(
        &mut self,
        code: &str,
        now: GameTime,
        auto_create: bool,
        config: &GameConfig,
        rng: &mut R,
    ) -> Result<Vec<FlightId>, GameError> {
        if self.airport(code).is_none() {
            return Err(GameError::AirportNotFound(code.to_string()));
        }
        if auto_create && self.future_flights_from(code, now).is_empty() {
            self.create_flights(code, now, config, rng)?;
        }
        Ok(self
            .future_flights_from(code, now)
            .iter()
            .map(|f| f.id)
            .collect())
    }

    /// Synthesizes one flight to each destination of the airport. Departures
    /// land after both `now` and the airport's latest live departure, plus
    /// the configured cushion and some jitter.
    pub fn create_flights<R: Rng>(
        &mut self,
        code: &str,
        now: GameTime,
        config: &GameConfig,
        rng: &mut R,
    ) -> Result<usize, GameError> {
        let origin = self
            .airport(code)
            .ok_or_else(|| GameError::AirportNotFound(code.to_string()))?
            .clone();
        let base = self
            .flights
            .iter()
            .filter(|f| f.origin == code && f.status != FlightStatus::Cancelled)
            .map(|f| f.depart_time())
            .max()
            .map_or(now, |latest| latest.max(now));

        let mut legs: Vec<(String, i64)> = Vec::new();
        for dest_code in &origin.destinations {
            let dest = self
                .airport(dest_code)
                .ok_or_else(|| GameError::AirportNotFound(dest_code.clone()))?;
            let distance = origin.distance_to(dest);
            let mut flight_time = (distance / config.cruise_speed).round() as i64
                + rng.gen_range(0..=config.flight_time_jitter);
            if flight_time < config.min_flight_time {
                flight_time = config.min_flight_time;
            }
            legs.push((dest_code.clone(), flight_time));
        }

        let created = legs.len();
        for (dest_code, flight_time) in legs {
            let depart =
                base + Duration::minutes(config.depart_cushion + rng.gen_range(0..=config.depart_jitter));
            self.add_flight(code, &dest_code, depart, flight_time);
        }
        Ok(created)
    }

    /// Registers a flight, allocating its id and flight number.
    pub fn add_flight(
        &mut self,
        origin: &str,
        destination: &str,
        depart_time: GameTime,
        flight_time: i64,
    ) -> FlightId {
        let id = self.next_flight_id;
        self.next_flight_id += 1;
        let number = (self.flights_created % 9900 + 100) as u32;
        self.flights_created += 1;
        self.flights
            .push(Flight::new(id, number, origin, destination, depart_time, flight_time));
        id
    }

    /// Cancels a flight and tears up every ticket sold for it.
    pub fn cancel_flight(&mut self, flight_id: FlightId, now: GameTime) -> Result<(), GameError> {
        let flight = self
            .flight_mut(flight_id)
            .ok_or(GameError::FlightNotFound(flight_id))?;
        flight.cancel(now)?;
        for player in self.players.iter_mut() {
            if player.ticket == Some(flight_id) {
                player.ticket = None;
            }
        }
        Ok(())
    }

    pub fn delay_flight(
        &mut self,
        flight_id: FlightId,
        delay: Duration,
        now: GameTime,
    ) -> Result<(), GameError> {
        let flight = self
            .flight_mut(flight_id)
            .ok_or(GameError::FlightNotFound(flight_id))?;
        flight.delay(delay, now)
    }

    /// Sells a seat. The checks run in a fixed order so the player always
    /// hears about the most actionable problem first.
    pub fn purchase(
        &mut self,
        username: &str,
        flight_id: FlightId,
        now: GameTime,
    ) -> Result<(), GameError> {
        if self.state == GameState::Paused {
            return Err(GameError::Paused);
        }
        if self.state != GameState::InProgress {
            return Err(GameError::SchedulingError(
                "the game is not running".to_string(),
            ));
        }
        let (full, depart_time, status, origin) = match self.flight(flight_id) {
            Some(f) => (f.full, f.depart_time(), f.status, f.origin.clone()),
            None => return Err(GameError::FlightNotFound(flight_id)),
        };
        if full {
            return Err(GameError::FlightFull);
        }
        if depart_time <= now {
            return Err(GameError::AlreadyDeparted);
        }
        if status == FlightStatus::Cancelled {
            return Err(GameError::Finished);
        }
        let player = self
            .player_mut(username)
            .ok_or_else(|| GameError::PlayerNotFound(username.to_string()))?;
        if player.airport.as_deref() != Some(origin.as_str()) {
            return Err(GameError::NotAtDepartingAirport);
        }
        player.ticket = Some(flight_id);
        Ok(())
    }

    /// Players who crossed their last goal at the earliest final stamp. Ties
    /// share the win; nobody else joins later.
    pub fn winners(&self) -> Vec<String> {
        let best = self
            .players
            .iter()
            .filter_map(|p| p.final_fulfillment())
            .min();
        match best {
            Some(best) => self
                .players
                .iter()
                .filter(|p| p.final_fulfillment() == Some(best))
                .map(|p| p.username.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The game ends once every player has run out of goals.
    pub fn is_over(&self) -> bool {
        self.players.iter().all(|p| p.finished())
    }

    /// Goals fulfilled per player, best first.
    pub fn standings(&self) -> Vec<(String, usize)> {
        let mut rows: Vec<(String, usize)> = self
            .players
            .iter()
            .map(|p| (p.username.clone(), p.goals_fulfilled()))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Everything a client needs to redraw one player's screen. `notify`
    /// carries the city the player just landed in, when that happened this
    /// tick.
    pub fn player_snapshot(&self, username: &str, notify: Option<&str>) -> Option<Value> {
        let player = self.player(username)?;
        let ticket = player.ticket.and_then(|id| self.flight(id)).map(|f| {
            json!({
                "number": f.number,
                "origin": f.origin,
                "destination": f.destination,
                "destination_city": self.city_of(&f.destination),
                "depart_time": f.depart_time().format(TIME_FORMAT).to_string(),
                "arrival_time": f.arrival_time().format(TIME_FORMAT).to_string(),
                "status": f.status.as_str(),
            })
        });
        let goals: Vec<Value> = player
            .achievements
            .iter()
            .map(|a| json!([a.city, a.fulfilled.is_some()]))
            .collect();
        let standings: Vec<Value> = self
            .standings()
            .into_iter()
            .map(|(name, count)| json!([name, count]))
            .collect();
        Some(json!({
            "player": player.username,
            "game": self.id,
            "game_state": self.state.as_str(),
            "airport": player.airport,
            "city": player.airport.as_deref().and_then(|code| self.city_of(code)),
            "ticket": ticket,
            "goals": goals,
            "standings": standings,
            "notify": notify,
        }))
    }
}

fn wire_routes<R: Rng>(airports: &mut [Airport], density: usize, rng: &mut R) {
    let codes: Vec<String> = airports.iter().map(|a| a.iata_code.clone()).collect();
    for airport in airports.iter_mut() {
        let mut others: Vec<&String> = codes
            .iter()
            .filter(|code| **code != airport.iata_code)
            .collect();
        others.shuffle(rng);
        for code in others.into_iter().take(density) {
            airport.add_destination(code);
        }
    }
    // No airport may be unreachable, or a goal there could never be met.
    for i in 0..airports.len() {
        let code = airports[i].iata_code.clone();
        if airports.iter().any(|a| a.reaches(&code)) {
            continue;
        }
        let mut j = rng.gen_range(0..airports.len() - 1);
        if j >= i {
            j += 1;
        }
        airports[j].add_destination(&code);
    }
}

/// Picks the goal run. The start city never appears, and when possible each
/// goal is not one direct hop from the previous stop, so winning takes at
/// least a little routing.
fn pick_goals<R: Rng>(
    airports: &[Airport],
    start_code: &str,
    goal_count: usize,
    rng: &mut R,
) -> Result<Vec<Goal>, GameError> {
    let mut pool: Vec<&Airport> = airports
        .iter()
        .filter(|a| a.iata_code != start_code)
        .collect();
    let mut goals = Vec::new();
    let mut prev_code = start_code.to_string();
    for order in 0..goal_count {
        let direct: Vec<String> = airports
            .iter()
            .find(|a| a.iata_code == prev_code)
            .map(|a| a.destinations.clone())
            .unwrap_or_default();
        let mut candidates: Vec<usize> = (0..pool.len())
            .filter(|&i| !direct.contains(&pool[i].iata_code))
            .collect();
        if candidates.is_empty() {
            candidates = (0..pool.len()).collect();
        }
        if candidates.is_empty() {
            return Err(GameError::SchedulingError(
                "not enough cities left for the goals".to_string(),
            ));
        }
        let chosen = pool.remove(candidates[rng.gen_range(0..candidates.len())]);
        prev_code = chosen.iata_code.clone();
        goals.push(Goal {
            city: chosen.city.clone(),
            order,
        });
    }
    Ok(goals)
}
