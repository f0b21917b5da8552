use std::collections::HashMap;

use rand::Rng;

use crate::config::GameConfig;
use crate::errors::GameError;
use crate::flight::{Flight, FlightStatus};
use crate::game::{Game, GameState, Purchase};
use crate::message::{MessageTag, Outbox};
use crate::monkeywrench::{self, WrenchKind};
use crate::player::Player;
use crate::{FlightId, GameTime};

/// What one tick changed. The scheduler turns this, plus the outbox, into
/// wire traffic after the store lock is gone.
#[derive(Debug)]
pub struct TickOutcome {
    pub now: GameTime,
    /// False when the game was not running and the tick did nothing.
    pub ticked: bool,
    /// The game finished during this tick.
    pub ended: bool,
    /// Players who landed this tick, with the city they landed in.
    pub arrivals: HashMap<String, String>,
    /// AI purchases that bounced off a rule, for the scheduler to log.
    pub skipped: Vec<(String, GameError)>,
}

/// Advances one game by one turn: autopilots move, a wrench may land,
/// flights depart and arrive, empty boards restock, winners get called, and
/// a finished race is closed out. Anything said along the way lands in the
/// outbox; nothing here touches a store or a socket.
pub fn take_turn<R: Rng>(
    game: &mut Game,
    now: GameTime,
    wrench: Option<WrenchKind>,
    config: &GameConfig,
    rng: &mut R,
    outbox: &mut Outbox,
) -> TickOutcome {
    let mut outcome = TickOutcome {
        now,
        ticked: false,
        ended: false,
        arrivals: HashMap::new(),
        skipped: Vec::new(),
    };
    if game.state != GameState::InProgress {
        return outcome;
    }
    outcome.ticked = true;
    let winners_before = game.winners();

    ai_moves(game, now, &mut outcome);
    if let Some(kind) = wrench {
        monkeywrench::throw(kind, game, now, config, rng, outbox);
    }
    process_departures(game, now, outbox);
    process_arrivals(game, now, outbox, &mut outcome.arrivals);
    restock_boards(game, now, config, rng);
    announce_winners(game, &winners_before, now, outbox);

    if game.is_over() {
        game.end(now, outbox);
        outcome.ended = true;
    }
    outcome
}

/// An autopilot already holding a ticket sits the tick out; its choice was
/// made and re-shopping could only trade it for a worse seat.
fn ai_moves(game: &mut Game, now: GameTime, outcome: &mut TickOutcome) {
    let pilots: Vec<String> = game
        .players
        .iter()
        .filter(|p| p.ai && !p.finished() && p.airport.is_some() && p.ticket.is_none())
        .map(|p| p.username.clone())
        .collect();
    for username in pilots {
        let choice = match game.player(&username) {
            Some(player) => ai_choice(game, player, now),
            None => None,
        };
        if let Some(flight_id) = choice {
            if let Err(err) = game.purchase(&username, flight_id, now) {
                outcome.skipped.push((username, err));
            }
        }
    }
}

/// Which seat the autopilot takes: a direct flight to its goal if one is on
/// the board, the only option when there is just one, and otherwise the
/// earliest arrival that does not fly it straight back where it came from.
fn ai_choice(game: &Game, player: &Player, now: GameTime) -> Option<FlightId> {
    let code = player.airport.as_deref()?;
    let goal_city = player.current_goal()?.city.clone();
    let options: Vec<&Flight> = game
        .future_flights_from(code, now)
        .into_iter()
        .filter(|f| f.buyable(player, now))
        .collect();
    if options.is_empty() {
        return None;
    }
    if let Some(direct) = options
        .iter()
        .find(|f| game.city_of(&f.destination) == Some(goal_city.as_str()))
    {
        return Some(direct.id);
    }
    if options.len() == 1 {
        return Some(options[0].id);
    }
    let mut remaining: Vec<&Flight> = match player.prev_airport.as_deref() {
        Some(prev) => {
            let forward: Vec<&Flight> = options
                .iter()
                .copied()
                .filter(|f| f.destination != prev)
                .collect();
            if forward.is_empty() {
                options
            } else {
                forward
            }
        }
        None => options,
    };
    remaining.sort_by_key(|f| f.arrival_time());
    remaining.first().map(|f| f.id)
}

/// Boards everyone holding a ticket on a flight whose departure has passed.
/// A flight that landed before the tick even looked still boards first, so a
/// slow tick walks the player through both steps in order.
fn process_departures(game: &mut Game, now: GameTime, outbox: &mut Outbox) {
    let departing: Vec<(FlightId, String)> = game
        .flights
        .iter()
        .filter(|f| f.status != FlightStatus::Cancelled && f.depart_time() <= now)
        .map(|f| (f.id, f.origin.clone()))
        .collect();
    for (flight_id, origin) in departing {
        let origin_city = game.city_of(&origin).unwrap_or(origin.as_str()).to_string();
        let boarding: Vec<String> = game
            .players
            .iter()
            .filter(|p| {
                p.ticket == Some(flight_id) && p.airport.as_deref() == Some(origin.as_str())
            })
            .map(|p| p.username.clone())
            .collect();
        for username in boarding {
            if let Some(player) = game.player_mut(&username) {
                player.airport = None;
            }
            game.purchases.push(Purchase {
                username: username.clone(),
                flight: flight_id,
                at: now,
            });
            outbox.broadcast(
                game,
                MessageTag::PlayerAction,
                &format!("{} has departed {}", username, origin_city),
                false,
                now,
            );
        }
    }
}

/// Lands flights whose arrival time has passed and walks their passengers
/// into the terminal, fulfilling goals as they step off.
fn process_arrivals(
    game: &mut Game,
    now: GameTime,
    outbox: &mut Outbox,
    arrivals: &mut HashMap<String, String>,
) {
    let landed: Vec<FlightId> = game
        .flights
        .iter()
        .filter(|f| f.has_landed(now) && f.status != FlightStatus::Arrived)
        .map(|f| f.id)
        .collect();
    for flight_id in landed {
        let (origin, destination, arrival_time) = match game.flight(flight_id) {
            Some(f) => (f.origin.clone(), f.destination.clone(), f.arrival_time()),
            None => continue,
        };
        let destination_city = game
            .city_of(&destination)
            .unwrap_or(destination.as_str())
            .to_string();
        for username in game.passengers_of(flight_id) {
            outbox.broadcast(
                game,
                MessageTag::PlayerAction,
                &format!("{} has arrived in {}", username, destination_city),
                false,
                now,
            );
            // Goals are stamped with the scheduled arrival, not the tick
            // that noticed it, so a slow tick cannot decide a race.
            let fulfilled = match game.player_mut(&username) {
                Some(player) => {
                    player.airport = Some(destination.clone());
                    player.prev_airport = Some(origin.clone());
                    player.ticket = None;
                    player.fulfill_current(&destination_city, arrival_time)
                }
                None => false,
            };
            if fulfilled {
                outbox.broadcast(
                    game,
                    MessageTag::Goal,
                    &format!("{} has reached {}", username, destination_city),
                    true,
                    now,
                );
            }
            arrivals.insert(username, destination_city.clone());
        }
        if let Some(flight) = game.flight_mut(flight_id) {
            flight.status = FlightStatus::Arrived;
        }
    }
}

/// Any airport whose departures board went empty gets a fresh wave.
fn restock_boards<R: Rng>(game: &mut Game, now: GameTime, config: &GameConfig, rng: &mut R) {
    let codes: Vec<String> = game.airports.iter().map(|a| a.iata_code.clone()).collect();
    for code in codes {
        if game.future_flights_from(&code, now).is_empty() {
            let _ = game.create_flights(&code, now, config, rng);
        }
    }
}

/// Calls the race the first tick somebody holds the win. Later finishers
/// never trigger a second announcement.
fn announce_winners(game: &Game, winners_before: &[String], now: GameTime, outbox: &mut Outbox) {
    if !winners_before.is_empty() {
        return;
    }
    let winners = game.winners();
    match winners.len() {
        0 => {}
        1 => outbox.broadcast(
            game,
            MessageTag::Winner,
            &format!("{} has won the game!", winners[0]),
            true,
            now,
        ),
        n => {
            outbox.broadcast(
                game,
                MessageTag::Winner,
                &format!("{}-way tie for the win!", n),
                true,
                now,
            );
            for winner in &winners {
                outbox.broadcast(
                    game,
                    MessageTag::Winner,
                    &format!("{} is a winner!", winner),
                    true,
                    now,
                );
            }
        }
    }
}
