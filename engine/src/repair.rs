use crate::game::Game;
use crate::player::Player;
use crate::GameTime;

/// Puts stranded players back on the board. A player is in limbo when they
/// are at no airport and hold no ticket on a flight in the air, which only
/// happens when a crash cut a turn short. A landed ticket puts them at its
/// destination, a dead or future one back at its origin, and no ticket at
/// all back at the start airport.
pub fn fix_players(game: &mut Game, now: GameTime) -> usize {
    let start_airport = game.start_airport.clone();
    let stranded: Vec<usize> = game
        .players
        .iter()
        .enumerate()
        .filter(|(_, player)| in_limbo(game, player, now))
        .map(|(index, _)| index)
        .collect();

    for index in &stranded {
        let refuge = game.players[*index]
            .ticket
            .and_then(|id| game.flight(id))
            .map(|f| {
                if f.has_landed(now) {
                    f.destination.clone()
                } else {
                    f.origin.clone()
                }
            });
        let player = &mut game.players[*index];
        player.airport = Some(refuge.unwrap_or_else(|| start_airport.clone()));
        player.ticket = None;
    }
    stranded.len()
}

fn in_limbo(game: &Game, player: &Player, now: GameTime) -> bool {
    if player.airport.is_some() {
        return false;
    }
    match player.ticket {
        Some(flight_id) => game
            .flight(flight_id)
            .map(|f| !f.in_flight(now))
            .unwrap_or(true),
        None => true,
    }
}
