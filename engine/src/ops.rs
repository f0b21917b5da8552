use std::sync::Arc;
use std::thread::JoinHandle;

use serde_json::{json, Value};

use logger::{Color, Logger};
use protocol::{Envelope, EventKind};

use crate::config::GameConfig;
use crate::courier::Courier;
use crate::errors::GameError;
use crate::game::{Game, GameState};
use crate::message::Outbox;
use crate::scheduler::TurnScheduler;
use crate::store::SharedStore;
use crate::GameId;

/// The engine's public operations, as the operator console and any other
/// adapter call them. Every method locks the store, mutates one game, and
/// does its delivery only after the lock is gone; a slow relay never holds
/// up a game.
pub struct GameOps {
    store: SharedStore,
    courier: Arc<dyn Courier>,
    config: GameConfig,
    logger: Logger,
}

impl GameOps {
    pub fn new(
        store: SharedStore,
        courier: Arc<dyn Courier>,
        config: GameConfig,
        logger: Logger,
    ) -> Self {
        GameOps {
            store,
            courier,
            config,
            logger,
        }
    }

    /// Builds a game for `host` and shelves it unstarted. Other players can
    /// join until `start_game` fires the gun.
    pub fn create_game(
        &self,
        host: &str,
        airport_count: usize,
        goal_count: usize,
    ) -> Result<GameId, GameError> {
        let mut outbox = Outbox::new();
        let mut rng = rand::thread_rng();
        let game = Game::create(
            host,
            airport_count,
            goal_count,
            &self.config,
            &mut rng,
            &mut outbox,
        )?;
        let id = {
            let mut store = self.store.lock()?;
            let id = store.insert_game(game);
            for note in outbox.notes.drain(..) {
                store.save_message(id, note);
            }
            id
        };
        self.logger.info(
            &format!("game {}: created by {}", id, host),
            Color::Green,
            true,
        )?;
        self.deliver(Envelope::new(EventKind::GameCreated, json!({ "game": id })));
        // No scheduler runs yet, so the host's new-game note goes out here.
        self.flush_notes(id)?;
        Ok(id)
    }

    pub fn join_game(&self, id: GameId, username: &str) -> Result<(), GameError> {
        {
            let mut store = self.store.lock()?;
            let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
            game.add_player(username, false)?;
        }
        self.logger.info(
            &format!("game {}: {} joined", id, username),
            Color::Green,
            true,
        )?;
        self.deliver(Envelope::new(EventKind::GameCreated, json!({ "game": id })));
        Ok(())
    }

    /// Starts the race and its scheduler thread.
    pub fn start_game(&self, id: GameId) -> Result<JoinHandle<()>, GameError> {
        {
            let mut store = self.store.lock()?;
            let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
            let mut outbox = Outbox::new();
            game.begin(self.config.time_factor, &mut outbox)?;
            for note in outbox.notes.drain(..) {
                store.save_message(id, note);
            }
        }
        self.logger
            .info(&format!("game {}: started", id), Color::Green, true)?;
        self.spawn_scheduler(id)
    }

    pub fn pause_game(&self, id: GameId) -> Result<(), GameError> {
        let mut store = self.store.lock()?;
        let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
        let mut outbox = Outbox::new();
        game.pause(&mut outbox)?;
        for note in outbox.notes.drain(..) {
            store.save_message(id, note);
        }
        Ok(())
    }

    pub fn resume_game(&self, id: GameId) -> Result<(), GameError> {
        let mut store = self.store.lock()?;
        let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
        let mut outbox = Outbox::new();
        game.resume(&mut outbox)?;
        for note in outbox.notes.drain(..) {
            store.save_message(id, note);
        }
        Ok(())
    }

    /// Pauses every open game that is running. Returns how many paused.
    pub fn pause_all(&self) -> Result<usize, GameError> {
        self.for_each_open(|ops, id| ops.pause_game(id))
    }

    /// Resumes every open game that is paused. Returns how many resumed.
    pub fn resume_all(&self) -> Result<usize, GameError> {
        self.for_each_open(|ops, id| ops.resume_game(id))
    }

    /// Force-quits a game. Its scheduler notices at the top of its next tick
    /// and exits, so the game-over mail is flushed here instead.
    pub fn end_game(&self, id: GameId) -> Result<(), GameError> {
        {
            let mut store = self.store.lock()?;
            let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
            let now = game.clock.now();
            let mut outbox = Outbox::new();
            game.end(now, &mut outbox);
            for note in outbox.notes.drain(..) {
                store.save_message(id, note);
            }
        }
        self.logger
            .info(&format!("game {}: ended", id), Color::Yellow, true)?;
        self.flush_notes(id)?;
        self.deliver(Envelope::new(EventKind::GameEnded, json!({ "game": id })));
        Ok(())
    }

    /// Drops the game from the repository. A running scheduler finds nothing
    /// to drive and stops on its own.
    pub fn delete_game(&self, id: GameId) -> Result<(), GameError> {
        {
            let mut store = self.store.lock()?;
            store.remove_game(id).ok_or(GameError::GameNotFound(id))?;
        }
        self.logger
            .info(&format!("game {}: deleted", id), Color::Yellow, true)?;
        self.deliver(Envelope::new(EventKind::GameEnded, json!({ "game": id })));
        Ok(())
    }

    /// Buys a seat for a player, at the game clock's current time.
    pub fn purchase_ticket(
        &self,
        id: GameId,
        username: &str,
        flight_id: crate::FlightId,
    ) -> Result<(), GameError> {
        let mut store = self.store.lock()?;
        let game = store.game_mut(id).ok_or(GameError::GameNotFound(id))?;
        let now = game.clock.now();
        game.purchase(username, flight_id, now)
    }

    /// Respawns a scheduler for every game the repository says is mid-race.
    /// Run once at boot; each scheduler heals its own players before ticking.
    pub fn respawn_open_games(&self) -> Result<Vec<JoinHandle<()>>, GameError> {
        let running: Vec<GameId> = {
            let store = self.store.lock()?;
            store
                .open_games()
                .into_iter()
                .filter(|id| {
                    matches!(
                        store.game(*id).map(|g| g.state),
                        Some(GameState::InProgress) | Some(GameState::Paused)
                    )
                })
                .collect()
        };
        let mut handles = Vec::new();
        for id in running {
            self.logger.info(
                &format!("game {}: scheduler respawned at boot", id),
                Color::Cyan,
                true,
            )?;
            handles.push(self.spawn_scheduler(id)?);
        }
        Ok(handles)
    }

    fn spawn_scheduler(&self, id: GameId) -> Result<JoinHandle<()>, GameError> {
        TurnScheduler::new(
            id,
            Arc::clone(&self.store),
            Arc::clone(&self.courier),
            self.config.clone(),
            self.logger.clone(),
        )
        .spawn()
    }

    fn for_each_open<F>(&self, apply: F) -> Result<usize, GameError>
    where
        F: Fn(&Self, GameId) -> Result<(), GameError>,
    {
        let open = {
            let store = self.store.lock()?;
            store.open_games()
        };
        let mut touched = 0;
        for id in open {
            match apply(self, id) {
                Ok(()) => touched += 1,
                // Games in the wrong state just sit the sweep out.
                Err(GameError::SchedulingError(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(touched)
    }

    /// Hands the game's unread notes to the courier, oldest first.
    fn flush_notes(&self, id: GameId) -> Result<(), GameError> {
        let fresh = self.store.lock()?.unread_messages_for(id);
        for note in fresh {
            self.deliver(note.to_envelope());
        }
        Ok(())
    }

    /// Delivery is fire-and-forget: a relay failure is logged, never raised,
    /// so game state and wire state cannot disagree about what happened.
    fn deliver(&self, envelope: Envelope) {
        if let Err(e) = self.courier.deliver(envelope) {
            let _ = self.logger.error(&format!("delivery failed: {}", e), false);
        }
    }
}

/// The open-games listing behind the `games_info` feed and the console's
/// `games` command. Reads the repository only; never touches live game state.
pub fn games_summary(store: &SharedStore) -> Result<Value, GameError> {
    let store = store.lock()?;
    let mut rows = Vec::new();
    for id in store.open_games() {
        if let Some(game) = store.game(id) {
            rows.push(json!({
                "game": game.id,
                "host": game.host,
                "state": game.state.as_str(),
                "players": game.players.len(),
                "airports": game.airports.len(),
                "goals": game.goals.len(),
            }));
        }
    }
    Ok(json!({ "games": rows }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courier::RecordingCourier;
    use crate::store::{self, MemoryStore};
    use std::path::Path;
    use std::time::Duration as StdDuration;

    struct Fixture {
        ops: GameOps,
        store: SharedStore,
        courier: Arc<RecordingCourier>,
    }

    fn fixture() -> Fixture {
        let mut config = GameConfig::default();
        config.tick_millis = 20;
        config.max_wrench_wait_secs = 3600;
        let store = store::shared(MemoryStore::new());
        let courier = Arc::new(RecordingCourier::new());
        let courier_dyn: Arc<dyn Courier> = courier.clone();
        let logger = Logger::new(Path::new("/tmp/test_ops_logs"), "ops").unwrap();
        Fixture {
            ops: GameOps::new(Arc::clone(&store), courier_dyn, config, logger),
            store,
            courier,
        }
    }

    #[test]
    fn test_create_announces_and_mails_the_host() {
        let fx = fixture();
        let id = fx.ops.create_game("amelia", 5, 2).unwrap();

        let sent = fx.courier.take();
        assert!(sent
            .iter()
            .any(|e| e.kind == EventKind::GameCreated && e.data["game"] == id));
        assert!(
            sent.iter().any(|e| e.kind == EventKind::PlayerMessage
                && e.data["player"] == "amelia"),
            "the host never got the new-game note"
        );

        let summary = games_summary(&fx.store).unwrap();
        let rows = summary["games"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["host"], "amelia");
        assert_eq!(rows[0]["state"], "not_started");
        assert_eq!(rows[0]["players"], 2, "host plus the autopilot");
    }

    #[test]
    fn test_join_only_before_start() {
        let fx = fixture();
        let id = fx.ops.create_game("amelia", 5, 2).unwrap();
        fx.ops.join_game(id, "charles").unwrap();
        assert!(fx.ops.join_game(id, "charles").is_err(), "no duplicates");
        assert!(matches!(
            fx.ops.join_game(99, "bessie"),
            Err(GameError::GameNotFound(99))
        ));

        let handle = fx.ops.start_game(id).unwrap();
        assert!(fx.ops.join_game(id, "late").is_err());
        fx.ops.end_game(id).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_start_spawns_a_scheduler_that_end_stops() {
        let fx = fixture();
        let id = fx.ops.create_game("amelia", 5, 2).unwrap();
        let handle = fx.ops.start_game(id).unwrap();
        assert!(fx.ops.start_game(id).is_err(), "cannot start twice");

        std::thread::sleep(StdDuration::from_millis(60));
        fx.ops.end_game(id).unwrap();
        handle.join().unwrap();

        let sent = fx.courier.take();
        assert!(sent
            .iter()
            .any(|e| e.kind == EventKind::GameEnded && e.data["game"] == id));
        assert!(
            sent.iter().any(|e| e.kind == EventKind::PlayerMessage
                && e.data["message"]["tag"] == "game_over"),
            "the game-over note was never flushed"
        );
        assert_eq!(
            fx.store.lock().unwrap().game(id).unwrap().state,
            GameState::GameOver
        );
    }

    #[test]
    fn test_pause_all_skips_games_not_running() {
        let fx = fixture();
        let idle = fx.ops.create_game("amelia", 5, 2).unwrap();
        let running = fx.ops.create_game("charles", 5, 2).unwrap();
        let handle = fx.ops.start_game(running).unwrap();

        assert_eq!(fx.ops.pause_all().unwrap(), 1, "only the running game");
        assert_eq!(
            fx.store.lock().unwrap().game(running).unwrap().state,
            GameState::Paused
        );
        assert_eq!(fx.ops.resume_all().unwrap(), 1);

        assert!(fx.ops.pause_game(idle).is_err(), "unstarted games cannot pause");
        fx.ops.end_game(running).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_delete_stops_the_scheduler() {
        let fx = fixture();
        let id = fx.ops.create_game("amelia", 5, 2).unwrap();
        let handle = fx.ops.start_game(id).unwrap();

        fx.ops.delete_game(id).unwrap();
        handle.join().unwrap();
        assert!(matches!(
            fx.ops.delete_game(id),
            Err(GameError::GameNotFound(_))
        ));
        assert_eq!(fx.store.lock().unwrap().game_count(), 0);
    }

    #[test]
    fn test_purchase_uses_the_game_clock() {
        let fx = fixture();
        let id = fx.ops.create_game("amelia", 5, 2).unwrap();
        let handle = fx.ops.start_game(id).unwrap();

        let flight_id = {
            let mut store = fx.store.lock().unwrap();
            let game = store.game_mut(id).unwrap();
            let start = game.start_airport.clone();
            let dest = game.airport(&start).unwrap().destinations[0].clone();
            let depart = game.clock.now() + chrono::Duration::hours(1);
            game.add_flight(&start, &dest, depart, 60)
        };
        fx.ops.purchase_ticket(id, "amelia", flight_id).unwrap();
        assert!(matches!(
            fx.ops.purchase_ticket(id, "nobody", flight_id),
            Err(GameError::PlayerNotFound(_))
        ));

        fx.ops.end_game(id).unwrap();
        handle.join().unwrap();
    }
}
