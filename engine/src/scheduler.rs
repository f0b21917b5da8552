use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use threadpool::ThreadPool;

use logger::{Color, Logger};
use protocol::{Envelope, EventKind};

use crate::config::GameConfig;
use crate::courier::Courier;
use crate::errors::GameError;
use crate::game::GameState;
use crate::message::Outbox;
use crate::monkeywrench::{WrenchFactory, WrenchTrigger};
use crate::repair;
use crate::store::SharedStore;
use crate::turn;
use crate::GameId;

const DELIVERY_WORKERS: usize = 4;

/// Drives one game on its own named thread: a turn per tick, a wrench when
/// the trigger says so, and everything the turn produced handed to the
/// delivery pool once the store lock is released.
///
/// The cadence is start-to-start: each tick sleeps for whatever remains of
/// `tick_millis` after the work, so a slow turn never makes the next one
/// come early, and an overrunning one is followed immediately.
pub struct TurnScheduler {
    game_id: GameId,
    store: SharedStore,
    courier: Arc<dyn Courier>,
    config: GameConfig,
    logger: Logger,
}

enum TickStep {
    Stop,
    Deliver(Vec<Envelope>),
}

impl TurnScheduler {
    pub fn new(
        game_id: GameId,
        store: SharedStore,
        courier: Arc<dyn Courier>,
        config: GameConfig,
        logger: Logger,
    ) -> Self {
        TurnScheduler {
            game_id,
            store,
            courier,
            config,
            logger,
        }
    }

    /// Starts the scheduler thread, named after its game.
    pub fn spawn(self) -> Result<JoinHandle<()>, GameError> {
        thread::Builder::new()
            .name(format!("game-{}", self.game_id))
            .spawn(move || self.run())
            .map_err(|e| GameError::ThreadError(e.to_string()))
    }

    fn run(self) {
        let mut rng = StdRng::from_entropy();
        let pool = ThreadPool::new(DELIVERY_WORKERS);
        let factory = WrenchFactory::new();
        let mut trigger = WrenchTrigger::new(self.config.max_wrench_wait_secs, &mut rng);

        if let Err(e) = self.repair_pass() {
            let _ = self.logger.error(
                &format!("game {}: repair pass failed: {}", self.game_id, e),
                true,
            );
        }

        loop {
            let tick_started = Instant::now();
            match self.tick(&mut rng, &factory, &mut trigger) {
                Ok(TickStep::Stop) => break,
                Ok(TickStep::Deliver(batch)) => {
                    if !batch.is_empty() {
                        let courier = Arc::clone(&self.courier);
                        let logger = self.logger.clone();
                        pool.execute(move || deliver_batch(&courier, batch, &logger));
                    }
                }
                Err(GameError::LockError) => {
                    // A poisoned store never heals; better to stop than spin.
                    let _ = self.logger.error(
                        &format!("game {}: store lock poisoned, stopping", self.game_id),
                        true,
                    );
                    break;
                }
                Err(e) => {
                    let _ = self
                        .logger
                        .error(&format!("game {}: tick failed: {}", self.game_id, e), true);
                }
            }
            let elapsed = tick_started.elapsed();
            thread::sleep(StdDuration::from_millis(self.config.tick_millis).saturating_sub(elapsed));
        }

        pool.join();
        let _ = self.logger.info(
            &format!("game {}: scheduler stopped", self.game_id),
            Color::Cyan,
            true,
        );
    }

    /// One-time pass over the roster before the loop starts, putting back
    /// anyone a crash left mid-air.
    fn repair_pass(&self) -> Result<(), GameError> {
        let mut store = self.store.lock()?;
        let game = store
            .game_mut(self.game_id)
            .ok_or(GameError::GameNotFound(self.game_id))?;
        let now = game.clock.now();
        let repaired = repair::fix_players(game, now);
        if repaired > 0 {
            self.logger.warn(
                &format!(
                    "game {}: walked {} stranded players back onto the board",
                    self.game_id, repaired
                ),
                true,
            )?;
        }
        Ok(())
    }

    fn tick(
        &self,
        rng: &mut StdRng,
        factory: &WrenchFactory,
        trigger: &mut WrenchTrigger,
    ) -> Result<TickStep, GameError> {
        let mut store = self.store.lock()?;
        let mut batch: Vec<Envelope> = Vec::new();

        let (notes, snapshots, ended) = {
            let game = match store.game_mut(self.game_id) {
                Some(game) => game,
                // Deleted out from under us; nothing left to drive.
                None => return Ok(TickStep::Stop),
            };
            if game.state == GameState::GameOver {
                return Ok(TickStep::Stop);
            }
            let now = game.clock.now();
            let wrench = if game.state == GameState::InProgress && trigger.due() {
                trigger.rearm(rng);
                Some(factory.pick(rng))
            } else {
                None
            };
            if let Some(kind) = wrench {
                let _ = self.logger.info(
                    &format!("game {}: throwing a {} wrench", self.game_id, kind.as_str()),
                    Color::Magenta,
                    false,
                );
            }

            let mut outbox = Outbox::new();
            let outcome = turn::take_turn(game, now, wrench, &self.config, rng, &mut outbox);
            for (username, err) in &outcome.skipped {
                let _ = self.logger.warn(
                    &format!("game {}: {} skipped a move: {}", self.game_id, username, err),
                    false,
                );
            }

            let mut snapshots = Vec::new();
            if outcome.ticked {
                for player in game.players.iter().filter(|p| !p.ai) {
                    let notify = outcome.arrivals.get(&player.username).map(String::as_str);
                    if let Some(data) = game.player_snapshot(&player.username, notify) {
                        snapshots.push(Envelope::new(EventKind::Info, data));
                    }
                }
            }
            (outbox.notes, snapshots, outcome.ended)
        };

        for note in notes {
            store.save_message(self.game_id, note);
        }
        // Notes go out before snapshots so the screen a client redraws
        // already reflects what the mail told them.
        for note in store.unread_messages_for(self.game_id) {
            batch.push(note.to_envelope());
        }
        batch.extend(snapshots);
        if ended {
            batch.push(Envelope::new(
                EventKind::GameEnded,
                json!({ "game": self.game_id }),
            ));
        }
        Ok(TickStep::Deliver(batch))
    }
}

fn deliver_batch(courier: &Arc<dyn Courier>, batch: Vec<Envelope>, logger: &Logger) {
    for envelope in batch {
        if let Err(e) = courier.deliver(envelope) {
            let _ = logger.error(&format!("delivery failed: {}", e), false);
        }
    }
}
