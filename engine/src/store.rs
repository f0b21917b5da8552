use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::game::{Game, GameState};
use crate::message::Message;
use crate::GameId;

/// Repository contract the engine runs against. One lock guards the whole
/// store; every game mutation happens while holding it, which is what keeps
/// concurrent schedulers and the operator console honest with each other.
pub trait GameStore: Send {
    /// Stores a freshly built game, assigning and returning its id.
    fn insert_game(&mut self, game: Game) -> GameId;
    fn game(&self, id: GameId) -> Option<&Game>;
    fn game_mut(&mut self, id: GameId) -> Option<&mut Game>;
    fn remove_game(&mut self, id: GameId) -> Option<Game>;
    /// Ids of games that have not finished, in ascending order.
    fn open_games(&self) -> Vec<GameId>;
    fn game_count(&self) -> usize;

    /// Persists a note under the given game, assigning and returning its id.
    fn save_message(&mut self, game: GameId, note: Message) -> u64;
    /// Takes the game's unread notes, oldest first, marking each as read.
    /// Mail belonging to other games is left alone.
    fn unread_messages_for(&mut self, game: GameId) -> Vec<Message>;
    fn messages_for(&self, username: &str) -> Vec<Message>;
}

/// The in-memory repository. Everything lives for the process lifetime and
/// no longer; restarts start from a clean slate.
pub struct MemoryStore {
    games: HashMap<GameId, Game>,
    messages: Vec<Message>,
    next_game_id: GameId,
    next_message_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            games: HashMap::new(),
            messages: Vec::new(),
            next_game_id: 1,
            next_message_id: 1,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl GameStore for MemoryStore {
    fn insert_game(&mut self, mut game: Game) -> GameId {
        let id = self.next_game_id;
        self.next_game_id += 1;
        game.id = id;
        self.games.insert(id, game);
        id
    }

    fn game(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    fn game_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    fn remove_game(&mut self, id: GameId) -> Option<Game> {
        self.games.remove(&id)
    }

    fn open_games(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self
            .games
            .values()
            .filter(|g| g.state != GameState::GameOver)
            .map(|g| g.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn game_count(&self) -> usize {
        self.games.len()
    }

    fn save_message(&mut self, game: GameId, mut note: Message) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        note.id = id;
        note.game = game;
        self.messages.push(note);
        id
    }

    fn unread_messages_for(&mut self, game: GameId) -> Vec<Message> {
        let mut fresh = Vec::new();
        for note in self.messages.iter_mut().filter(|n| n.game == game && !n.read) {
            note.read = true;
            fresh.push(note.clone());
        }
        fresh
    }

    fn messages_for(&self, username: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|n| n.username == username)
            .cloned()
            .collect()
    }
}

/// The store as the rest of the system holds it.
pub type SharedStore = Arc<Mutex<dyn GameStore>>;

pub fn shared(store: MemoryStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::message::{MessageTag, Outbox};
    use chrono::NaiveDateTime;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(timestamp: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(timestamp, crate::TIME_FORMAT).unwrap()
    }

    fn sample_game() -> Game {
        let config = GameConfig::default();
        let mut outbox = Outbox::new();
        let mut rng = StdRng::seed_from_u64(9);
        Game::create("amelia", 5, 2, &config, &mut rng, &mut outbox).unwrap()
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let mut store = MemoryStore::new();
        let first = store.insert_game(sample_game());
        let second = store.insert_game(sample_game());
        assert!(second > first);
        assert_eq!(store.game(first).unwrap().id, first);
        assert_eq!(store.game_count(), 2);
    }

    #[test]
    fn test_open_games_excludes_finished() {
        let mut store = MemoryStore::new();
        let first = store.insert_game(sample_game());
        let second = store.insert_game(sample_game());
        let mut outbox = Outbox::new();
        store
            .game_mut(first)
            .unwrap()
            .end(t("01-05-2024 11:00:00"), &mut outbox);
        assert_eq!(store.open_games(), vec![second]);
    }

    #[test]
    fn test_remove_game() {
        let mut store = MemoryStore::new();
        let id = store.insert_game(sample_game());
        assert!(store.remove_game(id).is_some());
        assert!(store.remove_game(id).is_none());
        assert_eq!(store.game_count(), 0);
    }

    #[test]
    fn test_unread_messages_drain_once_in_order() {
        let mut store = MemoryStore::new();
        let at = t("01-05-2024 11:00:00");
        store.save_message(1, Message::new("amelia", MessageTag::Default, "first", at));
        store.save_message(1, Message::new("charles", MessageTag::Goal, "second", at));

        let fresh = store.unread_messages_for(1);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].text, "first");
        assert_eq!(fresh[1].text, "second");
        assert!(fresh.iter().all(|n| n.read && n.game == 1));
        assert!(fresh[0].id > 0);

        assert!(
            store.unread_messages_for(1).is_empty(),
            "a note is flushed once"
        );
    }

    #[test]
    fn test_unread_drain_is_scoped_to_one_game() {
        let mut store = MemoryStore::new();
        let at = t("01-05-2024 11:00:00");
        store.save_message(1, Message::new("amelia", MessageTag::Default, "mine", at));
        store.save_message(2, Message::new("bessie", MessageTag::Default, "theirs", at));

        let fresh = store.unread_messages_for(1);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].text, "mine");

        // The other game's mail is untouched and still waiting.
        let theirs = store.unread_messages_for(2);
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].text, "theirs");
    }

    #[test]
    fn test_messages_for_keeps_history() {
        let mut store = MemoryStore::new();
        let at = t("01-05-2024 11:00:00");
        store.save_message(1, Message::new("amelia", MessageTag::Default, "first", at));
        store.save_message(1, Message::new("charles", MessageTag::Goal, "second", at));
        let _ = store.unread_messages_for(1);

        let history = store.messages_for("amelia");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "first");
    }
}
