use chrono::NaiveDateTime;
use serde_json::json;

use protocol::{Envelope, EventKind};

use crate::game::Game;
use crate::{GameId, TIME_FORMAT};

/// Coarse category stamped on every note so clients can style them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    Default,
    PlayerAction,
    Goal,
    Winner,
    MonkeyWrench,
    NewGame,
    GameOver,
}

impl MessageTag {
    pub fn as_str(&self) -> &str {
        match self {
            MessageTag::Default => "default",
            MessageTag::PlayerAction => "player_action",
            MessageTag::Goal => "goal",
            MessageTag::Winner => "winner",
            MessageTag::MonkeyWrench => "monkey_wrench",
            MessageTag::NewGame => "new_game",
            MessageTag::GameOver => "game_over",
        }
    }
}

/// A note addressed to one player, persisted until the scheduler flushes it
/// out to the messenger. The id and owning game are assigned by the store on
/// save, so each game's scheduler only ever drains its own mail.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub game: GameId,
    pub username: String,
    pub tag: MessageTag,
    pub text: String,
    pub created: NaiveDateTime,
    pub read: bool,
}

impl Message {
    pub fn new(username: &str, tag: MessageTag, text: &str, created: NaiveDateTime) -> Self {
        Message {
            id: 0,
            game: 0,
            username: username.to_string(),
            tag,
            text: text.to_string(),
            created,
            read: false,
        }
    }

    /// The wire form the messenger routes to the note's addressee.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(
            EventKind::PlayerMessage,
            json!({
                "player": self.username,
                "message": {
                    "id": self.id,
                    "tag": self.tag.as_str(),
                    "text": self.text,
                    "created": self.created.format(TIME_FORMAT).to_string(),
                },
            }),
        )
    }
}

/// Collects the notes produced while a game is being mutated. The caller
/// drains it into the store once the operation is done, which keeps game
/// logic free of any store or socket handle.
#[derive(Debug, Default)]
pub struct Outbox {
    pub notes: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Outbox { notes: Vec::new() }
    }

    /// Queues a note for a single player.
    pub fn send(&mut self, username: &str, tag: MessageTag, text: &str, at: NaiveDateTime) {
        self.notes.push(Message::new(username, tag, text, at));
    }

    /// Queues one copy of the note per human player in the game. Players who
    /// already finished only hear about it when `finishers` is set; they are
    /// out of the race and routine chatter would just be noise to them.
    pub fn broadcast(
        &mut self,
        game: &Game,
        tag: MessageTag,
        text: &str,
        finishers: bool,
        at: NaiveDateTime,
    ) {
        for player in game.players.iter().filter(|p| !p.ai) {
            if !finishers && player.finished() {
                continue;
            }
            self.send(&player.username, tag, text, at);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }
}
