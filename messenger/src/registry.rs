use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use engine::GameId;
use protocol::{Envelope, EventKind, Serializable};

/// Where a session's screen currently is. An `info` snapshot repaints the
/// in-game view, so it only goes to sessions looking at that game; anywhere
/// else it would stomp on whatever the client is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Menu,
    InGame(GameId),
}

struct Session<W> {
    username: String,
    page: Page,
    sink: Arc<Mutex<W>>,
}

/// The process-wide roster of live client connections, guarded by one mutex.
/// Delivery snapshots the matching sessions under the lock and writes with
/// the lock released, so a client connecting or dropping mid-broadcast never
/// trips anyone else. A session whose write fails is evicted on the spot.
///
/// Generic over the sink so tests can hand it plain buffers; the service
/// runs it over `TcpStream`.
pub struct Registry<W = TcpStream> {
    sessions: Mutex<HashMap<Uuid, Session<W>>>,
}

impl<W: Write + Send> Registry<W> {
    pub fn new() -> Self {
        Registry {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a connection for `username`, starting on the menu page.
    pub fn register(&self, username: &str, sink: Arc<Mutex<W>>) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(
                id,
                Session {
                    username: username.to_string(),
                    page: Page::Menu,
                    sink,
                },
            );
        }
        id
    }

    pub fn set_page(&self, session_id: Uuid, page: Page) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(session) = sessions.get_mut(&session_id) {
                session.page = page;
            }
        }
    }

    pub fn remove(&self, session_id: Uuid) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&session_id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Delivers to every live connection of `username`. `info` envelopes are
    /// suppressed for sessions not on the game's page. Returns how many
    /// connections got the envelope.
    pub fn message(&self, username: &str, envelope: &Envelope) -> usize {
        self.write_to(|session| {
            session.username == username && wants(session.page, envelope)
        }, envelope)
    }

    /// Delivers to every live connection except the excluded sessions.
    pub fn broadcast(&self, envelope: &Envelope, exclude: &[Uuid]) -> usize {
        let targets = self.snapshot(|id, _| !exclude.contains(id));
        self.deliver(targets, envelope)
    }

    /// Delivers to every session currently on the menu page.
    pub fn broadcast_menu(&self, envelope: &Envelope) -> usize {
        self.write_to(|session| session.page == Page::Menu, envelope)
    }

    /// Delivers to one specific session.
    pub fn send(&self, session_id: Uuid, envelope: &Envelope) -> usize {
        let targets = self.snapshot(|id, _| *id == session_id);
        self.deliver(targets, envelope)
    }

    fn write_to<F>(&self, keep: F, envelope: &Envelope) -> usize
    where
        F: Fn(&Session<W>) -> bool,
    {
        let targets = self.snapshot(|_, session| keep(session));
        self.deliver(targets, envelope)
    }

    /// The matching sessions' sinks, cloned out from under the lock.
    fn snapshot<F>(&self, keep: F) -> Vec<(Uuid, Arc<Mutex<W>>)>
    where
        F: Fn(&Uuid, &Session<W>) -> bool,
    {
        match self.sessions.lock() {
            Ok(sessions) => sessions
                .iter()
                .filter(|(id, session)| keep(id, session))
                .map(|(id, session)| (*id, Arc::clone(&session.sink)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn deliver(&self, targets: Vec<(Uuid, Arc<Mutex<W>>)>, envelope: &Envelope) -> usize {
        let line = match envelope.to_bytes() {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                bytes
            }
            Err(_) => return 0,
        };
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sink) in targets {
            let written = match sink.lock() {
                Ok(mut sink) => sink.write_all(&line).and_then(|_| sink.flush()).is_ok(),
                Err(_) => false,
            };
            if written {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            self.remove(id);
        }
        delivered
    }
}

impl<W: Write + Send> Default for Registry<W> {
    fn default() -> Self {
        Registry::new()
    }
}

/// Whether a session's page wants this envelope. Only `info` is picky.
fn wants(page: Page, envelope: &Envelope) -> bool {
    if envelope.kind != EventKind::Info {
        return true;
    }
    match envelope.data.get("game").and_then(|v| v.as_u64()) {
        Some(game) => page == Page::InGame(game),
        None => matches!(page, Page::InGame(_)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

    fn sink() -> Arc<Mutex<Vec<u8>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn lines(sink: &Arc<Mutex<Vec<u8>>>) -> Vec<Envelope> {
        let raw = sink.lock().unwrap().clone();
        raw.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| Envelope::from_bytes(line).unwrap())
            .collect()
    }

    #[test]
    fn test_message_reaches_every_session_of_the_user() {
        let registry: Registry<Vec<u8>> = Registry::new();
        let first = sink();
        let second = sink();
        let other = sink();
        registry.register("amelia", Arc::clone(&first));
        registry.register("amelia", Arc::clone(&second));
        registry.register("charles", Arc::clone(&other));

        let note = Envelope::new(EventKind::PlayerMessage, json!({"player": "amelia"}));
        assert_eq!(registry.message("amelia", &note), 2);
        assert_eq!(lines(&first).len(), 1);
        assert_eq!(lines(&second).len(), 1);
        assert!(lines(&other).is_empty());
        assert_eq!(registry.message("nobody", &note), 0);
    }

    #[test]
    fn test_info_only_lands_on_the_game_page() {
        let registry: Registry<Vec<u8>> = Registry::new();
        let menu = sink();
        let in_game = sink();
        let wrong_game = sink();
        registry.register("amelia", Arc::clone(&menu));
        let playing = registry.register("amelia", Arc::clone(&in_game));
        let elsewhere = registry.register("amelia", Arc::clone(&wrong_game));
        registry.set_page(playing, Page::InGame(7));
        registry.set_page(elsewhere, Page::InGame(9));

        let info = Envelope::new(EventKind::Info, json!({"player": "amelia", "game": 7}));
        assert_eq!(registry.message("amelia", &info), 1);
        assert!(lines(&menu).is_empty(), "menu sessions keep their screen");
        assert_eq!(lines(&in_game).len(), 1);
        assert!(lines(&wrong_game).is_empty());

        // Everything else goes everywhere the user is.
        let note = Envelope::new(EventKind::PlayerMessage, json!({"player": "amelia"}));
        assert_eq!(registry.message("amelia", &note), 3);
    }

    #[test]
    fn test_broadcast_skips_excluded_sessions() {
        let registry: Registry<Vec<u8>> = Registry::new();
        let first = sink();
        let second = sink();
        let skipped = registry.register("amelia", Arc::clone(&first));
        registry.register("charles", Arc::clone(&second));

        let wall = Envelope::new(EventKind::Wall, json!({"text": "towers down at noon"}));
        assert_eq!(registry.broadcast(&wall, &[skipped]), 1);
        assert!(lines(&first).is_empty());
        assert_eq!(lines(&second).len(), 1);
    }

    #[test]
    fn test_broadcast_menu_targets_menu_pages_only() {
        let registry: Registry<Vec<u8>> = Registry::new();
        let menu = sink();
        let in_game = sink();
        registry.register("amelia", Arc::clone(&menu));
        let playing = registry.register("charles", Arc::clone(&in_game));
        registry.set_page(playing, Page::InGame(1));

        let feed = Envelope::new(EventKind::GamesInfo, json!({"games": []}));
        assert_eq!(registry.broadcast_menu(&feed), 1);
        assert_eq!(lines(&menu).len(), 1);
        assert!(lines(&in_game).is_empty());
    }

    #[test]
    fn test_remove_and_send_to_one_session() {
        let registry: Registry<Vec<u8>> = Registry::new();
        let first = sink();
        let second = sink();
        let target = registry.register("amelia", Arc::clone(&first));
        let gone = registry.register("amelia", Arc::clone(&second));
        registry.remove(gone);
        assert_eq!(registry.session_count(), 1);

        let feed = Envelope::new(EventKind::GamesInfo, json!({"games": []}));
        assert_eq!(registry.send(target, &feed), 1);
        assert_eq!(registry.send(gone, &feed), 0);
    }

    /// A sink that always fails, standing in for a hung-up client.
    struct BrokenPipe;

    impl io::Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_evicts_the_session() {
        let registry: Registry<BrokenPipe> = Registry::new();
        registry.register("amelia", Arc::new(Mutex::new(BrokenPipe)));
        assert_eq!(registry.session_count(), 1);

        let wall = Envelope::new(EventKind::Wall, json!({"text": "hello?"}));
        assert_eq!(registry.broadcast(&wall, &[]), 0);
        assert_eq!(registry.session_count(), 0, "dead sessions get swept");
    }
}
