use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use engine::courier::Courier;
use engine::ops;
use engine::store::SharedStore;
use engine::GameError;
use logger::{Color, Logger};
use protocol::{Envelope, EventKind, Serializable};

use crate::errors::MessengerError;
use crate::registry::Registry;

enum RelayAction {
    Continue,
    Stop,
}

/// Starts the loopback listener the engine relays outbound traffic through.
/// Every envelope must carry the shared key; one that does not is logged and
/// dropped. The key is coarse mutual trust between the engine and this
/// service, nothing more — the listener must never face untrusted clients.
///
/// The caller binds the listener so tests can pick a free port. The thread
/// runs until a keyed `shutdown` envelope arrives.
pub fn spawn_relay_listener(
    listener: TcpListener,
    key: &str,
    registry: Arc<Registry>,
    store: SharedStore,
    logger: Logger,
) -> Result<JoinHandle<()>, MessengerError> {
    let key = key.to_string();
    let addr = listener.local_addr()?;
    let stopping = Arc::new(AtomicBool::new(false));
    thread::Builder::new()
        .name("relay".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let key = key.clone();
                        let registry = Arc::clone(&registry);
                        let store = Arc::clone(&store);
                        let conn_logger = logger.clone();
                        let stopping = Arc::clone(&stopping);
                        let spawned = thread::Builder::new().name("relay-conn".to_string()).spawn(
                            move || {
                                handle_relay_connection(
                                    stream, addr, &key, &registry, &store, &conn_logger, &stopping,
                                )
                            },
                        );
                        if let Err(e) = spawned {
                            let _ = logger
                                .error(&format!("relay: could not spawn handler: {}", e), true);
                        }
                    }
                    Err(e) => {
                        let _ = logger.error(&format!("relay: accept failed: {}", e), false);
                    }
                }
            }
            let _ = logger.info("relay: listener stopped", Color::Cyan, true);
        })
        .map_err(|e| MessengerError::ThreadError(e.to_string()))
}

fn handle_relay_connection(
    stream: TcpStream,
    addr: SocketAddr,
    key: &str,
    registry: &Registry,
    store: &SharedStore,
    logger: &Logger,
    stopping: &AtomicBool,
) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) if !line.trim().is_empty() => line,
            Ok(_) => continue,
            Err(_) => break,
        };
        match Envelope::from_bytes(line.as_bytes()) {
            Ok(envelope) => {
                if !envelope.authenticates(key) {
                    let _ = logger.error("relay: someone is knocking with a bad key", true);
                    continue;
                }
                match dispatch(envelope, registry, store, logger) {
                    RelayAction::Continue => {}
                    RelayAction::Stop => {
                        stopping.store(true, Ordering::SeqCst);
                        // Poke the accept loop awake so it sees the flag.
                        let _ = TcpStream::connect(addr);
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = logger.error(&format!("relay: dropped an envelope: {}", e), false);
            }
        }
    }
}

/// Routes one authenticated envelope. The key never travels further: what
/// the registry writes out is rebuilt without it.
fn dispatch(
    envelope: Envelope,
    registry: &Registry,
    store: &SharedStore,
    logger: &Logger,
) -> RelayAction {
    let outbound = Envelope::new(envelope.kind, envelope.data);
    match outbound.kind {
        EventKind::Info | EventKind::PlayerMessage => {
            match outbound.data.get("player").and_then(|v| v.as_str()) {
                Some(player) => {
                    registry.message(player, &outbound);
                }
                None => {
                    let _ = logger.warn("relay: addressed envelope without a player", false);
                }
            }
        }
        EventKind::GameCreated | EventKind::GameEnded => match ops::games_summary(store) {
            Ok(summary) => {
                registry.broadcast_menu(&Envelope::new(EventKind::GamesInfo, summary));
            }
            Err(e) => {
                let _ = logger.error(&format!("relay: games summary failed: {}", e), false);
            }
        },
        EventKind::Wall => {
            registry.broadcast(&outbound, &[]);
        }
        EventKind::Shutdown => {
            let _ = logger.info("relay: shutdown requested", Color::Yellow, true);
            return RelayAction::Stop;
        }
        // Client-side kinds have no business on the relay.
        EventKind::Hello | EventKind::Page | EventKind::GamesInfo => {
            let _ = logger.warn(
                &format!("relay: ignoring a {} envelope", outbound.kind.as_str()),
                false,
            );
        }
    }
    RelayAction::Continue
}

/// The engine's side of the relay: a courier that stamps the shared key on
/// every envelope and writes it down one reused loopback connection,
/// reconnecting once when the old one has gone stale.
pub struct RelayClient {
    addr: SocketAddr,
    key: String,
    stream: Mutex<Option<TcpStream>>,
}

impl RelayClient {
    pub fn new(addr: SocketAddr, key: &str) -> Self {
        RelayClient {
            addr,
            key: key.to_string(),
            stream: Mutex::new(None),
        }
    }

    fn encode(&self, envelope: Envelope) -> Result<Vec<u8>, GameError> {
        let keyed = Envelope::with_key(envelope.kind, &self.key, envelope.data);
        let mut line = keyed.to_bytes()?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Courier for RelayClient {
    fn deliver(&self, envelope: Envelope) -> Result<(), GameError> {
        let line = self.encode(envelope)?;
        let mut guard = self.stream.lock()?;
        if let Some(stream) = guard.as_mut() {
            if write_line(stream, &line).is_ok() {
                return Ok(());
            }
            *guard = None;
        }
        let mut stream = TcpStream::connect(self.addr)
            .map_err(|e| GameError::DeliveryError(format!("relay unreachable: {}", e)))?;
        write_line(&mut stream, &line)
            .map_err(|e| GameError::DeliveryError(format!("relay write failed: {}", e)))?;
        *guard = Some(stream);
        Ok(())
    }
}

fn write_line(stream: &mut TcpStream, line: &[u8]) -> std::io::Result<()> {
    stream.write_all(line)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Page;
    use engine::store::{self, MemoryStore};
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    fn test_logger(tag: &str) -> Logger {
        Logger::new(Path::new("/tmp/test_relay_logs"), tag).unwrap()
    }

    /// A connected stream pair: the registry writes one end, the test reads
    /// the other.
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    fn read_envelope(stream: &mut TcpStream) -> Option<Envelope> {
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(n) if n > 0 => Envelope::from_bytes(line.trim_end().as_bytes()).ok(),
            _ => None,
        }
    }

    struct RelayFixture {
        client: RelayClient,
        handle: JoinHandle<()>,
        registry: Arc<Registry>,
    }

    fn relay_fixture(key: &str) -> RelayFixture {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(Registry::new());
        let store = store::shared(MemoryStore::new());
        let handle = spawn_relay_listener(
            listener,
            key,
            Arc::clone(&registry),
            store,
            test_logger("listener"),
        )
        .unwrap();
        RelayFixture {
            client: RelayClient::new(addr, key),
            handle,
            registry,
        }
    }

    fn shutdown(fx: RelayFixture) {
        fx.client
            .deliver(Envelope::new(EventKind::Shutdown, json!(null)))
            .unwrap();
        fx.handle.join().unwrap();
    }

    #[test]
    fn test_keyed_note_crosses_the_relay() {
        let fx = relay_fixture("sesame");
        let (sink, mut client_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(sink)));

        fx.client
            .deliver(Envelope::new(
                EventKind::PlayerMessage,
                json!({"player": "amelia", "message": {"text": "hi"}}),
            ))
            .unwrap();

        let received = read_envelope(&mut client_end).expect("nothing crossed the relay");
        assert_eq!(received.kind, EventKind::PlayerMessage);
        assert_eq!(received.data["message"]["text"], "hi");
        assert!(received.key.is_none(), "the key must not leak to clients");
        shutdown(fx);
    }

    #[test]
    fn test_bad_key_is_dropped_without_side_effects() {
        let fx = relay_fixture("sesame");
        let (sink, mut client_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(sink)));

        // An impostor with the wrong key, straight onto the socket.
        let impostor = RelayClient::new(fx.client.addr, "wrong");
        impostor
            .deliver(Envelope::new(
                EventKind::Wall,
                json!({"text": "let me in"}),
            ))
            .unwrap();

        assert!(
            read_envelope(&mut client_end).is_none(),
            "an unauthenticated envelope reached a client"
        );
        shutdown(fx);
    }

    #[test]
    fn test_lifecycle_event_refreshes_the_menu() {
        let fx = relay_fixture("sesame");
        let (menu_sink, mut menu_end) = socket_pair();
        let (game_sink, mut game_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(menu_sink)));
        let playing = fx
            .registry
            .register("charles", Arc::new(Mutex::new(game_sink)));
        fx.registry.set_page(playing, Page::InGame(1));

        fx.client
            .deliver(Envelope::new(EventKind::GameCreated, json!({"game": 1})))
            .unwrap();

        let received = read_envelope(&mut menu_end).expect("menu feed never arrived");
        assert_eq!(received.kind, EventKind::GamesInfo);
        assert!(received.data["games"].as_array().unwrap().is_empty());
        assert!(read_envelope(&mut game_end).is_none(), "not for game pages");
        shutdown(fx);
    }

    #[test]
    fn test_wall_reaches_everyone() {
        let fx = relay_fixture("sesame");
        let (first_sink, mut first_end) = socket_pair();
        let (second_sink, mut second_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(first_sink)));
        let playing = fx
            .registry
            .register("charles", Arc::new(Mutex::new(second_sink)));
        fx.registry.set_page(playing, Page::InGame(3));

        fx.client
            .deliver(Envelope::new(EventKind::Wall, json!({"text": "going down"})))
            .unwrap();

        assert_eq!(
            read_envelope(&mut first_end).unwrap().data["text"],
            "going down"
        );
        assert_eq!(
            read_envelope(&mut second_end).unwrap().data["text"],
            "going down"
        );
        shutdown(fx);
    }

    #[test]
    fn test_client_reconnects_after_a_stale_stream() {
        let fx = relay_fixture("sesame");
        let (sink, mut client_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(sink)));

        fx.client
            .deliver(Envelope::new(
                EventKind::PlayerMessage,
                json!({"player": "amelia", "message": {"text": "first"}}),
            ))
            .unwrap();
        assert!(read_envelope(&mut client_end).is_some());

        // Sour the cached connection behind the client's back.
        {
            let mut guard = fx.client.stream.lock().unwrap();
            if let Some(stream) = guard.as_mut() {
                stream.shutdown(std::net::Shutdown::Both).unwrap();
            }
        }

        fx.client
            .deliver(Envelope::new(
                EventKind::PlayerMessage,
                json!({"player": "amelia", "message": {"text": "second"}}),
            ))
            .unwrap();
        let received = read_envelope(&mut client_end).expect("reconnect never happened");
        assert_eq!(received.data["message"]["text"], "second");
        shutdown(fx);
    }

    #[test]
    fn test_garbage_on_the_wire_is_ignored() {
        let fx = relay_fixture("sesame");
        let (sink, mut client_end) = socket_pair();
        fx.registry
            .register("amelia", Arc::new(Mutex::new(sink)));

        let mut raw = TcpStream::connect(fx.client.addr).unwrap();
        raw.write_all(b"{\"type\": \"teleport\", \"data\": {}}\n").unwrap();
        raw.write_all(b"not json\n").unwrap();
        raw.flush().unwrap();

        assert!(read_envelope(&mut client_end).is_none());
        shutdown(fx);
    }
}
