use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use engine::ops;
use engine::store::SharedStore;
use logger::{Color, Logger};
use protocol::{Envelope, EventKind, Serializable};

use crate::errors::MessengerError;
use crate::registry::{Page, Registry};

/// Starts the listener game clients connect to. Each connection gets its own
/// thread; a session opens with a `hello` envelope naming the player and is
/// answered with the current `games_info` feed, after which the client only
/// speaks to report page changes. Everything it receives beyond that comes
/// from the engine through the relay.
pub fn spawn_client_listener(
    listener: TcpListener,
    registry: Arc<Registry>,
    store: SharedStore,
    logger: Logger,
) -> Result<JoinHandle<()>, MessengerError> {
    thread::Builder::new()
        .name("client-listener".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let registry = Arc::clone(&registry);
                        let store = Arc::clone(&store);
                        let conn_logger = logger.clone();
                        let spawned =
                            thread::Builder::new().name("client-conn".to_string()).spawn(
                                move || {
                                    if let Err(e) =
                                        handle_session(stream, &registry, &store, &conn_logger)
                                    {
                                        let _ = conn_logger
                                            .warn(&format!("client session ended: {}", e), false);
                                    }
                                },
                            );
                        if let Err(e) = spawned {
                            let _ = logger
                                .error(&format!("could not spawn a session: {}", e), true);
                        }
                    }
                    Err(e) => {
                        let _ = logger.error(&format!("client accept failed: {}", e), false);
                    }
                }
            }
        })
        .map_err(|e| MessengerError::ThreadError(e.to_string()))
}

fn handle_session(
    stream: TcpStream,
    registry: &Registry,
    store: &SharedStore,
    logger: &Logger,
) -> Result<(), MessengerError> {
    let mut reader = BufReader::new(stream.try_clone()?);

    // Nothing happens until the client says who it is.
    let username = match expect_hello(&mut reader)? {
        Some(username) => username,
        None => return Ok(()),
    };
    let sink = Arc::new(Mutex::new(stream));
    let session_id = registry.register(&username, sink);
    logger.info(
        &format!("{} connected ({})", username, session_id),
        Color::Blue,
        true,
    )?;
    registry.send(session_id, &games_feed(store)?);

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }
        match Envelope::from_bytes(line.trim_end().as_bytes()) {
            Ok(envelope) => match envelope.kind {
                EventKind::Page => registry.set_page(session_id, read_page(&envelope)),
                EventKind::Hello => {
                    registry.send(session_id, &games_feed(store)?);
                }
                other => {
                    let _ = logger.warn(
                        &format!("{} sent a {} envelope; ignored", username, other.as_str()),
                        false,
                    );
                }
            },
            Err(e) => {
                let _ = logger.warn(&format!("{} sent garbage: {}", username, e), false);
            }
        }
    }

    registry.remove(session_id);
    logger.info(
        &format!("{} disconnected ({})", username, session_id),
        Color::Blue,
        true,
    )?;
    Ok(())
}

/// Reads envelopes until a `hello` with a username shows up. Anything else
/// before that ends the session; an unnamed connection has nowhere to route.
fn expect_hello(reader: &mut BufReader<TcpStream>) -> Result<Option<String>, MessengerError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let envelope = match Envelope::from_bytes(line.trim_end().as_bytes()) {
        Ok(envelope) => envelope,
        Err(_) => return Ok(None),
    };
    if envelope.kind != EventKind::Hello {
        return Ok(None);
    }
    Ok(envelope
        .data
        .get("username")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

fn read_page(envelope: &Envelope) -> Page {
    match envelope.data.get("game").and_then(|v| v.as_u64()) {
        Some(game) => Page::InGame(game),
        None => Page::Menu,
    }
}

fn games_feed(store: &SharedStore) -> Result<Envelope, MessengerError> {
    let summary = ops::games_summary(store)?;
    Ok(Envelope::new(EventKind::GamesInfo, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::store::{self, MemoryStore};
    use serde_json::json;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    struct ServiceFixture {
        addr: std::net::SocketAddr,
        registry: Arc<Registry>,
        _handle: JoinHandle<()>,
    }

    fn service_fixture() -> ServiceFixture {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(Registry::new());
        let store = store::shared(MemoryStore::new());
        let logger = Logger::new(Path::new("/tmp/test_service_logs"), "service").unwrap();
        let handle =
            spawn_client_listener(listener, Arc::clone(&registry), store, logger).unwrap();
        ServiceFixture {
            addr,
            registry,
            _handle: handle,
        }
    }

    fn send(stream: &mut TcpStream, envelope: &Envelope) {
        let mut line = envelope.to_bytes().unwrap();
        line.push(b'\n');
        stream.write_all(&line).unwrap();
        stream.flush().unwrap();
    }

    fn read_envelope(reader: &mut BufReader<TcpStream>) -> Option<Envelope> {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(n) if n > 0 => Envelope::from_bytes(line.trim_end().as_bytes()).ok(),
            _ => None,
        }
    }

    fn wait_for_sessions(registry: &Registry, count: usize) {
        for _ in 0..50 {
            if registry.session_count() == count {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("registry never reached {} sessions", count);
    }

    #[test]
    fn test_hello_registers_and_gets_the_games_feed() {
        let fx = service_fixture();
        let mut client = TcpStream::connect(fx.addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        send(
            &mut client,
            &Envelope::new(EventKind::Hello, json!({"username": "amelia"})),
        );

        let mut reader = BufReader::new(client.try_clone().unwrap());
        let feed = read_envelope(&mut reader).expect("no games feed after hello");
        assert_eq!(feed.kind, EventKind::GamesInfo);
        assert!(feed.data["games"].is_array());
        wait_for_sessions(&fx.registry, 1);
    }

    #[test]
    fn test_page_change_routes_info_to_the_session() {
        let fx = service_fixture();
        let mut client = TcpStream::connect(fx.addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        send(
            &mut client,
            &Envelope::new(EventKind::Hello, json!({"username": "amelia"})),
        );
        let mut reader = BufReader::new(client.try_clone().unwrap());
        assert!(read_envelope(&mut reader).is_some(), "games feed first");

        let info = Envelope::new(EventKind::Info, json!({"player": "amelia", "game": 4}));
        wait_for_sessions(&fx.registry, 1);
        assert_eq!(fx.registry.message("amelia", &info), 0, "still on the menu");

        send(&mut client, &Envelope::new(EventKind::Page, json!({"page": "game", "game": 4})));
        // The page change races the next delivery attempt.
        for _ in 0..50 {
            if fx.registry.message("amelia", &info) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let received = read_envelope(&mut reader).expect("snapshot never arrived");
        assert_eq!(received.kind, EventKind::Info);
        assert_eq!(received.data["game"], 4);
    }

    #[test]
    fn test_disconnect_clears_the_session() {
        let fx = service_fixture();
        {
            let mut client = TcpStream::connect(fx.addr).unwrap();
            send(
                &mut client,
                &Envelope::new(EventKind::Hello, json!({"username": "amelia"})),
            );
            wait_for_sessions(&fx.registry, 1);
        }
        wait_for_sessions(&fx.registry, 0);
    }

    #[test]
    fn test_no_hello_no_session() {
        let fx = service_fixture();
        let mut client = TcpStream::connect(fx.addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        send(
            &mut client,
            &Envelope::new(EventKind::Page, json!({"page": "menu"})),
        );

        let mut reader = BufReader::new(client.try_clone().unwrap());
        assert!(read_envelope(&mut reader).is_none(), "no feed for strangers");
        assert_eq!(fx.registry.session_count(), 0);
    }
}
