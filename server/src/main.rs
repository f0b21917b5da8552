use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde_json::json;

use engine::config::GameConfig;
use engine::courier::Courier;
use engine::ops::{self, GameOps};
use engine::store::{self, MemoryStore, SharedStore};
use engine::GameId;
use logger::Logger;
use messenger::relay::{spawn_relay_listener, RelayClient};
use messenger::registry::Registry;
use messenger::service::spawn_client_listener;
use protocol::{Envelope, EventKind};

/// Boots the whole server in one process: the in-memory repository, the
/// client listener, the loopback relay, and the operator console on stdin.
fn main() -> Result<(), String> {
    let config = GameConfig::from_env();
    let logger =
        Logger::new(&config.log_dir, "server").map_err(|e| format!("logger: {}", e))?;
    let store = store::shared(MemoryStore::new());
    let registry = Arc::new(Registry::new());

    let client_listener = TcpListener::bind(("0.0.0.0", config.client_port))
        .map_err(|e| format!("client port {}: {}", config.client_port, e))?;
    let relay_listener = TcpListener::bind(("127.0.0.1", config.relay_port))
        .map_err(|e| format!("relay port {}: {}", config.relay_port, e))?;
    let relay_addr: SocketAddr = relay_listener
        .local_addr()
        .map_err(|e| format!("relay addr: {}", e))?;

    let _client_handle = spawn_client_listener(
        client_listener,
        Arc::clone(&registry),
        Arc::clone(&store),
        logger.clone(),
    )
    .map_err(|e| e.to_string())?;
    let relay_handle = spawn_relay_listener(
        relay_listener,
        &config.relay_key,
        registry,
        Arc::clone(&store),
        logger.clone(),
    )
    .map_err(|e| e.to_string())?;

    let courier: Arc<dyn Courier> = Arc::new(RelayClient::new(relay_addr, &config.relay_key));
    let ops = GameOps::new(
        Arc::clone(&store),
        Arc::clone(&courier),
        config.clone(),
        logger.clone(),
    );
    // A restart picks every mid-race game back up before taking commands.
    let mut schedulers = ops.respawn_open_games().map_err(|e| e.to_string())?;

    println!(
        "Airport race server up: clients on port {}, relay on {}.",
        config.client_port, relay_addr
    );
    console_loop(&ops, &store, &courier, &mut schedulers);

    // Graceful exit: close the races, tell the relay to stop, then wait for
    // everyone to notice.
    for id in open_games(&store) {
        if let Err(e) = ops.end_game(id) {
            println!("Could not end game {}: {}", id, e);
        }
    }
    if let Err(e) = courier.deliver(Envelope::new(EventKind::Shutdown, json!(null))) {
        println!("Could not reach the relay to shut it down: {}", e);
    } else if relay_handle.join().is_err() {
        println!("The relay thread ended badly.");
    }
    for handle in schedulers {
        let _ = handle.join();
    }
    Ok(())
}

fn console_loop(
    ops: &GameOps,
    store: &SharedStore,
    courier: &Arc<dyn Courier>,
    schedulers: &mut Vec<JoinHandle<()>>,
) {
    print_help();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut command = String::new();
        if io::stdin().read_line(&mut command).is_err() {
            continue;
        }
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }
        match args[0] {
            "create-game" => match parse_create(&args) {
                Some((host, airports, goals)) => match ops.create_game(host, airports, goals) {
                    Ok(id) => println!("Game {} created for {}.", id, host),
                    Err(e) => println!("{}", e),
                },
                None => println!("Usage: create-game <host> <airports> <goals>"),
            },
            "join" => match (parse_game_id(&args, 1), args.get(2)) {
                (Some(id), Some(username)) => match ops.join_game(id, username) {
                    Ok(()) => println!("{} joined game {}.", username, id),
                    Err(e) => println!("{}", e),
                },
                _ => println!("Usage: join <game> <username>"),
            },
            "start" => match parse_game_id(&args, 1) {
                Some(id) => match ops.start_game(id) {
                    Ok(handle) => {
                        schedulers.push(handle);
                        println!("Game {} is off.", id);
                    }
                    Err(e) => println!("{}", e),
                },
                None => println!("Usage: start <game>"),
            },
            "pause" => run_sweep(&args, "pause", || ops.pause_all(), |id| ops.pause_game(id)),
            "resume" => run_sweep(&args, "resume", || ops.resume_all(), |id| ops.resume_game(id)),
            "end" => match parse_game_id(&args, 1) {
                Some(id) => match ops.end_game(id) {
                    Ok(()) => println!("Game {} ended.", id),
                    Err(e) => println!("{}", e),
                },
                None => println!("Usage: end <game>"),
            },
            "delete-game" => match parse_game_id(&args, 1) {
                Some(id) => match ops.end_game(id).and_then(|_| ops.delete_game(id)) {
                    Ok(()) => println!("Game {} deleted.", id),
                    Err(e) => println!("{}", e),
                },
                None => println!("Usage: delete-game <game>"),
            },
            "games" => print_games(store),
            "wall" => {
                if args.len() < 2 {
                    println!("Usage: wall <text>");
                } else {
                    let text = args[1..].join(" ");
                    match courier.deliver(Envelope::new(EventKind::Wall, json!({ "text": text }))) {
                        Ok(()) => println!("Posted."),
                        Err(e) => println!("{}", e),
                    }
                }
            }
            "help" | "-h" | "--help" => print_help(),
            "exit" => break,
            other => println!("Unknown command '{}'; try 'help'.", other),
        }
    }
}

/// `pause`/`resume` take a game id or the word `all`.
fn run_sweep<A, O>(args: &[&str], verb: &str, all: A, one: O)
where
    A: FnOnce() -> Result<usize, engine::GameError>,
    O: FnOnce(GameId) -> Result<(), engine::GameError>,
{
    match args.get(1) {
        Some(&"all") => match all() {
            Ok(count) => println!("{}d {} games.", verb, count),
            Err(e) => println!("{}", e),
        },
        Some(raw) => match raw.parse::<GameId>() {
            Ok(id) => match one(id) {
                Ok(()) => println!("Game {} {}d.", id, verb),
                Err(e) => println!("{}", e),
            },
            Err(_) => println!("Usage: {} <game|all>", verb),
        },
        None => println!("Usage: {} <game|all>", verb),
    }
}

fn parse_create<'a>(args: &[&'a str]) -> Option<(&'a str, usize, usize)> {
    let host = args.get(1)?;
    let airports = args.get(2)?.parse().ok()?;
    let goals = args.get(3)?.parse().ok()?;
    Some((host, airports, goals))
}

fn parse_game_id(args: &[&str], position: usize) -> Option<GameId> {
    args.get(position)?.parse().ok()
}

fn open_games(store: &SharedStore) -> Vec<GameId> {
    store.lock().map(|s| s.open_games()).unwrap_or_default()
}

fn print_games(store: &SharedStore) {
    match ops::games_summary(store) {
        Ok(summary) => {
            let games = summary["games"].as_array().cloned().unwrap_or_default();
            if games.is_empty() {
                println!("No open games.");
                return;
            }
            println!("{:>5}  {:<12} {:<12} {:>7} {:>8} {:>5}", "id", "host", "state", "players", "airports", "goals");
            for game in games {
                println!(
                    "{:>5}  {:<12} {:<12} {:>7} {:>8} {:>5}",
                    game["game"], game["host"].as_str().unwrap_or("?"),
                    game["state"].as_str().unwrap_or("?"),
                    game["players"], game["airports"], game["goals"],
                );
            }
        }
        Err(e) => println!("{}", e),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  create-game <host> <airports> <goals>   build a new game");
    println!("  join <game> <username>                  seat a player");
    println!("  start <game>                            start the race");
    println!("  pause <game|all>                        freeze the clock");
    println!("  resume <game|all>                       unfreeze the clock");
    println!("  end <game>                              force-quit a game");
    println!("  delete-game <game>                      end and drop a game");
    println!("  games                                   list open games");
    println!("  wall <text>                             notice to every client");
    println!("  help                                    this text");
    println!("  exit                                    end all games and stop");
}
