use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime knobs for the whole server. Every field has a sensible default and
/// can be overridden through a `GAME_*` environment variable.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Game seconds that elapse per wall-clock second.
    pub time_factor: i32,
    /// Wall-clock cadence of the per-game turn loop.
    pub tick_millis: u64,
    /// Cruise speed used to derive flight times, in km per game minute.
    pub cruise_speed: f64,
    /// Floor for any synthesized flight time, in game minutes.
    pub min_flight_time: i64,
    /// Extra game minutes added at random on top of the derived flight time.
    pub flight_time_jitter: i64,
    /// Minimum spacing between an airport's departures, in game minutes.
    pub depart_cushion: i64,
    /// Extra random game minutes added on top of the cushion.
    pub depart_jitter: i64,
    /// Upper bound, in wall seconds, for the wait between monkey wrenches.
    pub max_wrench_wait_secs: u64,
    /// How many destinations each airport gets wired to.
    pub destination_density: usize,
    /// Username reserved for the house pilot.
    pub ai_player_name: String,
    /// Port the messenger accepts game clients on.
    pub client_port: u16,
    /// Loopback port the engine relays outbound traffic through.
    pub relay_port: u16,
    /// Shared secret expected on every relayed envelope.
    pub relay_key: String,
    /// Directory for the append-only log files.
    pub log_dir: PathBuf,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            time_factor: 60,
            tick_millis: 4000,
            cruise_speed: 13.0,
            min_flight_time: 30,
            flight_time_jitter: 20,
            depart_cushion: 20,
            depart_jitter: 40,
            max_wrench_wait_secs: 45,
            destination_density: 5,
            ai_player_name: "autopilot".to_string(),
            client_port: 8080,
            relay_port: 8081,
            relay_key: "up-up-and-away".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl GameConfig {
    /// Builds the configuration from the environment, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = GameConfig::default();
        GameConfig {
            time_factor: env_parse("GAME_TIME_FACTOR", defaults.time_factor),
            tick_millis: env_parse("GAME_TICK_MILLIS", defaults.tick_millis),
            cruise_speed: env_parse("GAME_CRUISE_SPEED", defaults.cruise_speed),
            min_flight_time: env_parse("GAME_MIN_FLIGHT_TIME", defaults.min_flight_time),
            flight_time_jitter: env_parse("GAME_FLIGHT_TIME_JITTER", defaults.flight_time_jitter),
            depart_cushion: env_parse("GAME_DEPART_CUSHION", defaults.depart_cushion),
            depart_jitter: env_parse("GAME_DEPART_JITTER", defaults.depart_jitter),
            max_wrench_wait_secs: env_parse("GAME_MAX_WRENCH_WAIT", defaults.max_wrench_wait_secs),
            destination_density: env_parse("GAME_DESTINATION_DENSITY", defaults.destination_density),
            ai_player_name: env::var("GAME_AI_NAME").unwrap_or(defaults.ai_player_name),
            client_port: env_parse("GAME_CLIENT_PORT", defaults.client_port),
            relay_port: env_parse("GAME_RELAY_PORT", defaults.relay_port),
            relay_key: env::var("GAME_RELAY_KEY").unwrap_or(defaults.relay_key),
            log_dir: env::var("GAME_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = GameConfig::default();
        assert_eq!(config.time_factor, 60);
        assert_eq!(config.tick_millis, 4000);
        assert_eq!(config.destination_density, 5);
        assert!(config.min_flight_time > 0);
        assert!(config.max_wrench_wait_secs >= 1);
    }

    #[test]
    fn test_env_override_wins() {
        env::set_var("GAME_TIME_FACTOR", "120");
        env::set_var("GAME_AI_NAME", "hal");
        let config = GameConfig::from_env();
        assert_eq!(config.time_factor, 120);
        assert_eq!(config.ai_player_name, "hal");
        env::remove_var("GAME_TIME_FACTOR");
        env::remove_var("GAME_AI_NAME");
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        env::set_var("GAME_TICK_MILLIS", "not-a-number");
        let config = GameConfig::from_env();
        assert_eq!(config.tick_millis, GameConfig::default().tick_millis);
        env::remove_var("GAME_TICK_MILLIS");
    }
}
