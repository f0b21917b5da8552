use chrono::{Duration, NaiveDateTime, Utc};

use crate::GameTime;

/// Scaled game clock. Game time starts at the wall instant the game begins
/// and advances `factor` game seconds per wall second. Pausing freezes it;
/// the time spent paused is subtracted out on resume so the game timeline
/// never jumps.
#[derive(Debug, Clone)]
pub struct GameClock {
    started: NaiveDateTime,
    factor: i32,
    paused_at: Option<NaiveDateTime>,
    paused_seconds: i64,
}

impl GameClock {
    pub fn start(factor: i32) -> Self {
        Self::start_at(wall_now(), factor)
    }

    pub fn start_at(started: NaiveDateTime, factor: i32) -> Self {
        GameClock {
            started,
            factor,
            paused_at: None,
            paused_seconds: 0,
        }
    }

    /// Current game time.
    pub fn now(&self) -> GameTime {
        self.now_from(wall_now())
    }

    /// Game time as seen from the given wall instant. While paused the
    /// pause stamp is used instead, so the answer does not move.
    pub fn now_from(&self, wall: NaiveDateTime) -> GameTime {
        let reference = self.paused_at.unwrap_or(wall) - Duration::seconds(self.paused_seconds);
        self.started + (reference - self.started) * self.factor
    }

    pub fn pause(&mut self) {
        self.pause_from(wall_now());
    }

    pub fn pause_from(&mut self, wall: NaiveDateTime) {
        if self.paused_at.is_none() {
            self.paused_at = Some(wall);
        }
    }

    pub fn resume(&mut self) {
        self.resume_from(wall_now());
    }

    pub fn resume_from(&mut self, wall: NaiveDateTime) {
        if let Some(stamp) = self.paused_at.take() {
            self.paused_seconds += (wall - stamp).num_seconds();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

fn wall_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TIME_FORMAT;

    fn t(timestamp: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(timestamp, TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_clock_scales_wall_time() {
        let clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        // Ten wall seconds at factor 60 is ten game minutes.
        let now = clock.now_from(t("01-05-2024 11:00:10"));
        assert_eq!(now, t("01-05-2024 11:10:00"));
    }

    #[test]
    fn test_clock_starts_at_start_instant() {
        let clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        assert_eq!(clock.now_from(t("01-05-2024 11:00:00")), t("01-05-2024 11:00:00"));
    }

    #[test]
    fn test_pause_freezes_game_time() {
        let mut clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        clock.pause_from(t("01-05-2024 11:00:10"));
        let frozen = clock.now_from(t("01-05-2024 11:00:10"));
        assert_eq!(frozen, clock.now_from(t("01-05-2024 11:05:00")));
        assert_eq!(frozen, t("01-05-2024 11:10:00"));
        assert!(clock.is_paused());
    }

    #[test]
    fn test_resume_continues_without_jump() {
        let mut clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        clock.pause_from(t("01-05-2024 11:00:10"));
        clock.resume_from(t("01-05-2024 11:03:10"));
        // Exactly at resume the clock reads what it read at the pause.
        assert_eq!(clock.now_from(t("01-05-2024 11:03:10")), t("01-05-2024 11:10:00"));
        // A further wall second keeps advancing at the same factor.
        assert_eq!(clock.now_from(t("01-05-2024 11:03:11")), t("01-05-2024 11:11:00"));
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_double_pause_keeps_first_stamp() {
        let mut clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        clock.pause_from(t("01-05-2024 11:00:10"));
        clock.pause_from(t("01-05-2024 11:00:40"));
        assert_eq!(clock.now_from(t("01-05-2024 11:01:00")), t("01-05-2024 11:10:00"));
    }

    #[test]
    fn test_two_pause_cycles_accumulate() {
        let mut clock = GameClock::start_at(t("01-05-2024 11:00:00"), 60);
        clock.pause_from(t("01-05-2024 11:00:10"));
        clock.resume_from(t("01-05-2024 11:00:20"));
        clock.pause_from(t("01-05-2024 11:00:30"));
        clock.resume_from(t("01-05-2024 11:00:50"));
        // 50 wall seconds minus 30 paused leaves 20 live seconds.
        assert_eq!(clock.now_from(t("01-05-2024 11:00:50")), t("01-05-2024 11:20:00"));
    }
}
