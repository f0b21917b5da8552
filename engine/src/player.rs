use chrono::NaiveDateTime;

use crate::FlightId;

/// One target city on a player's route. Fulfilled in order, at most once,
/// with the game-time stamp of the arrival that did it.
#[derive(Debug, Clone)]
pub struct Achievement {
    pub city: String,
    pub fulfilled: Option<NaiveDateTime>,
}

/// A racer. Either the player sits at an airport or they hold a ticket on a
/// flight in the air; both at once means they are waiting at the gate, and
/// neither means something crashed mid-flight (see `repair`).
#[derive(Debug, Clone)]
pub struct Player {
    pub username: String,
    pub ai: bool,
    pub airport: Option<String>,
    pub prev_airport: Option<String>,
    pub ticket: Option<FlightId>,
    pub achievements: Vec<Achievement>,
}

impl Player {
    pub fn new(username: &str, ai: bool, start_airport: &str, goal_cities: &[String]) -> Self {
        Player {
            username: username.to_string(),
            ai,
            airport: Some(start_airport.to_string()),
            prev_airport: None,
            ticket: None,
            achievements: goal_cities
                .iter()
                .map(|city| Achievement {
                    city: city.clone(),
                    fulfilled: None,
                })
                .collect(),
        }
    }

    /// The next goal still to reach, if any.
    pub fn current_goal(&self) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.fulfilled.is_none())
    }

    /// Marks the current goal fulfilled if it matches the city just reached.
    /// Landing anywhere else changes nothing; goals are strictly in order.
    pub fn fulfill_current(&mut self, city: &str, at: NaiveDateTime) -> bool {
        if let Some(goal) = self.achievements.iter_mut().find(|a| a.fulfilled.is_none()) {
            if goal.city == city {
                goal.fulfilled = Some(at);
                return true;
            }
        }
        false
    }

    pub fn finished(&self) -> bool {
        self.achievements.iter().all(|a| a.fulfilled.is_some())
    }

    /// When the player crossed their last goal. `None` until they finish;
    /// ordered fulfillment means the last goal's stamp is the final one.
    pub fn final_fulfillment(&self) -> Option<NaiveDateTime> {
        self.achievements.last().and_then(|a| a.fulfilled)
    }

    pub fn goals_fulfilled(&self) -> usize {
        self.achievements
            .iter()
            .filter(|a| a.fulfilled.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TIME_FORMAT;

    fn t(timestamp: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(timestamp, TIME_FORMAT).unwrap()
    }

    fn goals() -> Vec<String> {
        vec!["Paris".to_string(), "Tokyo".to_string()]
    }

    #[test]
    fn test_new_player_starts_grounded() {
        let player = Player::new("amelia", false, "JFK", &goals());
        assert_eq!(player.airport.as_deref(), Some("JFK"));
        assert!(player.ticket.is_none());
        assert!(!player.finished());
        assert_eq!(player.current_goal().unwrap().city, "Paris");
    }

    #[test]
    fn test_goals_fulfil_strictly_in_order() {
        let mut player = Player::new("amelia", false, "JFK", &goals());
        // Reaching the second goal first does nothing.
        assert!(!player.fulfill_current("Tokyo", t("01-05-2024 12:00:00")));
        assert_eq!(player.goals_fulfilled(), 0);

        assert!(player.fulfill_current("Paris", t("01-05-2024 13:00:00")));
        assert_eq!(player.current_goal().unwrap().city, "Tokyo");

        assert!(player.fulfill_current("Tokyo", t("01-05-2024 15:00:00")));
        assert!(player.finished());
        assert_eq!(player.final_fulfillment(), Some(t("01-05-2024 15:00:00")));
    }

    #[test]
    fn test_unfinished_player_has_no_final_stamp() {
        let mut player = Player::new("amelia", false, "JFK", &goals());
        player.fulfill_current("Paris", t("01-05-2024 13:00:00"));
        assert_eq!(player.final_fulfillment(), None);
    }
}
