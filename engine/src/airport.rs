/// Represents an airport with its IATA code, home city, geographical position,
/// and the destinations it can reach directly.

#[derive(Clone, Debug)]
pub struct Airport {
    pub iata_code: String,
    pub city: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub destinations: Vec<String>,
}

const EARTH_RADIUS_KM: f64 = 6371.0;

impl Airport {
    pub fn new(iata_code: &str, city: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        Airport {
            iata_code: iata_code.to_string(),
            city: city.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
            destinations: Vec::new(),
        }
    }

    /// Wires a direct route to another airport. Self-loops and duplicates are
    /// silently ignored.
    pub fn add_destination(&mut self, iata_code: &str) {
        if iata_code != self.iata_code && !self.destinations.iter().any(|d| d == iata_code) {
            self.destinations.push(iata_code.to_string());
        }
    }

    pub fn reaches(&self, iata_code: &str) -> bool {
        self.destinations.iter().any(|d| d == iata_code)
    }

    /// Great-circle distance to another airport in kilometers.
    pub fn distance_to(&self, other: &Airport) -> f64 {
        haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Haversine distance between two coordinates, in kilometers.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_destination_skips_self_and_duplicates() {
        let mut airport = Airport::new("EZE", "Buenos Aires", "Ministro Pistarini", -34.82, -58.54);
        airport.add_destination("EZE");
        airport.add_destination("GRU");
        airport.add_destination("GRU");
        assert_eq!(airport.destinations, vec!["GRU".to_string()]);
        assert!(airport.reaches("GRU"));
        assert!(!airport.reaches("EZE"));
    }

    #[test]
    fn test_haversine_known_distance() {
        let ezeiza = Airport::new("EZE", "Buenos Aires", "Ministro Pistarini", -34.8222, -58.5358);
        let guarulhos = Airport::new("GRU", "Sao Paulo", "Guarulhos", -23.4356, -46.4731);
        let distance = ezeiza.distance_to(&guarulhos);
        // Roughly 1700 km between the two.
        assert!(
            (1600.0..1800.0).contains(&distance),
            "unexpected distance: {}",
            distance
        );
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        assert!(haversine_distance(40.0, -73.0, 40.0, -73.0).abs() < 1e-9);
    }
}
