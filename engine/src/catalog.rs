use crate::airport::Airport;

/// Master list every new game samples its map from. Routes are wired per
/// game, so the catalog only carries identity and position.
pub fn master_airports() -> Vec<Airport> {
    let seeds = vec![
        ("JFK", "New York", "John F. Kennedy International Airport", 40.6413, -73.7781),
        ("LAX", "Los Angeles", "Los Angeles International Airport", 33.9416, -118.4085),
        ("ORD", "Chicago", "O'Hare International Airport", 41.9742, -87.9073),
        ("MIA", "Miami", "Miami International Airport", 25.7959, -80.2870),
        ("YYZ", "Toronto", "Toronto Pearson International Airport", 43.6777, -79.6248),
        ("MEX", "Mexico City", "Benito Juarez International Airport", 19.4363, -99.0721),
        ("EZE", "Buenos Aires", "Ministro Pistarini International Airport", -34.8222, -58.5358),
        ("GRU", "Sao Paulo", "Guarulhos International Airport", -23.4356, -46.4731),
        ("SCL", "Santiago", "Arturo Merino Benitez International Airport", -33.3930, -70.7858),
        ("LHR", "London", "Heathrow Airport", 51.4700, -0.4543),
        ("CDG", "Paris", "Charles de Gaulle Airport", 49.0097, 2.5479),
        ("FRA", "Frankfurt", "Frankfurt Airport", 50.0379, 8.5622),
        ("MAD", "Madrid", "Adolfo Suarez Madrid-Barajas Airport", 40.4983, -3.5676),
        ("FCO", "Rome", "Leonardo da Vinci-Fiumicino Airport", 41.8003, 12.2389),
        ("AMS", "Amsterdam", "Schiphol Airport", 52.3105, 4.7683),
        ("CAI", "Cairo", "Cairo International Airport", 30.1219, 31.4056),
        ("CPT", "Cape Town", "Cape Town International Airport", -33.9649, 18.6017),
        ("DXB", "Dubai", "Dubai International Airport", 25.2532, 55.3657),
        ("DEL", "New Delhi", "Indira Gandhi International Airport", 28.5562, 77.1000),
        ("SIN", "Singapore", "Changi Airport", 1.3644, 103.9915),
        ("HKG", "Hong Kong", "Hong Kong International Airport", 22.3080, 113.9185),
        ("ICN", "Seoul", "Incheon International Airport", 37.4602, 126.4407),
        ("HND", "Tokyo", "Haneda Airport", 35.5494, 139.7798),
        ("SYD", "Sydney", "Sydney Kingsford Smith Airport", -33.9399, 151.1753),
    ];

    seeds
        .into_iter()
        .map(|(code, city, name, lat, lon)| Airport::new(code, city, name, lat, lon))
        .collect()
}
