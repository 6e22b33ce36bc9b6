//! Stadium reference data: coordinates, dimensions and park factors for
//! all 30 MLB parks, used for weather lookups and park adjustments.

use std::collections::HashMap;

use crate::error::Result;
use crate::store::{SqlValue, Store};

pub struct StadiumSeed {
    pub stadium_id: i64,
    pub name: &'static str,
    pub team_abbr: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: i64,
    pub roof_type: &'static str,
    pub lf_distance: i64,
    pub cf_distance: i64,
    pub rf_distance: i64,
    pub hr_park_factor: f64,
}

macro_rules! stadium {
    ($id:expr, $name:expr, $abbr:expr, $city:expr, $state:expr, $lat:expr, $lon:expr,
     $elev:expr, $roof:expr, $lf:expr, $cf:expr, $rf:expr, $hr:expr) => {
        StadiumSeed {
            stadium_id: $id,
            name: $name,
            team_abbr: $abbr,
            city: $city,
            state: $state,
            latitude: $lat,
            longitude: $lon,
            elevation_ft: $elev,
            roof_type: $roof,
            lf_distance: $lf,
            cf_distance: $cf,
            rf_distance: $rf,
            hr_park_factor: $hr,
        }
    };
}

pub const STADIUMS: &[StadiumSeed] = &[
    stadium!(1, "Chase Field", "ARI", "Phoenix", "AZ", 33.4455, -112.0667, 1059, "retractable", 330, 407, 335, 1.04),
    stadium!(2, "Truist Park", "ATL", "Atlanta", "GA", 33.8907, -84.4677, 1050, "open", 335, 400, 325, 1.00),
    stadium!(3, "Camden Yards", "BAL", "Baltimore", "MD", 39.2838, -76.6218, 33, "open", 333, 410, 318, 1.12),
    stadium!(4, "Fenway Park", "BOS", "Boston", "MA", 42.3467, -71.0972, 21, "open", 310, 390, 302, 1.05),
    stadium!(5, "Wrigley Field", "CHC", "Chicago", "IL", 41.9484, -87.6553, 600, "open", 355, 400, 353, 1.06),
    stadium!(6, "Guaranteed Rate Field", "CHW", "Chicago", "IL", 41.8299, -87.6338, 595, "open", 330, 400, 335, 1.08),
    stadium!(7, "Great American Ball Park", "CIN", "Cincinnati", "OH", 39.0975, -84.5070, 482, "open", 328, 404, 325, 1.18),
    stadium!(8, "Progressive Field", "CLE", "Cleveland", "OH", 41.4959, -81.6852, 653, "open", 325, 405, 325, 0.96),
    stadium!(9, "Coors Field", "COL", "Denver", "CO", 39.7559, -104.9942, 5280, "open", 347, 415, 350, 1.38),
    stadium!(10, "Comerica Park", "DET", "Detroit", "MI", 42.3390, -83.0485, 600, "open", 345, 412, 330, 0.91),
    stadium!(11, "Minute Maid Park", "HOU", "Houston", "TX", 29.7573, -95.3555, 42, "retractable", 315, 409, 326, 1.04),
    stadium!(12, "Kauffman Stadium", "KC", "Kansas City", "MO", 39.0517, -94.4803, 800, "open", 330, 410, 330, 0.88),
    stadium!(13, "Angel Stadium", "LAA", "Anaheim", "CA", 33.8003, -117.8827, 157, "open", 330, 396, 330, 0.95),
    stadium!(14, "Dodger Stadium", "LAD", "Los Angeles", "CA", 34.0739, -118.2400, 515, "open", 330, 395, 330, 0.93),
    stadium!(15, "LoanDepot Park", "MIA", "Miami", "FL", 25.7781, -80.2196, 7, "retractable", 344, 407, 335, 0.82),
    stadium!(16, "American Family Field", "MIL", "Milwaukee", "WI", 43.0280, -87.9712, 600, "retractable", 344, 400, 345, 1.02),
    stadium!(17, "Target Field", "MIN", "Minneapolis", "MN", 44.9817, -93.2776, 841, "open", 339, 411, 328, 0.94),
    stadium!(18, "Citi Field", "NYM", "New York", "NY", 40.7571, -73.8458, 20, "open", 335, 408, 330, 0.89),
    stadium!(19, "Yankee Stadium", "NYY", "New York", "NY", 40.8296, -73.9262, 55, "open", 318, 408, 314, 1.15),
    stadium!(20, "Sutter Health Park", "OAK", "West Sacramento", "CA", 38.5802, -121.5111, 26, "open", 330, 403, 325, 1.00),
    stadium!(21, "Citizens Bank Park", "PHI", "Philadelphia", "PA", 39.9061, -75.1665, 30, "open", 329, 401, 330, 1.10),
    stadium!(22, "PNC Park", "PIT", "Pittsburgh", "PA", 40.4469, -80.0058, 730, "open", 325, 399, 320, 0.85),
    stadium!(23, "Petco Park", "SD", "San Diego", "CA", 32.7076, -117.1570, 17, "open", 336, 396, 322, 0.88),
    stadium!(24, "Oracle Park", "SF", "San Francisco", "CA", 37.7786, -122.3893, 3, "open", 339, 399, 309, 0.83),
    stadium!(25, "T-Mobile Park", "SEA", "Seattle", "WA", 47.5914, -122.3325, 10, "retractable", 331, 405, 326, 0.90),
    stadium!(26, "Busch Stadium", "STL", "St. Louis", "MO", 38.6226, -90.1928, 455, "open", 336, 400, 335, 0.96),
    stadium!(27, "Tropicana Field", "TB", "St. Petersburg", "FL", 27.7682, -82.6534, 44, "dome", 315, 404, 322, 0.91),
    stadium!(28, "Globe Life Field", "TEX", "Arlington", "TX", 32.7474, -97.0845, 551, "retractable", 329, 407, 326, 0.97),
    stadium!(29, "Rogers Centre", "TOR", "Toronto", "ON", 43.6414, -79.3894, 269, "retractable", 328, 400, 328, 1.05),
    stadium!(30, "Nationals Park", "WSH", "Washington", "DC", 38.8730, -77.0074, 25, "open", 336, 403, 335, 0.98),
];

/// Full team name → short abbreviation, the team identity used everywhere.
pub fn team_abbrs() -> HashMap<String, String> {
    [
        ("Arizona Diamondbacks", "ARI"),
        ("Atlanta Braves", "ATL"),
        ("Baltimore Orioles", "BAL"),
        ("Boston Red Sox", "BOS"),
        ("Chicago Cubs", "CHC"),
        ("Chicago White Sox", "CHW"),
        ("Cincinnati Reds", "CIN"),
        ("Cleveland Guardians", "CLE"),
        ("Colorado Rockies", "COL"),
        ("Detroit Tigers", "DET"),
        ("Houston Astros", "HOU"),
        ("Kansas City Royals", "KC"),
        ("Los Angeles Angels", "LAA"),
        ("Los Angeles Dodgers", "LAD"),
        ("Miami Marlins", "MIA"),
        ("Milwaukee Brewers", "MIL"),
        ("Minnesota Twins", "MIN"),
        ("New York Mets", "NYM"),
        ("New York Yankees", "NYY"),
        ("Oakland Athletics", "OAK"),
        ("Philadelphia Phillies", "PHI"),
        ("Pittsburgh Pirates", "PIT"),
        ("San Diego Padres", "SD"),
        ("San Francisco Giants", "SF"),
        ("Seattle Mariners", "SEA"),
        ("St. Louis Cardinals", "STL"),
        ("Tampa Bay Rays", "TB"),
        ("Texas Rangers", "TEX"),
        ("Toronto Blue Jays", "TOR"),
        ("Washington Nationals", "WSH"),
    ]
    .into_iter()
    .map(|(name, abbr)| (name.to_string(), abbr.to_string()))
    .collect()
}

/// Per-park HR multipliers by batter hand `(lhb, rhb)`, relative to the
/// generic `hr_park_factor`. Parks without meaningful asymmetry default
/// to 1.0.
pub fn handedness_hr_factor(team_abbr: &str, bat_hand: Option<&str>) -> f64 {
    let (lhb, rhb) = match team_abbr {
        "NYY" => (1.22, 0.93), // short RF porch vs deep left-center
        "BOS" => (0.85, 1.08), // Green Monster suppresses LHB HR
        "SF" => (0.80, 0.90),
        "COL" => (1.38, 1.38), // elevation boost, symmetric
        "CIN" => (1.18, 1.15),
        "BAL" => (0.95, 1.10),
        "HOU" => (0.90, 1.05),
        "CHC" => (1.10, 1.05),
        "TEX" => (1.12, 1.08),
        "PHI" => (1.05, 1.08),
        _ => return 1.0,
    };
    match bat_hand {
        Some("L") => lhb,
        Some("R") => rhb,
        _ => (lhb + rhb) / 2.0,
    }
}

/// Load stadium reference rows into the store (idempotent).
pub async fn load_stadiums(store: &Store) -> Result<u64> {
    let columns = [
        "stadium_id",
        "name",
        "team_abbr",
        "city",
        "state",
        "latitude",
        "longitude",
        "elevation_ft",
        "roof_type",
        "lf_distance",
        "cf_distance",
        "rf_distance",
        "hr_park_factor",
    ];
    let rows: Vec<Vec<SqlValue>> = STADIUMS
        .iter()
        .map(|s| {
            vec![
                SqlValue::from(s.stadium_id),
                SqlValue::from(s.name),
                SqlValue::from(s.team_abbr),
                SqlValue::from(s.city),
                SqlValue::from(s.state),
                SqlValue::from(s.latitude),
                SqlValue::from(s.longitude),
                SqlValue::from(s.elevation_ft),
                SqlValue::from(s.roof_type),
                SqlValue::from(s.lf_distance),
                SqlValue::from(s.cf_distance),
                SqlValue::from(s.rf_distance),
                SqlValue::from(s.hr_park_factor),
            ]
        })
        .collect();
    store
        .upsert_batch("stadiums", &columns, &["stadium_id"], &rows)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thirty_parks_unique_abbrs() {
        let mut abbrs: Vec<&str> = STADIUMS.iter().map(|s| s.team_abbr).collect();
        abbrs.sort_unstable();
        abbrs.dedup();
        assert_eq!(abbrs.len(), 30);
        assert_eq!(team_abbrs().len(), 30);
    }

    #[test]
    fn test_handedness_factor() {
        assert!(handedness_hr_factor("NYY", Some("L")) > handedness_hr_factor("NYY", Some("R")));
        assert_eq!(handedness_hr_factor("LAD", Some("L")), 1.0);
        // switch hitter averages both sides
        let avg = handedness_hr_factor("BOS", None);
        assert!((avg - (0.85 + 1.08) / 2.0).abs() < 1e-9);
    }
}
