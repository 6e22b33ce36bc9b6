//! Odds normalization: maps heterogeneous book/market payloads to the
//! internal `(market, entity, side, line, selection_key)` shape and provides
//! the American/decimal/implied-probability conversions used everywhere
//! downstream.
//!
//! `selection_key` is the join axis across `market_odds`, `model_scores`,
//! `market_outcomes`, `bets` and `closing_lines`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::store::{date_str, SqlValue, Store};

// =============================================================================
// Price conversions
// =============================================================================

/// American odds to decimal odds. `1 + p/100` for positive prices,
/// `1 + 100/|p|` for negative. Zero is not a price.
pub fn american_to_decimal(american: i64) -> Option<f64> {
    if american == 0 {
        return None;
    }
    if american > 0 {
        Some(1.0 + american as f64 / 100.0)
    } else {
        Some(1.0 + 100.0 / american.unsigned_abs() as f64)
    }
}

/// American odds to implied probability in (0, 1).
pub fn american_to_implied(american: i64) -> Option<f64> {
    if american == 0 {
        return None;
    }
    if american > 0 {
        Some(100.0 / (american as f64 + 100.0))
    } else {
        let a = american.unsigned_abs() as f64;
        Some(a / (a + 100.0))
    }
}

pub fn decimal_to_implied(decimal: f64) -> Option<f64> {
    if decimal <= 1.0 {
        return None;
    }
    Some(1.0 / decimal)
}

/// Decimal odds back to the nearest American price. Identity on integer
/// American inputs round-tripped through `american_to_decimal`.
pub fn decimal_to_american(decimal: f64) -> Option<i64> {
    if decimal <= 1.0 {
        return None;
    }
    if decimal >= 2.0 {
        Some(((decimal - 1.0) * 100.0).round() as i64)
    } else {
        Some((-100.0 / (decimal - 1.0)).round() as i64)
    }
}

// =============================================================================
// Source market mapping
// =============================================================================

/// Source-book market keys mapped to internal market codes. Unknown keys
/// are counted and skipped by the normalizer.
pub fn map_source_market(source_key: &str, line: Option<f64>) -> Option<(Market, EntityType)> {
    let key = source_key.trim().to_lowercase();
    // Some books expose batter_hits with a 0.5 line that effectively means 1+ hit.
    if key == "batter_hits" {
        return if line.is_some_and(|l| l <= 0.5) {
            Some((Market::Hits1P, EntityType::Batter))
        } else {
            Some((Market::HitsLine, EntityType::Batter))
        };
    }
    match key.as_str() {
        "batter_home_runs" => Some((Market::Hr, EntityType::Batter)),
        "pitcher_strikeouts" => Some((Market::K, EntityType::Pitcher)),
        "pitcher_outs" | "pitcher_total_outs" => Some((Market::OutsRecorded, EntityType::Pitcher)),
        "batter_hits_1_plus" => Some((Market::Hits1P, EntityType::Batter)),
        "batter_total_bases" => Some((Market::TbLine, EntityType::Batter)),
        "h2h" => Some((Market::Ml, EntityType::Game)),
        "totals" => Some((Market::Total, EntityType::Game)),
        "h2h_1st_5_innings" => Some((Market::F5Ml, EntityType::Game)),
        "totals_1st_5_innings" => Some((Market::F5Total, EntityType::Game)),
        "team_totals" => Some((Market::TeamTotal, EntityType::Team)),
        _ => None,
    }
}

/// Source market keys requested from the odds provider.
pub const SOURCE_MARKET_KEYS: &[&str] = &[
    "batter_home_runs",
    "pitcher_strikeouts",
    "pitcher_outs",
    "batter_hits",
    "batter_hits_1_plus",
    "batter_total_bases",
    "h2h",
    "totals",
    "h2h_1st_5_innings",
    "totals_1st_5_innings",
    "team_totals",
];

// =============================================================================
// Selection keys
// =============================================================================

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_sep = true;
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed
    }
}

fn line_token(line: Option<f64>) -> Option<String> {
    let line = line?;
    if (line - line.round()).abs() < f64::EPSILON {
        Some(format!("{}", line.round() as i64))
    } else {
        Some(format!("{line:.1}"))
    }
}

/// Reference to the entity one selection is about.
#[derive(Debug, Clone)]
pub enum EntityRef<'a> {
    Player { id: Option<i64>, name: Option<&'a str> },
    Team { abbr: Option<&'a str> },
    Game,
}

/// Build the stable selection key, e.g. `HR|player:12345|YES`,
/// `K|player:678|line:6.5|OVER`, `ML|game:9|HOME`,
/// `TEAM_TOTAL|game:9|team:NYY|line:4.5|OVER`.
///
/// HR OVER/UNDER sides normalize to YES/NO; ML markets carry no line token.
pub fn selection_key(
    market: Market,
    game_ref: &str,
    entity: &EntityRef<'_>,
    side: Option<SelectionSide>,
    line: Option<f64>,
) -> String {
    let side = match (market, side) {
        (Market::Hr, Some(SelectionSide::Over)) => Some(SelectionSide::Yes),
        (Market::Hr, Some(SelectionSide::Under)) => Some(SelectionSide::No),
        (_, s) => s,
    };

    let mut key = match entity {
        EntityRef::Player { id, name } => {
            let player_ref = match id {
                Some(id) => id.to_string(),
                None => format!("name:{}", slug(name.unwrap_or(""))),
            };
            format!("{}|player:{player_ref}", market.as_str())
        }
        EntityRef::Team { abbr } => {
            let team_ref = abbr.map(str::to_string).unwrap_or_else(|| "unknown".into());
            format!("{}|game:{game_ref}|team:{team_ref}", market.as_str())
        }
        EntityRef::Game => format!("{}|game:{game_ref}", market.as_str()),
    };

    let takes_line = !matches!(market, Market::Hr | Market::Ml | Market::F5Ml);
    if takes_line {
        if let Some(token) = line_token(line) {
            key.push_str("|line:");
            key.push_str(&token);
        }
    }
    if let Some(side) = side {
        key.push('|');
        key.push_str(side.as_str());
    }
    key
}

pub fn bet_type(market: Market, side: Option<SelectionSide>) -> String {
    match side {
        Some(side) => format!("{}_{}", market.as_str(), side.as_str()),
        None => market.as_str().to_string(),
    }
}

// =============================================================================
// Odds API payload → normalized rows
// =============================================================================

/// One Odds API event payload (the subset we read).
#[derive(Debug, Clone, Deserialize)]
pub struct OddsEvent {
    pub id: String,
    #[serde(default)]
    pub commence_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsBookmaker {
    pub key: String,
    #[serde(default)]
    pub markets: Vec<OddsMarketBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsMarketBlock {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsOutcome {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub point: Option<f64>,
    #[serde(default)]
    pub player_id: Option<i64>,
}

/// Normalized odds row ready for `market_odds`.
#[derive(Debug, Clone)]
pub struct NormalizedOdds {
    pub game_date: NaiveDate,
    pub event_id: String,
    pub game_id: Option<i64>,
    pub market: Market,
    pub entity_type: EntityType,
    pub player_id: Option<i64>,
    pub player_name: Option<String>,
    pub team_id: Option<String>,
    pub opponent_team_id: Option<String>,
    pub selection_key: String,
    pub side: Option<SelectionSide>,
    pub bet_type: String,
    pub line: Option<f64>,
    pub price_american: i64,
    pub price_decimal: Option<f64>,
    pub implied_probability: Option<f64>,
    pub sportsbook: String,
    pub source_market_key: String,
}

#[derive(Debug, Default, Clone)]
pub struct NormalizeSummary {
    pub total_outcomes: usize,
    pub normalized_rows: usize,
    pub skipped_unsupported_market: usize,
    pub skipped_invalid_price: usize,
    pub unsupported_keys: HashMap<String, usize>,
}

fn normalize_side(
    raw_name: Option<&str>,
    home_team: Option<&str>,
    away_team: Option<&str>,
) -> Option<SelectionSide> {
    let name = raw_name?.trim();
    if let Some(side) = SelectionSide::parse(name) {
        return Some(side);
    }
    if home_team.is_some_and(|h| h.eq_ignore_ascii_case(name)) {
        return Some(SelectionSide::Home);
    }
    if away_team.is_some_and(|a| a.eq_ignore_ascii_case(name)) {
        return Some(SelectionSide::Away);
    }
    None
}

/// Normalize one event payload into `market_odds`-ready rows plus a
/// summary for logging. `team_abbrs` maps full team names to the short
/// abbreviations used as team identity throughout the store.
pub fn normalize_event_odds(
    event: &OddsEvent,
    game_id: Option<i64>,
    team_abbrs: &HashMap<String, String>,
) -> (Vec<NormalizedOdds>, NormalizeSummary) {
    let mut rows = Vec::new();
    let mut summary = NormalizeSummary::default();

    let game_date = event
        .commence_time
        .map(|t| t.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive());
    let home_abbr = event
        .home_team
        .as_deref()
        .map(|t| team_abbrs.get(t).cloned().unwrap_or_else(|| t.to_string()));
    let away_abbr = event
        .away_team
        .as_deref()
        .map(|t| team_abbrs.get(t).cloned().unwrap_or_else(|| t.to_string()));
    let game_ref = game_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| event.id.clone());

    for bookmaker in &event.bookmakers {
        for block in &bookmaker.markets {
            for outcome in &block.outcomes {
                summary.total_outcomes += 1;

                let line = outcome.point;
                let Some((market, entity_type)) = map_source_market(&block.key, line) else {
                    summary.skipped_unsupported_market += 1;
                    *summary.unsupported_keys.entry(block.key.clone()).or_default() += 1;
                    continue;
                };

                let price_american = match outcome.price.map(|p| p.round() as i64) {
                    Some(p) if p != 0 => p,
                    _ => {
                        summary.skipped_invalid_price += 1;
                        continue;
                    }
                };

                let side = normalize_side(
                    outcome.name.as_deref(),
                    event.home_team.as_deref(),
                    event.away_team.as_deref(),
                );

                let player_name = outcome
                    .description
                    .clone()
                    .or_else(|| outcome.name.clone());

                let (team_id, opponent_team_id) = match entity_type {
                    EntityType::Team => match side {
                        Some(SelectionSide::Home) => (home_abbr.clone(), away_abbr.clone()),
                        Some(SelectionSide::Away) => (away_abbr.clone(), home_abbr.clone()),
                        _ => {
                            // team totals identify the team in the description
                            let desc = outcome.description.as_deref().unwrap_or("");
                            if event.home_team.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(desc)) {
                                (home_abbr.clone(), away_abbr.clone())
                            } else if event.away_team.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(desc)) {
                                (away_abbr.clone(), home_abbr.clone())
                            } else {
                                (None, None)
                            }
                        }
                    },
                    _ => (None, None),
                };

                let entity = match entity_type {
                    EntityType::Batter | EntityType::Pitcher => EntityRef::Player {
                        id: outcome.player_id,
                        name: player_name.as_deref(),
                    },
                    EntityType::Team => EntityRef::Team {
                        abbr: team_id.as_deref(),
                    },
                    EntityType::Game => EntityRef::Game,
                };

                let key = selection_key(market, &game_ref, &entity, side, line);
                let price_decimal = american_to_decimal(price_american);
                let implied = american_to_implied(price_american)
                    .or_else(|| price_decimal.and_then(decimal_to_implied));

                rows.push(NormalizedOdds {
                    game_date,
                    event_id: event.id.clone(),
                    game_id,
                    market,
                    entity_type,
                    player_id: outcome.player_id,
                    player_name,
                    team_id,
                    opponent_team_id,
                    selection_key: key,
                    side,
                    bet_type: bet_type(market, side),
                    line,
                    price_american,
                    price_decimal,
                    implied_probability: implied,
                    sportsbook: bookmaker.key.clone(),
                    source_market_key: block.key.clone(),
                });
                summary.normalized_rows += 1;
            }
        }
    }

    if !summary.unsupported_keys.is_empty() {
        debug!(?summary.unsupported_keys, "skipped unsupported source markets");
    }
    (rows, summary)
}

// =============================================================================
// Best-available recompute
// =============================================================================

/// Recompute `is_best_available` for every selection key on a date in one
/// statement: the row with the lowest implied probability for its offered
/// side (highest payoff) wins; latest fetch breaks ties.
pub async fn recompute_best_available(store: &Store, game_date: NaiveDate) -> Result<u64> {
    store
        .execute(
            "UPDATE market_odds SET is_best_available = CASE WHEN id IN (
                SELECT id FROM (
                    SELECT id,
                           ROW_NUMBER() OVER (
                               PARTITION BY selection_key
                               ORDER BY implied_probability ASC, fetched_at DESC, id ASC
                           ) AS rn
                    FROM market_odds
                    WHERE game_date = $1 AND implied_probability IS NOT NULL
                ) ranked WHERE rn = 1
            ) THEN 1 ELSE 0 END
            WHERE game_date = $1",
            &[SqlValue::from(date_str(game_date))],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_decimal_roundtrip_identity() {
        for price in [-250, -110, -105, 100, 120, 150, 320, 340, 900] {
            let dec = american_to_decimal(price).unwrap();
            assert_eq!(decimal_to_american(dec), Some(price), "price {price}");
        }
        assert_eq!(american_to_decimal(0), None);
    }

    #[test]
    fn test_american_to_implied_in_unit_interval() {
        for price in [-10_000, -110, 100, 150, 10_000] {
            let p = american_to_implied(price).unwrap();
            assert!(p > 0.0 && p < 1.0, "price {price} gave {p}");
        }
        // spot values from the book
        assert!((american_to_implied(150).unwrap() - 0.4).abs() < 1e-9);
        assert!((american_to_implied(-110).unwrap() - (110.0 / 210.0)).abs() < 1e-9);
        assert!((american_to_implied(340).unwrap() - (100.0 / 440.0)).abs() < 1e-9);
    }

    #[test]
    fn test_selection_key_shapes() {
        let hr = selection_key(
            Market::Hr,
            "776123",
            &EntityRef::Player { id: Some(592450), name: None },
            Some(SelectionSide::Over),
            Some(0.5),
        );
        // HR OVER normalizes to YES and carries no line token
        assert_eq!(hr, "HR|player:592450|YES");

        let k = selection_key(
            Market::K,
            "776123",
            &EntityRef::Player { id: Some(678), name: None },
            Some(SelectionSide::Over),
            Some(6.5),
        );
        assert_eq!(k, "K|player:678|line:6.5|OVER");

        let ml = selection_key(Market::Ml, "9", &EntityRef::Game, Some(SelectionSide::Home), None);
        assert_eq!(ml, "ML|game:9|HOME");

        let tt = selection_key(
            Market::TeamTotal,
            "9",
            &EntityRef::Team { abbr: Some("NYY") },
            Some(SelectionSide::Over),
            Some(4.5),
        );
        assert_eq!(tt, "TEAM_TOTAL|game:9|team:NYY|line:4.5|OVER");

        // integer lines render bare
        let total = selection_key(Market::Total, "9", &EntityRef::Game, Some(SelectionSide::Under), Some(9.0));
        assert_eq!(total, "TOTAL|game:9|line:9|UNDER");
    }

    #[test]
    fn test_selection_key_name_fallback_slug() {
        let key = selection_key(
            Market::Hr,
            "1",
            &EntityRef::Player { id: None, name: Some("Aaron Judge") },
            Some(SelectionSide::Yes),
            None,
        );
        assert_eq!(key, "HR|player:name:aaron_judge|YES");
    }

    #[test]
    fn test_map_source_market_hits_reinterpretation() {
        assert_eq!(
            map_source_market("batter_hits", Some(0.5)),
            Some((Market::Hits1P, EntityType::Batter))
        );
        assert_eq!(
            map_source_market("batter_hits", Some(1.5)),
            Some((Market::HitsLine, EntityType::Batter))
        );
        assert_eq!(map_source_market("player_assists", None), None);
    }

    #[test]
    fn test_normalize_event_counts_unsupported() {
        let event = OddsEvent {
            id: "ev1".into(),
            commence_time: None,
            home_team: Some("New York Yankees".into()),
            away_team: Some("Boston Red Sox".into()),
            bookmakers: vec![OddsBookmaker {
                key: "draftkings".into(),
                markets: vec![
                    OddsMarketBlock {
                        key: "h2h".into(),
                        outcomes: vec![
                            OddsOutcome {
                                name: Some("New York Yankees".into()),
                                description: None,
                                price: Some(-130.0),
                                point: None,
                                player_id: None,
                            },
                            OddsOutcome {
                                name: Some("Boston Red Sox".into()),
                                description: None,
                                price: Some(110.0),
                                point: None,
                                player_id: None,
                            },
                        ],
                    },
                    OddsMarketBlock {
                        key: "alternate_spreads".into(),
                        outcomes: vec![OddsOutcome {
                            name: Some("whatever".into()),
                            description: None,
                            price: Some(100.0),
                            point: Some(1.5),
                            player_id: None,
                        }],
                    },
                ],
            }],
        };
        let mut abbrs = HashMap::new();
        abbrs.insert("New York Yankees".to_string(), "NYY".to_string());
        abbrs.insert("Boston Red Sox".to_string(), "BOS".to_string());

        let (rows, summary) = normalize_event_odds(&event, Some(9), &abbrs);
        assert_eq!(summary.total_outcomes, 3);
        assert_eq!(summary.normalized_rows, 2);
        assert_eq!(summary.skipped_unsupported_market, 1);
        assert_eq!(rows[0].selection_key, "ML|game:9|HOME");
        assert_eq!(rows[1].selection_key, "ML|game:9|AWAY");
        assert_eq!(rows[0].side, Some(SelectionSide::Home));
        assert!((rows[1].implied_probability.unwrap() - 100.0 / 210.0).abs() < 1e-9);
    }
}
