//! Game/team market outcome extraction from final game state.
//!
//! ML/F5_ML outcomes encode 1.0 for a home win, 0.0 for an away win and
//! 0.5 for a tie; totals carry realized run counts; F5 variants read the
//! first five innings from the cached linescore.

use std::collections::HashMap;

use reqwest::Client;
use tracing::warn;

use crate::config::ApiConfig;
use crate::domain::{GameStatus, Market, SelectionSide};
use crate::error::Result;
use crate::fetch::boxscore::fetch_linescore_first5;
use crate::grading::{OutcomeRow, SelectionCandidate};
use crate::store::{SqlValue, Store};

struct FinalGame {
    home_team: String,
    away_team: String,
    home_score: i64,
    away_score: i64,
}

async fn final_game(store: &Store, game_id: i64) -> Result<Option<FinalGame>> {
    let Some(row) = store
        .fetch_optional(
            "SELECT home_team, away_team, status, home_score, away_score
             FROM games WHERE game_id = $1",
            &[SqlValue::from(game_id)],
        )
        .await?
    else {
        return Ok(None);
    };
    let status = GameStatus::parse(&row.text("status")?);
    if !status.is_some_and(|s| s.is_terminal()) {
        return Ok(None);
    }
    let (Some(home_score), Some(away_score)) =
        (row.opt_i64("home_score")?, row.opt_i64("away_score")?)
    else {
        return Ok(None);
    };
    Ok(Some(FinalGame {
        home_team: row.text("home_team")?,
        away_team: row.text("away_team")?,
        home_score,
        away_score,
    }))
}

fn team_total_target(candidate: &SelectionCandidate, game: &FinalGame) -> Option<f64> {
    let team = candidate.team_id.as_deref().or_else(|| {
        let key = candidate.selection_key.to_uppercase();
        if key.contains("|HOME") {
            Some(game.home_team.as_str())
        } else if key.contains("|AWAY") {
            Some(game.away_team.as_str())
        } else {
            None
        }
    })?;
    if team == game.home_team {
        Some(game.home_score as f64)
    } else if team == game.away_team {
        Some(game.away_score as f64)
    } else {
        // selection keys carry the abbreviation in the team token
        let key = candidate.selection_key.to_uppercase();
        if key.contains(&format!("TEAM:{}", game.home_team.to_uppercase())) {
            Some(game.home_score as f64)
        } else if key.contains(&format!("TEAM:{}", game.away_team.to_uppercase())) {
            Some(game.away_score as f64)
        } else {
            None
        }
    }
}

fn ml_value(home: i64, away: i64) -> (f64, String) {
    if home == away {
        (0.5, format!("ml_tie:{home}-{away}"))
    } else if home > away {
        (1.0, format!("final:{home}-{away}"))
    } else {
        (0.0, format!("final:{home}-{away}"))
    }
}

pub async fn grade_game_market_outcomes(
    store: &Store,
    client: &Client,
    api_cfg: &ApiConfig,
    candidates: &[SelectionCandidate],
) -> Result<Vec<OutcomeRow>> {
    let mut by_game: HashMap<i64, Vec<&SelectionCandidate>> = HashMap::new();
    for candidate in candidates {
        if candidate.market.is_game_market() {
            by_game.entry(candidate.game_id).or_default().push(candidate);
        }
    }

    let mut outcomes = Vec::new();
    let mut first5_cache: HashMap<i64, Option<(i64, i64)>> = HashMap::new();

    for (game_id, game_candidates) in by_game {
        let Some(game) = final_game(store, game_id).await? else {
            continue;
        };

        for candidate in game_candidates {
            let extracted: Option<(f64, String)> = match candidate.market {
                Market::Ml => Some(ml_value(game.home_score, game.away_score)),
                Market::Total => {
                    let total = (game.home_score + game.away_score) as f64;
                    Some((total, format!("final_total={}", total as i64)))
                }
                Market::TeamTotal => team_total_target(candidate, &game)
                    .map(|runs| (runs, format!("team_runs={}", runs as i64))),
                Market::F5Ml | Market::F5Total => {
                    let first5 = match first5_cache.get(&game_id) {
                        Some(cached) => *cached,
                        None => {
                            let fetched =
                                match fetch_linescore_first5(client, api_cfg, store, game_id).await {
                                    Ok(v) => v,
                                    Err(e) => {
                                        warn!(game_id, error = %e, "linescore fetch failed");
                                        None
                                    }
                                };
                            first5_cache.insert(game_id, fetched);
                            fetched
                        }
                    };
                    first5.map(|(home_f5, away_f5)| {
                        if candidate.market == Market::F5Ml {
                            let (value, _) = ml_value(home_f5, away_f5);
                            (value, format!("f5:{home_f5}-{away_f5}"))
                        } else {
                            let total = (home_f5 + away_f5) as f64;
                            (total, format!("f5_total={}", total as i64))
                        }
                    })
                }
                _ => None,
            };

            if let Some((value, text)) = extracted {
                outcomes.push(OutcomeRow {
                    candidate: candidate.clone(),
                    outcome_value: value,
                    outcome_text: text,
                });
            }
        }
    }
    Ok(outcomes)
}

/// Convenience used by tests and the backtester: what a game-market
/// candidate's value would be for given final scores.
pub fn game_outcome_value(
    market: Market,
    side_hint: Option<SelectionSide>,
    home_score: i64,
    away_score: i64,
) -> Option<f64> {
    let _ = side_hint;
    match market {
        Market::Ml => Some(ml_value(home_score, away_score).0),
        Market::Total => Some((home_score + away_score) as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ml_value_encoding() {
        assert_eq!(ml_value(5, 3).0, 1.0);
        assert_eq!(ml_value(2, 7).0, 0.0);
        assert_eq!(ml_value(4, 4).0, 0.5);
    }

    #[test]
    fn test_game_outcome_value() {
        assert_eq!(game_outcome_value(Market::Total, None, 6, 5), Some(11.0));
        assert_eq!(game_outcome_value(Market::Ml, None, 6, 5), Some(1.0));
        assert_eq!(game_outcome_value(Market::Hr, None, 6, 5), None);
    }

    #[test]
    fn test_team_total_target_from_key() {
        let game = FinalGame {
            home_team: "NYY".into(),
            away_team: "BOS".into(),
            home_score: 6,
            away_score: 2,
        };
        let candidate = SelectionCandidate {
            game_date: chrono::NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            market: Market::TeamTotal,
            game_id: 9,
            entity_type: None,
            player_id: None,
            team_id: None,
            selection_key: "TEAM_TOTAL|game:9|team:BOS|line:4.5|OVER".into(),
            side: Some(SelectionSide::Over),
            bet_type: None,
            line: Some(4.5),
        };
        assert_eq!(team_total_target(&candidate, &game), Some(2.0));
    }
}
