//! First-five-innings markets (F5_ML, F5_TOTAL).
//!
//! The first five belong to the starters: bullpen contributions are
//! nearly eliminated, starter edges weigh heavier than in the full-game
//! variants, and run expectations scale to the 5/9 share of the game.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, odds_by_side, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, confidence_band, probability_edge_pct,
    projection_edge_pct, sigmoid, visibility_tier, RiskFlagBuilder,
};
use crate::markets::game_common::{
    offense_strength, starter_innings, starter_ra9, starter_strength, team_bullpen_ra9,
    team_offense_base,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const F5_SHARE: f64 = 5.0 / 9.0;
const F5_HOME_FIELD_ADV: f64 = 1.1;

/// Expected first-five runs for one offense. The starter covers five
/// innings when his expected outing reaches that deep; the shortfall is
/// priced at the bullpen rate.
fn f5_expected_runs(
    offense: Option<&crate::features::team::TeamFeatures>,
    opposing_starter: Option<&crate::features::pitcher::PitcherFeatures>,
    opposing_bullpen_team: Option<&crate::features::team::TeamFeatures>,
    env: f64,
) -> f64 {
    let offense_base = team_offense_base(offense) * F5_SHARE;
    let starter_share = clamp(starter_innings(opposing_starter) / 5.0, 0.0, 1.0);
    let allowed_ra5 = (starter_ra9(opposing_starter) * starter_share
        + team_bullpen_ra9(opposing_bullpen_team) * (1.0 - starter_share))
        * F5_SHARE;
    clamp((offense_base * 0.60 + allowed_ra5 * 0.40) * env, 0.6, 5.0)
}

fn game_env(data: &DateData, game_id: i64) -> f64 {
    let context = data.context(game_id);
    let weather_mult = context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0);
    let ump = context.and_then(|c| c.umpire_run_env).map(|r| r / 8.8).unwrap_or(1.0);
    let park = context
        .and_then(|c| c.park_factor_runs.or(c.park_factor_hr))
        .unwrap_or(1.0);
    clamp(weather_mult * ump * park, 0.82, 1.25)
}

// =============================================================================
// F5 moneyline
// =============================================================================

pub struct F5MlModel;

#[async_trait]
impl MarketModel for F5MlModel {
    fn market(&self) -> Market {
        Market::F5Ml
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::F5Ml).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineup_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);

            let home_team = data.teams.get(&game.home_team);
            let away_team = data.teams.get(&game.away_team);
            let home_sp = game.home_pitcher_id.and_then(|id| data.pitchers.get(&id));
            let away_sp = game.away_pitcher_id.and_then(|id| data.pitchers.get(&id));

            // starter edge dominates the first five
            let home_strength =
                starter_strength(home_sp) * 1.6 + offense_strength(home_team) * 0.8;
            let away_strength =
                starter_strength(away_sp) * 1.6 + offense_strength(away_team) * 0.8;
            let net_home = home_strength - away_strength + F5_HOME_FIELD_ADV;
            let home_win_prob = sigmoid(net_home / 9.5);

            let side_odds = odds_by_side(&odds, game.game_id);
            for side in [SelectionSide::Home, SelectionSide::Away] {
                let model_prob = if side == SelectionSide::Home {
                    home_win_prob
                } else {
                    1.0 - home_win_prob
                };
                let (team_id, opponent_team_id, own_sp, opp_sp) = if side == SelectionSide::Home {
                    (&game.home_team, &game.away_team, home_sp, away_sp)
                } else {
                    (&game.away_team, &game.home_team, away_sp, home_sp)
                };

                let odds_row = side_odds.get(&side).copied();
                let implied = odds_row.and_then(|o| o.implied_probability);
                let edge = probability_edge_pct(Some(model_prob), implied);

                let mut model_score = 50.0 + (model_prob - 0.5) * 95.0;
                if let Some(edge) = edge {
                    model_score += clamp(edge * 0.35, -8.0, 8.0);
                }
                let model_score = clamp(model_score, 0.0, 100.0);

                let factors = BTreeMap::from([
                    (
                        "starter_edge_score".to_string(),
                        clamp(
                            50.0 + (starter_strength(own_sp) - starter_strength(opp_sp)) * 2.8,
                            0.0,
                            100.0,
                        ),
                    ),
                    (
                        "offense_edge_score".to_string(),
                        clamp(
                            50.0 + (offense_strength(if side == SelectionSide::Home {
                                home_team
                            } else {
                                away_team
                            }) - offense_strength(if side == SelectionSide::Home {
                                away_team
                            } else {
                                home_team
                            })) * 2.0,
                            0.0,
                            100.0,
                        ),
                    ),
                    (
                        "home_field_score".to_string(),
                        if side == SelectionSide::Home { 58.0 } else { 42.0 },
                    ),
                ]);

                let signal = assign_signal(self.spec(), model_score, edge);
                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(own_sp.is_none().then_some("starter_features"))
                    .lineup_pending(!lineup_confirmed)
                    .weather_pending(context.is_none())
                    .build();
                let band = confidence_band(model_score, risk_flags.len());
                let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                    selection_key(
                        Market::F5Ml,
                        &game.game_id.to_string(),
                        &EntityRef::Game,
                        Some(side),
                        None,
                    )
                });

                results.push(ScoredSelection {
                    market: Market::F5Ml,
                    entity_type: EntityType::Game,
                    game_id: game.game_id,
                    event_id: odds_row.and_then(|o| o.event_id.clone()),
                    player_id: None,
                    player_name: None,
                    team_id: Some(team_id.clone()),
                    opponent_team_id: Some(opponent_team_id.clone()),
                    selection_key: key,
                    side: Some(side),
                    bet_type: odds_row
                        .and_then(|o| o.bet_type.clone())
                        .unwrap_or_else(|| bet_type(Market::F5Ml, Some(side))),
                    line: None,
                    model_score: (model_score * 100.0).round() / 100.0,
                    model_prob: Some((model_prob * 10_000.0).round() / 10_000.0),
                    model_projection: None,
                    book_implied_prob: implied,
                    edge: edge.map(|e| (e * 1000.0).round() / 1000.0),
                    signal,
                    confidence_band: band,
                    visibility_tier: visibility_tier(signal, band),
                    reasons: build_reasons(&factors, 3),
                    factors,
                    calibration: Some("sigmoid:p_home=1/(1+exp(-net_f5_strength/9.5))".to_string()),
                    risk_flags,
                    lineup_confirmed: lineup_confirmed,
                    weather_final,
                });
            }
        }
        Ok(results)
    }
}

// =============================================================================
// F5 totals
// =============================================================================

pub struct F5TotalModel;

#[async_trait]
impl MarketModel for F5TotalModel {
    fn market(&self) -> Market {
        Market::F5Total
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::F5Total).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineup_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let env = game_env(data, game.game_id);

            let home_team = data.teams.get(&game.home_team);
            let away_team = data.teams.get(&game.away_team);
            let home_sp = game.home_pitcher_id.and_then(|id| data.pitchers.get(&id));
            let away_sp = game.away_pitcher_id.and_then(|id| data.pitchers.get(&id));

            let projection = clamp(
                f5_expected_runs(home_team, away_sp, away_team, env)
                    + f5_expected_runs(away_team, home_sp, home_team, env),
                1.5,
                9.0,
            );

            let factors = BTreeMap::from([
                (
                    "offense_pace_score".to_string(),
                    clamp(
                        50.0 + ((team_offense_base(home_team) + team_offense_base(away_team)) / 2.0
                            - 4.4)
                            * 14.0,
                        0.0,
                        100.0,
                    ),
                ),
                (
                    "starter_run_prevention_score".to_string(),
                    clamp(
                        70.0 - ((starter_ra9(home_sp) + starter_ra9(away_sp)) / 2.0 - 4.2) * 14.0,
                        0.0,
                        100.0,
                    ),
                ),
                (
                    "park_weather_score".to_string(),
                    clamp(50.0 + (env - 1.0) * 180.0, 0.0, 100.0),
                ),
            ]);
            // starters carry most of the weight; no bullpen factor at all
            let over_base = factors["offense_pace_score"] * 0.38
                + factors["starter_run_prevention_score"] * 0.42
                + factors["park_weather_score"] * 0.20;

            let risk_flags = RiskFlagBuilder::new()
                .missing_all((home_sp.is_none() || away_sp.is_none()).then_some("starter_features"))
                .lineup_pending(!lineup_confirmed)
                .weather_pending(context.is_none())
                .build();
            let reasons = build_reasons(&factors, 3);

            let mut emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: f64| {
                let mut flags = risk_flags.clone();
                let prob_over = clamp(sigmoid((projection - line) / 1.10), 0.01, 0.99);
                let model_prob = if side == SelectionSide::Over {
                    prob_over
                } else {
                    1.0 - prob_over
                };
                let implied = odds_row.and_then(|o| o.implied_probability);
                let edge = match projection_edge_pct(Some(projection), Some(line)) {
                    Some(edge) => Some(edge),
                    None => {
                        flags.push("logic:line_zero".to_string());
                        probability_edge_pct(Some(model_prob), implied)
                    }
                };
                let mut model_score = if side == SelectionSide::Under {
                    100.0 - over_base
                } else {
                    over_base
                };
                if let Some(edge) = edge {
                    model_score += clamp(edge * 0.35, -8.0, 8.0);
                }
                let model_score = clamp(model_score, 0.0, 100.0);
                let signal = assign_signal(self.spec(), model_score, edge);
                let band = confidence_band(model_score, flags.len());
                let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                    selection_key(
                        Market::F5Total,
                        &game.game_id.to_string(),
                        &EntityRef::Game,
                        Some(side),
                        Some(line),
                    )
                });
                results.push(ScoredSelection {
                    market: Market::F5Total,
                    entity_type: EntityType::Game,
                    game_id: game.game_id,
                    event_id: odds_row.and_then(|o| o.event_id.clone()),
                    player_id: None,
                    player_name: None,
                    team_id: None,
                    opponent_team_id: None,
                    selection_key: key,
                    side: Some(side),
                    bet_type: odds_row
                        .and_then(|o| o.bet_type.clone())
                        .unwrap_or_else(|| bet_type(Market::F5Total, Some(side))),
                    line: Some(line),
                    model_score: (model_score * 100.0).round() / 100.0,
                    model_prob: Some((model_prob * 10_000.0).round() / 10_000.0),
                    model_projection: Some((projection * 1000.0).round() / 1000.0),
                    book_implied_prob: implied,
                    edge: edge.map(|e| (e * 1000.0).round() / 1000.0),
                    signal,
                    confidence_band: band,
                    visibility_tier: visibility_tier(signal, band),
                    factors: factors.clone(),
                    calibration: Some("sigmoid:p_over=1/(1+exp(-(projection-line)/1.10))".to_string()),
                    reasons: reasons.clone(),
                    risk_flags: flags,
                    lineup_confirmed: lineup_confirmed,
                    weather_final,
                });
            };

            let game_rows: Vec<&OddsRow> = odds
                .iter()
                .filter(|o| o.game_id == Some(game.game_id))
                .collect();
            if game_rows.is_empty() {
                let default_line = (projection * 2.0).round() / 2.0;
                emit(None, SelectionSide::Over, default_line);
                emit(None, SelectionSide::Under, default_line);
            } else {
                for odds_row in game_rows {
                    let (Some(side), Some(line)) = (odds_row.side, odds_row.line) else {
                        continue;
                    };
                    if matches!(side, SelectionSide::Over | SelectionSide::Under) {
                        emit(Some(odds_row), side, line);
                    }
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f5_runs_scale_below_full_game() {
        let f5 = f5_expected_runs(None, None, None, 1.0);
        // 5/9 share of a typical ~4.4-run side lands in the 2–3 range
        assert!(f5 > 1.5 && f5 < 3.5);
    }

    #[test]
    fn test_f5_environment_response() {
        let hot = f5_expected_runs(None, None, None, 1.25);
        let cold = f5_expected_runs(None, None, None, 0.85);
        assert!(hot > cold);
    }
}
