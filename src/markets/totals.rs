//! Full-game totals. OVER and UNDER are both emitted per offered line.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, confidence_band, probability_edge_pct,
    projection_edge_pct, sigmoid, visibility_tier, RiskFlagBuilder,
};
use crate::markets::game_common::{
    starter_ra9, team_bullpen_ra9, team_expected_runs, team_offense_base,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const CALIBRATION: &str = "sigmoid:p_over=1/(1+exp(-(projection-line)/1.85))";

pub struct TotalsModel;

#[async_trait]
impl MarketModel for TotalsModel {
    fn market(&self) -> Market {
        Market::Total
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::Total).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineup_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let weather_mult = context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0);
            let ump_run_env = context.and_then(|c| c.umpire_run_env).map(|r| r / 8.8).unwrap_or(1.0);
            let park = context
                .and_then(|c| c.park_factor_runs.or(c.park_factor_hr))
                .unwrap_or(1.0);
            let env = clamp(weather_mult * ump_run_env * park, 0.82, 1.25);

            let home_team = data.teams.get(&game.home_team);
            let away_team = data.teams.get(&game.away_team);
            let home_pitcher = game.home_pitcher_id.and_then(|id| data.pitchers.get(&id));
            let away_pitcher = game.away_pitcher_id.and_then(|id| data.pitchers.get(&id));

            let home_runs = team_expected_runs(home_team, away_pitcher, away_team, env);
            let away_runs = team_expected_runs(away_team, home_pitcher, home_team, env);
            let projection = clamp(home_runs + away_runs, 3.5, 16.0);

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
                        70.0 - ((starter_ra9(home_pitcher) + starter_ra9(away_pitcher)) / 2.0 - 4.2)
                            * 12.0,
                        0.0,
                        100.0,
                    ),
                ),
                (
                    "bullpen_run_prevention_score".to_string(),
                    clamp(
                        70.0 - ((team_bullpen_ra9(home_team) + team_bullpen_ra9(away_team)) / 2.0
                            - 4.2)
                            * 14.0,
                        0.0,
                        100.0,
                    ),
                ),
                (
                    "park_weather_score".to_string(),
                    clamp(50.0 + (env - 1.0) * 180.0, 0.0, 100.0),
                ),
                (
                    "umpire_run_env_score".to_string(),
                    clamp(50.0 + (ump_run_env - 1.0) * 200.0, 0.0, 100.0),
                ),
            ]);
            let over_base = factors["offense_pace_score"] * 0.30
                + factors["starter_run_prevention_score"] * 0.23
                + factors["bullpen_run_prevention_score"] * 0.20
                + factors["park_weather_score"] * 0.17
                + factors["umpire_run_env_score"] * 0.10;

            let risk_flags = RiskFlagBuilder::new()
                .missing_all((home_team.is_none() || away_team.is_none()).then_some("team_features"))
                .missing_all(
                    (home_pitcher.is_none() || away_pitcher.is_none()).then_some("starter_features"),
                )
                .lineup_pending(!lineup_confirmed)
                .weather_pending(context.is_none())
                .build();
            let reasons = build_reasons(&factors, 3);

            let mut emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: f64| {
                let mut flags = risk_flags.clone();
                let prob_over = clamp(sigmoid((projection - line) / 1.85), 0.01, 0.99);
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
                    // under likes stronger run prevention and lower environment
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
                        Market::Total,
                        &game.game_id.to_string(),
                        &EntityRef::Game,
                        Some(side),
                        Some(line),
                    )
                });
                results.push(ScoredSelection {
                    market: Market::Total,
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
                        .unwrap_or_else(|| bet_type(Market::Total, Some(side))),
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
                    calibration: Some(CALIBRATION.to_string()),
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
