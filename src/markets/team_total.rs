//! Team totals: both teams, OVER and UNDER per offered line.

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

const CALIBRATION: &str = "sigmoid:p_over=1/(1+exp(-(projection-line)/1.20))";

pub struct TeamTotalModel;

#[async_trait]
impl MarketModel for TeamTotalModel {
    fn market(&self) -> Market {
        Market::TeamTotal
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::TeamTotal).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineup_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let weather_mult = context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0);
            let ump = context.and_then(|c| c.umpire_run_env).map(|r| r / 8.8).unwrap_or(1.0);
            let park = context
                .and_then(|c| c.park_factor_runs.or(c.park_factor_hr))
                .unwrap_or(1.0);
            let env = clamp(weather_mult * ump * park, 0.82, 1.25);

            for (target, opponent) in [
                (game.home_team.clone(), game.away_team.clone()),
                (game.away_team.clone(), game.home_team.clone()),
            ] {
                let target_team = data.teams.get(&target);
                let opp_team = data.teams.get(&opponent);
                let opp_sp = game
                    .opposing_pitcher(&target)
                    .and_then(|id| data.pitchers.get(&id));

                let projection = team_expected_runs(target_team, opp_sp, opp_team, env);

                let factors = BTreeMap::from([
                    (
                        "offense_strength_score".to_string(),
                        clamp(50.0 + (team_offense_base(target_team) - 4.4) * 16.0, 0.0, 100.0),
                    ),
                    (
                        "opponent_starter_suppress_score".to_string(),
                        clamp(70.0 - (starter_ra9(opp_sp) - 4.2) * 12.0, 0.0, 100.0),
                    ),
                    (
                        "opponent_bullpen_suppress_score".to_string(),
                        clamp(70.0 - (team_bullpen_ra9(opp_team) - 4.2) * 14.0, 0.0, 100.0),
                    ),
                    (
                        "park_weather_score".to_string(),
                        clamp(50.0 + (env - 1.0) * 180.0, 0.0, 100.0),
                    ),
                ]);
                let over_base = factors["offense_strength_score"] * 0.38
                    + factors["opponent_starter_suppress_score"] * 0.24
                    + factors["opponent_bullpen_suppress_score"] * 0.22
                    + factors["park_weather_score"] * 0.16;

                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(target_team.is_none().then_some("team_features"))
                    .missing_all(opp_sp.is_none().then_some("opposing_starter_features"))
                    .lineup_pending(!lineup_confirmed)
                    .weather_pending(context.is_none())
                    .build();
                let reasons = build_reasons(&factors, 3);

                // team-total odds rows identified by team
                let team_rows: Vec<&OddsRow> = odds
                    .iter()
                    .filter(|o| {
                        o.game_id == Some(game.game_id) && o.team_id.as_deref() == Some(&target)
                    })
                    .collect();

                let mut emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: f64| {
                    let mut flags = risk_flags.clone();
                    let prob_over = clamp(sigmoid((projection - line) / 1.20), 0.01, 0.99);
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
                            Market::TeamTotal,
                            &game.game_id.to_string(),
                            &EntityRef::Team { abbr: Some(&target) },
                            Some(side),
                            Some(line),
                        )
                    });
                    results.push(ScoredSelection {
                        market: Market::TeamTotal,
                        entity_type: EntityType::Team,
                        game_id: game.game_id,
                        event_id: odds_row.and_then(|o| o.event_id.clone()),
                        player_id: None,
                        player_name: None,
                        team_id: Some(target.clone()),
                        opponent_team_id: Some(opponent.clone()),
                        selection_key: key,
                        side: Some(side),
                        bet_type: odds_row
                            .and_then(|o| o.bet_type.clone())
                            .unwrap_or_else(|| bet_type(Market::TeamTotal, Some(side))),
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

                if team_rows.is_empty() {
                    let default_line = (projection * 2.0).round() / 2.0;
                    emit(None, SelectionSide::Over, default_line);
                    emit(None, SelectionSide::Under, default_line);
                } else {
                    for odds_row in team_rows {
                        let (Some(side), Some(line)) = (odds_row.side, odds_row.line) else {
                            continue;
                        };
                        if matches!(side, SelectionSide::Over | SelectionSide::Under) {
                            emit(Some(odds_row), side, line);
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}
