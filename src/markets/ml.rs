//! Moneyline model. Convention: both sides (HOME and AWAY) are scored.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, odds_by_side, DateData};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, confidence_band, probability_edge_pct, sigmoid,
    visibility_tier, RiskFlagBuilder,
};
use crate::markets::game_common::{bullpen_strength, offense_strength, starter_strength};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const HOME_FIELD_ADV: f64 = 1.8;
const CALIBRATION: &str = "sigmoid:p_home=1/(1+exp(-net_strength/8.5))";

pub struct MlModel;

#[async_trait]
impl MarketModel for MlModel {
    fn market(&self) -> Market {
        Market::Ml
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::Ml).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineup_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let weather_mult = context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0);

            let home_team = data.teams.get(&game.home_team);
            let away_team = data.teams.get(&game.away_team);
            let home_pitcher = game.home_pitcher_id.and_then(|id| data.pitchers.get(&id));
            let away_pitcher = game.away_pitcher_id.and_then(|id| data.pitchers.get(&id));

            let home_strength = offense_strength(home_team)
                + bullpen_strength(home_team)
                + starter_strength(home_pitcher);
            let away_strength = offense_strength(away_team)
                + bullpen_strength(away_team)
                + starter_strength(away_pitcher);
            let weather_home_adj = (weather_mult - 1.0) * 2.0;
            let net_home = home_strength - away_strength + HOME_FIELD_ADV + weather_home_adj;
            let home_win_prob = sigmoid(net_home / 8.5);

            let side_odds = odds_by_side(&odds, game.game_id);

            for side in [SelectionSide::Home, SelectionSide::Away] {
                let model_prob = if side == SelectionSide::Home {
                    home_win_prob
                } else {
                    1.0 - home_win_prob
                };
                let (team_id, opponent_team_id, own_team, opp_team, own_sp, opp_sp) =
                    if side == SelectionSide::Home {
                        (
                            &game.home_team,
                            &game.away_team,
                            home_team,
                            away_team,
                            home_pitcher,
                            away_pitcher,
                        )
                    } else {
                        (
                            &game.away_team,
                            &game.home_team,
                            away_team,
                            home_team,
                            away_pitcher,
                            home_pitcher,
                        )
                    };

                let odds_row = side_odds.get(&side).copied();
                let implied = odds_row.and_then(|o| o.implied_probability);
                let edge = probability_edge_pct(Some(model_prob), implied);

                let side_strength = if side == SelectionSide::Home {
                    home_strength
                } else {
                    away_strength
                };
                let opp_strength = if side == SelectionSide::Home {
                    away_strength
                } else {
                    home_strength
                };
                let mut model_score =
                    50.0 + (model_prob - 0.5) * 90.0 + (side_strength - opp_strength) * 0.4;
                if let Some(edge) = edge {
                    model_score += clamp(edge * 0.35, -8.0, 8.0);
                }
                let model_score = clamp(model_score, 0.0, 100.0);

                let factors = BTreeMap::from([
                    (
                        "starter_edge_score".to_string(),
                        clamp(
                            50.0 + (starter_strength(own_sp) - starter_strength(opp_sp)) * 2.1,
                            0.0,
                            100.0,
                        ),
                    ),
                    (
                        "offense_edge_score".to_string(),
                        clamp(
                            50.0 + (offense_strength(own_team) - offense_strength(opp_team)) * 2.5,
                            0.0,
                            100.0,
                        ),
                    ),
                    (
                        "bullpen_edge_score".to_string(),
                        clamp(
                            50.0 + (bullpen_strength(own_team) - bullpen_strength(opp_team)) * 3.0,
                            0.0,
                            100.0,
                        ),
                    ),
                    (
                        "home_field_score".to_string(),
                        if side == SelectionSide::Home { 62.0 } else { 38.0 },
                    ),
                    (
                        "weather_context_score".to_string(),
                        clamp(50.0 + (weather_mult - 1.0) * 150.0, 0.0, 100.0),
                    ),
                ]);

                let signal = assign_signal(self.spec(), model_score, edge);
                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(own_sp.is_none().then_some("starter_features"))
                    .missing_all(own_team.is_none().then_some("team_features"))
                    .lineup_pending(!lineup_confirmed)
                    .weather_pending(context.is_none())
                    .build();
                let band = confidence_band(model_score, risk_flags.len());

                let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                    selection_key(
                        Market::Ml,
                        &game.game_id.to_string(),
                        &EntityRef::Game,
                        Some(side),
                        None,
                    )
                });

                results.push(ScoredSelection {
                    market: Market::Ml,
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
                        .unwrap_or_else(|| bet_type(Market::Ml, Some(side))),
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
                    calibration: Some(CALIBRATION.to_string()),
                    risk_flags,
                    lineup_confirmed: lineup_confirmed,
                    weather_final,
                });
            }
        }
        Ok(results)
    }
}
