//! Total bases props, including alternate ladder lines through the same
//! TB_LINE market. Poisson tail on a rate-based projection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, odds_by_player, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, composite_score, confidence_band, expected_pa,
    poisson_cdf, probability_edge_pct, projection_edge_pct, visibility_tier, RiskFlagBuilder,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const WEIGHTS: [(&str, f64); 8] = [
    ("power_form_score", 0.24),
    ("tb_rate_score", 0.20),
    ("pitcher_damage_allow_score", 0.14),
    ("batting_order_score", 0.12),
    ("park_weather_score", 0.10),
    ("xbh_profile_score", 0.08),
    ("tto_score", 0.07),
    ("day_night_score", 0.05),
];

const CALIBRATION: &str = "poisson_tail:p=1-CDF(floor(line),projection)";

fn order_score(order: Option<i64>) -> f64 {
    match order {
        Some(1) => 72.0,
        Some(2) => 78.0,
        Some(3) => 85.0,
        Some(4) => 82.0,
        Some(5) => 70.0,
        Some(6) => 58.0,
        Some(7) => 45.0,
        Some(8) => 35.0,
        Some(9) => 28.0,
        _ => 50.0,
    }
}

pub struct TbModel;

#[async_trait]
impl MarketModel for TbModel {
    fn market(&self) -> Market {
        Market::TbLine
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::TbLine).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let weather_mult = context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0);
            let hr_mult = context.and_then(|c| c.weather_hr_multiplier).unwrap_or(1.0);
            let park = context.and_then(|c| c.park_factor_hr).unwrap_or(1.0);
            let is_day = context.and_then(|c| c.is_day_game);
            let lineups_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let game_odds = odds_by_player(&odds, game.game_id);

            for (player_id, team) in data.batter_universe(game) {
                let Some(batter) = data.batters.get(&player_id) else {
                    continue;
                };
                let (tb14, tb30) = (batter.tb_per_pa_14, batter.tb_per_pa_30);
                if tb14.is_none() && tb30.is_none() {
                    continue;
                }
                let opp = game
                    .opposing_pitcher(&team)
                    .and_then(|id| data.pitchers.get(&id));
                let entry = data.lineup(game.game_id, player_id);
                let order = entry.batting_order.or(batter.recent_lineup_slot);

                let base_tb_rate = clamp(
                    0.6 * tb14.unwrap_or(0.0) + 0.4 * tb30.unwrap_or(0.0),
                    0.10,
                    0.95,
                );
                let pitcher_penalty = opp
                    .map(|p| {
                        (89.0 - p.avg_exit_velo_allowed_14.unwrap_or(89.0)) * 0.002
                            + (35.0 - p.hard_hit_pct_allowed_14.unwrap_or(35.0)) * 0.003
                    })
                    .unwrap_or(0.0);

                let pa = expected_pa(order, entry.confirmed);
                let env_mult = clamp(weather_mult * hr_mult * park, 0.85, 1.20);
                let adjusted_rate = clamp((base_tb_rate - pitcher_penalty) * env_mult, 0.08, 1.10);
                let projection = clamp(adjusted_rate * pa, 0.1, 6.0);

                let power_form = 50.0
                    + (batter.iso_14.unwrap_or(0.16) - 0.16) * 260.0
                    + (batter.slg_14.unwrap_or(0.40) - 0.40) * 120.0;
                let tb_rate_score = 50.0 + (base_tb_rate - 0.42) * 150.0;
                let mut damage_allow = 50.0;
                if let Some(p) = opp {
                    damage_allow += (p.hard_hit_pct_allowed_14.unwrap_or(35.0) - 35.0) * 1.4;
                    damage_allow += (p.barrel_pct_allowed_14.unwrap_or(8.5) - 8.5) * 2.0;
                }
                let xbh_profile = 50.0
                    + batter.doubles_rate_14.or(batter.doubles_rate_30).unwrap_or(0.05) * 200.0
                    + batter.triples_rate_14.or(batter.triples_rate_30).unwrap_or(0.005) * 400.0
                    + batter.hr_rate_14.unwrap_or(0.04) * 250.0;
                let tto = opp
                    .and_then(|p| p.tto_endurance_score)
                    .map(|s| 100.0 - s)
                    .unwrap_or(50.0);
                let day_night = match is_day {
                    Some(true) => 56.0,
                    Some(false) => 47.0,
                    None => 50.0,
                };

                let factors = BTreeMap::from([
                    ("power_form_score".to_string(), clamp(power_form, 0.0, 100.0)),
                    ("tb_rate_score".to_string(), clamp(tb_rate_score, 0.0, 100.0)),
                    (
                        "pitcher_damage_allow_score".to_string(),
                        clamp(damage_allow, 0.0, 100.0),
                    ),
                    ("batting_order_score".to_string(), order_score(order)),
                    (
                        "park_weather_score".to_string(),
                        clamp(50.0 + (env_mult - 1.0) * 180.0, 0.0, 100.0),
                    ),
                    ("xbh_profile_score".to_string(), clamp(xbh_profile, 0.0, 100.0)),
                    ("tto_score".to_string(), clamp(tto, 0.0, 100.0)),
                    ("day_night_score".to_string(), day_night),
                ]);
                let model_score = composite_score(&factors, &WEIGHTS);
                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(opp.is_none().then_some("opposing_pitcher_features"))
                    .lineup_pending(!(lineups_confirmed && entry.confirmed))
                    .weather_pending(context.is_none())
                    .build();
                let reasons = build_reasons(&factors, 3);

                let emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: Option<f64>| {
                    let threshold = line.unwrap_or(0.5).floor() as i64;
                    let prob_over = clamp(1.0 - poisson_cdf(threshold, projection), 0.01, 0.99);
                    let model_prob = if side == SelectionSide::Over {
                        prob_over
                    } else {
                        1.0 - prob_over
                    };
                    let implied = odds_row.and_then(|o| o.implied_probability);
                    let edge = probability_edge_pct(Some(model_prob), implied)
                        .or_else(|| projection_edge_pct(Some(projection), line));
                    let signal = assign_signal(self.spec(), model_score, edge);
                    let band = confidence_band(model_score, risk_flags.len());
                    let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                        selection_key(
                            Market::TbLine,
                            &game.game_id.to_string(),
                            &EntityRef::Player {
                                id: Some(player_id),
                                name: None,
                            },
                            Some(side),
                            line,
                        )
                    });
                    ScoredSelection {
                        market: Market::TbLine,
                        entity_type: EntityType::Batter,
                        game_id: game.game_id,
                        event_id: odds_row.and_then(|o| o.event_id.clone()),
                        player_id: Some(player_id),
                        player_name: odds_row.and_then(|o| o.player_name.clone()),
                        team_id: Some(team.clone()),
                        opponent_team_id: game.opponent_of(&team).map(str::to_string),
                        selection_key: key,
                        side: Some(side),
                        bet_type: odds_row
                            .and_then(|o| o.bet_type.clone())
                            .unwrap_or_else(|| bet_type(Market::TbLine, Some(side))),
                        line,
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
                        risk_flags: risk_flags.clone(),
                        lineup_confirmed: lineups_confirmed && entry.confirmed,
                        weather_final,
                    }
                };

                match game_odds.get(&player_id) {
                    Some(player_odds) => {
                        for &odds_row in player_odds {
                            let side = odds_row.side.unwrap_or(SelectionSide::Over);
                            results.push(emit(Some(odds_row), side, odds_row.line));
                        }
                    }
                    None => {
                        let default_line = (projection * 2.0).round() / 2.0;
                        results.push(emit(None, SelectionSide::Over, Some(default_line)));
                    }
                }
            }
        }
        Ok(results)
    }
}
