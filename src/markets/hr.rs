//! Home run market: probability of 1+ HR per batter.
//!
//! Factor weights: barrel quality 0.25, platoon/ISO matchup 0.20,
//! park × weather 0.25, opposing pitcher vulnerability 0.20, hot/cold
//! 0.10. Convention: a single preferred-side YES row per batter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, odds_by_player, DateData};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, composite_score, confidence_band, expected_pa,
    factor_score_linear, factor_score_relative_slope, percentile_score, probability_edge_pct,
    visibility_tier, RiskFlagBuilder,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::stadiums::handedness_hr_factor;
use crate::store::Store;

const WEIGHTS: [(&str, f64); 5] = [
    ("barrel_score", 0.25),
    ("matchup_score", 0.20),
    ("park_weather_score", 0.25),
    ("pitcher_vuln_score", 0.20),
    ("hot_cold_score", 0.10),
];

const CALIBRATION: &str = "linear:p=0.02+0.33*score/100";

pub struct HrModel;

#[async_trait]
impl MarketModel for HrModel {
    fn market(&self) -> Market {
        Market::Hr
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::Hr).await?;

        // same-date reference populations for percentile ranks
        let barrel_pop: Vec<f64> = data.batters.values().filter_map(|b| b.barrel_pct_14).collect();
        let hr9_pop: Vec<f64> = data.pitchers.values().filter_map(|p| p.hr_per_9_14).collect();
        let barrel_allowed_pop: Vec<f64> = data
            .pitchers
            .values()
            .filter_map(|p| p.barrel_pct_allowed_14)
            .collect();

        let mut results = Vec::new();
        for game in &data.games {
            let context = data.context(game.game_id);
            let park_hr = context.and_then(|c| c.park_factor_hr).unwrap_or(1.0);
            let weather_hr = context.and_then(|c| c.weather_hr_multiplier).unwrap_or(1.0);
            let lineups_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let game_odds = odds_by_player(&odds, game.game_id);

            for (player_id, team) in data.batter_universe(game) {
                let Some(batter) = data.batters.get(&player_id) else {
                    continue;
                };
                let opp_pitcher = game
                    .opposing_pitcher(&team)
                    .and_then(|id| data.pitchers.get(&id));
                let opp_hand = game.opposing_pitcher_hand(&team);

                let barrel_score = percentile_score(&barrel_pop, batter.barrel_pct_14);

                // ISO split against the facing hand, normalized 0.10–0.30
                let iso_split = match opp_hand {
                    Some("L") => batter.iso_vs_lhp,
                    Some("R") => batter.iso_vs_rhp,
                    _ => batter.iso_14,
                };
                let iso_component = factor_score_linear(iso_split, 0.10, 0.30);
                let hr9_pr = percentile_score(&hr9_pop, opp_pitcher.and_then(|p| p.hr_per_9_30));
                let matchup_score = 0.65 * iso_component + 0.35 * hr9_pr;

                let hand_factor = handedness_hr_factor(&game.home_team, batter.bats.as_deref());
                let park_weather_mult = park_hr * weather_hr * hand_factor;
                let park_weather_score = factor_score_linear(Some(park_weather_mult), 0.85, 1.20);

                let pitcher_vuln_score = match opp_pitcher {
                    Some(p) => {
                        0.6 * percentile_score(&hr9_pop, p.hr_per_9_14.or(p.hr_per_9_30))
                            + 0.4 * percentile_score(&barrel_allowed_pop, p.barrel_pct_allowed_14)
                    }
                    None => 50.0,
                };

                let hot_cold_score = match (batter.hot_cold_delta_iso, batter.iso_30) {
                    (Some(delta), Some(base)) => {
                        factor_score_relative_slope(delta, base, 0.08, 50.0, 10.0, 90.0)
                    }
                    _ => 50.0,
                };

                let factors = BTreeMap::from([
                    ("barrel_score".to_string(), barrel_score),
                    ("matchup_score".to_string(), matchup_score),
                    ("park_weather_score".to_string(), park_weather_score),
                    ("pitcher_vuln_score".to_string(), pitcher_vuln_score),
                    ("hot_cold_score".to_string(), hot_cold_score),
                ]);
                let model_score = composite_score(&factors, &WEIGHTS);

                // calibration: score maps into the 2%–35% HR probability range,
                // then scales with the expected PA count for the lineup slot
                let entry = data.lineup(game.game_id, player_id);
                let slot = entry.batting_order.or(batter.recent_lineup_slot);
                let pa_expect = expected_pa(slot, entry.confirmed);
                let mut model_prob = 0.02 + model_score / 100.0 * 0.33;
                model_prob = clamp(model_prob * (pa_expect / 4.3), 0.01, 0.45);

                // only the YES side of the prop is priced against
                let best = game_odds.get(&player_id).and_then(|rows| {
                    rows.iter()
                        .find(|o| matches!(o.side, Some(SelectionSide::Yes) | None))
                        .copied()
                });
                let implied = best.and_then(|o| o.implied_probability);
                let edge = probability_edge_pct(Some(model_prob), implied);

                let signal = assign_signal(self.spec(), model_score, edge);
                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(opp_pitcher.is_none().then_some("opposing_pitcher_features"))
                    .lineup_pending(!(lineups_confirmed && entry.confirmed))
                    .weather_pending(!weather_final)
                    .build();
                let band = confidence_band(model_score, risk_flags.len());

                let key = best.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                    selection_key(
                        Market::Hr,
                        &game.game_id.to_string(),
                        &EntityRef::Player {
                            id: Some(player_id),
                            name: None,
                        },
                        Some(SelectionSide::Yes),
                        None,
                    )
                });

                results.push(ScoredSelection {
                    market: Market::Hr,
                    entity_type: EntityType::Batter,
                    game_id: game.game_id,
                    event_id: best.and_then(|o| o.event_id.clone()),
                    player_id: Some(player_id),
                    player_name: best.and_then(|o| o.player_name.clone()),
                    team_id: Some(team.clone()),
                    opponent_team_id: game.opponent_of(&team).map(str::to_string),
                    selection_key: key,
                    side: Some(SelectionSide::Yes),
                    bet_type: bet_type(Market::Hr, Some(SelectionSide::Yes)),
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
                    lineup_confirmed: lineups_confirmed && entry.confirmed,
                    weather_final,
                });
            }
        }
        Ok(results)
    }
}
