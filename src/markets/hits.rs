//! Hits markets: HITS_1P (1+ hit, yes/no) and HITS_LINE (over/under),
//! one model parameterized by market code.
//!
//! Rate path: blended 14/30-day hit rate, opposing-pitcher K/hard-hit
//! suppression, TTO degradation boost for middle-order slots, run
//! environment and day/night visibility adjustments. The yes/over
//! probability comes from the per-PA miss chain (HITS_1P) or a Poisson
//! tail on the projection (HITS_LINE).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::features::batter::BatterFeatures;
use crate::features::pitcher::PitcherFeatures;
use crate::markets::context::{best_odds_for_market, odds_by_player, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, composite_score, confidence_band, expected_pa,
    factor_score_relative_slope, platoon_advantage, poisson_cdf, probability_edge_pct,
    projection_edge_pct, visibility_tier, RiskFlagBuilder,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const WEIGHTS: [(&str, f64); 9] = [
    ("contact_score", 0.22),
    ("hit_form_score", 0.22),
    ("pitcher_contact_allow_score", 0.15),
    ("batting_order_score", 0.12),
    ("context_score", 0.08),
    ("platoon_fit_score", 0.05),
    ("hot_cold_score", 0.05),
    ("tto_score", 0.06),
    ("day_night_score", 0.05),
];

pub struct HitsModel {
    market: Market,
}

impl HitsModel {
    pub fn ones() -> Self {
        Self { market: Market::Hits1P }
    }

    pub fn lines() -> Self {
        Self { market: Market::HitsLine }
    }

    fn calibration(&self) -> &'static str {
        match self.market {
            Market::Hits1P => "miss_chain:p=1-(1-hit_rate)^pa",
            _ => "poisson_tail:p=1-CDF(floor(line),projection)",
        }
    }
}

fn batting_order_score(order: Option<i64>) -> f64 {
    match order {
        Some(1) => 72.0,
        Some(2) => 78.0,
        Some(3) => 82.0,
        Some(4) => 78.0,
        Some(5) => 68.0,
        Some(6) => 58.0,
        Some(7) => 45.0,
        Some(8) => 35.0,
        Some(9) => 28.0,
        _ => 50.0,
    }
}

/// Boost to hit rate from the opposing pitcher's TTO strikeout decay;
/// middle-order slots see the pitcher later more often.
fn tto_hit_boost(opp: Option<&PitcherFeatures>, order: Option<i64>) -> f64 {
    let Some(decay) = opp.and_then(|p| p.tto_k_decay_pct) else {
        return 0.0;
    };
    let base = (decay - 18.0) * 0.0008;
    if order.is_some_and(|o| (3..=6).contains(&o)) {
        base * 1.3
    } else {
        base
    }
}

fn projection_and_prob(market: Market, line: Option<f64>, hit_rate: f64, pa: f64) -> (f64, f64) {
    let projection = clamp(hit_rate * pa, 0.0, 3.5);
    if market == Market::Hits1P {
        let miss = 1.0 - clamp(hit_rate, 0.01, 0.8);
        let prob_yes = 1.0 - miss.powf(pa);
        return (projection, clamp(prob_yes, 0.01, 0.99));
    }
    let threshold = line.unwrap_or(0.5).floor() as i64;
    let prob_over = 1.0 - poisson_cdf(threshold, projection);
    (projection, clamp(prob_over, 0.01, 0.99))
}

struct PlayerInputs<'a> {
    batter: &'a BatterFeatures,
    opp: Option<&'a PitcherFeatures>,
    opp_hand: Option<&'a str>,
    order: Option<i64>,
    confirmed: bool,
    weather_temp: Option<f64>,
    run_mult: f64,
    is_day: Option<bool>,
}

fn factor_set(inputs: &PlayerInputs<'_>) -> BTreeMap<String, f64> {
    let b = inputs.batter;
    let contact = 100.0 - b.k_pct_14.unwrap_or(22.0) * 2.2;
    let hit_form =
        50.0 + (b.hit_rate_14.or(b.hit_rate_30).unwrap_or(0.25) - 0.25) * 220.0;
    let mut pitcher_allow = 50.0;
    if let Some(opp) = inputs.opp {
        pitcher_allow += (opp.hard_hit_pct_allowed_14.unwrap_or(35.0) - 35.0) * 1.5;
    }
    let context = 50.0
        + inputs
            .weather_temp
            .map(|t| (t - 70.0) * 0.7)
            .unwrap_or(0.0);

    let (split, other) = match inputs.opp_hand {
        Some("L") => (b.hit_rate_vs_lhp, b.hit_rate_vs_rhp),
        Some("R") => (b.hit_rate_vs_rhp, b.hit_rate_vs_lhp),
        _ => (None, None),
    };
    let platoon = platoon_advantage(split, other);

    let hot_cold = match (b.hot_cold_delta_hit_rate, b.hit_rate_30) {
        (Some(delta), Some(base)) => factor_score_relative_slope(delta, base, 0.05, 100.0, 10.0, 90.0),
        _ => 50.0,
    };

    let tto = inputs
        .opp
        .and_then(|p| p.tto_endurance_score)
        .map(|s| 100.0 - s)
        .unwrap_or(50.0);

    let day_night = match inputs.is_day {
        Some(true) => 58.0,
        Some(false) => 47.0,
        None => 50.0,
    };

    BTreeMap::from([
        ("contact_score".to_string(), clamp(contact, 0.0, 100.0)),
        ("hit_form_score".to_string(), clamp(hit_form, 0.0, 100.0)),
        (
            "pitcher_contact_allow_score".to_string(),
            clamp(pitcher_allow, 0.0, 100.0),
        ),
        (
            "batting_order_score".to_string(),
            batting_order_score(inputs.order),
        ),
        ("context_score".to_string(), clamp(context, 0.0, 100.0)),
        ("platoon_fit_score".to_string(), platoon),
        ("hot_cold_score".to_string(), hot_cold),
        ("tto_score".to_string(), clamp(tto, 0.0, 100.0)),
        ("day_night_score".to_string(), day_night),
    ])
}

fn adjusted_hit_rate(inputs: &PlayerInputs<'_>) -> Option<f64> {
    let b = inputs.batter;
    let (h14, h30) = (b.hit_rate_14, b.hit_rate_30);
    if h14.is_none() && h30.is_none() {
        return None;
    }
    let base = 0.6 * h14.unwrap_or(0.0) + 0.4 * h30.unwrap_or(0.0);
    let base = clamp(base, 0.08, 0.45);

    let suppress = inputs
        .opp
        .map(|opp| {
            (opp.k_pct_14.unwrap_or(22.0) - 22.0) * 0.0025
                - (opp.hard_hit_pct_allowed_14.unwrap_or(35.0) - 35.0) * 0.0015
        })
        .unwrap_or(0.0);

    let boost = tto_hit_boost(inputs.opp, inputs.order);
    let mut rate = clamp(base - suppress + boost, 0.06, 0.55) * inputs.run_mult;
    match inputs.is_day {
        Some(true) => rate *= 1.02,
        Some(false) => rate *= 0.995,
        None => {}
    }
    Some(clamp(rate, 0.06, 0.60))
}

#[async_trait]
impl MarketModel for HitsModel {
    fn market(&self) -> Market {
        self.market
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, self.market).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let lineups_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let game_odds = odds_by_player(&odds, game.game_id);

            for (player_id, team) in data.batter_universe(game) {
                let Some(batter) = data.batters.get(&player_id) else {
                    continue;
                };
                let entry = data.lineup(game.game_id, player_id);
                let inputs = PlayerInputs {
                    batter,
                    opp: game
                        .opposing_pitcher(&team)
                        .and_then(|id| data.pitchers.get(&id)),
                    opp_hand: game.opposing_pitcher_hand(&team),
                    order: entry.batting_order.or(batter.recent_lineup_slot),
                    confirmed: entry.confirmed,
                    weather_temp: context.and_then(|c| c.weather_temp_f),
                    run_mult: context.and_then(|c| c.weather_run_multiplier).unwrap_or(1.0),
                    is_day: context.and_then(|c| c.is_day_game),
                };
                let Some(hit_rate) = adjusted_hit_rate(&inputs) else {
                    continue;
                };
                let pa = expected_pa(inputs.order, inputs.confirmed);

                let factors = factor_set(&inputs);
                let model_score = composite_score(&factors, &WEIGHTS);
                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(inputs.opp.is_none().then_some("opposing_pitcher_features"))
                    .lineup_pending(!(lineups_confirmed && entry.confirmed))
                    .weather_pending(context.is_none())
                    .build();
                let reasons = build_reasons(&factors, 3);

                let emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: Option<f64>| {
                    let (projection, prob_side) =
                        projection_and_prob(self.market, line, hit_rate, pa);
                    let model_prob = if matches!(side, SelectionSide::Yes | SelectionSide::Over) {
                        prob_side
                    } else {
                        1.0 - prob_side
                    };
                    let implied = odds_row.and_then(|o| o.implied_probability);
                    let edge = probability_edge_pct(Some(model_prob), implied)
                        .or_else(|| projection_edge_pct(Some(projection), line));
                    let signal = assign_signal(self.spec(), model_score, edge);
                    let band = confidence_band(model_score, risk_flags.len());
                    let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                        selection_key(
                            self.market,
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
                        market: self.market,
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
                            .unwrap_or_else(|| bet_type(self.market, Some(side))),
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
                        calibration: Some(self.calibration().to_string()),
                        reasons: reasons.clone(),
                        risk_flags: risk_flags.clone(),
                        lineup_confirmed: lineups_confirmed && entry.confirmed,
                        weather_final,
                    }
                };

                match game_odds.get(&player_id) {
                    Some(player_odds) => {
                        for &odds_row in player_odds {
                            let side = odds_row.side.unwrap_or(match self.market {
                                Market::Hits1P => SelectionSide::Yes,
                                _ => SelectionSide::Over,
                            });
                            results.push(emit(Some(odds_row), side, odds_row.line));
                        }
                    }
                    None => {
                        // no priced selection: emit the default side
                        let (side, line) = match self.market {
                            Market::Hits1P => (SelectionSide::Yes, Some(0.5)),
                            _ => (
                                SelectionSide::Over,
                                Some((hit_rate * pa * 2.0).round() / 2.0),
                            ),
                        };
                        results.push(emit(None, side, line));
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
    fn test_projection_and_prob_hits1p() {
        let (projection, prob) = projection_and_prob(Market::Hits1P, Some(0.5), 0.27, 4.55);
        assert!(projection > 1.0 && projection < 1.5);
        // 1 - 0.73^4.55 is comfortably over a coin flip
        assert!(prob > 0.7 && prob < 0.8);
    }

    #[test]
    fn test_projection_and_prob_line_market() {
        let (projection, prob_over) = projection_and_prob(Market::HitsLine, Some(1.5), 0.25, 4.0);
        assert!((projection - 1.0).abs() < 1e-9);
        // needing 2+ hits on a 1.0 projection is a clear underdog
        assert!(prob_over < 0.35);
    }

    #[test]
    fn test_tto_boost_middle_order_amplified() {
        let strong_decay = PitcherFeatures {
            tto_k_decay_pct: Some(30.0),
            ..Default::default()
        };
        let middle = tto_hit_boost(Some(&strong_decay), Some(4));
        let top = tto_hit_boost(Some(&strong_decay), Some(1));
        assert!(middle > top);
        assert!(top > 0.0);
        assert_eq!(tto_hit_boost(None, Some(4)), 0.0);
    }

    #[test]
    fn test_batting_order_score_table() {
        assert_eq!(batting_order_score(Some(3)), 82.0);
        assert_eq!(batting_order_score(Some(9)), 28.0);
        assert_eq!(batting_order_score(None), 50.0);
    }
}
