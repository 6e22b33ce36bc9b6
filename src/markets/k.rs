//! Strikeouts props for probable starters.
//!
//! Hybrid market: the composite maps to a strikeout projection
//! (3.5–9.0 K) and the over/under probability comes from a Poisson tail
//! at the offered line. The opposing offense's strikeout rate enters the
//! composite directly; a contact-heavy lineup drags the score down.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::markets::context::{best_odds_for_market, odds_by_player, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, composite_score, confidence_band, factor_score_linear,
    percentile_score, poisson_cdf, probability_edge_pct, projection_edge_pct, visibility_tier,
    RiskFlagBuilder,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const WEIGHTS: [(&str, f64); 6] = [
    ("k_form_score", 0.30),
    ("whiff_chase_score", 0.25),
    ("opponent_whiff_score", 0.15),
    ("pitch_count_role_score", 0.15),
    ("contact_quality_score", 0.10),
    ("context_score", 0.05),
];

const CALIBRATION: &str = "linear:k=3.5+5.5*score/100; poisson_tail for line prob";

pub struct KModel;

#[async_trait]
impl MarketModel for KModel {
    fn market(&self) -> Market {
        Market::K
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::K).await?;

        let k_pop: Vec<f64> = data.pitchers.values().filter_map(|p| p.k_pct_14).collect();
        let whiff_pop: Vec<f64> = data.pitchers.values().filter_map(|p| p.whiff_pct_14).collect();
        let chase_pop: Vec<f64> = data.pitchers.values().filter_map(|p| p.chase_pct_14).collect();

        let mut results = Vec::new();
        for game in &data.games {
            let context = data.context(game.game_id);
            let temp = context.and_then(|c| c.weather_temp_f);
            // cooler air slightly helps strikeout stuff
            let context_score = match temp {
                Some(t) => clamp(60.0 - clamp(t - 40.0, 0.0, 50.0) / 50.0 * 15.0, 0.0, 100.0),
                None => 50.0,
            };
            let ump_boost = context.and_then(|c| c.umpire_k_boost).unwrap_or(0.0);
            let lineups_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let game_odds = odds_by_player(&odds, game.game_id);

            for (pitcher_id, team, opponent) in data.pitcher_universe(game) {
                let Some(pitcher) = data.pitchers.get(&pitcher_id) else {
                    continue;
                };
                let opp_team = data.teams.get(&opponent);

                let k_form = percentile_score(&k_pop, pitcher.k_pct_14);
                let whiff = percentile_score(&whiff_pop, pitcher.whiff_pct_14);
                let chase = percentile_score(&chase_pop, pitcher.chase_pct_14);
                let whiff_chase = 0.6 * whiff + 0.4 * chase;
                let opponent_whiff =
                    factor_score_linear(opp_team.and_then(|t| t.offense_k_pct_14), 15.0, 30.0);
                let pitch_count_role = factor_score_linear(pitcher.batters_faced_14, 40.0, 120.0);
                let contact_quality = match pitcher.avg_exit_velo_allowed_14 {
                    Some(ev) => 100.0 - factor_score_linear(Some(ev), 85.0, 95.0),
                    None => 50.0,
                };

                let factors = BTreeMap::from([
                    ("k_form_score".to_string(), k_form),
                    ("whiff_chase_score".to_string(), whiff_chase),
                    ("opponent_whiff_score".to_string(), opponent_whiff),
                    ("pitch_count_role_score".to_string(), pitch_count_role),
                    ("contact_quality_score".to_string(), contact_quality),
                    ("context_score".to_string(), context_score),
                ]);
                let model_score = composite_score(&factors, &WEIGHTS);

                let mut projection = 3.5 + model_score / 100.0 * 5.5;
                // umpire zone adds or removes a fraction of a strikeout
                projection = clamp(projection + ump_boost * 0.3, 2.0, 12.0);

                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(opp_team.is_none().then_some("opponent_team_features"))
                    .missing_all(
                        pitcher
                            .outs_recorded_avg_last_5
                            .is_none()
                            .then_some("outs_recorded_avg_last_5"),
                    )
                    .lineup_pending(!lineups_confirmed)
                    .weather_pending(context.is_none())
                    .build();
                let reasons = build_reasons(&factors, 3);

                let emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: Option<f64>| {
                    let threshold = line.unwrap_or(5.5).floor() as i64;
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
                            Market::K,
                            &game.game_id.to_string(),
                            &EntityRef::Player {
                                id: Some(pitcher_id),
                                name: None,
                            },
                            Some(side),
                            line,
                        )
                    });
                    ScoredSelection {
                        market: Market::K,
                        entity_type: EntityType::Pitcher,
                        game_id: game.game_id,
                        event_id: odds_row.and_then(|o| o.event_id.clone()),
                        player_id: Some(pitcher_id),
                        player_name: odds_row.and_then(|o| o.player_name.clone()),
                        team_id: Some(team.clone()),
                        opponent_team_id: Some(opponent.clone()),
                        selection_key: key,
                        side: Some(side),
                        bet_type: odds_row
                            .and_then(|o| o.bet_type.clone())
                            .unwrap_or_else(|| bet_type(Market::K, Some(side))),
                        line,
                        model_score: (model_score * 100.0).round() / 100.0,
                        model_prob: Some((model_prob * 10_000.0).round() / 10_000.0),
                        model_projection: Some((projection * 100.0).round() / 100.0),
                        book_implied_prob: implied,
                        edge: edge.map(|e| (e * 1000.0).round() / 1000.0),
                        signal,
                        confidence_band: band,
                        visibility_tier: visibility_tier(signal, band),
                        factors: factors.clone(),
                        calibration: Some(CALIBRATION.to_string()),
                        reasons: reasons.clone(),
                        risk_flags: risk_flags.clone(),
                        lineup_confirmed: lineups_confirmed,
                        weather_final,
                    }
                };

                match game_odds.get(&pitcher_id) {
                    Some(pitcher_odds) => {
                        for &odds_row in pitcher_odds {
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
