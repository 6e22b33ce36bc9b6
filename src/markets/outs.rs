//! Outs-recorded props: projection market on the starter's expected
//! outs, driven by role confidence, recent workloads and efficiency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{EntityType, Market, SelectionSide};
use crate::error::Result;
use crate::features::pitcher::PitcherFeatures;
use crate::features::team::TeamFeatures;
use crate::markets::context::{best_odds_for_market, odds_by_player, DateData, OddsRow};
use crate::markets::engine::{
    assign_signal, build_reasons, clamp, composite_score, confidence_band, probability_edge_pct,
    projection_edge_pct, sigmoid, visibility_tier, RiskFlagBuilder,
};
use crate::markets::{MarketModel, ScoredSelection};
use crate::odds::{bet_type, selection_key, EntityRef};
use crate::store::Store;

const WEIGHTS: [(&str, f64); 5] = [
    ("starter_leash_score", 0.30),
    ("pitch_count_score", 0.22),
    ("efficiency_score", 0.24),
    ("opponent_patience_score", 0.16),
    ("weather_delay_risk_score", 0.08),
];

const CALIBRATION: &str = "sigmoid:p=1/(1+exp(-(projection-line)/1.6))";

fn project_outs(
    pitcher: &PitcherFeatures,
    opp_team: Option<&TeamFeatures>,
    wind_speed: Option<f64>,
) -> (f64, BTreeMap<String, f64>, Vec<&'static str>) {
    let mut missing = Vec::new();
    let role = pitcher.starter_role_confidence;
    let outs_last5 = pitcher.outs_recorded_avg_last_5;
    let pitches_last5 = pitcher.pitches_avg_last_5;
    if role.is_none() {
        missing.push("starter_role_confidence");
    }
    if outs_last5.is_none() {
        missing.push("outs_recorded_avg_last_5");
    }
    if pitches_last5.is_none() {
        missing.push("pitches_avg_last_5");
    }
    let opp_bb = opp_team.and_then(|t| t.offense_bb_pct_14);
    if opp_bb.is_none() {
        missing.push("opponent_offense_bb_pct_14");
    }
    let opp_runs = opp_team.and_then(|t| t.runs_per_game_14);

    let weather_risk = if wind_speed.is_some_and(|w| w >= 18.0) { 0.3 } else { 0.0 };

    let role_val = role.unwrap_or(0.55);
    let base_outs = outs_last5.unwrap_or(16.5 + role_val * 2.5);
    let pitch_cap = pitches_last5.unwrap_or(88.0);

    let mut efficiency = 0.0;
    if let Some(bb) = pitcher.bb_pct_14 {
        efficiency -= (bb - 8.0) * 0.20;
    }
    if let Some(k) = pitcher.k_pct_14 {
        efficiency += (k - 22.0) * 0.12;
    }
    if let Some(bb) = opp_bb {
        efficiency -= (bb - 8.0) * 0.25;
    }
    if let Some(runs) = opp_runs {
        efficiency -= (runs - 4.4) * 0.25;
    }
    efficiency -= weather_risk * 1.4;

    let projection = clamp(base_outs + (pitch_cap - 88.0) * 0.06 + efficiency, 9.0, 24.0);

    let factors = BTreeMap::from([
        ("starter_leash_score".to_string(), clamp(role_val * 100.0, 0.0, 100.0)),
        (
            "pitch_count_score".to_string(),
            clamp(50.0 + (pitch_cap - 88.0) * 1.8, 0.0, 100.0),
        ),
        (
            "efficiency_score".to_string(),
            clamp(50.0 + efficiency * 4.0, 0.0, 100.0),
        ),
        (
            "opponent_patience_score".to_string(),
            clamp(70.0 - opp_bb.unwrap_or(8.0) * 3.0, 0.0, 100.0),
        ),
        (
            "weather_delay_risk_score".to_string(),
            clamp(65.0 - weather_risk * 70.0, 0.0, 100.0),
        ),
    ]);
    (projection, factors, missing)
}

pub struct OutsModel;

#[async_trait]
impl MarketModel for OutsModel {
    fn market(&self) -> Market {
        Market::OutsRecorded
    }

    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>> {
        let odds = best_odds_for_market(store, date, Market::OutsRecorded).await?;
        let mut results = Vec::new();

        for game in &data.games {
            let context = data.context(game.game_id);
            let wind_speed = context.and_then(|c| c.weather_wind_speed_mph);
            let lineups_confirmed = data.lineups_confirmed(game.game_id);
            let weather_final = data.weather_final(game.game_id);
            let game_odds = odds_by_player(&odds, game.game_id);

            for (pitcher_id, team, opponent) in data.pitcher_universe(game) {
                let Some(pitcher) = data.pitchers.get(&pitcher_id) else {
                    continue;
                };
                let opp_team = data.teams.get(&opponent);
                let (projection, factors, missing) = project_outs(pitcher, opp_team, wind_speed);
                let base_score = composite_score(&factors, &WEIGHTS);

                let risk_flags = RiskFlagBuilder::new()
                    .missing_all(missing.iter().copied())
                    .lineup_pending(!lineups_confirmed)
                    .weather_pending(context.is_none())
                    .build();
                let reasons = build_reasons(&factors, 3);

                let emit = |odds_row: Option<&OddsRow>, side: SelectionSide, line: Option<f64>| {
                    let line_val = line.unwrap_or(15.5);
                    let prob_over = clamp(sigmoid((projection - line_val) / 1.6), 0.01, 0.99);
                    let model_prob = if side == SelectionSide::Over {
                        prob_over
                    } else {
                        1.0 - prob_over
                    };
                    let implied = odds_row.and_then(|o| o.implied_probability);
                    let mut flags = risk_flags.clone();
                    let edge = match projection_edge_pct(Some(projection), line) {
                        Some(edge) => Some(edge),
                        None if line == Some(0.0) => {
                            flags.push("logic:line_zero".to_string());
                            None
                        }
                        None => probability_edge_pct(Some(model_prob), implied),
                    };
                    let signal = assign_signal(self.spec(), base_score, edge);
                    let band = confidence_band(base_score, flags.len());
                    let key = odds_row.map(|o| o.selection_key.clone()).unwrap_or_else(|| {
                        selection_key(
                            Market::OutsRecorded,
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
                        market: Market::OutsRecorded,
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
                            .unwrap_or_else(|| bet_type(Market::OutsRecorded, Some(side))),
                        line,
                        model_score: (base_score * 100.0).round() / 100.0,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_outs_workhorse_vs_opener() {
        let workhorse = PitcherFeatures {
            starter_role_confidence: Some(0.9),
            outs_recorded_avg_last_5: Some(19.0),
            pitches_avg_last_5: Some(98.0),
            k_pct_14: Some(27.0),
            bb_pct_14: Some(6.0),
            ..Default::default()
        };
        let opener = PitcherFeatures {
            starter_role_confidence: Some(0.35),
            outs_recorded_avg_last_5: Some(9.0),
            pitches_avg_last_5: Some(45.0),
            ..Default::default()
        };
        let (wp, _, wm) = project_outs(&workhorse, None, None);
        let (op, _, _) = project_outs(&opener, None, None);
        assert!(wp > op + 5.0);
        // only the opponent input is missing for the workhorse
        assert_eq!(wm, vec!["opponent_offense_bb_pct_14"]);
    }

    #[test]
    fn test_project_outs_wind_risk_drags() {
        let pitcher = PitcherFeatures {
            starter_role_confidence: Some(0.7),
            outs_recorded_avg_last_5: Some(17.0),
            pitches_avg_last_5: Some(92.0),
            ..Default::default()
        };
        let (calm, _, _) = project_outs(&pitcher, None, Some(5.0));
        let (gusty, factors, _) = project_outs(&pitcher, None, Some(22.0));
        assert!(gusty < calm);
        assert!(factors["weather_delay_risk_score"] < 65.0);
    }
}
