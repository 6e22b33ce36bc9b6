//! Market scoring passes: required-input checks, model dispatch, the
//! missing-data policy and supersede-aware persistence.
//!
//! Supersede is a two-statement transaction per selection: insert the new
//! run's row with `is_active = 1`, then flip prior rows with the same
//! natural key to `is_active = 0`. Active rows are never updated in
//! place.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::Market;
use crate::error::{MlbError, Result};
use crate::markets::context::DateData;
use crate::markets::spec::MissingDataPolicy;
use crate::markets::{engine, ModelRegistry, ScoredSelection};
use crate::store::runs::{complete_score_run, create_score_run, fail_score_run};
use crate::store::{date_str, now_ts, SqlValue, Store};

#[derive(Debug, Clone)]
pub struct MarketScoreResult {
    pub market: Market,
    pub score_run_id: i64,
    pub rows_written: u64,
    pub status: String,
    pub error: Option<String>,
}

impl MarketScoreResult {
    pub fn failed(&self) -> bool {
        self.status == "failed"
    }
}

async fn feature_table_count(store: &Store, table: &str, date: NaiveDate) -> Result<i64> {
    let row = store
        .fetch_one(
            &format!("SELECT CAST(COUNT(*) AS BIGINT) AS n FROM {table} WHERE game_date = $1"),
            &[SqlValue::from(date)],
        )
        .await?;
    row.i64("n")
}

/// Detect a selection-key collision inside one scoring pass. Two rows
/// sharing `(market, game_id, selection_key)` would silently supersede
/// each other; that is a fatal invariant violation.
fn check_key_collisions(rows: &[ScoredSelection]) -> Result<()> {
    let mut seen = HashSet::new();
    for row in rows {
        if !seen.insert((row.market, row.game_id, row.selection_key.clone())) {
            return Err(MlbError::Invariant(format!(
                "selection key collision: {} game {} key {}",
                row.market, row.game_id, row.selection_key
            )));
        }
    }
    Ok(())
}

/// Apply the market's missing-data policy to drafted rows.
fn apply_missing_data_policy(
    policy: MissingDataPolicy,
    missing_tables: &[&str],
    rows: &mut Vec<ScoredSelection>,
) {
    if missing_tables.is_empty() {
        return;
    }
    match policy {
        MissingDataPolicy::Skip => rows.clear(),
        MissingDataPolicy::StoreWithRiskFlags => {
            for row in rows.iter_mut() {
                for table in missing_tables {
                    row.risk_flags.push(format!("missing:{table}"));
                }
                row.confidence_band = engine::confidence_band(row.model_score, row.risk_flags.len());
                row.visibility_tier = engine::visibility_tier(row.signal, row.confidence_band);
            }
        }
        MissingDataPolicy::DegradeConfidence => {
            for row in rows.iter_mut() {
                for table in missing_tables {
                    row.risk_flags.push(format!("missing:{table}"));
                }
                row.confidence_band = row.confidence_band.degraded();
                row.visibility_tier = engine::visibility_tier(row.signal, row.confidence_band);
            }
        }
    }
}

/// Persist scored rows with supersede semantics in a single transaction.
pub async fn persist_scores(
    store: &Store,
    date: NaiveDate,
    run_id: i64,
    rows: &[ScoredSelection],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    check_key_collisions(rows)?;

    let created_at = now_ts();
    let mut stmts: Vec<(String, Vec<SqlValue>)> = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        stmts.push((
            "INSERT INTO model_scores (
                score_run_id, game_date, market, entity_type, game_id, event_id,
                player_id, player_name, team_id, opponent_team_id, selection_key, side,
                bet_type, line, model_score, model_prob, model_projection,
                book_implied_prob, edge, signal, confidence_band, visibility_tier,
                factors_json, reasons_json, risk_flags_json, lineup_confirmed,
                weather_final, is_active, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,
                      $20,$21,$22,$23,$24,$25,$26,$27,1,$28,$28)
            ON CONFLICT (market, game_id, selection_key, score_run_id) DO UPDATE SET
                model_score = EXCLUDED.model_score,
                model_prob = EXCLUDED.model_prob,
                model_projection = EXCLUDED.model_projection,
                book_implied_prob = EXCLUDED.book_implied_prob,
                edge = EXCLUDED.edge,
                signal = EXCLUDED.signal,
                confidence_band = EXCLUDED.confidence_band,
                visibility_tier = EXCLUDED.visibility_tier,
                factors_json = EXCLUDED.factors_json,
                reasons_json = EXCLUDED.reasons_json,
                risk_flags_json = EXCLUDED.risk_flags_json,
                lineup_confirmed = EXCLUDED.lineup_confirmed,
                weather_final = EXCLUDED.weather_final,
                is_active = 1,
                updated_at = EXCLUDED.updated_at"
                .to_string(),
            vec![
                SqlValue::from(run_id),
                SqlValue::from(date),
                SqlValue::from(row.market.as_str()),
                SqlValue::from(row.entity_type.as_str()),
                SqlValue::from(row.game_id),
                SqlValue::from(row.event_id.clone()),
                SqlValue::from(row.player_id),
                SqlValue::from(row.player_name.clone()),
                SqlValue::from(row.team_id.clone()),
                SqlValue::from(row.opponent_team_id.clone()),
                SqlValue::from(row.selection_key.clone()),
                SqlValue::from(row.side.map(|s| s.as_str())),
                SqlValue::from(row.bet_type.clone()),
                SqlValue::from(row.line),
                SqlValue::from(row.model_score),
                SqlValue::from(row.model_prob),
                SqlValue::from(row.model_projection),
                SqlValue::from(row.book_implied_prob),
                SqlValue::from(row.edge),
                SqlValue::from(row.signal.as_str()),
                SqlValue::from(row.confidence_band.as_str()),
                SqlValue::from(row.visibility_tier.as_str()),
                SqlValue::from(row.factors_json().to_string()),
                SqlValue::from(json!(row.reasons).to_string()),
                SqlValue::from(json!(row.risk_flags).to_string()),
                SqlValue::from(row.lineup_confirmed),
                SqlValue::from(row.weather_final),
                SqlValue::from(created_at.clone()),
            ],
        ));
        stmts.push((
            "UPDATE model_scores SET is_active = 0, updated_at = $1
             WHERE market = $2 AND game_id = $3 AND selection_key = $4
               AND score_run_id <> $5 AND is_active = 1"
                .to_string(),
            vec![
                SqlValue::from(created_at.clone()),
                SqlValue::from(row.market.as_str()),
                SqlValue::from(row.game_id),
                SqlValue::from(row.selection_key.clone()),
                SqlValue::from(run_id),
            ],
        ));
    }
    store.execute_in_transaction(&stmts).await?;
    Ok(rows.len() as u64)
}

/// Score one market for a date. `only_game_ids` narrows persistence to
/// affected games (lineup-triggered re-scores).
pub async fn score_one_market(
    store: &Store,
    registry: &ModelRegistry,
    date: NaiveDate,
    market: Market,
    triggered_by: &str,
    only_game_ids: Option<&[i64]>,
) -> Result<MarketScoreResult> {
    let Some(model) = registry.get(market) else {
        return Err(MlbError::Validation(format!("no model registered for market {market}")));
    };
    let spec = model.spec();

    let run_id = create_score_run(
        store,
        "score",
        Some(date),
        Some(market.as_str()),
        triggered_by,
        only_game_ids.map(|ids| json!({ "only_game_ids": ids })),
    )
    .await?;

    let result: Result<Vec<ScoredSelection>> = async {
        let mut missing_tables = Vec::new();
        for table in spec.required_feature_tables {
            if feature_table_count(store, table, date).await? == 0 {
                missing_tables.push(*table);
            }
        }
        if !missing_tables.is_empty() {
            warn!(market = %market, ?missing_tables, "required feature tables empty for date");
            if spec.missing_data_policy == MissingDataPolicy::Skip {
                return Ok(Vec::new());
            }
        }

        let data = DateData::load(store, date).await?;
        let mut rows = model.score(store, date, &data).await?;
        if let Some(game_ids) = only_game_ids {
            rows.retain(|r| game_ids.contains(&r.game_id));
        }
        apply_missing_data_policy(spec.missing_data_policy, &missing_tables, &mut rows);
        Ok(rows)
    }
    .await;

    match result {
        Ok(rows) => {
            let written = persist_scores(store, date, run_id, &rows).await?;
            complete_score_run(
                store,
                run_id,
                "completed",
                written as i64,
                Some(json!({ "market": market.as_str(), "rows_written": written })),
            )
            .await?;
            info!(market = %market, date = %date_str(date), rows = written, "market scored");
            Ok(MarketScoreResult {
                market,
                score_run_id: run_id,
                rows_written: written,
                status: "completed".to_string(),
                error: None,
            })
        }
        Err(err) => {
            fail_score_run(store, run_id, &err.to_string(), None).await?;
            if err.is_fatal() {
                return Err(err);
            }
            Ok(MarketScoreResult {
                market,
                score_run_id: run_id,
                rows_written: 0,
                status: "failed".to_string(),
                error: Some(err.to_string()),
            })
        }
    }
}

/// Score several markets sequentially, returning one result per market.
pub async fn score_markets(
    store: &Store,
    registry: &ModelRegistry,
    date: NaiveDate,
    markets: &[Market],
    triggered_by: &str,
) -> Result<Vec<MarketScoreResult>> {
    let mut results = Vec::new();
    for market in markets {
        results.push(
            score_one_market(store, registry, date, *market, triggered_by, None).await?,
        );
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfidenceBand, EntityType, SelectionSide, Signal, VisibilityTier};
    use std::collections::BTreeMap;

    fn draft(key: &str) -> ScoredSelection {
        ScoredSelection {
            market: Market::Hr,
            entity_type: EntityType::Batter,
            game_id: 776123,
            event_id: None,
            player_id: Some(592450),
            player_name: None,
            team_id: None,
            opponent_team_id: None,
            selection_key: key.to_string(),
            side: Some(SelectionSide::Yes),
            bet_type: "HR_YES".into(),
            line: None,
            model_score: 82.0,
            model_prob: Some(0.24),
            model_projection: None,
            book_implied_prob: None,
            edge: None,
            signal: Signal::Bet,
            confidence_band: ConfidenceBand::High,
            visibility_tier: VisibilityTier::Free,
            factors: BTreeMap::new(),
            calibration: None,
            reasons: vec![],
            risk_flags: vec![],
            lineup_confirmed: true,
            weather_final: true,
        }
    }

    #[test]
    fn test_key_collision_detected() {
        let rows = vec![draft("HR|player:592450|YES"), draft("HR|player:592450|YES")];
        assert!(matches!(
            check_key_collisions(&rows),
            Err(MlbError::Invariant(_))
        ));
        let ok = vec![draft("HR|player:592450|YES"), draft("HR|player:660271|YES")];
        assert!(check_key_collisions(&ok).is_ok());
    }

    #[test]
    fn test_missing_data_policy_skip_clears() {
        let mut rows = vec![draft("HR|player:592450|YES")];
        apply_missing_data_policy(MissingDataPolicy::Skip, &["batter_daily_features"], &mut rows);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_data_policy_degrade() {
        let mut rows = vec![draft("HR|player:592450|YES")];
        apply_missing_data_policy(
            MissingDataPolicy::DegradeConfidence,
            &["game_context_features"],
            &mut rows,
        );
        assert_eq!(rows[0].confidence_band, ConfidenceBand::Medium);
        // FREE requires BET + HIGH, so the degraded row is PRO
        assert_eq!(rows[0].visibility_tier, VisibilityTier::Pro);
        assert!(rows[0]
            .risk_flags
            .contains(&"missing:game_context_features".to_string()));
    }

    #[test]
    fn test_missing_data_policy_flags_recompute_band() {
        let mut rows = vec![draft("HR|player:592450|YES")];
        rows[0].risk_flags = vec!["lineup_pending".to_string()];
        apply_missing_data_policy(
            MissingDataPolicy::StoreWithRiskFlags,
            &["game_context_features"],
            &mut rows,
        );
        // two flags now, HIGH degrades one step
        assert_eq!(rows[0].confidence_band, ConfidenceBand::Medium);
    }
}
