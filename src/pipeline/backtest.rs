//! No-lookahead historical backtester.
//!
//! Reconstructs as-of views from the persisted store: scored rows joined
//! against realized outcomes, open odds restricted to snapshots fetched
//! at or before the score row's creation, closing lines from the cached
//! policy rows. Emits the results CSV plus aggregate metrics (win rate
//! with pushes excluded, ROI per row, probability-bucket calibration and
//! factor↔profit correlations).
//!
//! Hard assertion: an outcome settled before its own game date is a
//! lookahead contradiction; the run aborts with an `Invariant` error
//! before any scoring-side read.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::domain::{BetResult, Market, SelectionSide, Signal};
use crate::error::{MlbError, Result};
use crate::grading::{payout_for_settlement, settle_selection};
use crate::store::{SqlValue, Store};

pub const CSV_FIELDS: [&str; 19] = [
    "game_date",
    "market",
    "game_id",
    "selection_key",
    "signal",
    "model_score",
    "model_prob",
    "edge",
    "side",
    "line",
    "open_odds",
    "open_implied_prob",
    "close_implied_prob",
    "clv",
    "outcome_value",
    "settlement",
    "profit_units",
    "score_bucket",
    "prob_bucket",
];

#[derive(Debug, Clone)]
pub struct BacktestOptions {
    pub market: Market,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub signals: Vec<Signal>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct BucketStat {
    pub count: usize,
    pub win_rate: Option<f64>,
    pub roi: f64,
    pub avg_edge: Option<f64>,
    pub avg_clv: Option<f64>,
}

#[derive(Debug, Default)]
pub struct CalibrationStat {
    pub count: usize,
    pub avg_model_prob: f64,
    pub realized_win_rate: f64,
    pub calibration_error: f64,
}

#[derive(Debug, Default)]
pub struct BacktestSummary {
    pub market: String,
    pub rows_scored: usize,
    pub rows_with_open_odds: usize,
    pub rows_graded: usize,
    pub win_rate: Option<f64>,
    pub roi_units: Option<f64>,
    pub total_profit_units: f64,
    pub score_buckets: BTreeMap<String, BucketStat>,
    pub calibration: BTreeMap<String, CalibrationStat>,
    pub factor_profit_corr: BTreeMap<String, f64>,
    pub csv_path: String,
}

pub fn score_bucket(model_score: Option<f64>) -> String {
    match model_score {
        None => "unknown".to_string(),
        Some(s) if s < 50.0 => "<50".to_string(),
        Some(s) if s < 60.0 => "50-59".to_string(),
        Some(s) if s < 70.0 => "60-69".to_string(),
        Some(s) if s < 80.0 => "70-79".to_string(),
        Some(_) => "80+".to_string(),
    }
}

pub fn prob_bucket(model_prob: Option<f64>) -> String {
    match model_prob {
        None => "unknown".to_string(),
        Some(p) => {
            let p = p.clamp(0.0, 1.0);
            let lo = ((p * 10.0).floor() as i64 * 10).min(90);
            format!("{}-{}%", lo, lo + 9)
        }
    }
}

fn corr(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let num: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let dx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum::<f64>().sqrt();
    let dy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum::<f64>().sqrt();
    if dx == 0.0 || dy == 0.0 {
        return None;
    }
    Some(num / (dx * dy))
}

struct SimRow {
    game_date: String,
    market: String,
    game_id: i64,
    selection_key: String,
    signal: String,
    model_score: Option<f64>,
    model_prob: Option<f64>,
    edge: Option<f64>,
    side: Option<String>,
    line: Option<f64>,
    open_odds: Option<i64>,
    open_implied_prob: Option<f64>,
    close_implied_prob: Option<f64>,
    clv: Option<f64>,
    outcome_value: Option<f64>,
    settlement: BetResult,
    profit_units: f64,
    factors: HashMap<String, f64>,
}

/// The no-lookahead hard assertion: no outcome in the range may carry a
/// settlement timestamp earlier than its own game date's first instant.
async fn assert_no_lookahead(
    store: &Store,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let mut sql = String::from(
        "SELECT game_date, selection_key, settled_at FROM market_outcomes
         WHERE settled_at < (game_date || 'T00:00:00+00:00')",
    );
    let mut params = Vec::new();
    if let Some(start) = start {
        params.push(SqlValue::from(start));
        sql.push_str(&format!(" AND game_date >= ${}", params.len()));
    }
    if let Some(end) = end {
        params.push(SqlValue::from(end));
        sql.push_str(&format!(" AND game_date <= ${}", params.len()));
    }
    sql.push_str(" LIMIT 1");

    if let Some(row) = store.fetch_optional(&sql, &params).await? {
        return Err(MlbError::Invariant(format!(
            "outcome settled before its game date: {} settled_at={} ({})",
            row.text("game_date")?,
            row.text("settled_at")?,
            row.text("selection_key")?,
        )));
    }
    Ok(())
}

async fn load_scores(store: &Store, opts: &BacktestOptions) -> Result<Vec<crate::store::StoreRow>> {
    let mut sql = String::from(
        "SELECT * FROM model_scores WHERE market = $1 AND is_active = 1",
    );
    let mut params = vec![SqlValue::from(opts.market.as_str())];
    if let Some(start) = opts.start {
        params.push(SqlValue::from(start));
        sql.push_str(&format!(" AND game_date >= ${}", params.len()));
    }
    if let Some(end) = opts.end {
        params.push(SqlValue::from(end));
        sql.push_str(&format!(" AND game_date <= ${}", params.len()));
    }
    if !opts.signals.is_empty() {
        let placeholders: Vec<String> = opts
            .signals
            .iter()
            .map(|s| {
                params.push(SqlValue::from(s.as_str()));
                format!("${}", params.len())
            })
            .collect();
        sql.push_str(&format!(" AND signal IN ({})", placeholders.join(", ")));
    }
    sql.push_str(" ORDER BY game_date, game_id, created_at");
    store.fetch_all(&sql, &params).await
}

/// Open odds with no lookahead: the newest snapshot fetched at or before
/// the score row's creation, best payoff on ties.
async fn match_open_odds(
    store: &Store,
    market: &str,
    game_id: i64,
    selection_key: &str,
    created_at: &str,
) -> Result<Option<(i64, Option<f64>)>> {
    let row = store
        .fetch_optional(
            "SELECT price_american, implied_probability
             FROM market_odds
             WHERE market = $1 AND game_id = $2 AND selection_key = $3 AND fetched_at <= $4
             ORDER BY fetched_at DESC, price_decimal DESC
             LIMIT 1",
            &[
                SqlValue::from(market),
                SqlValue::from(game_id),
                SqlValue::from(selection_key),
                SqlValue::from(created_at),
            ],
        )
        .await?;
    Ok(match row {
        Some(row) => Some((row.i64("price_american")?, row.opt_f64("implied_probability")?)),
        None => None,
    })
}

async fn match_outcome(
    store: &Store,
    market: &str,
    game_id: i64,
    selection_key: &str,
) -> Result<Option<f64>> {
    let row = store
        .fetch_optional(
            "SELECT outcome_value FROM market_outcomes
             WHERE market = $1 AND game_id = $2 AND selection_key = $3",
            &[
                SqlValue::from(market),
                SqlValue::from(game_id),
                SqlValue::from(selection_key),
            ],
        )
        .await?;
    Ok(row.map(|r| r.opt_f64("outcome_value")).transpose()?.flatten())
}

async fn match_closing_implied(
    store: &Store,
    game_date: &str,
    selection_key: &str,
) -> Result<Option<f64>> {
    let row = store
        .fetch_optional(
            "SELECT implied_probability FROM closing_lines
             WHERE game_date = $1 AND selection_key = $2",
            &[SqlValue::from(game_date), SqlValue::from(selection_key)],
        )
        .await?;
    Ok(row.map(|r| r.opt_f64("implied_probability")).transpose()?.flatten())
}

fn parse_factors(raw: &str) -> HashMap<String, f64> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return HashMap::new();
    };
    map.into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
        .collect()
}

fn write_csv(path: &Path, rows: &[SimRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_FIELDS)?;
    let fmt_f = |v: Option<f64>| v.map(|f| f.to_string()).unwrap_or_default();
    for row in rows {
        writer.write_record([
            row.game_date.clone(),
            row.market.clone(),
            row.game_id.to_string(),
            row.selection_key.clone(),
            row.signal.clone(),
            fmt_f(row.model_score),
            fmt_f(row.model_prob),
            fmt_f(row.edge),
            row.side.clone().unwrap_or_default(),
            fmt_f(row.line),
            row.open_odds.map(|o| o.to_string()).unwrap_or_default(),
            fmt_f(row.open_implied_prob),
            fmt_f(row.close_implied_prob),
            fmt_f(row.clv),
            fmt_f(row.outcome_value),
            row.settlement.as_str().to_string(),
            row.profit_units.to_string(),
            score_bucket(row.model_score),
            prob_bucket(row.model_prob),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub async fn run_backtest(store: &Store, opts: &BacktestOptions) -> Result<BacktestSummary> {
    assert_no_lookahead(store, opts.start, opts.end).await?;

    let output_path = opts
        .output_dir
        .join(format!("backtest_results_{}.csv", opts.market.as_str()));
    let scores = load_scores(store, opts).await?;
    let mut summary = BacktestSummary {
        market: opts.market.as_str().to_string(),
        rows_scored: scores.len(),
        csv_path: output_path.display().to_string(),
        ..Default::default()
    };

    let mut sim_rows: Vec<SimRow> = Vec::new();
    for score in &scores {
        let market = score.text("market")?;
        let game_id = score.i64("game_id")?;
        let selection_key = score.text("selection_key")?;
        let created_at = score.text("created_at")?;

        let Some((open_odds, open_implied_raw)) =
            match_open_odds(store, &market, game_id, &selection_key, &created_at).await?
        else {
            continue;
        };
        let Some(outcome_value) = match_outcome(store, &market, game_id, &selection_key).await?
        else {
            continue;
        };

        let side = score.opt_text("side")?;
        let line = score.opt_f64("line")?;
        let settlement = settle_selection(
            opts.market,
            side.as_deref().and_then(SelectionSide::parse),
            line,
            Some(outcome_value),
        );
        let (_, profit) = payout_for_settlement(1.0, Some(open_odds), settlement);
        let Some(profit) = profit else {
            continue;
        };

        let open_implied =
            open_implied_raw.or_else(|| crate::odds::american_to_implied(open_odds));
        let game_date = score.text("game_date")?;
        let close_implied = match_closing_implied(store, &game_date, &selection_key).await?;
        let clv = match (open_implied, close_implied) {
            (Some(open), Some(close)) => Some(open - close),
            _ => None,
        };

        sim_rows.push(SimRow {
            game_date,
            market,
            game_id,
            selection_key,
            signal: score.text("signal")?,
            model_score: score.opt_f64("model_score")?,
            model_prob: score.opt_f64("model_prob")?,
            edge: score.opt_f64("edge")?,
            side,
            line,
            open_odds: Some(open_odds),
            open_implied_prob: open_implied,
            close_implied_prob: close_implied,
            clv,
            outcome_value: Some(outcome_value),
            settlement,
            profit_units: profit,
            factors: parse_factors(&score.text("factors_json")?),
        });
    }

    summary.rows_with_open_odds = sim_rows.len();
    summary.rows_graded = sim_rows.len();
    write_csv(&output_path, &sim_rows)?;
    if sim_rows.is_empty() {
        return Ok(summary);
    }

    // aggregate metrics; pushes excluded from the win rate
    let wins = sim_rows.iter().filter(|r| r.settlement == BetResult::Win).count();
    let losses = sim_rows.iter().filter(|r| r.settlement == BetResult::Loss).count();
    let decisions = wins + losses;
    summary.total_profit_units = sim_rows.iter().map(|r| r.profit_units).sum();
    summary.roi_units = Some(summary.total_profit_units / sim_rows.len() as f64);
    summary.win_rate = if decisions > 0 {
        Some(wins as f64 / decisions as f64)
    } else {
        None
    };

    let mut by_score: BTreeMap<String, Vec<&SimRow>> = BTreeMap::new();
    let mut by_prob: BTreeMap<String, Vec<&SimRow>> = BTreeMap::new();
    for row in &sim_rows {
        by_score.entry(score_bucket(row.model_score)).or_default().push(row);
        by_prob.entry(prob_bucket(row.model_prob)).or_default().push(row);
    }

    for (bucket, rows) in by_score {
        let b_wins = rows.iter().filter(|r| r.settlement == BetResult::Win).count();
        let b_losses = rows.iter().filter(|r| r.settlement == BetResult::Loss).count();
        let edges: Vec<f64> = rows.iter().filter_map(|r| r.edge).collect();
        let clvs: Vec<f64> = rows.iter().filter_map(|r| r.clv).collect();
        summary.score_buckets.insert(
            bucket,
            BucketStat {
                count: rows.len(),
                win_rate: if b_wins + b_losses > 0 {
                    Some(b_wins as f64 / (b_wins + b_losses) as f64)
                } else {
                    None
                },
                roi: rows.iter().map(|r| r.profit_units).sum::<f64>() / rows.len() as f64,
                avg_edge: if edges.is_empty() {
                    None
                } else {
                    Some(edges.iter().sum::<f64>() / edges.len() as f64)
                },
                avg_clv: if clvs.is_empty() {
                    None
                } else {
                    Some(clvs.iter().sum::<f64>() / clvs.len() as f64)
                },
            },
        );
    }

    for (bucket, rows) in by_prob {
        if bucket == "unknown" {
            continue;
        }
        let decided: Vec<&&SimRow> = rows
            .iter()
            .filter(|r| matches!(r.settlement, BetResult::Win | BetResult::Loss))
            .collect();
        let probs: Vec<f64> = decided.iter().filter_map(|r| r.model_prob).collect();
        if decided.is_empty() || probs.is_empty() {
            continue;
        }
        let realized = decided
            .iter()
            .filter(|r| r.settlement == BetResult::Win)
            .count() as f64
            / decided.len() as f64;
        let avg_prob = probs.iter().sum::<f64>() / probs.len() as f64;
        summary.calibration.insert(
            bucket,
            CalibrationStat {
                count: decided.len(),
                avg_model_prob: avg_prob,
                realized_win_rate: realized,
                calibration_error: avg_prob - realized,
            },
        );
    }

    let mut factor_values: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in &sim_rows {
        for (key, value) in &row.factors {
            let entry = factor_values.entry(key.clone()).or_default();
            entry.0.push(*value);
            entry.1.push(row.profit_units);
        }
    }
    for (key, (values, profits)) in factor_values {
        if let Some(c) = corr(&values, &profits) {
            summary.factor_profit_corr.insert(key, c);
        }
    }

    info!(
        market = %summary.market,
        rows = summary.rows_graded,
        win_rate = ?summary.win_rate,
        roi = ?summary.roi_units,
        csv = %summary.csv_path,
        "backtest complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_buckets() {
        assert_eq!(score_bucket(Some(42.0)), "<50");
        assert_eq!(score_bucket(Some(55.0)), "50-59");
        assert_eq!(score_bucket(Some(69.9)), "60-69");
        assert_eq!(score_bucket(Some(75.0)), "70-79");
        assert_eq!(score_bucket(Some(91.0)), "80+");
        assert_eq!(score_bucket(None), "unknown");
    }

    #[test]
    fn test_prob_buckets_ten_point_bins() {
        assert_eq!(prob_bucket(Some(0.05)), "0-9%");
        assert_eq!(prob_bucket(Some(0.24)), "20-29%");
        assert_eq!(prob_bucket(Some(0.999)), "90-99%");
        assert_eq!(prob_bucket(Some(1.0)), "90-99%");
        assert_eq!(prob_bucket(None), "unknown");
    }

    #[test]
    fn test_corr_perfect_positive() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((corr(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
        // degenerate inputs
        assert_eq!(corr(&[1.0, 2.0], &[1.0, 2.0]), None);
        assert_eq!(corr(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn test_csv_field_order_matches_contract() {
        assert_eq!(CSV_FIELDS[0], "game_date");
        assert_eq!(CSV_FIELDS[4], "signal");
        assert_eq!(CSV_FIELDS[16], "profit_units");
        assert_eq!(CSV_FIELDS.len(), 19);
    }
}
