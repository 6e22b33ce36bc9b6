//! Score-run audit rows: one per scoring/fetch/grade pass,
//! `started → completed | failed`.

use chrono::NaiveDate;
use serde_json::json;

use crate::error::Result;
use crate::store::{date_str, now_ts, SqlValue, Store};

pub async fn create_score_run(
    store: &Store,
    run_type: &str,
    game_date: Option<NaiveDate>,
    market: Option<&str>,
    triggered_by: &str,
    metadata: Option<serde_json::Value>,
) -> Result<i64> {
    let metadata = metadata.unwrap_or_else(|| json!({}));
    let row = store
        .fetch_one(
            "INSERT INTO score_runs (run_type, game_date, market, triggered_by, status, \
             started_at, metadata_json, updated_at)
             VALUES ($1, $2, $3, $4, 'started', $5, $6, $5)
             RETURNING id",
            &[
                SqlValue::from(run_type),
                SqlValue::from(game_date.map(date_str)),
                SqlValue::from(market),
                SqlValue::from(triggered_by),
                SqlValue::from(now_ts()),
                SqlValue::from(metadata.to_string()),
            ],
        )
        .await?;
    row.i64("id")
}

pub async fn complete_score_run(
    store: &Store,
    score_run_id: i64,
    status: &str,
    rows_scored: i64,
    metadata: Option<serde_json::Value>,
) -> Result<()> {
    match metadata {
        None => {
            store
                .execute(
                    "UPDATE score_runs
                     SET status = $1, rows_scored = $2, finished_at = $3, updated_at = $3
                     WHERE id = $4",
                    &[
                        SqlValue::from(status),
                        SqlValue::from(rows_scored),
                        SqlValue::from(now_ts()),
                        SqlValue::from(score_run_id),
                    ],
                )
                .await?;
        }
        Some(meta) => {
            store
                .execute(
                    "UPDATE score_runs
                     SET status = $1, rows_scored = $2, finished_at = $3,
                         metadata_json = $4, updated_at = $3
                     WHERE id = $5",
                    &[
                        SqlValue::from(status),
                        SqlValue::from(rows_scored),
                        SqlValue::from(now_ts()),
                        SqlValue::from(meta.to_string()),
                        SqlValue::from(score_run_id),
                    ],
                )
                .await?;
        }
    }
    Ok(())
}

/// Mark a run failed and attach the error message to `metadata_json`.
pub async fn fail_score_run(
    store: &Store,
    score_run_id: i64,
    error_message: &str,
    extra: Option<serde_json::Value>,
) -> Result<()> {
    let mut payload = json!({ "error_message": error_message });
    if let Some(serde_json::Value::Object(map)) = extra {
        for (k, v) in map {
            payload[k] = v;
        }
    }
    complete_score_run(store, score_run_id, "failed", 0, Some(payload)).await
}
