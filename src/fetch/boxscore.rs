//! Final boxscore and linescore fetchers used by the grader when the
//! locally derived game logs do not cover a selection.

use std::collections::HashMap;

use reqwest::Client;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::Result;
use crate::fetch::with_retries;
use crate::store::{SqlValue, Store};

/// Realized per-player line from a final boxscore.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerLine {
    pub hr: i64,
    pub hits: i64,
    pub total_bases: i64,
    pub strikeouts_thrown: i64,
    pub outs_recorded: i64,
}

pub async fn fetch_boxscore_lines(
    client: &Client,
    cfg: &ApiConfig,
    game_id: i64,
) -> Result<HashMap<i64, PlayerLine>> {
    let url = format!("{}/game/{}/boxscore", cfg.mlb_stats_base, game_id);
    let payload = with_retries(cfg.retry_attempts, "boxscore", || async {
        let resp = client.get(&url).send().await?.error_for_status()?;
        Ok(resp.json::<Value>().await?)
    })
    .await?;

    let mut lines: HashMap<i64, PlayerLine> = HashMap::new();
    for side in ["home", "away"] {
        let Some(players) = payload["teams"][side]["players"].as_object() else {
            continue;
        };
        for (key, player) in players {
            let Some(player_id) = key.strip_prefix("ID").and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            let batting = &player["stats"]["batting"];
            let pitching = &player["stats"]["pitching"];
            let line = lines.entry(player_id).or_default();
            line.hr = batting["homeRuns"].as_i64().unwrap_or(0);
            line.hits = batting["hits"].as_i64().unwrap_or(0);
            line.total_bases = batting["totalBases"].as_i64().unwrap_or(0);
            line.strikeouts_thrown = pitching["strikeOuts"].as_i64().unwrap_or(0);
            line.outs_recorded = pitching["outs"].as_i64().unwrap_or(0);
        }
    }
    Ok(lines)
}

/// Fetch per-inning runs and cache them in `game_linescores`. Returns the
/// first-5 totals `(home, away)` when at least five innings are recorded.
pub async fn fetch_linescore_first5(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    game_id: i64,
) -> Result<Option<(i64, i64)>> {
    // Cached innings first: backfilled ranges never re-fetch.
    if let Some(first5) = first5_from_store(store, game_id).await? {
        return Ok(Some(first5));
    }

    let url = format!("{}/game/{}/linescore", cfg.mlb_stats_base, game_id);
    let payload = with_retries(cfg.retry_attempts, "linescore", || async {
        let resp = client.get(&url).send().await?.error_for_status()?;
        Ok(resp.json::<Value>().await?)
    })
    .await?;

    let Some(innings) = payload["innings"].as_array() else {
        return Ok(None);
    };
    let columns = ["game_id", "inning", "home_runs", "away_runs"];
    let rows: Vec<Vec<SqlValue>> = innings
        .iter()
        .enumerate()
        .map(|(idx, inning)| {
            vec![
                SqlValue::from(game_id),
                SqlValue::from(inning["num"].as_i64().unwrap_or(idx as i64 + 1)),
                SqlValue::from(inning["home"]["runs"].as_i64()),
                SqlValue::from(inning["away"]["runs"].as_i64()),
            ]
        })
        .collect();
    store
        .upsert_batch("game_linescores", &columns, &["game_id", "inning"], &rows)
        .await?;

    first5_from_store(store, game_id).await
}

async fn first5_from_store(store: &Store, game_id: i64) -> Result<Option<(i64, i64)>> {
    let row = store
        .fetch_one(
            "SELECT CAST(COUNT(*) AS BIGINT) AS n,
                    CAST(COALESCE(SUM(home_runs), 0) AS BIGINT) AS home_total,
                    CAST(COALESCE(SUM(away_runs), 0) AS BIGINT) AS away_total
             FROM game_linescores
             WHERE game_id = $1 AND inning <= 5",
            &[SqlValue::from(game_id)],
        )
        .await?;
    if row.i64("n")? < 5 {
        return Ok(None);
    }
    Ok(Some((row.i64("home_total")?, row.i64("away_total")?)))
}
