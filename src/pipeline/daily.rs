//! Daily orchestrator: fetchers → raw stats → feature store → market
//! dispatch → grading, sequentially, one `ScoreRun` per stage.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, warn};

use crate::alerts;
use crate::config::AppConfig;
use crate::error::Result;
use crate::fetch::{lineups, odds_api, schedule, statcast, weather};
use crate::grading;
use crate::markets::ModelRegistry;
use crate::pipeline::score::score_markets;
use crate::stats::build_window_stats;
use crate::store::runs::{complete_score_run, create_score_run, fail_score_run};
use crate::store::{date_str, Store};

#[derive(Debug, Default)]
pub struct DailySummary {
    pub games: usize,
    pub event_rows: usize,
    pub weather_records: usize,
    pub lineup_changes: usize,
    pub odds_rows: usize,
    pub feature_rows: u64,
    pub score_rows: u64,
    pub outcomes: u64,
    pub risk_warnings: usize,
    pub failed_markets: usize,
}

impl DailySummary {
    /// Exit code semantics: 0 clean, 2 partial success with risk flags.
    pub fn exit_code(&self) -> i32 {
        if self.failed_markets > 0 || self.risk_warnings > 0 {
            2
        } else {
            0
        }
    }
}

/// Run one stage under a score-run audit row; a stage error marks the
/// run failed and propagates.
async fn staged<T, F>(
    store: &Store,
    run_type: &str,
    date: NaiveDate,
    work: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<(T, i64)>>,
{
    let run_id = create_score_run(store, run_type, Some(date), None, "daily", None).await?;
    match work.await {
        Ok((value, rows)) => {
            complete_score_run(store, run_id, "completed", rows, None).await?;
            Ok(value)
        }
        Err(err) => {
            fail_score_run(store, run_id, &err.to_string(), Some(json!({"stage": run_type})))
                .await?;
            error!(stage = run_type, error = %err, "daily stage failed");
            Err(err)
        }
    }
}

pub async fn run_daily(
    config: &AppConfig,
    store: &Store,
    client: &Client,
    registry: &ModelRegistry,
    date: NaiveDate,
    send_alerts: bool,
) -> Result<DailySummary> {
    info!(date = %date_str(date), "daily pipeline start");
    let mut summary = DailySummary::default();
    let api = &config.apis;

    // Stage 1: schedule + umpires
    let games = staged(store, "fetch_schedule", date, async {
        let games = schedule::fetch_games(client, api, store, date).await?;
        let n = games.len() as i64;
        Ok((games, n))
    })
    .await?;
    summary.games = games.len();
    if games.is_empty() {
        info!("no games today, pipeline complete");
        return Ok(summary);
    }

    // Stage 2: pitch events + rolling windows (yesterday's games feed
    // today's as-of stats)
    summary.event_rows = staged(store, "fetch_events", date, async {
        let prev = date.pred_opt().unwrap_or(date);
        let rows = statcast::fetch_per_day(client, api, store, prev).await?;
        build_window_stats(store, prev, prev).await?;
        Ok((rows, rows as i64))
    })
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "pitch event stage degraded");
        summary.risk_warnings += 1;
        0
    });

    // Stage 3: weather
    summary.weather_records = staged(store, "fetch_weather", date, async {
        let records = weather::fetch_game_weather(client, api, store, &games).await?;
        let n = records.len() as i64;
        Ok((records.len(), n))
    })
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "weather stage degraded");
        summary.risk_warnings += 1;
        0
    });

    // Stage 4: lineups
    summary.lineup_changes = staged(store, "fetch_lineups", date, async {
        let result = lineups::fetch_lineups_for_date(client, api, store, date).await?;
        let n = result.rows_inserted as i64;
        Ok((result.changed.len(), n))
    })
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "lineup stage degraded");
        summary.risk_warnings += 1;
        0
    });

    // Stage 5: odds
    summary.odds_rows = staged(store, "odds_refresh", date, async {
        let result = odds_api::refresh_odds(client, api, store, date).await?;
        let n = result.rows_upserted as i64;
        Ok((result.rows_collected, n))
    })
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "odds stage degraded");
        summary.risk_warnings += 1;
        0
    });

    // Stage 6: feature store
    let features = staged(store, "build_features", date, async {
        let summary = crate::features::run_build_features(store, date).await?;
        let rows = summary.total_rows() as i64;
        Ok((summary, rows))
    })
    .await?;
    summary.feature_rows = features.total_rows();
    summary.risk_warnings += features.warnings.len();

    // Stage 7: scoring, all markets
    let markets = registry.markets();
    let results = score_markets(store, registry, date, &markets, "daily").await?;
    summary.score_rows = results.iter().map(|r| r.rows_written).sum();
    summary.failed_markets = results.iter().filter(|r| r.failed()).count();

    if send_alerts {
        for result in &results {
            if !result.failed() {
                if let Err(e) =
                    alerts::send_market_alerts(client, &config.alerts, store, date, result.market)
                        .await
                {
                    warn!(market = %result.market, error = %e, "alert send failed");
                }
            }
        }
    }

    // Stage 8: grading (settles whatever is final)
    let grade = staged(store, "grade", date, async {
        let summary =
            grading::grade_date(store, client, api, date, config.pipeline.closing_line_policy)
                .await?;
        let rows = summary.outcomes_upserted as i64;
        Ok((summary, rows))
    })
    .await?;
    summary.outcomes = grade.outcomes_upserted;

    info!(
        date = %date_str(date),
        games = summary.games,
        features = summary.feature_rows,
        scores = summary.score_rows,
        outcomes = summary.outcomes,
        "daily pipeline complete"
    );
    Ok(summary)
}
