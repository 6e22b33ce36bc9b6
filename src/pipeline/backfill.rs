//! Historical backfill across a date range.
//!
//! Phase 1 is sequential and bulk-efficient: pitch events arrive in
//! bounded chunks (default 60 days), each consumed into window stats and
//! released before the next loads; the schedule is pulled per date.
//!
//! Phase 2 is a bounded worker pool (default 4): dates flow through a
//! queue, each worker clones its own store handle, runs feature builders,
//! scorers and the grader for its date, and an error on one date never
//! poisons the pool. The pool's exit status is the worst of any worker's.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::Market;
use crate::error::Result;
use crate::fetch::{schedule, statcast};
use crate::grading;
use crate::markets::ModelRegistry;
use crate::pipeline::score::score_one_market;
use crate::stats::build_window_stats;
use crate::store::{date_str, Store};

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub build_features: bool,
    pub score_markets: Vec<Market>,
    pub grade: bool,
    pub use_bulk: bool,
    pub workers: usize,
}

#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub days: usize,
    pub success_days: usize,
    pub failed_days: Vec<(NaiveDate, String)>,
    /// Market passes that completed degraded (risk-flagged) rather than
    /// failing their date outright.
    pub degraded_markets: usize,
    pub event_rows: usize,
    pub batter_stat_rows: u64,
    pub pitcher_stat_rows: u64,
    pub feature_rows: u64,
    pub score_rows: u64,
    pub outcomes: u64,
}

impl BackfillSummary {
    /// Worst outcome across the pool: 1 for any failed date, 2 for
    /// degraded market passes, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if !self.failed_days.is_empty() {
            1
        } else if self.degraded_markets > 0 {
            2
        } else {
            0
        }
    }
}

fn dates_in(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current += Duration::days(1);
    }
    dates
}

// =============================================================================
// Phase 1: raw store
// =============================================================================

async fn phase1(
    config: &AppConfig,
    store: &Store,
    client: &Client,
    opts: &BackfillOptions,
    summary: &mut BackfillSummary,
) -> Result<()> {
    let chunk_days = config.pipeline.bulk_chunk_days.max(1);
    let mut chunk_start = opts.start;
    while chunk_start <= opts.end {
        let chunk_end = (chunk_start + Duration::days(chunk_days - 1)).min(opts.end);
        info!(
            start = %date_str(chunk_start),
            end = %date_str(chunk_end),
            "phase 1 chunk"
        );

        // schedule per date: game rows anchor starters and grading
        for date in dates_in(chunk_start, chunk_end) {
            if let Err(e) = schedule::fetch_games(client, &config.apis, store, date).await {
                warn!(date = %date_str(date), error = %e, "schedule fetch degraded");
            }
        }

        if opts.use_bulk {
            summary.event_rows +=
                statcast::fetch_bulk(client, &config.apis, store, chunk_start, chunk_end).await?;
        } else {
            for date in dates_in(chunk_start, chunk_end) {
                summary.event_rows +=
                    statcast::fetch_per_day(client, &config.apis, store, date).await?;
            }
        }

        let windows = build_window_stats(store, chunk_start, chunk_end).await?;
        summary.batter_stat_rows += windows.batter_rows;
        summary.pitcher_stat_rows += windows.pitcher_rows;

        // chunk buffers release here before the next span loads
        chunk_start = chunk_end + Duration::days(1);
    }
    Ok(())
}

// =============================================================================
// Phase 2: per-date pipeline, bounded parallel
// =============================================================================

#[derive(Debug, Default)]
struct DayOutcome {
    feature_rows: u64,
    score_rows: u64,
    outcomes: u64,
    degraded_markets: usize,
}

async fn process_date(
    config: &AppConfig,
    store: &Store,
    client: &Client,
    registry: &ModelRegistry,
    opts: &BackfillOptions,
    date: NaiveDate,
) -> Result<DayOutcome> {
    let mut outcome = DayOutcome::default();

    if opts.build_features {
        let features = crate::features::run_build_features(store, date).await?;
        outcome.feature_rows = features.total_rows();
    }

    for market in &opts.score_markets {
        let result =
            score_one_market(store, registry, date, *market, "backfill", None).await?;
        outcome.score_rows += result.rows_written;
        if result.failed() {
            warn!(
                date = %date_str(date),
                market = %result.market,
                error = result.error.as_deref().unwrap_or("unknown"),
                "market pass degraded"
            );
            outcome.degraded_markets += 1;
        }
    }

    if opts.grade {
        let graded = grading::grade_date(
            store,
            client,
            &config.apis,
            date,
            config.pipeline.closing_line_policy,
        )
        .await?;
        outcome.outcomes = graded.outcomes_upserted;
    }
    Ok(outcome)
}

async fn phase2(
    config: &AppConfig,
    store: &Store,
    client: &Client,
    opts: &BackfillOptions,
    summary: &mut BackfillSummary,
) -> Result<()> {
    if !opts.build_features && opts.score_markets.is_empty() && !opts.grade {
        return Ok(());
    }

    let dates = dates_in(opts.start, opts.end);
    let queue = Arc::new(Mutex::new(dates.into_iter().collect::<Vec<_>>()));
    let workers = opts.workers.max(1);
    info!(workers, "phase 2 start");

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let queue = Arc::clone(&queue);
        let store = store.clone();
        let client = client.clone();
        let config = config.clone();
        let opts = opts.clone();
        handles.push(tokio::spawn(async move {
            // each worker owns its registry and pooled connections
            let registry = ModelRegistry::new();
            let mut results: Vec<(NaiveDate, Result<DayOutcome>)> = Vec::new();
            loop {
                let date = {
                    let mut q = queue.lock().await;
                    match q.pop() {
                        Some(d) => d,
                        None => break,
                    }
                };
                let outcome =
                    process_date(&config, &store, &client, &registry, &opts, date).await;
                if let Err(e) = &outcome {
                    error!(worker_id, date = %date_str(date), error = %e, "backfill date failed");
                }
                results.push((date, outcome));
            }
            results
        }));
    }

    for handle in handles {
        let results = handle
            .await
            .map_err(|e| crate::error::MlbError::Internal(format!("worker panicked: {e}")))?;
        for (date, outcome) in results {
            match outcome {
                Ok(day) => {
                    summary.success_days += 1;
                    summary.feature_rows += day.feature_rows;
                    summary.score_rows += day.score_rows;
                    summary.outcomes += day.outcomes;
                    summary.degraded_markets += day.degraded_markets;
                }
                Err(e) => summary.failed_days.push((date, e.to_string())),
            }
        }
    }
    Ok(())
}

pub async fn run_backfill(
    config: &AppConfig,
    store: &Store,
    client: &Client,
    opts: BackfillOptions,
) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary {
        days: dates_in(opts.start, opts.end).len(),
        ..Default::default()
    };

    info!(
        start = %date_str(opts.start),
        end = %date_str(opts.end),
        days = summary.days,
        bulk = opts.use_bulk,
        "backfill start"
    );

    phase1(config, store, client, &opts, &mut summary).await?;
    phase2(config, store, client, &opts, &mut summary).await?;

    if !opts.build_features && opts.score_markets.is_empty() && !opts.grade {
        summary.success_days = summary.days;
    }

    info!(
        events = summary.event_rows,
        batter_stats = summary.batter_stat_rows,
        pitcher_stats = summary.pitcher_stat_rows,
        features = summary.feature_rows,
        scores = summary.score_rows,
        degraded = summary.degraded_markets,
        failed = summary.failed_days.len(),
        "backfill complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dates_in_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 4, 3).unwrap();
        assert_eq!(dates_in(start, end).len(), 3);
        assert_eq!(dates_in(start, start).len(), 1);
    }

    #[test]
    fn test_exit_code_worst_of_pool() {
        let mut summary = BackfillSummary::default();
        assert_eq!(summary.exit_code(), 0);

        summary.degraded_markets = 2;
        assert_eq!(summary.exit_code(), 2);

        // a failed date outranks degraded passes
        summary
            .failed_days
            .push((NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), "boom".into()));
        assert_eq!(summary.exit_code(), 1);
    }
}
