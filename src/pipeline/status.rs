//! Status command: last run timestamps per run type, table counts and
//! data freshness.

use crate::error::Result;
use crate::store::Store;

const STATUS_TABLES: [&str; 14] = [
    "stadiums",
    "games",
    "pitch_events",
    "batter_stats",
    "pitcher_stats",
    "lineups",
    "weather",
    "market_odds",
    "batter_daily_features",
    "pitcher_daily_features",
    "team_daily_features",
    "game_context_features",
    "model_scores",
    "market_outcomes",
];

#[derive(Debug)]
pub struct RunStatus {
    pub run_type: String,
    pub status: String,
    pub game_date: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub table_counts: Vec<(String, i64)>,
    pub last_runs: Vec<RunStatus>,
    pub latest_score_date: Option<String>,
}

pub async fn status_report(store: &Store) -> Result<StatusReport> {
    let mut report = StatusReport::default();

    for table in STATUS_TABLES {
        let count = store.table_count(table).await.unwrap_or(-1);
        report.table_counts.push((table.to_string(), count));
    }

    let rows = store
        .fetch_all(
            "SELECT run_type, status, game_date, finished_at
             FROM score_runs s
             WHERE started_at = (
                 SELECT MAX(started_at) FROM score_runs WHERE run_type = s.run_type
             )
             ORDER BY run_type",
            &[],
        )
        .await?;
    for row in &rows {
        report.last_runs.push(RunStatus {
            run_type: row.text("run_type")?,
            status: row.text("status")?,
            game_date: row.opt_text("game_date")?,
            finished_at: row.opt_text("finished_at")?,
        });
    }

    let latest = store
        .fetch_optional(
            "SELECT MAX(game_date) AS latest FROM model_scores WHERE is_active = 1",
            &[],
        )
        .await?;
    report.latest_score_date = latest.map(|r| r.opt_text("latest")).transpose()?.flatten();

    Ok(report)
}

pub fn print_report(report: &StatusReport) {
    println!("table counts");
    for (table, count) in &report.table_counts {
        let display = if *count < 0 { "missing".to_string() } else { count.to_string() };
        println!("  {table:.<32} {display:>10}");
    }
    println!("\nlast runs");
    for run in &report.last_runs {
        println!(
            "  {:<18} {:<10} date={:<12} finished={}",
            run.run_type,
            run.status,
            run.game_date.as_deref().unwrap_or("-"),
            run.finished_at.as_deref().unwrap_or("-"),
        );
    }
    if let Some(latest) = &report.latest_score_date {
        println!("\nlatest active scores: {latest}");
    }
}
