//! mlbpredicts CLI: one subcommand per pipeline entrypoint.
//!
//! Exit codes: 0 success, 1 hard error (surfaced to the job runner),
//! 2 partial success with risk flags. A failed migration is always 1.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::error;

use crate::config::AppConfig;
use crate::domain::{Market, Signal};
use crate::error::{MlbError, Result};
use crate::fetch::{self, lineups, odds_api};
use crate::grading;
use crate::markets::ModelRegistry;
use crate::pipeline::backfill::{run_backfill, BackfillOptions};
use crate::pipeline::backtest::{run_backtest, BacktestOptions};
use crate::pipeline::daily::run_daily;
use crate::pipeline::rescore::rescore_on_lineup;
use crate::pipeline::score::score_markets;
use crate::pipeline::status::{print_report, status_report};
use crate::stadiums::load_stadiums;
use crate::store::{migrate, Store};
use crate::{alerts, features};

#[derive(Parser, Debug)]
#[command(name = "mlbpredicts")]
#[command(author, version, about = "MLB betting market scoring pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the schema and load stadium reference data
    Init,

    /// Apply pending additive SQL migrations
    Migrate,

    /// Run the daily orchestrator for a date
    Daily {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        send_alerts: bool,
    },

    /// Fetch and normalize sportsbook odds for a date
    RefreshOdds {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Fetch lineup snapshots for a date
    FetchLineups {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run the four feature-store builders for a date
    BuildFeatures {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Score one market or all markets for a date
    Score {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        market: Option<String>,
        #[arg(long)]
        all_markets: bool,
        #[arg(long)]
        send_alerts: bool,
    },

    /// Re-score lineup-sensitive markets for games whose lineups changed
    RescoreOnLineup {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        send_alerts: bool,
    },

    /// Grade outcomes, settle bets and capture closing-line value
    Grade {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Backfill a historical date range (bulk Phase 1, parallel Phase 2)
    Backfill {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        #[arg(long)]
        build_features: bool,
        #[arg(long)]
        score: bool,
        #[arg(long)]
        all_markets: bool,
        #[arg(long)]
        market: Option<String>,
        #[arg(long)]
        grade: bool,
        /// Use per-day event fetches instead of bulk spans
        #[arg(long)]
        no_bulk: bool,
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Run the no-lookahead backtester for a market and write its CSV
    Backtest {
        #[arg(long)]
        market: String,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Comma-separated signals to include (default: BET)
        #[arg(long, default_value = "BET")]
        signals: String,
        #[arg(long, default_value = "./data")]
        output_dir: String,
    },

    /// Print last run timestamps, row counts and freshness
    Status,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn parse_market(raw: &str) -> Result<Market> {
    Market::parse(raw).ok_or_else(|| MlbError::Validation(format!("unknown market: {raw}")))
}

fn parse_markets(market: Option<&str>, all_markets: bool) -> Result<Vec<Market>> {
    if all_markets {
        return Ok(Market::ALL.to_vec());
    }
    match market {
        Some(raw) => Ok(vec![parse_market(raw)?]),
        None => Err(MlbError::Validation(
            "either --market or --all-markets is required".to_string(),
        )),
    }
}

impl Cli {
    /// Dispatch the parsed command; the returned code is the process
    /// exit status.
    pub async fn run(self, config: AppConfig) -> Result<i32> {
        let store = Store::connect(&config.database).await?;
        let client = fetch::http_client(&config.apis)?;

        match self.command {
            Commands::Init => {
                migrate::run_migrations(&store).await?;
                let stadiums = load_stadiums(&store).await?;
                println!("schema ready, {stadiums} stadium rows loaded");
                Ok(0)
            }
            Commands::Migrate => {
                let applied = migrate::run_migrations(&store).await.map_err(|e| {
                    error!(error = %e, "migration failed");
                    e
                })?;
                println!("{applied} migration(s) applied");
                Ok(0)
            }
            Commands::Daily { date, send_alerts } => {
                let registry = ModelRegistry::new();
                let summary = run_daily(
                    &config,
                    &store,
                    &client,
                    &registry,
                    date.unwrap_or_else(today),
                    send_alerts,
                )
                .await?;
                Ok(summary.exit_code())
            }
            Commands::RefreshOdds { date } => {
                let summary =
                    odds_api::refresh_odds(&client, &config.apis, &store, date.unwrap_or_else(today))
                        .await?;
                println!(
                    "events={} rows={} best_updates={}",
                    summary.events_seen, summary.rows_upserted, summary.best_available_updates
                );
                Ok(0)
            }
            Commands::FetchLineups { date } => {
                let summary = lineups::fetch_lineups_for_date(
                    &client,
                    &config.apis,
                    &store,
                    date.unwrap_or_else(today),
                )
                .await?;
                println!(
                    "games={} changed={} rows={}",
                    summary.games_seen,
                    summary.changed.len(),
                    summary.rows_inserted
                );
                Ok(0)
            }
            Commands::BuildFeatures { date } => {
                let summary =
                    features::run_build_features(&store, date.unwrap_or_else(today)).await?;
                println!(
                    "batter={} pitcher={} team={} context={} warnings={}",
                    summary.batter_rows,
                    summary.pitcher_rows,
                    summary.team_rows,
                    summary.game_context_rows,
                    summary.warnings.len()
                );
                Ok(if summary.warnings.is_empty() { 0 } else { 2 })
            }
            Commands::Score { date, market, all_markets, send_alerts } => {
                let date = date.unwrap_or_else(today);
                let markets = parse_markets(market.as_deref(), all_markets)?;
                let registry = ModelRegistry::new();
                let results =
                    score_markets(&store, &registry, date, &markets, "manual_score").await?;
                for result in &results {
                    println!(
                        "{}: {} rows ({})",
                        result.market, result.rows_written, result.status
                    );
                    if send_alerts && !result.failed() {
                        let _ = alerts::send_market_alerts(
                            &client,
                            &config.alerts,
                            &store,
                            date,
                            result.market,
                        )
                        .await;
                    }
                }
                Ok(if results.iter().any(|r| r.failed()) { 2 } else { 0 })
            }
            Commands::RescoreOnLineup { date, send_alerts } => {
                let date = date.unwrap_or_else(today);
                let registry = ModelRegistry::new();
                let summary = rescore_on_lineup(&store, &registry, date).await?;
                println!(
                    "changed_pairs={} affected_games={} markets_rescored={}",
                    summary.changed_pairs,
                    summary.affected_games.len(),
                    summary.results.len()
                );
                if send_alerts {
                    for result in &summary.results {
                        if !result.failed() && result.rows_written > 0 {
                            let _ = alerts::send_market_alerts(
                                &client,
                                &config.alerts,
                                &store,
                                date,
                                result.market,
                            )
                            .await;
                        }
                    }
                }
                Ok(if summary.results.iter().any(|r| r.failed()) { 2 } else { 0 })
            }
            Commands::Grade { date } => {
                let summary = grading::grade_date(
                    &store,
                    &client,
                    &config.apis,
                    date.unwrap_or_else(today),
                    config.pipeline.closing_line_policy,
                )
                .await?;
                println!(
                    "selections={} outcomes={} settled={} still_pending={}",
                    summary.selections_considered,
                    summary.outcomes_upserted,
                    summary.settled,
                    summary.still_pending
                );
                Ok(0)
            }
            Commands::Backfill {
                start_date,
                end_date,
                build_features,
                score,
                all_markets,
                market,
                grade,
                no_bulk,
                workers,
            } => {
                if end_date < start_date {
                    return Err(MlbError::Validation(
                        "end date precedes start date".to_string(),
                    ));
                }
                let score_markets = if score {
                    parse_markets(market.as_deref(), all_markets || market.is_none())?
                } else {
                    Vec::new()
                };
                let opts = BackfillOptions {
                    start: start_date,
                    end: end_date,
                    build_features,
                    score_markets,
                    grade,
                    use_bulk: !no_bulk,
                    workers: workers.unwrap_or(config.pipeline.workers),
                };
                let summary = run_backfill(&config, &store, &client, opts).await?;
                println!(
                    "days={} ok={} degraded={} failed={} events={} scores={}",
                    summary.days,
                    summary.success_days,
                    summary.degraded_markets,
                    summary.failed_days.len(),
                    summary.event_rows,
                    summary.score_rows
                );
                for (date, err) in &summary.failed_days {
                    println!("  failed {date}: {err}");
                }
                Ok(summary.exit_code())
            }
            Commands::Backtest { market, start_date, end_date, signals, output_dir } => {
                let signals: Vec<Signal> = signals
                    .split(',')
                    .filter_map(|s| Signal::parse(s.trim()))
                    .collect();
                let opts = BacktestOptions {
                    market: parse_market(&market)?,
                    start: start_date,
                    end: end_date,
                    signals,
                    output_dir: output_dir.into(),
                };
                let summary = run_backtest(&store, &opts).await?;
                println!(
                    "market={} scored={} graded={} win_rate={:?} roi={:?}",
                    summary.market,
                    summary.rows_scored,
                    summary.rows_graded,
                    summary.win_rate,
                    summary.roi_units
                );
                println!("csv: {}", summary.csv_path);
                Ok(0)
            }
            Commands::Status => {
                let report = status_report(&store).await?;
                print_report(&report);
                Ok(0)
            }
        }
    }
}
