//! Feature store builders.
//!
//! Four builders (batter, pitcher, team, game-context) materialize one
//! snapshot per `game_date`, strictly from information available before
//! that date. Window-stat rows are as-of dated (see `crate::stats`), so
//! `stat_date <= game_date` is the lookahead-safe read.

pub mod batter;
pub mod game_context;
pub mod pitcher;
pub mod team;

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::store::Store;

/// How many days back a feature lookup may reach for the latest window
/// row (covers off-days, injuries and the offseason boundary).
pub const FEATURE_LOOKBACK_DAYS: i64 = 45;

#[derive(Debug, Default)]
pub struct FeatureBuildSummary {
    pub batter_rows: u64,
    pub pitcher_rows: u64,
    pub team_rows: u64,
    pub game_context_rows: u64,
    pub warnings: Vec<String>,
}

impl FeatureBuildSummary {
    pub fn total_rows(&self) -> u64 {
        self.batter_rows + self.pitcher_rows + self.team_rows + self.game_context_rows
    }
}

/// Run all four builders for a date. Missing inputs downgrade to
/// warnings (risk-flag fodder downstream), never errors.
pub async fn run_build_features(store: &Store, date: NaiveDate) -> Result<FeatureBuildSummary> {
    let mut summary = FeatureBuildSummary::default();

    let batter = batter::build_batter_features(store, date).await?;
    summary.batter_rows = batter.rows_upserted;
    summary.warnings.extend(batter.warnings);

    let pitcher = pitcher::build_pitcher_features(store, date).await?;
    summary.pitcher_rows = pitcher.rows_upserted;
    summary.warnings.extend(pitcher.warnings);

    let team = team::build_team_features(store, date).await?;
    summary.team_rows = team.rows_upserted;
    summary.warnings.extend(team.warnings);

    let context = game_context::build_game_context_features(store, date).await?;
    summary.game_context_rows = context.rows_upserted;
    summary.warnings.extend(context.warnings);

    info!(
        date = %date,
        rows = summary.total_rows(),
        warnings = summary.warnings.len(),
        "feature build complete"
    );
    Ok(summary)
}

#[derive(Debug, Default)]
pub struct BuilderSummary {
    pub rows_generated: usize,
    pub rows_upserted: u64,
    pub warnings: Vec<String>,
}
