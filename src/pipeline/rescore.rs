//! Lineup-triggered re-scoring: detect changed or newly confirmed
//! lineup snapshots, then re-score the lineup-sensitive markets for the
//! affected games only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::markets::ModelRegistry;
use crate::pipeline::score::{score_one_market, MarketScoreResult};
use crate::store::{date_str, SqlValue, Store};

#[derive(Debug, Clone)]
pub struct ChangedLineup {
    pub game_id: i64,
    pub team_id: String,
    pub lineup_changed: bool,
    pub became_confirmed: bool,
}

type Snapshot = Vec<(i64, Option<i64>, Option<String>, bool, bool)>;

/// Compare the two latest snapshots per `(game_id, team_id)` by sorted
/// signature; emit pairs whose lineup changed or first became confirmed.
pub async fn detect_changed_lineups(store: &Store, date: NaiveDate) -> Result<Vec<ChangedLineup>> {
    let rows = store
        .fetch_all(
            "SELECT game_id, team_id, fetched_at, player_id, batting_order, position,
                    is_starter, confirmed
             FROM lineups
             WHERE game_date = $1
             ORDER BY game_id, team_id, fetched_at DESC, batting_order, player_id",
            &[SqlValue::from(date)],
        )
        .await?;

    // (game, team) → fetched_at → snapshot rows
    let mut grouped: BTreeMap<(i64, String), BTreeMap<String, Snapshot>> = BTreeMap::new();
    for row in &rows {
        let key = (row.i64("game_id")?, row.text("team_id")?);
        grouped
            .entry(key)
            .or_default()
            .entry(row.text("fetched_at")?)
            .or_default()
            .push((
                row.i64("player_id")?,
                row.opt_i64("batting_order")?,
                row.opt_text("position")?,
                row.flag("is_starter")?,
                row.flag("confirmed")?,
            ));
    }

    let mut changed = Vec::new();
    for ((game_id, team_id), snapshots) in grouped {
        let mut times: Vec<&String> = snapshots.keys().collect();
        times.sort();
        times.reverse();

        let latest = {
            let mut s = snapshots[times[0]].clone();
            s.sort();
            s
        };
        let previous = times.get(1).map(|t| {
            let mut s = snapshots[*t].clone();
            s.sort();
            s
        });

        let latest_confirmed = latest.iter().any(|(_, _, _, _, c)| *c);
        let prev_confirmed = previous
            .as_ref()
            .is_some_and(|s| s.iter().any(|(_, _, _, _, c)| *c));

        let lineup_changed = previous.as_ref().is_some_and(|prev| *prev != latest);
        let became_confirmed = latest_confirmed && !prev_confirmed && previous.is_some();

        if lineup_changed || became_confirmed {
            changed.push(ChangedLineup {
                game_id,
                team_id,
                lineup_changed,
                became_confirmed,
            });
        }
    }
    Ok(changed)
}

#[derive(Debug, Default)]
pub struct RescoreSummary {
    pub changed_pairs: usize,
    pub affected_games: Vec<i64>,
    pub results: Vec<MarketScoreResult>,
}

pub async fn rescore_on_lineup(
    store: &Store,
    registry: &ModelRegistry,
    date: NaiveDate,
) -> Result<RescoreSummary> {
    let changed = detect_changed_lineups(store, date).await?;
    let mut summary = RescoreSummary {
        changed_pairs: changed.len(),
        ..Default::default()
    };
    if changed.is_empty() {
        info!(date = %date_str(date), "no lineup changes detected");
        return Ok(summary);
    }

    summary.affected_games = changed.iter().map(|c| c.game_id).collect();
    summary.affected_games.sort_unstable();
    summary.affected_games.dedup();

    for market in registry.lineup_sensitive_markets() {
        let result = score_one_market(
            store,
            registry,
            date,
            market,
            "lineup_rescore",
            Some(&summary.affected_games),
        )
        .await?;
        summary.results.push(result);
    }

    info!(
        date = %date_str(date),
        pairs = summary.changed_pairs,
        games = summary.affected_games.len(),
        markets = summary.results.len(),
        "lineup rescore complete"
    );
    Ok(summary)
}
