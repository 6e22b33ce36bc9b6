//! Player prop outcome extraction (HR, HITS, TB, K, OUTS).
//!
//! Realized lines come from the locally derived game logs first
//! (`batter_game_outcomes`, `pitcher_game_log`); the live path falls
//! back to a boxscore fetch for games the backfill has not covered.

use std::collections::HashMap;

use reqwest::Client;
use tracing::warn;

use crate::config::ApiConfig;
use crate::domain::{GameStatus, Market};
use crate::error::Result;
use crate::fetch::boxscore::{fetch_boxscore_lines, PlayerLine};
use crate::grading::{OutcomeRow, SelectionCandidate};
use crate::store::{SqlValue, Store};

async fn game_status(store: &Store, game_id: i64) -> Result<Option<GameStatus>> {
    let row = store
        .fetch_optional(
            "SELECT status FROM games WHERE game_id = $1",
            &[SqlValue::from(game_id)],
        )
        .await?;
    Ok(row
        .map(|r| r.text("status"))
        .transpose()?
        .and_then(|s| GameStatus::parse(&s)))
}

async fn local_lines(store: &Store, game_id: i64) -> Result<HashMap<i64, PlayerLine>> {
    let mut lines: HashMap<i64, PlayerLine> = HashMap::new();
    let batter_rows = store
        .fetch_all(
            "SELECT player_id, hits, hr_count, total_bases FROM batter_game_outcomes
             WHERE game_id = $1",
            &[SqlValue::from(game_id)],
        )
        .await?;
    for row in &batter_rows {
        let line = lines.entry(row.i64("player_id")?).or_default();
        line.hits = row.opt_i64("hits")?.unwrap_or(0);
        line.hr = row.opt_i64("hr_count")?.unwrap_or(0);
        line.total_bases = row.opt_i64("total_bases")?.unwrap_or(0);
    }
    let pitcher_rows = store
        .fetch_all(
            "SELECT pitcher_id, ks, outs_recorded FROM pitcher_game_log WHERE game_id = $1",
            &[SqlValue::from(game_id)],
        )
        .await?;
    for row in &pitcher_rows {
        let line = lines.entry(row.i64("pitcher_id")?).or_default();
        line.strikeouts_thrown = row.opt_i64("ks")?.unwrap_or(0);
        line.outs_recorded = row.opt_i64("outs_recorded")?.unwrap_or(0);
    }
    Ok(lines)
}

fn outcome_for(candidate: &SelectionCandidate, line: &PlayerLine) -> (f64, String) {
    match candidate.market {
        Market::Hr => (line.hr as f64, format!("hr={}", line.hr)),
        Market::Hits1P | Market::HitsLine => (line.hits as f64, format!("hits={}", line.hits)),
        Market::TbLine => (line.total_bases as f64, format!("tb={}", line.total_bases)),
        Market::K => (
            line.strikeouts_thrown as f64,
            format!("k={}", line.strikeouts_thrown),
        ),
        Market::OutsRecorded => (
            line.outs_recorded as f64,
            format!("outs={}", line.outs_recorded),
        ),
        _ => unreachable!("player prop extractor only sees player markets"),
    }
}

pub async fn grade_player_prop_outcomes(
    store: &Store,
    client: &Client,
    api_cfg: &ApiConfig,
    candidates: &[SelectionCandidate],
) -> Result<Vec<OutcomeRow>> {
    let mut by_game: HashMap<i64, Vec<&SelectionCandidate>> = HashMap::new();
    for candidate in candidates {
        if candidate.market.is_player_prop() && candidate.player_id.is_some() {
            by_game.entry(candidate.game_id).or_default().push(candidate);
        }
    }

    let mut outcomes = Vec::new();
    for (game_id, game_candidates) in by_game {
        // outcomes only exist once the game is over
        match game_status(store, game_id).await? {
            Some(status) if status.is_terminal() => {}
            _ => continue,
        }

        let mut lines = local_lines(store, game_id).await?;
        let needs_fetch = game_candidates
            .iter()
            .any(|c| !lines.contains_key(&c.player_id.unwrap_or(-1)));
        if needs_fetch {
            match fetch_boxscore_lines(client, api_cfg, game_id).await {
                Ok(fetched) => {
                    for (pid, line) in fetched {
                        lines.entry(pid).or_insert(line);
                    }
                }
                Err(e) => warn!(game_id, error = %e, "boxscore fallback failed"),
            }
        }

        for candidate in game_candidates {
            let Some(player_id) = candidate.player_id else {
                continue;
            };
            let Some(line) = lines.get(&player_id) else {
                continue;
            };
            let (value, text) = outcome_for(candidate, line);
            outcomes.push(OutcomeRow {
                candidate: candidate.clone(),
                outcome_value: value,
                outcome_text: text,
            });
        }
    }
    Ok(outcomes)
}
