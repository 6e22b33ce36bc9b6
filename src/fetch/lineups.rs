//! Lineup snapshot fetcher.
//!
//! Each snapshot supersedes the previous active version for its
//! `(game_id, team_id)`: unchanged snapshots are skipped via a sorted
//! signature comparison, changed ones deactivate the prior version and
//! insert a new one in a single transaction.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::Result;
use crate::fetch::schedule::games_for_date;
use crate::fetch::with_retries;
use crate::store::{date_str, now_ts, SqlValue, Store};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineupSlot {
    pub player_id: i64,
    pub batting_order: Option<i64>,
    pub position: Option<String>,
    pub is_starter: bool,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct LineupChange {
    pub game_id: i64,
    pub team_id: String,
    pub confirmed: bool,
    pub players: usize,
}

#[derive(Debug, Default)]
pub struct LineupFetchSummary {
    pub games_seen: usize,
    pub snapshots_checked: usize,
    pub rows_inserted: u64,
    pub changed: Vec<LineupChange>,
}

fn batting_order_to_slot(raw: i64) -> i64 {
    // the boxscore encodes slot 3 as 300, 301 for mid-game replacements
    if raw >= 100 {
        raw / 100
    } else {
        raw
    }
}

fn extract_lineup(team_payload: &Value) -> Vec<LineupSlot> {
    let players = team_payload["players"].as_object();
    let mut slots = Vec::new();
    let mut seen = std::collections::HashSet::new();

    if let Some(order) = team_payload["battingOrder"].as_array() {
        for (idx, raw_pid) in order.iter().enumerate() {
            let Some(pid) = raw_pid.as_i64() else { continue };
            if !seen.insert(pid) {
                continue;
            }
            let position = players
                .and_then(|p| p.get(&format!("ID{pid}")))
                .and_then(|p| p["position"]["abbreviation"].as_str())
                .map(str::to_string);
            slots.push(LineupSlot {
                player_id: pid,
                batting_order: Some(idx as i64 + 1),
                position,
                is_starter: true,
                confirmed: false,
            });
        }
        return slots;
    }

    // Pregame payloads often lack the battingOrder list; fall back to the
    // per-player battingOrder field.
    if let Some(players) = players {
        for player in players.values() {
            let Some(pid) = player["person"]["id"].as_i64() else { continue };
            let Some(order_raw) = player["battingOrder"]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .or_else(|| player["battingOrder"].as_i64())
            else {
                continue;
            };
            if !seen.insert(pid) {
                continue;
            }
            slots.push(LineupSlot {
                player_id: pid,
                batting_order: Some(batting_order_to_slot(order_raw)),
                position: player["position"]["abbreviation"].as_str().map(str::to_string),
                is_starter: true,
                confirmed: false,
            });
        }
    }
    slots.sort();
    slots
}

fn signature(slots: &[LineupSlot]) -> Vec<(i64, Option<i64>, Option<String>, bool, bool)> {
    let mut sig: Vec<_> = slots
        .iter()
        .map(|s| {
            (
                s.player_id,
                s.batting_order,
                s.position.clone(),
                s.is_starter,
                s.confirmed,
            )
        })
        .collect();
    sig.sort();
    sig
}

async fn active_snapshot(
    store: &Store,
    game_date: NaiveDate,
    game_id: i64,
    team_id: &str,
) -> Result<Vec<LineupSlot>> {
    let rows = store
        .fetch_all(
            "SELECT player_id, batting_order, position, is_starter, confirmed
             FROM lineups
             WHERE game_date = $1 AND game_id = $2 AND team_id = $3 AND active_version = 1
             ORDER BY batting_order, player_id",
            &[
                SqlValue::from(game_date),
                SqlValue::from(game_id),
                SqlValue::from(team_id),
            ],
        )
        .await?;
    rows.iter()
        .map(|row| {
            Ok(LineupSlot {
                player_id: row.i64("player_id")?,
                batting_order: row.opt_i64("batting_order")?,
                position: row.opt_text("position")?,
                is_starter: row.flag("is_starter")?,
                confirmed: row.flag("confirmed")?,
            })
        })
        .collect()
}

/// Swap the active snapshot for one `(game_id, team_id)` transactionally.
async fn store_snapshot(
    store: &Store,
    game_date: NaiveDate,
    game_id: i64,
    team_id: &str,
    slots: &[LineupSlot],
    fetched_at: &str,
) -> Result<u64> {
    let mut stmts: Vec<(String, Vec<SqlValue>)> = vec![(
        "UPDATE lineups SET active_version = 0, updated_at = $1
         WHERE game_date = $2 AND game_id = $3 AND team_id = $4 AND active_version = 1"
            .to_string(),
        vec![
            SqlValue::from(now_ts()),
            SqlValue::from(game_date),
            SqlValue::from(game_id),
            SqlValue::from(team_id),
        ],
    )];

    for slot in slots {
        stmts.push((
            "INSERT INTO lineups (game_date, game_id, team_id, player_id, fetched_at, \
             batting_order, position, is_starter, confirmed, source, active_version, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'mlb_stats_api', 1, $10)"
                .to_string(),
            vec![
                SqlValue::from(game_date),
                SqlValue::from(game_id),
                SqlValue::from(team_id),
                SqlValue::from(slot.player_id),
                SqlValue::from(fetched_at),
                SqlValue::from(slot.batting_order),
                SqlValue::from(slot.position.clone()),
                SqlValue::from(slot.is_starter),
                SqlValue::from(slot.confirmed),
                SqlValue::from(now_ts()),
            ],
        ));
    }
    store.execute_in_transaction(&stmts).await
}

/// Fetch lineup snapshots for every game on a date, persisting only the
/// changed `(game, team)` pairs.
pub async fn fetch_lineups_for_date(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    date: NaiveDate,
) -> Result<LineupFetchSummary> {
    let games = games_for_date(store, date).await?;
    let mut summary = LineupFetchSummary {
        games_seen: games.len(),
        ..Default::default()
    };
    if games.is_empty() {
        return Ok(summary);
    }

    let fetched_at = now_ts();
    for game in &games {
        let url = format!("{}/game/{}/boxscore", cfg.mlb_stats_base, game.game_id);
        let boxscore = match with_retries(cfg.retry_attempts, "lineup_boxscore", || async {
            let resp = client.get(&url).send().await?.error_for_status()?;
            Ok(resp.json::<Value>().await?)
        })
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(game_id = game.game_id, error = %e, "lineup boxscore fetch failed");
                continue;
            }
        };

        for (side, team_id) in [("home", &game.home_team), ("away", &game.away_team)] {
            let team_payload = &boxscore["teams"][side];
            let mut slots = extract_lineup(team_payload);
            if slots.is_empty() {
                continue;
            }
            summary.snapshots_checked += 1;

            // A full batting order (or a game already underway) counts as
            // confirmed.
            let confirmed = slots.len() >= 9 || game.status != crate::domain::GameStatus::Scheduled;
            for slot in &mut slots {
                slot.confirmed = confirmed;
            }

            let existing = active_snapshot(store, date, game.game_id, team_id).await?;
            if signature(&existing) == signature(&slots) {
                continue;
            }

            summary.rows_inserted +=
                store_snapshot(store, date, game.game_id, team_id, &slots, &fetched_at).await?;
            summary.changed.push(LineupChange {
                game_id: game.game_id,
                team_id: team_id.clone(),
                confirmed,
                players: slots.len(),
            });
        }
    }

    info!(
        date = %date_str(date),
        games = summary.games_seen,
        snapshots = summary.snapshots_checked,
        changed = summary.changed.len(),
        rows = summary.rows_inserted,
        "lineup fetch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_from_batting_order_list() {
        let payload = json!({
            "battingOrder": [592450, 660271],
            "players": {
                "ID592450": {"position": {"abbreviation": "RF"}},
                "ID660271": {"position": {"abbreviation": "DH"}}
            }
        });
        let slots = extract_lineup(&payload);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].player_id, 592450);
        assert_eq!(slots[0].batting_order, Some(1));
        assert_eq!(slots[1].position.as_deref(), Some("DH"));
    }

    #[test]
    fn test_extract_from_per_player_orders() {
        let payload = json!({
            "players": {
                "ID100": {"person": {"id": 100}, "battingOrder": "300", "position": {"abbreviation": "1B"}},
                "ID200": {"person": {"id": 200}, "battingOrder": "100", "position": {"abbreviation": "SS"}},
                "ID300": {"person": {"id": 300}}
            }
        });
        let slots = extract_lineup(&payload);
        assert_eq!(slots.len(), 2);
        // per-player 300 means slot 3
        let orders: Vec<_> = slots.iter().map(|s| s.batting_order).collect();
        assert!(orders.contains(&Some(1)) && orders.contains(&Some(3)));
    }

    #[test]
    fn test_signature_detects_order_change() {
        let a = vec![LineupSlot {
            player_id: 1,
            batting_order: Some(1),
            position: None,
            is_starter: true,
            confirmed: true,
        }];
        let mut b = a.clone();
        b[0].batting_order = Some(2);
        assert_ne!(signature(&a), signature(&b));
        assert_eq!(signature(&a), signature(&a.clone()));
    }
}
