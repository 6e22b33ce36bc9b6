//! MLB Stats API schedule fetcher: games, probable pitchers (with
//! handedness), game status and home-plate umpire assignments.

use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::domain::{Game, GameStatus};
use crate::error::Result;
use crate::fetch::with_retries;
use crate::stadiums::team_abbrs;
use crate::store::{date_str, now_ts, SqlValue, Store};

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

async fn stadium_map(store: &Store) -> Result<HashMap<String, i64>> {
    let rows = store
        .fetch_all("SELECT stadium_id, team_abbr FROM stadiums", &[])
        .await?;
    let mut map = HashMap::new();
    for row in rows {
        map.insert(row.text("team_abbr")?, row.i64("stadium_id")?);
    }
    Ok(map)
}

/// Batch-resolve pitcher handedness from the /people endpoint.
async fn resolve_pitcher_hands(
    client: &Client,
    cfg: &ApiConfig,
    pitcher_ids: &[i64],
) -> HashMap<i64, String> {
    if pitcher_ids.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<String> = pitcher_ids.iter().map(|id| id.to_string()).collect();
    let url = format!("{}/people", cfg.mlb_stats_base);
    let result = with_retries(cfg.retry_attempts, "pitcher_hands", || async {
        let resp = client
            .get(&url)
            .query(&[("personIds", ids.join(","))])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Value>().await?)
    })
    .await;

    let mut hands = HashMap::new();
    match result {
        Ok(payload) => {
            for person in payload["people"].as_array().unwrap_or(&vec![]) {
                if let (Some(id), Some(code)) =
                    (as_i64(&person["id"]), person["pitchHand"]["code"].as_str())
                {
                    hands.insert(id, code.to_string());
                }
            }
        }
        Err(e) => warn!(error = %e, "pitcher handedness lookup failed"),
    }
    hands
}

fn parse_game(entry: &Value, game_date: NaiveDate, abbrs: &HashMap<String, String>) -> Option<Game> {
    let game_id = as_i64(&entry["gamePk"])?;
    let home = &entry["teams"]["home"];
    let away = &entry["teams"]["away"];

    let abbr_of = |team: &Value| -> Option<String> {
        let name = team["team"]["name"].as_str()?;
        Some(abbrs.get(name).cloned().unwrap_or_else(|| name.to_string()))
    };

    let status_raw = entry["status"]["detailedState"].as_str().unwrap_or("");
    let status = GameStatus::parse(status_raw).unwrap_or(GameStatus::Scheduled);

    Some(Game {
        game_id,
        game_date,
        game_time: entry["gameDate"].as_str().map(str::to_string),
        home_team: abbr_of(home)?,
        away_team: abbr_of(away)?,
        stadium_id: None,
        home_pitcher_id: as_i64(&home["probablePitcher"]["id"]),
        away_pitcher_id: as_i64(&away["probablePitcher"]["id"]),
        home_pitcher_name: home["probablePitcher"]["fullName"].as_str().map(str::to_string),
        away_pitcher_name: away["probablePitcher"]["fullName"].as_str().map(str::to_string),
        home_pitcher_hand: None,
        away_pitcher_hand: None,
        umpire_name: None,
        status,
        home_score: as_i64(&home["score"]),
        away_score: as_i64(&away["score"]),
    })
}

/// Fetch home-plate umpire assignments for a date: `game_id → name`.
pub async fn fetch_umpire_assignments(
    client: &Client,
    cfg: &ApiConfig,
    date: NaiveDate,
) -> Result<HashMap<i64, String>> {
    let url = format!("{}/schedule", cfg.mlb_stats_base);
    let payload = with_retries(cfg.retry_attempts, "umpires", || async {
        let resp = client
            .get(&url)
            .query(&[
                ("date", date_str(date)),
                ("sportId", "1".into()),
                ("hydrate", "officials".into()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Value>().await?)
    })
    .await?;

    let mut assignments = HashMap::new();
    for date_entry in payload["dates"].as_array().unwrap_or(&vec![]) {
        for game in date_entry["games"].as_array().unwrap_or(&vec![]) {
            let Some(game_id) = as_i64(&game["gamePk"]) else { continue };
            for official in game["officials"].as_array().unwrap_or(&vec![]) {
                if official["officialType"].as_str() == Some("Home Plate") {
                    if let Some(name) = official["official"]["fullName"].as_str() {
                        assignments.insert(game_id, name.to_string());
                    }
                    break;
                }
            }
        }
    }
    Ok(assignments)
}

/// Fetch the schedule for a date and upsert `games` rows. Status only
/// moves forward across re-fetches; a regressing upstream status is
/// ignored with a warning.
pub async fn fetch_games(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    date: NaiveDate,
) -> Result<Vec<Game>> {
    let url = format!("{}/schedule", cfg.mlb_stats_base);
    let payload = with_retries(cfg.retry_attempts, "schedule", || async {
        let resp = client
            .get(&url)
            .query(&[
                ("date", date_str(date)),
                ("sportId", "1".into()),
                ("hydrate", "probablePitcher,linescore,team".into()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Value>().await?)
    })
    .await?;

    let abbrs = team_abbrs();
    let stadiums = stadium_map(store).await?;

    let mut games = Vec::new();
    let mut pitcher_ids = Vec::new();
    for date_entry in payload["dates"].as_array().unwrap_or(&vec![]) {
        for entry in date_entry["games"].as_array().unwrap_or(&vec![]) {
            if let Some(mut game) = parse_game(entry, date, &abbrs) {
                game.stadium_id = stadiums.get(&game.home_team).copied();
                pitcher_ids.extend(game.home_pitcher_id);
                pitcher_ids.extend(game.away_pitcher_id);
                games.push(game);
            }
        }
    }

    pitcher_ids.sort_unstable();
    pitcher_ids.dedup();
    let hands = resolve_pitcher_hands(client, cfg, &pitcher_ids).await;
    for game in &mut games {
        game.home_pitcher_hand = game.home_pitcher_id.and_then(|id| hands.get(&id).cloned());
        game.away_pitcher_hand = game.away_pitcher_id.and_then(|id| hands.get(&id).cloned());
    }

    // Umpires ride along on the same schedule surface.
    let umpires = fetch_umpire_assignments(client, cfg, date).await.unwrap_or_default();
    for game in &mut games {
        game.umpire_name = umpires.get(&game.game_id).cloned();
    }

    upsert_games(store, &games).await?;
    info!(date = %date, games = games.len(), umpires = umpires.len(), "schedule fetched");
    Ok(games)
}

/// Upsert games, enforcing the forward-only status transition.
pub async fn upsert_games(store: &Store, games: &[Game]) -> Result<u64> {
    if games.is_empty() {
        return Ok(0);
    }

    // Existing statuses, to refuse regressions on re-fetch.
    let mut existing: HashMap<i64, GameStatus> = HashMap::new();
    for game in games {
        if let Some(row) = store
            .fetch_optional(
                "SELECT status FROM games WHERE game_id = $1",
                &[SqlValue::from(game.game_id)],
            )
            .await?
        {
            if let Some(status) = GameStatus::parse(&row.text("status")?) {
                existing.insert(game.game_id, status);
            }
        }
    }

    let columns = [
        "game_id",
        "game_date",
        "game_time",
        "home_team",
        "away_team",
        "stadium_id",
        "home_pitcher_id",
        "away_pitcher_id",
        "home_pitcher_name",
        "away_pitcher_name",
        "home_pitcher_hand",
        "away_pitcher_hand",
        "umpire_name",
        "status",
        "home_score",
        "away_score",
        "updated_at",
    ];

    let rows: Vec<Vec<SqlValue>> = games
        .iter()
        .map(|g| {
            let mut status = g.status;
            if let Some(prev) = existing.get(&g.game_id) {
                if !prev.can_transition_to(status) {
                    warn!(
                        game_id = g.game_id,
                        from = prev.as_str(),
                        to = status.as_str(),
                        "refusing backward status transition"
                    );
                    status = *prev;
                }
            }
            vec![
                SqlValue::from(g.game_id),
                SqlValue::from(g.game_date),
                SqlValue::from(g.game_time.clone()),
                SqlValue::from(g.home_team.clone()),
                SqlValue::from(g.away_team.clone()),
                SqlValue::from(g.stadium_id),
                SqlValue::from(g.home_pitcher_id),
                SqlValue::from(g.away_pitcher_id),
                SqlValue::from(g.home_pitcher_name.clone()),
                SqlValue::from(g.away_pitcher_name.clone()),
                SqlValue::from(g.home_pitcher_hand.clone()),
                SqlValue::from(g.away_pitcher_hand.clone()),
                SqlValue::from(g.umpire_name.clone()),
                SqlValue::from(status.as_str()),
                SqlValue::from(g.home_score),
                SqlValue::from(g.away_score),
                SqlValue::from(now_ts()),
            ]
        })
        .collect();

    store.upsert_batch("games", &columns, &["game_id"], &rows).await
}

/// Load games for a date from the store.
pub async fn games_for_date(store: &Store, date: NaiveDate) -> Result<Vec<Game>> {
    let rows = store
        .fetch_all(
            "SELECT * FROM games WHERE game_date = $1 ORDER BY game_id",
            &[SqlValue::from(date)],
        )
        .await?;
    rows.iter()
        .map(|row| {
            Ok(Game {
                game_id: row.i64("game_id")?,
                game_date: row.date("game_date")?,
                game_time: row.opt_text("game_time")?,
                home_team: row.text("home_team")?,
                away_team: row.text("away_team")?,
                stadium_id: row.opt_i64("stadium_id")?,
                home_pitcher_id: row.opt_i64("home_pitcher_id")?,
                away_pitcher_id: row.opt_i64("away_pitcher_id")?,
                home_pitcher_name: row.opt_text("home_pitcher_name")?,
                away_pitcher_name: row.opt_text("away_pitcher_name")?,
                home_pitcher_hand: row.opt_text("home_pitcher_hand")?,
                away_pitcher_hand: row.opt_text("away_pitcher_hand")?,
                umpire_name: row.opt_text("umpire_name")?,
                status: GameStatus::parse(&row.text("status")?).unwrap_or(GameStatus::Scheduled),
                home_score: row.opt_i64("home_score")?,
                away_score: row.opt_i64("away_score")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_game_basic() {
        let entry = json!({
            "gamePk": 776123,
            "gameDate": "2024-07-04T17:05:00Z",
            "status": {"detailedState": "Scheduled"},
            "teams": {
                "home": {
                    "team": {"name": "New York Yankees"},
                    "probablePitcher": {"id": 543037, "fullName": "Gerrit Cole"},
                    "score": null
                },
                "away": {
                    "team": {"name": "Boston Red Sox"},
                    "probablePitcher": {},
                    "score": null
                }
            }
        });
        let abbrs = team_abbrs();
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let game = parse_game(&entry, date, &abbrs).unwrap();
        assert_eq!(game.game_id, 776123);
        assert_eq!(game.home_team, "NYY");
        assert_eq!(game.away_team, "BOS");
        assert_eq!(game.home_pitcher_id, Some(543037));
        assert_eq!(game.away_pitcher_id, None);
        assert_eq!(game.status, GameStatus::Scheduled);
    }
}
