//! Game context snapshots: park factors, weather multipliers, umpire
//! profile, lineup confirmation and the `is_final_context` flag.
//!
//! Weather multipliers are deterministic:
//!   HR mult  = wind impact × temp step (≥80 °F ×1.03, ≤55 °F ×0.97)
//!   run mult = 1 + (temp − 65) × 0.0025 + min(wind, 25) × 0.003,
//!              clamped to [0.8, 1.25]

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::Result;
use crate::fetch::schedule::games_for_date;
use crate::features::BuilderSummary;
use crate::store::{date_str, SqlValue, Store};

#[derive(Debug, Clone, Default)]
pub struct GameContext {
    pub game_id: i64,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub home_pitcher_id: Option<i64>,
    pub away_pitcher_id: Option<i64>,
    pub park_factor_hr: Option<f64>,
    pub park_factor_runs: Option<f64>,
    pub park_factor_hits: Option<f64>,
    pub weather_temp_f: Option<f64>,
    pub weather_wind_speed_mph: Option<f64>,
    pub weather_wind_dir: Option<String>,
    pub weather_hr_multiplier: Option<f64>,
    pub weather_run_multiplier: Option<f64>,
    pub umpire_name: Option<String>,
    pub umpire_k_boost: Option<f64>,
    pub umpire_run_env: Option<f64>,
    pub is_day_game: Option<bool>,
    pub lineups_confirmed_home: bool,
    pub lineups_confirmed_away: bool,
    pub is_final_context: bool,
}

pub fn weather_multipliers(
    temp_f: Option<f64>,
    wind_speed_mph: Option<f64>,
    wind_hr_impact: Option<f64>,
) -> (f64, f64) {
    let mut hr_mult = wind_hr_impact.unwrap_or(1.0);
    if let Some(temp) = temp_f {
        if temp >= 80.0 {
            hr_mult *= 1.03;
        } else if temp <= 55.0 {
            hr_mult *= 0.97;
        }
    }

    let mut run_mult = 1.0;
    if let Some(temp) = temp_f {
        run_mult += (temp - 65.0) * 0.0025;
    }
    run_mult += wind_speed_mph.unwrap_or(0.0).min(25.0) * 0.003;
    run_mult = run_mult.clamp(0.8, 1.25);

    (
        (hr_mult * 10_000.0).round() / 10_000.0,
        (run_mult * 10_000.0).round() / 10_000.0,
    )
}

async fn park_factors(
    store: &Store,
    stadium_id: Option<i64>,
    season: i64,
) -> Result<(Option<f64>, Option<f64>, Option<f64>)> {
    let Some(stadium_id) = stadium_id else {
        return Ok((None, None, None));
    };

    if let Some(row) = store
        .fetch_optional(
            "SELECT hr_factor, runs_factor, hits_factor FROM park_factors
             WHERE stadium_id = $1 AND season = $2",
            &[SqlValue::from(stadium_id), SqlValue::from(season)],
        )
        .await?
    {
        let hr = row.opt_f64("hr_factor")?;
        if hr.is_some() {
            return Ok((hr, row.opt_f64("runs_factor")?, row.opt_f64("hits_factor")?));
        }
    }

    // stadium default when no seasonal row exists
    let row = store
        .fetch_optional(
            "SELECT hr_park_factor FROM stadiums WHERE stadium_id = $1",
            &[SqlValue::from(stadium_id)],
        )
        .await?;
    Ok((
        row.and_then(|r| r.opt_f64("hr_park_factor").ok().flatten()),
        None,
        None,
    ))
}

async fn latest_weather(
    store: &Store,
    game_id: i64,
) -> Result<Option<(Option<f64>, Option<f64>, Option<String>, Option<f64>)>> {
    let row = store
        .fetch_optional(
            "SELECT temperature_f, wind_speed_mph, wind_description, wind_hr_impact
             FROM weather WHERE game_id = $1
             ORDER BY fetch_time DESC LIMIT 1",
            &[SqlValue::from(game_id)],
        )
        .await?;
    Ok(match row {
        Some(row) => Some((
            row.opt_f64("temperature_f")?,
            row.opt_f64("wind_speed_mph")?,
            row.opt_text("wind_description")?,
            row.opt_f64("wind_hr_impact")?,
        )),
        None => None,
    })
}

async fn umpire_context(
    store: &Store,
    umpire_name: Option<&str>,
    season: i64,
) -> Result<(Option<f64>, Option<f64>)> {
    let Some(name) = umpire_name else {
        return Ok((None, None));
    };
    let row = store
        .fetch_optional(
            "SELECT k_pct_above_avg, avg_runs_per_game FROM umpires
             WHERE umpire_name = $1 AND season = $2",
            &[SqlValue::from(name), SqlValue::from(season)],
        )
        .await?;
    Ok(match row {
        Some(row) => (row.opt_f64("k_pct_above_avg")?, row.opt_f64("avg_runs_per_game")?),
        None => (None, None),
    })
}

async fn lineup_confirmed(
    store: &Store,
    date: NaiveDate,
    game_id: i64,
    team_id: &str,
) -> Result<bool> {
    let row = store
        .fetch_optional(
            "SELECT 1 AS present FROM lineups
             WHERE game_date = $1 AND game_id = $2 AND team_id = $3
               AND confirmed = 1 AND active_version = 1
             LIMIT 1",
            &[
                SqlValue::from(date),
                SqlValue::from(game_id),
                SqlValue::from(team_id),
            ],
        )
        .await?;
    Ok(row.is_some())
}

/// Local first pitch before 6 PM counts as a day game. Game times are
/// stored as UTC ISO strings; 22:00 UTC splits day/night across the
/// league's time zones closely enough for the context flag.
fn is_day_game(game_time: Option<&str>) -> Option<bool> {
    let t = game_time?;
    let hour: u32 = t.get(11..13)?.parse().ok()?;
    Some(hour < 22)
}

pub async fn build_game_context_features(store: &Store, date: NaiveDate) -> Result<BuilderSummary> {
    let games = games_for_date(store, date).await?;
    if games.is_empty() {
        warn!(date = %date_str(date), "no games for date");
        return Ok(BuilderSummary {
            warnings: vec!["no games found for date".into()],
            ..Default::default()
        });
    }

    let season = i64::from(chrono::Datelike::year(&date));
    let mut contexts = Vec::new();
    let mut warnings = Vec::new();
    for game in &games {
        let (park_hr, park_runs, park_hits) = park_factors(store, game.stadium_id, season).await?;
        let weather = latest_weather(store, game.game_id).await?;
        let (temp, wind_speed, wind_dir, wind_impact) = match &weather {
            Some((t, w, d, i)) => (*t, *w, d.clone(), *i),
            None => (None, None, None, None),
        };
        let (hr_mult, run_mult) = weather_multipliers(temp, wind_speed, wind_impact);

        let (ump_k, ump_run) = umpire_context(store, game.umpire_name.as_deref(), season).await?;

        let confirmed_home = lineup_confirmed(store, date, game.game_id, &game.home_team).await?;
        let confirmed_away = lineup_confirmed(store, date, game.game_id, &game.away_team).await?;
        let has_probables = game.home_pitcher_id.is_some() && game.away_pitcher_id.is_some();
        let has_weather = weather.is_some();

        if !has_weather {
            warnings.push(format!("game_id={}: missing_weather", game.game_id));
        }
        if !confirmed_home || !confirmed_away {
            warnings.push(format!("game_id={}: lineup_pending", game.game_id));
        }
        if !has_probables {
            warnings.push(format!("game_id={}: probable_pitcher_missing", game.game_id));
        }

        contexts.push(GameContext {
            game_id: game.game_id,
            home_team_id: Some(game.home_team.clone()),
            away_team_id: Some(game.away_team.clone()),
            home_pitcher_id: game.home_pitcher_id,
            away_pitcher_id: game.away_pitcher_id,
            park_factor_hr: park_hr,
            park_factor_runs: park_runs,
            park_factor_hits: park_hits,
            weather_temp_f: temp,
            weather_wind_speed_mph: wind_speed,
            weather_wind_dir: wind_dir,
            weather_hr_multiplier: if has_weather { Some(hr_mult) } else { None },
            weather_run_multiplier: if has_weather { Some(run_mult) } else { None },
            umpire_name: game.umpire_name.clone(),
            umpire_k_boost: ump_k,
            umpire_run_env: ump_run,
            is_day_game: is_day_game(game.game_time.as_deref()),
            lineups_confirmed_home: confirmed_home,
            lineups_confirmed_away: confirmed_away,
            is_final_context: confirmed_home && confirmed_away && has_weather && has_probables,
        });
    }

    let upserted = persist(store, date, &contexts).await?;
    info!(
        date = %date_str(date),
        generated = contexts.len(),
        upserted,
        warnings = warnings.len(),
        "game context features built"
    );
    Ok(BuilderSummary {
        rows_generated: contexts.len(),
        rows_upserted: upserted,
        warnings,
    })
}

async fn persist(store: &Store, date: NaiveDate, contexts: &[GameContext]) -> Result<u64> {
    if contexts.is_empty() {
        return Ok(0);
    }
    let columns = [
        "game_date",
        "game_id",
        "home_team_id",
        "away_team_id",
        "home_pitcher_id",
        "away_pitcher_id",
        "park_factor_hr",
        "park_factor_runs",
        "park_factor_hits",
        "weather_temp_f",
        "weather_wind_speed_mph",
        "weather_wind_dir",
        "weather_hr_multiplier",
        "weather_run_multiplier",
        "umpire_name",
        "umpire_k_boost",
        "umpire_run_env",
        "is_day_game",
        "lineups_confirmed_home",
        "lineups_confirmed_away",
        "is_final_context",
    ];
    let rows: Vec<Vec<SqlValue>> = contexts
        .iter()
        .map(|c| {
            vec![
                SqlValue::from(date),
                SqlValue::from(c.game_id),
                SqlValue::from(c.home_team_id.clone()),
                SqlValue::from(c.away_team_id.clone()),
                SqlValue::from(c.home_pitcher_id),
                SqlValue::from(c.away_pitcher_id),
                SqlValue::from(c.park_factor_hr),
                SqlValue::from(c.park_factor_runs),
                SqlValue::from(c.park_factor_hits),
                SqlValue::from(c.weather_temp_f),
                SqlValue::from(c.weather_wind_speed_mph),
                SqlValue::from(c.weather_wind_dir.clone()),
                SqlValue::from(c.weather_hr_multiplier),
                SqlValue::from(c.weather_run_multiplier),
                SqlValue::from(c.umpire_name.clone()),
                SqlValue::from(c.umpire_k_boost),
                SqlValue::from(c.umpire_run_env),
                SqlValue::from(c.is_day_game.map(i64::from)),
                SqlValue::from(c.lineups_confirmed_home),
                SqlValue::from(c.lineups_confirmed_away),
                SqlValue::from(c.is_final_context),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "game_context_features",
            &columns,
            &["game_date", "game_id"],
            &rows,
        )
        .await
}

/// Load game context rows for a date, keyed by game.
pub async fn load_for_date(store: &Store, date: NaiveDate) -> Result<HashMap<i64, GameContext>> {
    let rows = store
        .fetch_all(
            "SELECT * FROM game_context_features WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut map = HashMap::new();
    for row in &rows {
        let c = GameContext {
            game_id: row.i64("game_id")?,
            home_team_id: row.opt_text("home_team_id")?,
            away_team_id: row.opt_text("away_team_id")?,
            home_pitcher_id: row.opt_i64("home_pitcher_id")?,
            away_pitcher_id: row.opt_i64("away_pitcher_id")?,
            park_factor_hr: row.opt_f64("park_factor_hr")?,
            park_factor_runs: row.opt_f64("park_factor_runs")?,
            park_factor_hits: row.opt_f64("park_factor_hits")?,
            weather_temp_f: row.opt_f64("weather_temp_f")?,
            weather_wind_speed_mph: row.opt_f64("weather_wind_speed_mph")?,
            weather_wind_dir: row.opt_text("weather_wind_dir")?,
            weather_hr_multiplier: row.opt_f64("weather_hr_multiplier")?,
            weather_run_multiplier: row.opt_f64("weather_run_multiplier")?,
            umpire_name: row.opt_text("umpire_name")?,
            umpire_k_boost: row.opt_f64("umpire_k_boost")?,
            umpire_run_env: row.opt_f64("umpire_run_env")?,
            is_day_game: row.opt_i64("is_day_game")?.map(|v| v != 0),
            lineups_confirmed_home: row.flag("lineups_confirmed_home")?,
            lineups_confirmed_away: row.flag("lineups_confirmed_away")?,
            is_final_context: row.flag("is_final_context")?,
        };
        map.insert(c.game_id, c);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_multipliers_hot_day_wind_out() {
        let (hr, run) = weather_multipliers(Some(88.0), Some(12.0), Some(1.15));
        assert!((hr - 1.15 * 1.03).abs() < 1e-3);
        assert!(run > 1.0 && run <= 1.25);
    }

    #[test]
    fn test_weather_multipliers_cold_capped() {
        let (hr, run) = weather_multipliers(Some(40.0), Some(0.0), Some(0.85));
        assert!((hr - 0.85 * 0.97).abs() < 1e-3);
        assert!(run >= 0.8);
    }

    #[test]
    fn test_weather_multipliers_missing_inputs_neutral() {
        let (hr, run) = weather_multipliers(None, None, None);
        assert_eq!(hr, 1.0);
        assert_eq!(run, 1.0);
    }

    #[test]
    fn test_is_day_game_from_utc_time() {
        assert_eq!(is_day_game(Some("2024-07-04T17:05:00Z")), Some(true));
        assert_eq!(is_day_game(Some("2024-07-04T23:10:00Z")), Some(false));
        assert_eq!(is_day_game(None), None);
    }
}
