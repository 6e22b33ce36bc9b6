//! Point-in-time stadium weather with deterministic HR-impact multipliers.
//!
//! Wind classification uses fixed compass buckets relative to the typical
//! park orientation (home plate in the southwest, outfield to the
//! northeast): wind FROM the southwest quadrant (200°–290°) blows out,
//! FROM the northeast quadrant (20°–110°) blows in, anything else is
//! cross wind. Domes and closed roofs are neutral.
//!
//! Multipliers: out 1.15, in 0.85, cross 1.02, scaled toward 1.0 below
//! 8 mph; missing weather is a downstream risk flag, not an error.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::domain::Game;
use crate::error::Result;
use crate::fetch::with_retries;
use crate::store::{now_ts, SqlValue, Store};

const WIND_OUT_MULTIPLIER: f64 = 1.15;
const WIND_IN_MULTIPLIER: f64 = 0.85;
const WIND_CROSS_MULTIPLIER: f64 = 1.02;

#[derive(Debug, Clone)]
pub struct WeatherRecord {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub temperature_f: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub wind_deg: Option<i64>,
    pub wind_description: Option<String>,
    pub wind_hr_impact: f64,
    pub humidity: Option<f64>,
    pub conditions: Option<String>,
    pub is_dome: bool,
}

pub fn classify_wind(wind_deg: Option<i64>) -> &'static str {
    match wind_deg {
        Some(deg) => {
            let deg = deg.rem_euclid(360);
            if (200..290).contains(&deg) {
                "out"
            } else if (20..110).contains(&deg) {
                "in"
            } else {
                "cross"
            }
        }
        None => "cross",
    }
}

/// Deterministic HR impact from wind direction and speed.
pub fn wind_hr_impact(wind_deg: Option<i64>, wind_speed_mph: Option<f64>, is_dome: bool) -> f64 {
    if is_dome {
        return 1.0;
    }
    let base = match classify_wind(wind_deg) {
        "out" => WIND_OUT_MULTIPLIER,
        "in" => WIND_IN_MULTIPLIER,
        _ => WIND_CROSS_MULTIPLIER,
    };
    let speed = wind_speed_mph.unwrap_or(0.0);
    if speed < 8.0 {
        // light wind: interpolate toward neutral
        1.0 + (base - 1.0) * (speed / 8.0)
    } else {
        base
    }
}

async fn stadium_for_game(store: &Store, game: &Game) -> Result<Option<(f64, f64, bool)>> {
    let Some(stadium_id) = game.stadium_id else {
        return Ok(None);
    };
    let row = store
        .fetch_optional(
            "SELECT latitude, longitude, roof_type FROM stadiums WHERE stadium_id = $1",
            &[SqlValue::from(stadium_id)],
        )
        .await?;
    Ok(match row {
        Some(row) => {
            let roof = row.opt_text("roof_type")?.unwrap_or_default();
            Some((
                row.opt_f64("latitude")?.unwrap_or(0.0),
                row.opt_f64("longitude")?.unwrap_or(0.0),
                roof == "dome",
            ))
        }
        None => None,
    })
}

/// Fetch current weather for each game's stadium and persist snapshots.
/// Games without stadium coordinates, and API failures after retries,
/// are skipped (downstream risk flags carry the gap).
pub async fn fetch_game_weather(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    games: &[Game],
) -> Result<Vec<WeatherRecord>> {
    let Some(api_key) = cfg.weather_api_key.as_deref() else {
        warn!("no weather API key set, skipping weather fetch");
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for game in games {
        let Some((lat, lon, is_dome)) = stadium_for_game(store, game).await? else {
            continue;
        };

        let url = format!("{}/weather", cfg.weather_api_base);
        let payload = match with_retries(cfg.retry_attempts, "weather", || async {
            let resp = client
                .get(&url)
                .query(&[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", "imperial".to_string()),
                    ("appid", api_key.to_string()),
                ])
                .send()
                .await?
                .error_for_status()?;
            Ok(resp.json::<Value>().await?)
        })
        .await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(game_id = game.game_id, error = %e, "weather fetch failed");
                continue;
            }
        };

        let wind_deg = payload["wind"]["deg"].as_i64();
        let wind_speed = payload["wind"]["speed"].as_f64();
        records.push(WeatherRecord {
            game_id: game.game_id,
            game_date: game.game_date,
            temperature_f: payload["main"]["temp"].as_f64(),
            wind_speed_mph: wind_speed,
            wind_deg,
            wind_description: Some(classify_wind(wind_deg).to_string()),
            wind_hr_impact: wind_hr_impact(wind_deg, wind_speed, is_dome),
            humidity: payload["main"]["humidity"].as_f64(),
            conditions: payload["weather"][0]["main"].as_str().map(str::to_string),
            is_dome,
        });
    }

    persist_weather(store, &records).await?;
    info!(games = games.len(), records = records.len(), "weather fetched");
    Ok(records)
}

pub async fn persist_weather(store: &Store, records: &[WeatherRecord]) -> Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }
    let fetch_time = now_ts();
    let columns = [
        "game_id",
        "game_date",
        "fetch_time",
        "temperature_f",
        "wind_speed_mph",
        "wind_deg",
        "wind_description",
        "wind_hr_impact",
        "humidity",
        "conditions",
        "is_dome",
    ];
    let rows: Vec<Vec<SqlValue>> = records
        .iter()
        .map(|w| {
            vec![
                SqlValue::from(w.game_id),
                SqlValue::from(w.game_date),
                SqlValue::from(fetch_time.clone()),
                SqlValue::from(w.temperature_f),
                SqlValue::from(w.wind_speed_mph),
                SqlValue::from(w.wind_deg),
                SqlValue::from(w.wind_description.clone()),
                SqlValue::from(w.wind_hr_impact),
                SqlValue::from(w.humidity),
                SqlValue::from(w.conditions.clone()),
                SqlValue::from(w.is_dome),
            ]
        })
        .collect();
    store
        .upsert_batch("weather", &columns, &["game_id", "fetch_time"], &rows)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wind_buckets() {
        assert_eq!(classify_wind(Some(245)), "out");
        assert_eq!(classify_wind(Some(45)), "in");
        assert_eq!(classify_wind(Some(0)), "cross");
        assert_eq!(classify_wind(Some(180)), "cross");
        assert_eq!(classify_wind(None), "cross");
    }

    #[test]
    fn test_wind_hr_impact() {
        // full strength wind out
        assert!((wind_hr_impact(Some(245), Some(15.0), false) - 1.15).abs() < 1e-9);
        // dome neutralizes everything
        assert_eq!(wind_hr_impact(Some(245), Some(30.0), true), 1.0);
        // light wind interpolates toward neutral
        let light = wind_hr_impact(Some(245), Some(4.0), false);
        assert!(light > 1.0 && light < 1.15);
        // calm is neutral
        assert!((wind_hr_impact(Some(45), Some(0.0), false) - 1.0).abs() < 1e-9);
    }
}
