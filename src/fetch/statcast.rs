//! Pitch-level event fetcher against the Statcast CSV export.
//!
//! Two modes share one code path: `per_day` (live pipeline) and `bulk`
//! (backfill, one request per date span). Rows are normalized into
//! `pitch_events`, the raw table every rolling aggregate derives from.

use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::Result;
use crate::fetch::with_retries;
use crate::store::{date_str, SqlValue, Store};

/// One normalized pitch event.
#[derive(Debug, Clone, Default)]
pub struct PitchEvent {
    pub game_id: i64,
    pub event_seq: i64,
    pub game_date: NaiveDate,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub bat_team: Option<String>,
    pub def_team: Option<String>,
    pub batter_id: Option<i64>,
    pub pitcher_id: Option<i64>,
    pub batter_name: Option<String>,
    pub pitcher_name: Option<String>,
    pub stand: Option<String>,
    pub p_throws: Option<String>,
    pub events: Option<String>,
    pub description: Option<String>,
    pub pitch_type: Option<String>,
    pub release_speed: Option<f64>,
    pub zone: Option<i64>,
    pub launch_speed: Option<f64>,
    pub launch_angle: Option<f64>,
    pub launch_speed_angle: Option<i64>,
    pub hc_x: Option<f64>,
    pub inning: Option<i64>,
    pub at_bat_number: Option<i64>,
    pub post_home_score: Option<i64>,
    pub post_away_score: Option<i64>,
}

struct HeaderIndex(HashMap<String, usize>);

impl HeaderIndex {
    fn new(headers: &csv::StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_string(), i))
                .collect(),
        )
    }

    fn text(&self, record: &csv::StringRecord, col: &str) -> Option<String> {
        let idx = *self.0.get(col)?;
        let raw = record.get(idx)?.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("na") {
            None
        } else {
            Some(raw.to_string())
        }
    }

    fn f64(&self, record: &csv::StringRecord, col: &str) -> Option<f64> {
        self.text(record, col)?.parse().ok()
    }

    fn i64(&self, record: &csv::StringRecord, col: &str) -> Option<i64> {
        let raw = self.text(record, col)?;
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
    }
}

fn parse_csv(body: &str) -> Result<Vec<PitchEvent>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();
    let idx = HeaderIndex::new(&headers);

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for (row_num, record) in reader.records().enumerate() {
        let record = record?;
        let Some(game_id) = idx.i64(&record, "game_pk") else {
            skipped += 1;
            continue;
        };
        let Some(game_date) = idx
            .text(&record, "game_date")
            .and_then(|s| NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d").ok())
        else {
            skipped += 1;
            continue;
        };

        let home_team = idx.text(&record, "home_team");
        let away_team = idx.text(&record, "away_team");
        let topbot = idx
            .text(&record, "inning_topbot")
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        let (bat_team, def_team) = if topbot == "top" {
            (away_team.clone(), home_team.clone())
        } else {
            (home_team.clone(), away_team.clone())
        };

        // Stable per-game ordering: at-bat number and pitch number when
        // present, raw row order otherwise.
        let at_bat = idx.i64(&record, "at_bat_number");
        let pitch_number = idx.i64(&record, "pitch_number");
        let event_seq = match (at_bat, pitch_number) {
            (Some(ab), Some(p)) => ab * 1000 + p,
            _ => 1_000_000_000 + row_num as i64,
        };

        events.push(PitchEvent {
            game_id,
            event_seq,
            game_date,
            home_team,
            away_team,
            bat_team,
            def_team,
            batter_id: idx.i64(&record, "batter"),
            pitcher_id: idx.i64(&record, "pitcher"),
            batter_name: idx.text(&record, "batter_name"),
            pitcher_name: idx
                .text(&record, "pitcher_name")
                .or_else(|| idx.text(&record, "player_name")),
            stand: idx.text(&record, "stand").map(|s| s.to_uppercase()),
            p_throws: idx.text(&record, "p_throws").map(|s| s.to_uppercase()),
            events: idx.text(&record, "events").map(|s| s.to_lowercase()),
            description: idx.text(&record, "description").map(|s| s.to_lowercase()),
            pitch_type: idx.text(&record, "pitch_type").map(|s| s.to_uppercase()),
            release_speed: idx.f64(&record, "release_speed"),
            zone: idx.i64(&record, "zone"),
            launch_speed: idx.f64(&record, "launch_speed"),
            launch_angle: idx.f64(&record, "launch_angle"),
            launch_speed_angle: idx.i64(&record, "launch_speed_angle"),
            hc_x: idx.f64(&record, "hc_x"),
            inning: idx.i64(&record, "inning"),
            at_bat_number: at_bat,
            post_home_score: idx.i64(&record, "post_home_score"),
            post_away_score: idx.i64(&record, "post_away_score"),
        });
    }

    if skipped > 0 {
        warn!(skipped, "pitch rows dropped for missing game id/date");
    }
    Ok(events)
}

/// Bulk fetch: one CSV export request for `[start, end]`, persisted in
/// batches. Callers bound memory by chunking the span (≤60 days).
pub async fn fetch_bulk(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize> {
    let body = with_retries(cfg.retry_attempts, "statcast_bulk", || async {
        let resp = client
            .get(&cfg.statcast_base)
            .query(&[
                ("all", "true".to_string()),
                ("type", "details".to_string()),
                ("player_type", "batter".to_string()),
                ("game_date_gt", date_str(start)),
                ("game_date_lt", date_str(end)),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    })
    .await?;

    let events = parse_csv(&body)?;
    let count = events.len();
    persist_events(store, &events).await?;
    info!(start = %start, end = %end, rows = count, "bulk pitch events persisted");
    Ok(count)
}

/// Per-day fetch used by the live path.
pub async fn fetch_per_day(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    date: NaiveDate,
) -> Result<usize> {
    fetch_bulk(client, cfg, store, date, date).await
}

pub async fn persist_events(store: &Store, events: &[PitchEvent]) -> Result<u64> {
    if events.is_empty() {
        return Ok(0);
    }
    let columns = [
        "game_id",
        "event_seq",
        "game_date",
        "home_team",
        "away_team",
        "bat_team",
        "def_team",
        "batter_id",
        "pitcher_id",
        "batter_name",
        "pitcher_name",
        "stand",
        "p_throws",
        "events",
        "description",
        "pitch_type",
        "release_speed",
        "zone",
        "launch_speed",
        "launch_angle",
        "launch_speed_angle",
        "hc_x",
        "inning",
        "at_bat_number",
        "post_home_score",
        "post_away_score",
    ];
    let rows: Vec<Vec<SqlValue>> = events
        .iter()
        .map(|e| {
            vec![
                SqlValue::from(e.game_id),
                SqlValue::from(e.event_seq),
                SqlValue::from(e.game_date),
                SqlValue::from(e.home_team.clone()),
                SqlValue::from(e.away_team.clone()),
                SqlValue::from(e.bat_team.clone()),
                SqlValue::from(e.def_team.clone()),
                SqlValue::from(e.batter_id),
                SqlValue::from(e.pitcher_id),
                SqlValue::from(e.batter_name.clone()),
                SqlValue::from(e.pitcher_name.clone()),
                SqlValue::from(e.stand.clone()),
                SqlValue::from(e.p_throws.clone()),
                SqlValue::from(e.events.clone()),
                SqlValue::from(e.description.clone()),
                SqlValue::from(e.pitch_type.clone()),
                SqlValue::from(e.release_speed),
                SqlValue::from(e.zone),
                SqlValue::from(e.launch_speed),
                SqlValue::from(e.launch_angle),
                SqlValue::from(e.launch_speed_angle),
                SqlValue::from(e.hc_x),
                SqlValue::from(e.inning),
                SqlValue::from(e.at_bat_number),
                SqlValue::from(e.post_home_score),
                SqlValue::from(e.post_away_score),
            ]
        })
        .collect();
    store
        .upsert_batch("pitch_events", &columns, &["game_id", "event_seq"], &rows)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
game_pk,game_date,home_team,away_team,inning_topbot,batter,pitcher,player_name,events,description,launch_speed,launch_angle,launch_speed_angle,hc_x,stand,p_throws,pitch_type,release_speed,zone,inning,at_bat_number,pitch_number,post_home_score,post_away_score
776123,2024-07-04,NYY,BOS,Top,592450,543037,Gerrit Cole,home_run,hit_into_play,108.3,27,6,120.5,R,R,FF,97.1,5,1,3,2,0,1
776123,2024-07-04,NYY,BOS,Bot,660271,601713,,,swinging_strike,null,null,null,null,L,R,SL,88.0,11,1,8,1,0,1
,2024-07-04,NYY,BOS,Top,1,2,,,,,,,,,,,,,,,,,";

    #[test]
    fn test_parse_csv_normalizes_rows() {
        let events = parse_csv(SAMPLE).unwrap();
        assert_eq!(events.len(), 2);

        let hr = &events[0];
        assert_eq!(hr.game_id, 776123);
        assert_eq!(hr.batter_id, Some(592450));
        assert_eq!(hr.events.as_deref(), Some("home_run"));
        // top of the inning: away team bats
        assert_eq!(hr.bat_team.as_deref(), Some("BOS"));
        assert_eq!(hr.def_team.as_deref(), Some("NYY"));
        assert_eq!(hr.event_seq, 3 * 1000 + 2);
        assert_eq!(hr.launch_speed_angle, Some(6));

        let whiff = &events[1];
        assert_eq!(whiff.bat_team.as_deref(), Some("NYY"));
        assert_eq!(whiff.launch_speed, None);
        assert_eq!(whiff.description.as_deref(), Some("swinging_strike"));
    }

    #[test]
    fn test_parse_csv_handles_na_tokens() {
        let body = "game_pk,game_date,launch_speed\n1,2024-05-01,NA\n";
        let events = parse_csv(body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].launch_speed, None);
    }
}
