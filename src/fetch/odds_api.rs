//! Sportsbook odds fetcher: pulls per-event odds for the supported source
//! markets, hands raw payloads to the normalizer, resolves MLB game ids
//! and recomputes the best-available marker per selection.

use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::Result;
use crate::fetch::schedule::games_for_date;
use crate::fetch::with_retries;
use crate::odds::{
    normalize_event_odds, recompute_best_available, NormalizedOdds, OddsEvent, SOURCE_MARKET_KEYS,
};
use crate::stadiums::team_abbrs;
use crate::store::{now_ts, SqlValue, Store};

#[derive(Debug, Default)]
pub struct OddsRefreshSummary {
    pub events_seen: usize,
    pub rows_collected: usize,
    pub rows_upserted: u64,
    pub skipped_unsupported: usize,
    pub best_available_updates: u64,
}

/// Fetch and persist normalized odds for a date, then recompute
/// `is_best_available` atomically over the affected selection keys.
pub async fn refresh_odds(
    client: &Client,
    cfg: &ApiConfig,
    store: &Store,
    date: NaiveDate,
) -> Result<OddsRefreshSummary> {
    let mut summary = OddsRefreshSummary::default();
    let Some(api_key) = cfg.odds_api_key.as_deref() else {
        warn!("no odds API key set, skipping odds refresh");
        return Ok(summary);
    };

    let events_url = format!("{}/sports/baseball_mlb/events", cfg.odds_api_base);
    let events: Vec<OddsEvent> = with_retries(cfg.retry_attempts, "odds_events", || async {
        let resp = client
            .get(&events_url)
            .query(&[("apiKey", api_key), ("dateFormat", "iso")])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    })
    .await?;
    summary.events_seen = events.len();

    // Resolve the MLB game id from (date, home, away).
    let abbrs = team_abbrs();
    let games = games_for_date(store, date).await?;
    let game_index: HashMap<(String, String), i64> = games
        .iter()
        .map(|g| ((g.home_team.clone(), g.away_team.clone()), g.game_id))
        .collect();

    let mut all_rows: Vec<NormalizedOdds> = Vec::new();
    for event in &events {
        if event.commence_time.is_some_and(|t| t.date_naive() != date) {
            continue;
        }

        let odds_url = format!(
            "{}/sports/baseball_mlb/events/{}/odds",
            cfg.odds_api_base, event.id
        );
        let markets_param = SOURCE_MARKET_KEYS.join(",");
        let detailed: OddsEvent = match with_retries(cfg.retry_attempts, "odds_event", || async {
            let resp = client
                .get(&odds_url)
                .query(&[
                    ("apiKey", api_key),
                    ("regions", "us"),
                    ("markets", markets_param.as_str()),
                    ("oddsFormat", "american"),
                    ("dateFormat", "iso"),
                ])
                .send()
                .await?
                .error_for_status()?;
            Ok(resp.json().await?)
        })
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "event odds fetch failed");
                continue;
            }
        };

        let game_id = match (detailed.home_team.as_deref(), detailed.away_team.as_deref()) {
            (Some(home), Some(away)) => {
                let home = abbrs.get(home).cloned().unwrap_or_else(|| home.to_string());
                let away = abbrs.get(away).cloned().unwrap_or_else(|| away.to_string());
                game_index.get(&(home, away)).copied()
            }
            _ => None,
        };

        let (rows, norm_summary) = normalize_event_odds(&detailed, game_id, &abbrs);
        summary.skipped_unsupported += norm_summary.skipped_unsupported_market;
        all_rows.extend(rows);
    }

    summary.rows_collected = all_rows.len();
    summary.rows_upserted = persist_odds(store, &all_rows).await?;
    summary.best_available_updates = recompute_best_available(store, date).await?;
    info!(
        date = %date,
        events = summary.events_seen,
        rows = summary.rows_collected,
        "odds refresh complete"
    );
    Ok(summary)
}

pub async fn persist_odds(store: &Store, rows: &[NormalizedOdds]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let fetched_at = now_ts();
    let columns = [
        "game_date",
        "game_id",
        "event_id",
        "market",
        "entity_type",
        "player_id",
        "player_name",
        "team_id",
        "opponent_team_id",
        "selection_key",
        "side",
        "bet_type",
        "line",
        "price_american",
        "price_decimal",
        "implied_probability",
        "sportsbook",
        "source_market_key",
        "fetched_at",
        "is_best_available",
    ];
    let values: Vec<Vec<SqlValue>> = rows
        .iter()
        .map(|r| {
            vec![
                SqlValue::from(r.game_date),
                SqlValue::from(r.game_id),
                SqlValue::from(r.event_id.clone()),
                SqlValue::from(r.market.as_str()),
                SqlValue::from(r.entity_type.as_str()),
                SqlValue::from(r.player_id),
                SqlValue::from(r.player_name.clone()),
                SqlValue::from(r.team_id.clone()),
                SqlValue::from(r.opponent_team_id.clone()),
                SqlValue::from(r.selection_key.clone()),
                SqlValue::from(r.side.map(|s| s.as_str())),
                SqlValue::from(r.bet_type.clone()),
                SqlValue::from(r.line),
                SqlValue::from(r.price_american),
                SqlValue::from(r.price_decimal),
                SqlValue::from(r.implied_probability),
                SqlValue::from(r.sportsbook.clone()),
                SqlValue::from(r.source_market_key.clone()),
                SqlValue::from(fetched_at.clone()),
                SqlValue::from(0i64),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "market_odds",
            &columns,
            &["game_date", "selection_key", "sportsbook", "fetched_at"],
            &values,
        )
        .await
}
