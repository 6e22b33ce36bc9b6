//! Closing-line resolution for CLV capture.
//!
//! Policy is a config flag: `latest_pregame` takes the newest snapshot
//! fetched before first pitch regardless of book; `best_available` takes
//! the best-available marked row at that snapshot. The resolved row is
//! cached in `closing_lines`, one per selection per settled date.

use chrono::NaiveDate;

use crate::config::ClosingLinePolicy;
use crate::domain::Market;
use crate::error::Result;
use crate::store::{date_str, SqlValue, Store};

#[derive(Debug, Clone)]
pub struct ClosingLine {
    pub selection_key: String,
    pub side: Option<String>,
    pub line: Option<f64>,
    pub price_american: Option<i64>,
    pub price_decimal: Option<f64>,
    pub implied_probability: Option<f64>,
    pub sportsbook: Option<String>,
    pub snapshot_at: Option<String>,
}

async fn cached_closing_line(
    store: &Store,
    date: NaiveDate,
    selection_key: &str,
) -> Result<Option<ClosingLine>> {
    let row = store
        .fetch_optional(
            "SELECT selection_key, side, line, price_american, price_decimal,
                    implied_probability, sportsbook, snapshot_at
             FROM closing_lines
             WHERE game_date = $1 AND selection_key = $2",
            &[SqlValue::from(date), SqlValue::from(selection_key)],
        )
        .await?;
    Ok(match row {
        Some(row) => Some(ClosingLine {
            selection_key: row.text("selection_key")?,
            side: row.opt_text("side")?,
            line: row.opt_f64("line")?,
            price_american: row.opt_i64("price_american")?,
            price_decimal: row.opt_f64("price_decimal")?,
            implied_probability: row.opt_f64("implied_probability")?,
            sportsbook: row.opt_text("sportsbook")?,
            snapshot_at: row.opt_text("snapshot_at")?,
        }),
        None => None,
    })
}

async fn pregame_cutoff(store: &Store, date: NaiveDate, selection_key: &str) -> Result<Option<String>> {
    // first pitch of the game the selection belongs to; falls back to
    // end-of-day when game_time is absent
    let row = store
        .fetch_optional(
            "SELECT g.game_time
             FROM market_odds o
             JOIN games g ON g.game_id = o.game_id
             WHERE o.game_date = $1 AND o.selection_key = $2 AND o.game_id IS NOT NULL
             LIMIT 1",
            &[SqlValue::from(date), SqlValue::from(selection_key)],
        )
        .await?;
    Ok(row.map(|r| r.opt_text("game_time")).transpose()?.flatten())
}

/// Resolve (and cache) the closing line for one selection.
pub async fn resolve_closing_line(
    store: &Store,
    date: NaiveDate,
    market: Market,
    selection_key: &str,
    policy: ClosingLinePolicy,
) -> Result<Option<ClosingLine>> {
    if let Some(cached) = cached_closing_line(store, date, selection_key).await? {
        return Ok(Some(cached));
    }

    let cutoff = pregame_cutoff(store, date, selection_key)
        .await?
        .unwrap_or_else(|| format!("{}T23:59:59Z", date_str(date)));

    let sql = match policy {
        ClosingLinePolicy::LatestPregame => {
            "SELECT selection_key, side, line, price_american, price_decimal,
                    implied_probability, sportsbook, fetched_at
             FROM market_odds
             WHERE game_date = $1 AND selection_key = $2 AND fetched_at <= $3
             ORDER BY fetched_at DESC, implied_probability ASC
             LIMIT 1"
        }
        ClosingLinePolicy::BestAvailable => {
            "SELECT selection_key, side, line, price_american, price_decimal,
                    implied_probability, sportsbook, fetched_at
             FROM market_odds
             WHERE game_date = $1 AND selection_key = $2 AND fetched_at <= $3
               AND is_best_available = 1
             ORDER BY fetched_at DESC
             LIMIT 1"
        }
    };
    let Some(row) = store
        .fetch_optional(
            sql,
            &[
                SqlValue::from(date),
                SqlValue::from(selection_key),
                SqlValue::from(cutoff),
            ],
        )
        .await?
    else {
        return Ok(None);
    };

    let closing = ClosingLine {
        selection_key: row.text("selection_key")?,
        side: row.opt_text("side")?,
        line: row.opt_f64("line")?,
        price_american: row.opt_i64("price_american")?,
        price_decimal: row.opt_f64("price_decimal")?,
        implied_probability: row.opt_f64("implied_probability")?,
        sportsbook: row.opt_text("sportsbook")?,
        snapshot_at: row.opt_text("fetched_at")?,
    };

    let policy_name = match policy {
        ClosingLinePolicy::LatestPregame => "latest_pregame",
        ClosingLinePolicy::BestAvailable => "best_available",
    };
    store
        .upsert_batch(
            "closing_lines",
            &[
                "game_date",
                "market",
                "game_id",
                "selection_key",
                "side",
                "line",
                "price_american",
                "price_decimal",
                "implied_probability",
                "sportsbook",
                "snapshot_at",
                "policy",
            ],
            &["game_date", "selection_key"],
            &[vec![
                SqlValue::from(date),
                SqlValue::from(market.as_str()),
                SqlValue::null_int(),
                SqlValue::from(closing.selection_key.clone()),
                SqlValue::from(closing.side.clone()),
                SqlValue::from(closing.line),
                SqlValue::from(closing.price_american),
                SqlValue::from(closing.price_decimal),
                SqlValue::from(closing.implied_probability),
                SqlValue::from(closing.sportsbook.clone()),
                SqlValue::from(closing.snapshot_at.clone()),
                SqlValue::from(policy_name),
            ]],
        )
        .await?;

    Ok(Some(closing))
}
