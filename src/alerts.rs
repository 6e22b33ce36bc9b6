//! Market-aware alerting over a generic JSON webhook. Absence of the
//! webhook URL suppresses alerts silently.

use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::AlertConfig;
use crate::domain::Market;
use crate::error::Result;
use crate::store::{date_str, SqlValue, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct AlertThreshold {
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_rows")]
    pub max_rows: i64,
}

fn default_signals() -> Vec<String> {
    vec!["BET".to_string(), "LEAN".to_string()]
}

fn default_min_score() -> f64 {
    70.0
}

fn default_max_rows() -> i64 {
    5
}

impl Default for AlertThreshold {
    fn default() -> Self {
        Self {
            signals: default_signals(),
            min_score: default_min_score(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_thresholds() -> HashMap<String, AlertThreshold> {
    HashMap::from([
        ("*".to_string(), AlertThreshold::default()),
        (
            "HR".to_string(),
            AlertThreshold {
                min_score: 72.0,
                ..Default::default()
            },
        ),
        ("K".to_string(), AlertThreshold::default()),
    ])
}

/// Per-market thresholds from config JSON, falling back to the defaults
/// (and the `*` entry for unlisted markets).
pub fn load_thresholds(config: &AlertConfig) -> HashMap<String, AlertThreshold> {
    let Some(raw) = config.thresholds_json.as_deref() else {
        return default_thresholds();
    };
    serde_json::from_str(raw).unwrap_or_else(|_| default_thresholds())
}

fn threshold_for(thresholds: &HashMap<String, AlertThreshold>, market: Market) -> AlertThreshold {
    thresholds
        .get(market.as_str())
        .or_else(|| thresholds.get("*"))
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct AlertOutcome {
    pub sent: bool,
    pub reason: &'static str,
    pub rows: usize,
}

/// Send the top-K scored rows for one market per the per-market
/// thresholds, as a single webhook message with a dashboard link
/// placeholder.
pub async fn send_market_alerts(
    client: &Client,
    config: &AlertConfig,
    store: &Store,
    date: NaiveDate,
    market: Market,
) -> Result<AlertOutcome> {
    let thresholds = load_thresholds(config);
    let t = threshold_for(&thresholds, market);

    let signal_list: Vec<String> = t.signals.iter().map(|s| s.to_uppercase()).collect();
    let placeholders: Vec<String> = (0..signal_list.len()).map(|i| format!("${}", i + 3)).collect();
    let sql = format!(
        "SELECT player_name, team_id, side, line, selection_key, model_score, edge, signal,
                confidence_band, lineup_confirmed, reasons_json, risk_flags_json
         FROM model_scores
         WHERE game_date = $1 AND market = $2 AND is_active = 1
           AND signal IN ({})
           AND model_score >= ${}
         ORDER BY model_score DESC, edge DESC
         LIMIT ${}",
        placeholders.join(", "),
        signal_list.len() + 3,
        signal_list.len() + 4,
    );
    let mut params = vec![SqlValue::from(date), SqlValue::from(market.as_str())];
    params.extend(signal_list.iter().map(|s| SqlValue::from(s.clone())));
    params.push(SqlValue::from(t.min_score));
    params.push(SqlValue::from(t.max_rows));

    let rows = store.fetch_all(&sql, &params).await?;
    if rows.is_empty() {
        return Ok(AlertOutcome { sent: false, reason: "no_rows", rows: 0 });
    }

    let Some(webhook) = config.webhook_url.as_deref() else {
        debug!("no alert webhook configured, skipping");
        return Ok(AlertOutcome { sent: false, reason: "webhook_not_set", rows: rows.len() });
    };

    let mut lines = vec![format!("MLBPredicts Alerts — {} {}", date_str(date), market)];
    for row in &rows {
        let reasons: Vec<String> = row
            .opt_text("reasons_json")?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let risks: Vec<String> = row
            .opt_text("risk_flags_json")?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let name = row
            .opt_text("player_name")?
            .or(row.opt_text("team_id")?)
            .or(row.opt_text("selection_key")?)
            .unwrap_or_default();
        let mut line = format!(
            " • {} {} {} {} score={:.1} edge={:.2}% lineup={}",
            row.text("signal")?,
            name,
            row.opt_text("side")?.unwrap_or_default(),
            row.opt_f64("line")?.map(|l| l.to_string()).unwrap_or_default(),
            row.opt_f64("model_score")?.unwrap_or(0.0),
            row.opt_f64("edge")?.unwrap_or(0.0),
            if row.flag("lineup_confirmed")? { "Y" } else { "N" },
        );
        if !reasons.is_empty() {
            line.push_str(&format!(" reasons={}", reasons[..reasons.len().min(2)].join("; ")));
        }
        if !risks.is_empty() {
            line.push_str(&format!(" risk={}", risks[..risks.len().min(2)].join("; ")));
        }
        lines.push(line);
    }
    if let Some(dashboard) = config.dashboard_url.as_deref() {
        lines.push(format!("Dashboard: {dashboard}"));
    }

    let mut content = lines.join("\n");
    if content.len() > 1900 {
        let mut cut = 1900;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
    }
    client
        .post(webhook)
        .json(&json!({ "content": content }))
        .send()
        .await?
        .error_for_status()?;

    info!(market = %market, rows = rows.len(), "alerts sent");
    Ok(AlertOutcome { sent: true, reason: "sent", rows: rows.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_fallback_to_star() {
        let config = AlertConfig::default();
        let thresholds = load_thresholds(&config);
        let ml = threshold_for(&thresholds, Market::Ml);
        assert_eq!(ml.min_score, 70.0);
        let hr = threshold_for(&thresholds, Market::Hr);
        assert_eq!(hr.min_score, 72.0);
    }

    #[test]
    fn test_thresholds_json_override() {
        let config = AlertConfig {
            thresholds_json: Some(
                r#"{"K": {"signals": ["BET"], "min_score": 80, "max_rows": 2}}"#.to_string(),
            ),
            ..Default::default()
        };
        let thresholds = load_thresholds(&config);
        let k = threshold_for(&thresholds, Market::K);
        assert_eq!(k.min_score, 80.0);
        assert_eq!(k.max_rows, 2);
        assert_eq!(k.signals, vec!["BET"]);
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let config = AlertConfig {
            thresholds_json: Some("not json".to_string()),
            ..Default::default()
        };
        let thresholds = load_thresholds(&config);
        assert!(thresholds.contains_key("*"));
    }
}
