use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Main configuration structure.
///
/// Loaded once at startup from an optional `mlbpredicts.toml` plus
/// environment overlays, then passed down immutably. No global mutable
/// state anywhere in the crate.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub apis: ApiConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Primary SQL database URL. When absent the embedded SQLite fallback
    /// at `sqlite_path` is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub odds_api_key: Option<String>,
    #[serde(default)]
    pub weather_api_key: Option<String>,
    #[serde(default = "default_mlb_stats_base")]
    pub mlb_stats_base: String,
    #[serde(default = "default_odds_api_base")]
    pub odds_api_base: String,
    #[serde(default = "default_weather_api_base")]
    pub weather_api_base: String,
    #[serde(default = "default_statcast_base")]
    pub statcast_base: String,
    /// Per-call HTTP timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Bounded retry attempts for upstream fetches.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertConfig {
    /// Absence suppresses alerts silently.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// JSON of per-market `{signals, min_score, max_rows}` thresholds.
    #[serde(default)]
    pub thresholds_json: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Backfill Phase 2 worker pool size.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bulk pitch-event chunk size in days (bounds memory).
    #[serde(default = "default_bulk_chunk_days")]
    pub bulk_chunk_days: i64,
    /// Closing-line selection policy: `latest_pregame` or `best_available`.
    #[serde(default = "default_closing_line_policy")]
    pub closing_line_policy: ClosingLinePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingLinePolicy {
    /// Latest snapshot fetched before first pitch, any book.
    LatestPregame,
    /// The best-available marked row at the latest pregame snapshot.
    BestAvailable,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            odds_api_key: None,
            weather_api_key: None,
            mlb_stats_base: default_mlb_stats_base(),
            odds_api_base: default_odds_api_base(),
            weather_api_base: default_weather_api_base(),
            statcast_base: default_statcast_base(),
            http_timeout_secs: default_http_timeout_secs(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            bulk_chunk_days: default_bulk_chunk_days(),
            closing_line_policy: default_closing_line_policy(),
        }
    }
}

fn default_sqlite_path() -> String {
    "./data/mlbpredicts.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_mlb_stats_base() -> String {
    "https://statsapi.mlb.com/api/v1".to_string()
}

fn default_odds_api_base() -> String {
    "https://api.the-odds-api.com/v4".to_string()
}

fn default_weather_api_base() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_statcast_base() -> String {
    "https://baseballsavant.mlb.com/statcast_search/csv".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_workers() -> usize {
    4
}

fn default_bulk_chunk_days() -> i64 {
    60
}

fn default_closing_line_policy() -> ClosingLinePolicy {
    ClosingLinePolicy::LatestPregame
}

/// Resolve the primary database URL from the accepted environment keys,
/// explicit URLs first, then discrete PG* parts.
fn resolve_database_url() -> Option<String> {
    for key in [
        "DATABASE_URL",
        "SUPABASE_DB_URL",
        "SUPABASE_DATABASE_URL",
        "POSTGRES_URL",
        "POSTGRESQL_URL",
    ] {
        if let Ok(url) = std::env::var(key) {
            let url = url.trim().to_string();
            if !url.is_empty() {
                return Some(url);
            }
        }
    }

    let host = std::env::var("PGHOST").ok()?.trim().to_string();
    if host.is_empty() {
        return None;
    }
    let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".into());
    let db = std::env::var("PGDATABASE").unwrap_or_else(|_| "postgres".into());
    let user = std::env::var("PGUSER").unwrap_or_else(|_| "postgres".into());
    let pass = std::env::var("PGPASSWORD").unwrap_or_default();
    if pass.is_empty() {
        Some(format!("postgresql://{user}@{host}:{port}/{db}"))
    } else {
        Some(format!("postgresql://{user}:{pass}@{host}:{port}/{db}"))
    }
}

impl AppConfig {
    /// Load configuration from `mlbpredicts.toml` (optional) and the
    /// environment, then apply the well-known direct env keys.
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name("mlbpredicts").required(false))
            .add_source(Environment::with_prefix("MLBPREDICTS").separator("__"))
            .build()?;
        let mut app: AppConfig = cfg.try_deserialize()?;

        if app.database.url.is_none() {
            app.database.url = resolve_database_url();
        }
        if app.apis.odds_api_key.is_none() {
            app.apis.odds_api_key = env_nonempty("ODDS_API_KEY");
        }
        if app.apis.weather_api_key.is_none() {
            app.apis.weather_api_key = env_nonempty("WEATHER_API_KEY");
        }
        if app.alerts.webhook_url.is_none() {
            app.alerts.webhook_url = env_nonempty("ALERT_WEBHOOK_URL");
        }
        if app.alerts.thresholds_json.is_none() {
            app.alerts.thresholds_json = env_nonempty("ALERT_THRESHOLDS_JSON");
        }
        if app.alerts.dashboard_url.is_none() {
            app.alerts.dashboard_url = env_nonempty("DASHBOARD_URL");
        }
        Ok(app)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.workers, 4);
        assert_eq!(pipeline.bulk_chunk_days, 60);
        assert_eq!(pipeline.closing_line_policy, ClosingLinePolicy::LatestPregame);

        let apis = ApiConfig::default();
        assert_eq!(apis.http_timeout_secs, 30);
        assert_eq!(apis.retry_attempts, 3);
    }
}
