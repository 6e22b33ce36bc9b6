//! Upstream adapters. Each fetcher is a function of inputs to normalized
//! records; retries and skips are local. A fetch that ultimately fails
//! surfaces as a null record plus a risk flag at the caller, never a crash.

pub mod boxscore;
pub mod lineups;
pub mod odds_api;
pub mod schedule;
pub mod statcast;
pub mod weather;

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::{MlbError, Result};

/// Shared HTTP client with the per-call timeout from config.
pub fn http_client(cfg: &ApiConfig) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("mlbpredicts/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .map_err(|e| MlbError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Run an upstream call with bounded retries and exponential backoff.
/// Exhaustion yields `TransientFetch`; the caller decides whether that
/// becomes a risk flag or a stage failure.
pub async fn with_retries<T, F, Fut>(attempts: u32, label: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = Duration::from_millis(500);
    let mut last_err: Option<MlbError> = None;

    for attempt in 1..=attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < attempts {
                    warn!(label, attempt, error = %err, "fetch attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_err = Some(err);
            }
        }
    }
    Err(MlbError::TransientFetch(format!(
        "{label}: {}",
        last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown".into())
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retries_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MlbError::Internal("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_exhaustion_is_transient() {
        let result: Result<()> = with_retries(1, "test", || async {
            Err(MlbError::Internal("down".into()))
        })
        .await;
        assert!(matches!(result, Err(MlbError::TransientFetch(_))));
    }
}
