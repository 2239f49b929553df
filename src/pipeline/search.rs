//! Web search capability and the Google Custom Search adapter.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{ConfigError, SearchError};
use crate::pipeline::types::SearchHit;

const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Custom Search returns at most 10 items per request.
pub const GOOGLE_MAX_RESULTS: usize = 10;

// ── Trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

// ── Retry ───────────────────────────────────────────────────────────

/// Exponential backoff for transient search failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubled after each failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run a search, retrying transient failures. Non-transient failures are
/// returned immediately.
pub async fn search_with_retry(
    searcher: &dyn WebSearcher,
    query: &str,
    limit: usize,
    policy: RetryPolicy,
) -> Result<Vec<SearchHit>, SearchError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match searcher.search(query, limit).await {
            Ok(hits) => return Ok(hits),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay_before(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient search failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Google Custom Search ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GoogleSearchConfig {
    pub api_key: SecretString,
    pub cx: String,
    pub timeout: Duration,
}

impl GoogleSearchConfig {
    /// Both `GOOGLE_API_KEY` and `GOOGLE_CX` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = required_env("GOOGLE_API_KEY", "Google Custom Search API key")?;
        let cx = required_env("GOOGLE_CX", "Custom Search engine id")?;
        Ok(Self {
            api_key: SecretString::from(api_key),
            cx,
            timeout: Duration::from_secs(30),
        })
    }
}

fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct GoogleSearcher {
    config: GoogleSearchConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleSearcher {
    pub fn new(config: GoogleSearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::Rejected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            endpoint: GOOGLE_CSE_URL.to_string(),
        })
    }

    /// Point the searcher at a different endpoint (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearcher for GoogleSearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let num = limit.clamp(1, GOOGLE_MAX_RESULTS).to_string();
        tracing::debug!(query, num = %num, "Google search");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.config.api_key.expose_secret()),
                ("cx", self.config.cx.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("start", "1"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SearchError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Rejected(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let data: CseResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let hits: Vec<SearchHit> = data
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .take(limit)
            .map(|item| SearchHit {
                url: item.link,
                title: item.title,
                snippet: item.snippet,
            })
            .collect();

        tracing::debug!(query, results = hits.len(), "Google search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails with the queued errors, then succeeds.
    struct FlakySearcher {
        errors: Mutex<Vec<SearchError>>,
        calls: AtomicU32,
    }

    impl FlakySearcher {
        fn new(mut errors: Vec<SearchError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl WebSearcher for FlakySearcher {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(vec![SearchHit {
                    url: "https://example.com".into(),
                    title: "t".into(),
                    snippet: "s".into(),
                }]),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let searcher = FlakySearcher::new(vec![
            SearchError::Transient("503".into()),
            SearchError::Transient("429".into()),
        ]);
        let started = tokio::time::Instant::now();
        let hits = search_with_retry(&searcher, "q", 5, RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 3);
        // 2 s + 4 s of backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_policy_attempts() {
        let searcher = FlakySearcher::new(vec![
            SearchError::Transient("a".into()),
            SearchError::Transient("b".into()),
            SearchError::Transient("c".into()),
            SearchError::Transient("d".into()),
        ]);
        let err = search_with_retry(&searcher, "q", 5, RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_is_not_retried() {
        let searcher = FlakySearcher::new(vec![SearchError::Rejected("403".into())]);
        let err = search_with_retry(&searcher, "q", 5, RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Rejected(_)));
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_before(1), Duration::from_secs(2));
        assert_eq!(p.delay_before(2), Duration::from_secs(4));
        assert_eq!(p.delay_before(3), Duration::from_secs(8));
    }

    #[test]
    fn cse_response_tolerates_missing_items() {
        let data: CseResponse = serde_json::from_str(r#"{"kind":"customsearch#search"}"#).unwrap();
        assert!(data.items.is_empty());

        let data: CseResponse = serde_json::from_str(
            r#"{"items":[{"link":"https://a.com","title":"A"},{"title":"no link"}]}"#,
        )
        .unwrap();
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.items[0].snippet, "");
    }

    #[test]
    fn config_requires_credentials() {
        // SAFETY: no other test touches these variables.
        unsafe {
            std::env::remove_var("GOOGLE_API_KEY");
            std::env::remove_var("GOOGLE_CX");
        }
        let err = GoogleSearchConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
