//! Resilient client for the third-party sports data provider (API-Football).
//!
//! - [`SportsDataClient`] owns the HTTP connection pool, the shared rate
//!   limiter and the retry policy. It is cheap to clone and shared by all jobs.
//! - [`Session`] brackets one logical unit of work. Every provider call goes
//!   through a session; dropping it releases the session on every exit path.
//! - [`endpoint`] holds the per-endpoint parameter and payload contracts.

mod endpoint;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use endpoint::{Endpoint, QueryParams, params};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::config::{Config, ProviderConfig, RateLimitConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::{IsRetryable, with_retry};

/// Longest body excerpt carried in a [`Error::ClientRequestError`]
const MAX_ERROR_BODY: usize = 200;

/// Validated provider payload
#[derive(Clone, Debug)]
pub struct RawResponse {
    /// Endpoint that produced the payload
    pub endpoint: Endpoint,
    /// Parameters the request was made with
    pub params: QueryParams,
    /// Items of the provider's `response` array
    pub items: Vec<Value>,
    /// Attempts it took, including the successful one
    pub attempts: u32,
    /// When the payload arrived
    pub fetched_at: DateTime<Utc>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    host: String,
    limiter: RateLimiter,
    retry: RetryConfig,
    open_sessions: AtomicUsize,
    next_session: AtomicU64,
    requests_sent: AtomicU64,
}

/// Shared sports data client (cloneable - all state is Arc-wrapped)
#[derive(Clone)]
pub struct SportsDataClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for SportsDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportsDataClient")
            .field("base_url", &self.inner.base_url)
            .field("open_sessions", &self.open_sessions())
            .finish_non_exhaustive()
    }
}

impl SportsDataClient {
    /// Build a client from the full configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.provider, &config.rate_limit, &config.retry)
    }

    /// Build a client from its component settings
    ///
    /// Fails with a configuration error when no API key is configured.
    pub fn new(
        provider: &ProviderConfig,
        rate_limit: &RateLimitConfig,
        retry: &RetryConfig,
    ) -> Result<Self> {
        let api_key = provider
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::config("provider.api_key", "no sports data API key configured")
            })?;

        rate_limit.validate()?;
        retry.validate("retry")?;

        let http = reqwest::Client::builder()
            .timeout(provider.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: provider.base_url.trim_end_matches('/').to_string(),
                api_key,
                host: provider.host.clone(),
                limiter: RateLimiter::new(rate_limit),
                retry: retry.clone(),
                open_sessions: AtomicUsize::new(0),
                next_session: AtomicU64::new(1),
                requests_sent: AtomicU64::new(0),
            }),
        })
    }

    /// Open a session for one unit of work
    pub fn session(&self) -> Session {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let open = self.inner.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(session = id, open_sessions = open, "provider session opened");
        Session {
            client: self.clone(),
            id,
        }
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// HTTP requests sent since the client was built (retries included)
    pub fn requests_sent(&self) -> u64 {
        self.inner.requests_sent.load(Ordering::Relaxed)
    }

    /// One rate-limited HTTP round trip, classified for the retry loop
    async fn attempt(&self, endpoint: Endpoint, params: &QueryParams) -> Result<Vec<Value>> {
        self.inner.limiter.acquire().await?;

        let url = format!("{}/{}", self.inner.base_url, endpoint.path());
        self.inner.requests_sent.fetch_add(1, Ordering::Relaxed);

        let response = self
            .inner
            .http
            .get(&url)
            .header("X-RapidAPI-Key", &self.inner.api_key)
            .header("X-RapidAPI-Host", &self.inner.host)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::UpstreamStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ClientRequestError {
                endpoint,
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let body = response.text().await?;
        let json: Value = serde_json::from_str(&body).map_err(|e| Error::MalformedResponse {
            endpoint,
            reason: format!("invalid JSON: {e}"),
        })?;
        endpoint.validate_response(&json)
    }
}

/// Scoped provider session
///
/// Obtained from [`SportsDataClient::session`]; released when dropped.
pub struct Session {
    client: SportsDataClient,
    id: u64,
}

impl Drop for Session {
    fn drop(&mut self) {
        let open = self.client.inner.open_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(session = self.id, open_sessions = open, "provider session released");
    }
}

impl Session {
    /// Session identifier, for log correlation
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fetch and validate one endpoint
    ///
    /// Parameter violations fail before anything is sent. 4xx answers fail
    /// immediately with [`Error::ClientRequestError`]; 5xx and transport errors
    /// are retried with backoff and end in [`Error::UpstreamUnavailable`] once
    /// the retry budget is spent. Payloads missing required fields fail with
    /// [`Error::MalformedResponse`].
    pub async fn fetch(&self, endpoint: Endpoint, params: QueryParams) -> Result<RawResponse> {
        endpoint.validate_params(&params)?;

        let attempts = AtomicU32::new(0);
        let result = with_retry(&self.client.inner.retry, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(session = self.id, endpoint = %endpoint, attempt, "provider request");
            self.client.attempt(endpoint, &params)
        })
        .await;
        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(items) => Ok(RawResponse {
                endpoint,
                params,
                items,
                attempts,
                fetched_at: Utc::now(),
            }),
            Err(e) if e.is_retryable() => Err(Error::UpstreamUnavailable {
                endpoint,
                attempts,
                last_error: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Fixtures filtered by league, season and/or date (YYYY-MM-DD)
    pub async fn get_fixtures(
        &self,
        league: Option<u32>,
        season: Option<u32>,
        date: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query = QueryParams::new();
        if let Some(league) = league {
            query.insert("league".into(), league.to_string());
        }
        if let Some(season) = season {
            query.insert("season".into(), season.to_string());
        }
        if let Some(date) = date {
            query.insert("date".into(), date.to_string());
        }
        Ok(self.fetch(Endpoint::Fixtures, query).await?.items)
    }

    /// A single fixture by id
    pub async fn get_fixture(&self, fixture_id: u64) -> Result<Option<Value>> {
        let response = self
            .fetch(Endpoint::Fixtures, params([("id", fixture_id)]))
            .await?;
        Ok(response.items.into_iter().next())
    }

    /// A club's fixtures for a season
    pub async fn get_team_fixtures(&self, team_id: u64, season: u32) -> Result<Vec<Value>> {
        let query = params([("team", team_id), ("season", u64::from(season))]);
        Ok(self.fetch(Endpoint::Fixtures, query).await?.items)
    }

    /// Teams in a league for a season
    pub async fn get_teams(&self, league: u32, season: u32) -> Result<Vec<Value>> {
        let query = params([("league", league), ("season", season)]);
        Ok(self.fetch(Endpoint::Teams, query).await?.items)
    }

    /// A single club by id
    pub async fn get_team(&self, team_id: u64) -> Result<Option<Value>> {
        let response = self
            .fetch(Endpoint::Teams, params([("id", team_id)]))
            .await?;
        Ok(response.items.into_iter().next())
    }

    /// League table for a season
    pub async fn get_league_standings(&self, league: u32, season: u32) -> Result<Option<Value>> {
        let query = params([("league", league), ("season", season)]);
        let response = self.fetch(Endpoint::Standings, query).await?;
        Ok(response.items.into_iter().next())
    }

    /// Per-team statistics for a fixture
    pub async fn get_match_statistics(&self, fixture_id: u64) -> Result<Vec<Value>> {
        let response = self
            .fetch(Endpoint::MatchStatistics, params([("fixture", fixture_id)]))
            .await?;
        Ok(response.items)
    }

    /// A club's players for a season
    pub async fn get_players(&self, team_id: u64, season: u32) -> Result<Vec<Value>> {
        let query = params([("team", team_id), ("season", u64::from(season))]);
        Ok(self.fetch(Endpoint::Players, query).await?.items)
    }

    /// A single player's profile and season statistics
    pub async fn get_player(&self, player_id: u64, season: u32) -> Result<Option<Value>> {
        let query = params([("id", player_id), ("season", u64::from(season))]);
        let response = self.fetch(Endpoint::Players, query).await?;
        Ok(response.items.into_iter().next())
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
