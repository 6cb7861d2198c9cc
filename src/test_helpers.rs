//! Shared test helpers: provider payload builders, a scripted generator and
//! ready-made clients pointed at a mock server.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{ProviderConfig, RateLimitConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::generation::{Generator, Prompt};
use crate::sports_data::{Endpoint, SportsDataClient};
use crate::types::{DatasetField, GameDataset, Subject, SubjectKind};

/// Wrap items in the provider envelope
pub(crate) fn envelope(items: Vec<Value>) -> Value {
    json!({
        "get": "test",
        "parameters": {},
        "errors": [],
        "results": items.len(),
        "paging": { "current": 1, "total": 1 },
        "response": items,
    })
}

pub(crate) fn fixture_item(id: u64, home_goals: u64, away_goals: u64) -> Value {
    json!({
        "fixture": {
            "id": id,
            "date": "2024-05-19T15:00:00+00:00",
            "venue": { "name": "Emirates Stadium", "city": "London" },
            "status": { "short": "FT" }
        },
        "league": {
            "id": 39,
            "name": "Premier League",
            "season": 2024,
            "round": "Regular Season - 38"
        },
        "teams": {
            "home": { "id": 42, "name": "Arsenal", "winner": home_goals > away_goals },
            "away": { "id": 49, "name": "Chelsea", "winner": away_goals > home_goals }
        },
        "goals": { "home": home_goals, "away": away_goals }
    })
}

pub(crate) fn statistics_items() -> Vec<Value> {
    vec![
        json!({
            "team": { "id": 42, "name": "Arsenal" },
            "statistics": [
                { "type": "Shots on Goal", "value": 7 },
                { "type": "Ball Possession", "value": "58%" }
            ]
        }),
        json!({
            "team": { "id": 49, "name": "Chelsea" },
            "statistics": [
                { "type": "Shots on Goal", "value": 3 },
                { "type": "Ball Possession", "value": "42%" }
            ]
        }),
    ]
}

pub(crate) fn standings_item() -> Value {
    json!({
        "league": {
            "id": 39,
            "season": 2024,
            "standings": [[
                { "rank": 2, "team": { "id": 42, "name": "Arsenal" }, "points": 89 },
                { "rank": 6, "team": { "id": 49, "name": "Chelsea" }, "points": 63 }
            ]]
        }
    })
}

pub(crate) fn player_item(id: u64, name: &str, team_id: u64) -> Value {
    json!({
        "player": { "id": id, "name": name, "age": 25 },
        "statistics": [{
            "team": { "id": team_id },
            "league": { "id": 39, "season": 2024 },
            "goals": { "total": 16 }
        }]
    })
}

pub(crate) fn team_item(id: u64, name: &str) -> Value {
    json!({
        "team": { "id": id, "name": name, "founded": 1886 },
        "venue": { "name": "Emirates Stadium", "capacity": 60704 }
    })
}

/// Retry policy with short fixed delays
pub(crate) fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

pub(crate) fn generous_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        capacity: 100,
        refill_per_second: 100.0,
        max_wait: Duration::from_secs(5),
    }
}

/// Client pointed at a mock server
pub(crate) fn test_client(base_url: &str) -> SportsDataClient {
    let provider = ProviderConfig {
        api_key: Some("test-key".to_string()),
        base_url: base_url.to_string(),
        ..ProviderConfig::default()
    };
    SportsDataClient::new(&provider, &generous_rate_limit(), &fast_retry(2)).unwrap()
}

/// Dataset for fixture 123 (Arsenal 2-1 Chelsea) with fixture, statistics and standings
pub(crate) fn sample_dataset() -> GameDataset {
    let subject = Subject::parse("fixture-123", SubjectKind::Game).unwrap();
    let mut builder = GameDataset::builder(subject);
    builder
        .collected(
            DatasetField::Fixture,
            Endpoint::Fixtures,
            fixture_item(123, 2, 1),
        )
        .collected(
            DatasetField::Statistics,
            Endpoint::MatchStatistics,
            Value::Array(statistics_items()),
        )
        .collected(
            DatasetField::Standings,
            Endpoint::Standings,
            standings_item(),
        );
    builder.build()
}

/// Generator that replays scripted replies and records prompts
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Replies in order; after they run out every call fails
    pub(crate) fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Same reply forever
    pub(crate) fn always(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::new(vec![])
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(Error::GenerationFailed("script exhausted".to_string())),
            },
        }
    }
}
