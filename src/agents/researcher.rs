//! Contextual research with a shared, single-flight TTL cache.
//!
//! The cache is keyed by (subject id, topic). Concurrent jobs asking for the
//! same key share one upstream lookup; a successful result is served until its
//! time-to-live runs out. Failed lookups are not cached and never fail the
//! research stage: the topic is simply left out of the notes.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::ResearchStage;
use crate::config::ResearchConfig;
use crate::error::Result;
use crate::generation::{Generator, Prompt};
use crate::types::{GameDataset, ResearchEntry, ResearchNotes};

/// Where research material comes from
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Look up `topic` for the dataset's subject; `Ok(None)` when nothing is known
    async fn lookup(&self, dataset: &GameDataset, topic: &str) -> Result<Option<ResearchEntry>>;
}

/// [`KnowledgeSource`] that asks the generation capability for background
#[derive(Clone)]
pub struct GenerativeKnowledge {
    generator: Arc<dyn Generator>,
}

impl GenerativeKnowledge {
    /// Research through `generator`
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

fn topic_brief(topic: &str) -> String {
    match topic {
        "team_history" => "the history and recent seasons of the clubs involved".to_string(),
        "head_to_head" => "recent meetings between these sides".to_string(),
        "recent_form" => "the form of the teams or player going into this fixture".to_string(),
        other => other.replace('_', " "),
    }
}

#[async_trait]
impl KnowledgeSource for GenerativeKnowledge {
    async fn lookup(&self, dataset: &GameDataset, topic: &str) -> Result<Option<ResearchEntry>> {
        let prompt = Prompt {
            system: "You are a football research assistant. Answer in at most three \
                     factual sentences. Reply with UNKNOWN if you are not sure."
                .to_string(),
            user: format!(
                "Subject: {}\nTopic: {}\nSummarize {}.",
                dataset.headline(),
                topic,
                topic_brief(topic)
            ),
        };

        let text = self.generator.generate(&prompt).await?;
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("unknown") {
            return Ok(None);
        }

        Ok(Some(ResearchEntry {
            text: text.to_string(),
            confidence: 0.5,
            source: "generated".to_string(),
        }))
    }
}

#[derive(Debug)]
struct Cached {
    stored_at: Instant,
    entry: Option<ResearchEntry>,
}

#[derive(Debug, Default)]
struct Slot {
    cell: OnceCell<Cached>,
}

impl Slot {
    fn expired(&self, ttl: Duration) -> bool {
        self.cell
            .get()
            .is_some_and(|cached| cached.stored_at.elapsed() >= ttl)
    }
}

type CacheKey = (String, String);

/// Shared research cache
#[derive(Debug)]
pub struct ResearchCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
    hits: AtomicU64,
    lookups: AtomicU64,
}

impl ResearchCache {
    /// Empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        }
    }

    /// Requests answered from a stored result
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Upstream lookups started
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Keys currently held, live or not yet swept
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Whether the cache holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Slot for `key`, replacing it when its value has expired
    ///
    /// Adding a new key first sweeps expired slots and abandoned empty ones
    /// (a failed lookup nobody is waiting on), so the map only holds live keys.
    fn slot(&self, key: CacheKey) -> Arc<Slot> {
        let mut slots = self.lock_slots();
        if !slots.contains_key(&key) {
            let before = slots.len();
            slots.retain(|_, slot| {
                let abandoned = slot.cell.get().is_none() && Arc::strong_count(slot) == 1;
                !(abandoned || slot.expired(self.ttl))
            });
            if slots.len() < before {
                tracing::debug!(evicted = before - slots.len(), "research cache swept");
            }
        }

        let slot = slots.entry(key).or_default();
        if slot.expired(self.ttl) {
            *slot = Arc::new(Slot::default());
        }
        Arc::clone(slot)
    }

    /// Cached value for (subject, topic), running `lookup` at most once per
    /// live entry across all concurrent callers
    pub async fn get_or_lookup<F, Fut>(
        &self,
        subject: &str,
        topic: &str,
        lookup: F,
    ) -> Result<Option<ResearchEntry>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<ResearchEntry>>>,
    {
        let slot = self.slot((subject.to_string(), topic.to_string()));
        if let Some(cached) = slot.cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.entry.clone());
        }

        let cached = slot
            .cell
            .get_or_try_init(|| async {
                self.lookups.fetch_add(1, Ordering::Relaxed);
                let entry = lookup().await?;
                Ok::<_, crate::error::Error>(Cached {
                    stored_at: Instant::now(),
                    entry,
                })
            })
            .await?;
        Ok(cached.entry.clone())
    }
}

/// Research stage
#[derive(Clone)]
pub struct Researcher {
    source: Arc<dyn KnowledgeSource>,
    cache: Arc<ResearchCache>,
    topics: Vec<String>,
}

impl Researcher {
    /// Research `config.topics` from `source`, sharing `cache` with other researchers
    pub fn new(
        source: Arc<dyn KnowledgeSource>,
        cache: Arc<ResearchCache>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            source,
            cache,
            topics: config.topics.clone(),
        }
    }

    /// The shared cache
    pub fn cache(&self) -> &Arc<ResearchCache> {
        &self.cache
    }
}

#[async_trait]
impl ResearchStage for Researcher {
    async fn enrich(&self, dataset: &GameDataset) -> Result<ResearchNotes> {
        let subject = &dataset.subject().id;
        let lookups = self.topics.iter().map(|topic| async move {
            let result = self
                .cache
                .get_or_lookup(subject, topic, || self.source.lookup(dataset, topic))
                .await;
            (topic, result)
        });

        let mut notes = ResearchNotes::default();
        for (topic, result) in join_all(lookups).await {
            match result {
                Ok(Some(entry)) => notes.insert(topic.clone(), entry),
                Ok(None) => tracing::debug!(%subject, %topic, "nothing found for topic"),
                Err(e) => tracing::warn!(%subject, %topic, error = %e, "research lookup failed"),
            }
        }

        tracing::info!(%subject, topics = notes.len(), "research complete");
        Ok(notes)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_helpers::{ScriptedGenerator, sample_dataset};
    use std::sync::atomic::AtomicUsize;

    /// Slow source that counts lookups and knows nothing about "rivalries"
    struct CountingSource {
        calls: AtomicUsize,
        fail_topic: Option<&'static str>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_topic: None,
            }
        }
    }

    #[async_trait]
    impl KnowledgeSource for CountingSource {
        async fn lookup(
            &self,
            _dataset: &GameDataset,
            topic: &str,
        ) -> Result<Option<ResearchEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            if Some(topic) == self.fail_topic {
                return Err(Error::GenerationFailed("source down".to_string()));
            }
            if topic == "rivalries" {
                return Ok(None);
            }
            Ok(Some(ResearchEntry {
                text: format!("notes on {topic}"),
                confidence: 0.9,
                source: "archive".to_string(),
            }))
        }
    }

    fn config(topics: &[&str]) -> ResearchConfig {
        ResearchConfig {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            ..ResearchConfig::default()
        }
    }

    #[tokio::test]
    async fn concurrent_enrich_shares_one_lookup_per_topic() {
        let source = Arc::new(CountingSource::new());
        let cache = Arc::new(ResearchCache::new(Duration::from_secs(60)));
        let researcher = Researcher::new(source.clone(), cache.clone(), &config(&["head_to_head"]));
        let dataset = sample_dataset();

        let (a, b) = tokio::join!(researcher.enrich(&dataset), researcher.enrich(&dataset));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lookups(), 1);
        assert_eq!(a, b);
        assert_eq!(a.get("head_to_head").unwrap().text, "notes on head_to_head");
    }

    #[tokio::test]
    async fn missing_and_failed_topics_are_absent() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_topic: Some("recent_form"),
        });
        let researcher = Researcher::new(
            source,
            Arc::new(ResearchCache::new(Duration::from_secs(60))),
            &config(&["team_history", "rivalries", "recent_form"]),
        );

        let notes = researcher.enrich(&sample_dataset()).await.unwrap();

        assert_eq!(notes.len(), 1);
        assert!(notes.get("team_history").is_some());
        assert!(notes.get("rivalries").is_none());
        assert!(notes.get("recent_form").is_none());
    }

    #[tokio::test]
    async fn failed_lookups_are_not_cached() {
        let cache = ResearchCache::new(Duration::from_secs(60));
        let first = cache
            .get_or_lookup("fixture-1", "team_history", || async {
                Err(Error::GenerationFailed("down".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_lookup("fixture-1", "team_history", || async {
                Ok(Some(ResearchEntry {
                    text: "founded 1886".to_string(),
                    confidence: 1.0,
                    source: "archive".to_string(),
                }))
            })
            .await
            .unwrap();
        assert_eq!(second.unwrap().text, "founded 1886");
        assert_eq!(cache.lookups(), 2);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let source = Arc::new(CountingSource::new());
        let researcher = Researcher::new(
            source.clone(),
            Arc::new(ResearchCache::new(Duration::from_millis(50))),
            &config(&["team_history"]),
        );
        let dataset = sample_dataset();

        researcher.enrich(&dataset).await.unwrap();
        researcher.enrich(&dataset).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(researcher.cache().hits(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        researcher.enrich(&dataset).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_when_new_keys_arrive() {
        let cache = ResearchCache::new(Duration::from_millis(30));
        for subject in ["fixture-1", "fixture-2", "fixture-3"] {
            cache
                .get_or_lookup(subject, "team_history", || async { Ok(None) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache
            .get_or_lookup("fixture-4", "team_history", || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_lookup_slots_do_not_linger() {
        let cache = ResearchCache::new(Duration::from_secs(60));
        let failed = cache
            .get_or_lookup("fixture-1", "team_history", || async {
                Err(Error::GenerationFailed("down".to_string()))
            })
            .await;
        assert!(failed.is_err());

        cache
            .get_or_lookup("fixture-2", "team_history", || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn generative_source_treats_unknown_as_absent() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("UNKNOWN".to_string()),
            Ok("Arsenal and Chelsea have met 200 times.".to_string()),
        ]));
        let source = GenerativeKnowledge::new(generator.clone());
        let dataset = sample_dataset();

        assert!(source.lookup(&dataset, "team_history").await.unwrap().is_none());
        let entry = source.lookup(&dataset, "head_to_head").await.unwrap().unwrap();
        assert_eq!(entry.source, "generated");

        let prompts = generator.prompts();
        assert!(prompts[1].user.contains("Arsenal vs Chelsea"));
        assert!(prompts[1].user.contains("recent meetings"));
    }
}
