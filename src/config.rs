//! Configuration types for pressbox

use crate::error::{Error, Result};
use crate::types::{DatasetField, SubjectKind};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

/// Sports data provider connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key sent as `X-RapidAPI-Key` (usually supplied via `RAPIDAPI_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the provider API (default: API-Football v3 on RapidAPI)
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Value of the `X-RapidAPI-Host` header
    #[serde(default = "default_provider_host")]
    pub host: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_base_url(),
            host: default_provider_host(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Token bucket sizing for provider calls
///
/// The bucket starts full; `capacity` calls may burst, after which calls are
/// admitted at `refill_per_second`. A call that cannot get a token within
/// `max_wait` fails with [`Error::RateLimitExceeded`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size (default: 10)
    #[serde(default = "default_bucket_capacity")]
    pub capacity: u32,

    /// Tokens added per second (default: 0.5, i.e. 30 requests per minute)
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Longest a caller will wait for a token (default: 60 seconds)
    #[serde(default = "default_max_wait", with = "duration_ms_serde")]
    pub max_wait: Duration,
}

impl RateLimitConfig {
    /// Check bucket size and refill rate
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::config(
                "rate_limit.capacity",
                "bucket capacity must be at least 1",
            ));
        }
        let refill = self.refill_per_second;
        if !refill.is_finite() || refill <= 0.0 {
            return Err(Error::config(
                "rate_limit.refill_per_second",
                "refill rate must be a positive finite number",
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_bucket_capacity(),
            refill_per_second: default_refill_per_second(),
            max_wait: default_max_wait(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 2, i.e. 3 attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry (default: 500ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Total number of attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Check the backoff schedule; `key` prefixes the offending setting
    pub fn validate(&self, key: &str) -> Result<()> {
        let multiplier = self.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                &format!("{key}.backoff_multiplier"),
                "backoff multiplier must be a finite number of at least 1.0",
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::config(
                &format!("{key}.initial_delay"),
                "initial retry delay must be positive",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                &format!("{key}.max_delay"),
                "max retry delay must not be below the initial delay",
            ));
        }
        Ok(())
    }
}

/// Orchestrator settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of jobs running at once (default: 4)
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Per-stage retry policy (default: 2 retries, exponential backoff)
    #[serde(default)]
    pub stage_retry: RetryConfig,

    /// Upper bound on a single stage invocation (default: 300 seconds)
    #[serde(default = "default_stage_timeout", with = "duration_serde")]
    pub stage_timeout: Duration,

    /// Capacity of the lifecycle event broadcast channel (default: 1024)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            stage_retry: RetryConfig::default(),
            stage_timeout: default_stage_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Data collection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Fields whose absence aborts collection, per subject kind
    #[serde(default = "default_essential_fields")]
    pub essential_fields: HashMap<SubjectKind, Vec<DatasetField>>,

    /// Season used for team and player lookups (default: 2024)
    #[serde(default = "default_season")]
    pub default_season: u32,

    /// League name (see [`crate::leagues`]) used for team standings (default: premier_league)
    #[serde(default = "default_league")]
    pub default_league: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            essential_fields: default_essential_fields(),
            default_season: default_season(),
            default_league: default_league(),
        }
    }
}

impl CollectionConfig {
    /// Whether `field` is essential when collecting a subject of `kind`
    pub fn is_essential(&self, kind: SubjectKind, field: DatasetField) -> bool {
        self.essential_fields
            .get(&kind)
            .is_some_and(|fields| fields.contains(&field))
    }
}

/// Research settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Topics looked up for every dataset
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// How long a successful lookup stays cached (default: 1 hour)
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub cache_ttl: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

/// Drafting settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WritingConfig {
    /// Target article length in words (default: 600)
    #[serde(default = "default_target_length")]
    pub target_length: usize,
}

impl Default for WritingConfig {
    fn default() -> Self {
        Self {
            target_length: default_target_length(),
        }
    }
}

/// Editing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditingConfig {
    /// Phrases the style check flags (matched case-insensitively)
    #[serde(default = "default_banned_phrases")]
    pub banned_phrases: Vec<String>,

    /// Sentences longer than this many words are flagged (default: 35)
    #[serde(default = "default_max_sentence_words")]
    pub max_sentence_words: usize,
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            banned_phrases: default_banned_phrases(),
            max_sentence_words: default_max_sentence_words(),
        }
    }
}

/// Generation provider settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API key (usually supplied via `ANTHROPIC_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Messages API
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Maximum tokens per completion (default: 4096)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout (default: 120 seconds)
    #[serde(default = "default_generation_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_generation_base_url(),
            max_tokens: default_max_tokens(),
            timeout: default_generation_timeout(),
        }
    }
}

/// Notification configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    /// Triggered when a job reaches `Done`
    OnComplete,
    /// Triggered when a job reaches `Failed`
    OnFailed,
}

/// Logging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (default: "pressbox=info"); `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Main configuration for the pressbox pipeline
///
/// Fields are organized into sub-configs, one per component. Every field has a
/// default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sports data provider connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Provider rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Transport-level retries for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Data collection settings
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Research settings
    #[serde(default)]
    pub research: ResearchConfig,

    /// Drafting settings
    #[serde(default)]
    pub writing: WritingConfig,

    /// Editing settings
    #[serde(default)]
    pub editing: EditingConfig,

    /// Generation provider
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Extra league-name to provider-id mappings
    #[serde(default)]
    pub leagues: HashMap<String, u32>,

    /// Webhook notifications
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides
    ///
    /// Recognized variables: `RAPIDAPI_KEY`, `ANTHROPIC_API_KEY`,
    /// `PRESSBOX_POOL_SIZE`, `PRESSBOX_RATE_LIMIT_CAPACITY`,
    /// `PRESSBOX_CACHE_TTL_SECS`, `PRESSBOX_LOG`.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var("RAPIDAPI_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(size) = parse_env::<usize>("PRESSBOX_POOL_SIZE")? {
            self.pipeline.worker_pool_size = size;
        }
        if let Some(capacity) = parse_env::<u32>("PRESSBOX_RATE_LIMIT_CAPACITY")? {
            self.rate_limit.capacity = capacity;
        }
        if let Some(secs) = parse_env::<u64>("PRESSBOX_CACHE_TTL_SECS")? {
            self.research.cache_ttl = Duration::from_secs(secs);
        }
        if let Ok(filter) = std::env::var("PRESSBOX_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.worker_pool_size == 0 {
            return Err(Error::config(
                "pipeline.worker_pool_size",
                "worker pool must allow at least one job",
            ));
        }
        self.rate_limit.validate()?;
        self.retry.validate("retry")?;
        self.pipeline.stage_retry.validate("pipeline.stage_retry")?;
        if self.pipeline.stage_timeout.is_zero() {
            return Err(Error::config(
                "pipeline.stage_timeout",
                "stage timeout must be positive",
            ));
        }
        if self.research.topics.is_empty() {
            return Err(Error::config(
                "research.topics",
                "at least one research topic is required",
            ));
        }
        if self.writing.target_length == 0 {
            return Err(Error::config(
                "writing.target_length",
                "target length must be positive",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(name, format!("cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}

fn default_provider_base_url() -> String {
    "https://api-football-v1.p.rapidapi.com/v3".to_string()
}

fn default_provider_host() -> String {
    "api-football-v1.p.rapidapi.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bucket_capacity() -> u32 {
    10
}

fn default_refill_per_second() -> f64 {
    0.5
}

fn default_max_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_stage_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_event_capacity() -> usize {
    1024
}

fn default_essential_fields() -> HashMap<SubjectKind, Vec<DatasetField>> {
    HashMap::from([
        (SubjectKind::Game, vec![DatasetField::Fixture]),
        (SubjectKind::Team, vec![DatasetField::TeamProfile]),
        (SubjectKind::Player, vec![DatasetField::PlayerProfile]),
    ])
}

fn default_season() -> u32 {
    2024
}

fn default_league() -> String {
    "premier_league".to_string()
}

fn default_topics() -> Vec<String> {
    vec![
        "team_history".to_string(),
        "head_to_head".to_string(),
        "recent_form".to_string(),
    ]
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_target_length() -> usize {
    600
}

fn default_banned_phrases() -> Vec<String> {
    [
        "at the end of the day",
        "game changer",
        "110 percent",
        "it is what it is",
        "back to the drawing board",
        "one game at a time",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_sentence_words() -> usize {
    35
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_generation_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_filter() -> String {
    "pressbox=info".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper (retry delays, rate limiter waits)
pub(crate) mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
