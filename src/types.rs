//! Core types for pressbox

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};
use crate::sports_data::Endpoint;

/// Unique identifier for a pipeline job
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a pipeline job writes about
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// A single fixture
    Game,
    /// A club
    Team,
    /// An individual player
    Player,
}

impl SubjectKind {
    /// Identifier prefixes accepted for this kind
    pub fn prefixes(self) -> &'static [&'static str] {
        match self {
            SubjectKind::Game => &["fixture", "game"],
            SubjectKind::Team => &["team"],
            SubjectKind::Player => &["player"],
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SubjectKind::Game => "game",
            SubjectKind::Team => "team",
            SubjectKind::Player => "player",
        })
    }
}

/// A game, team or player identified for collection
///
/// `id` is the identifier as supplied (e.g. `"fixture-123"`), `provider_id`
/// the numeric id the sports data provider understands.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier as supplied by the caller
    pub id: String,
    /// Kind of subject
    pub kind: SubjectKind,
    /// Numeric provider identifier
    pub provider_id: u64,
}

impl Subject {
    /// Parse a subject identifier such as `"fixture-123"`, `"team-33"` or `"276"`
    ///
    /// A prefix that belongs to another kind (e.g. `"team-33"` as a game) is rejected.
    pub fn parse(id: &str, kind: SubjectKind) -> Result<Self> {
        let trimmed = id.trim();
        let numeric = match trimmed.rsplit_once('-') {
            Some((prefix, n)) if kind.prefixes().contains(&prefix) => n,
            Some(_) => return Err(Error::InvalidSubject(id.to_string())),
            None => trimmed,
        };
        let provider_id = numeric
            .parse::<u64>()
            .map_err(|_| Error::InvalidSubject(id.to_string()))?;

        Ok(Self {
            id: trimmed.to_string(),
            kind,
            provider_id,
        })
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Named slot in a [`GameDataset`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetField {
    /// Fixture record (teams, score, venue, league, season)
    Fixture,
    /// Per-team match statistics
    Statistics,
    /// League table
    Standings,
    /// Home side squad
    HomeRoster,
    /// Away side squad
    AwayRoster,
    /// Club profile
    TeamProfile,
    /// Club's fixtures for the season
    TeamFixtures,
    /// Club squad
    Roster,
    /// Player profile with season statistics
    PlayerProfile,
}

impl std::fmt::Display for DatasetField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DatasetField::Fixture => "fixture",
            DatasetField::Statistics => "statistics",
            DatasetField::Standings => "standings",
            DatasetField::HomeRoster => "home_roster",
            DatasetField::AwayRoster => "away_roster",
            DatasetField::TeamProfile => "team_profile",
            DatasetField::TeamFixtures => "team_fixtures",
            DatasetField::Roster => "roster",
            DatasetField::PlayerProfile => "player_profile",
        })
    }
}

/// Where a dataset field came from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Provenance {
    /// Fetched successfully
    Collected {
        /// Endpoint that produced the field
        endpoint: Endpoint,
    },
    /// Optional field whose source call failed
    Unavailable {
        /// Endpoint that was attempted
        endpoint: Endpoint,
        /// Why the call failed
        reason: String,
    },
}

impl Provenance {
    /// Whether the field was collected
    pub fn is_collected(&self) -> bool {
        matches!(self, Provenance::Collected { .. })
    }
}

/// Normalized bundle of provider data for one subject
///
/// Built once by the collector through [`DatasetBuilder`] and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameDataset {
    subject: Subject,
    fields: BTreeMap<DatasetField, serde_json::Value>,
    provenance: BTreeMap<DatasetField, Provenance>,
    collected_at: DateTime<Utc>,
}

impl GameDataset {
    /// Start building a dataset for `subject`
    pub fn builder(subject: Subject) -> DatasetBuilder {
        DatasetBuilder {
            subject,
            fields: BTreeMap::new(),
            provenance: BTreeMap::new(),
        }
    }

    /// Subject this dataset describes
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Collected value for `field`
    pub fn field(&self, field: DatasetField) -> Option<&serde_json::Value> {
        self.fields.get(&field)
    }

    /// All collected fields in stable order
    pub fn fields(&self) -> &BTreeMap<DatasetField, serde_json::Value> {
        &self.fields
    }

    /// Provenance of `field`, if collection attempted it
    pub fn provenance(&self, field: DatasetField) -> Option<&Provenance> {
        self.provenance.get(&field)
    }

    /// Provenance of every attempted field
    pub fn provenance_map(&self) -> &BTreeMap<DatasetField, Provenance> {
        &self.provenance
    }

    /// When collection completed
    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    /// Short human-readable label, e.g. "Arsenal vs Chelsea"
    pub fn headline(&self) -> String {
        if let Some(fixture) = self.field(DatasetField::Fixture) {
            let home = fixture.pointer("/teams/home/name").and_then(|v| v.as_str());
            let away = fixture.pointer("/teams/away/name").and_then(|v| v.as_str());
            if let (Some(home), Some(away)) = (home, away) {
                return format!("{home} vs {away}");
            }
        }
        if let Some(name) = self
            .field(DatasetField::TeamProfile)
            .and_then(|v| v.pointer("/team/name"))
            .and_then(|v| v.as_str())
        {
            return name.to_string();
        }
        if let Some(name) = self
            .field(DatasetField::PlayerProfile)
            .and_then(|v| v.pointer("/player/name"))
            .and_then(|v| v.as_str())
        {
            return name.to_string();
        }
        self.subject.to_string()
    }

    /// Final score as (home, away) when the fixture records one
    pub fn final_score(&self) -> Option<(u64, u64)> {
        let fixture = self.field(DatasetField::Fixture)?;
        let home = fixture.pointer("/goals/home")?.as_u64()?;
        let away = fixture.pointer("/goals/away")?.as_u64()?;
        Some((home, away))
    }
}

/// Accumulates fields while collection is in progress
#[derive(Debug)]
pub struct DatasetBuilder {
    subject: Subject,
    fields: BTreeMap<DatasetField, serde_json::Value>,
    provenance: BTreeMap<DatasetField, Provenance>,
}

impl DatasetBuilder {
    /// Record a successfully collected field
    pub fn collected(
        &mut self,
        field: DatasetField,
        endpoint: Endpoint,
        value: serde_json::Value,
    ) -> &mut Self {
        self.fields.insert(field, value);
        self.provenance
            .insert(field, Provenance::Collected { endpoint });
        self
    }

    /// Record an optional field whose source call failed
    pub fn unavailable(
        &mut self,
        field: DatasetField,
        endpoint: Endpoint,
        reason: impl Into<String>,
    ) -> &mut Self {
        self.fields.remove(&field);
        self.provenance.insert(
            field,
            Provenance::Unavailable {
                endpoint,
                reason: reason.into(),
            },
        );
        self
    }

    /// Freeze the dataset, stamping the collection time
    pub fn build(self) -> GameDataset {
        GameDataset {
            subject: self.subject,
            fields: self.fields,
            provenance: self.provenance,
            collected_at: Utc::now(),
        }
    }
}

/// One researched topic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchEntry {
    /// Narrative text
    pub text: String,
    /// Confidence in the material, 0.0 to 1.0
    pub confidence: f32,
    /// Where the material came from
    pub source: String,
}

/// Contextual material gathered for a dataset, keyed by topic
///
/// Topics that could not be researched are simply absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchNotes {
    /// Entries by topic name (e.g. "team_history", "head_to_head")
    pub entries: BTreeMap<String, ResearchEntry>,
}

impl ResearchNotes {
    /// Add or replace a topic
    pub fn insert(&mut self, topic: impl Into<String>, entry: ResearchEntry) {
        self.entries.insert(topic.into(), entry);
    }

    /// Look up a topic
    pub fn get(&self, topic: &str) -> Option<&ResearchEntry> {
        self.entries.get(topic)
    }

    /// Number of researched topics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Structured article metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    /// Words in the body
    pub word_count: usize,
    /// Requested length in words
    pub target_length: usize,
    /// Identifier of the dataset the article was written from
    pub dataset_id: String,
}

/// A drafted or edited article
///
/// The writer creates revision 0; each editor pass produces revision N+1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline
    pub title: String,
    /// Body text
    pub body: String,
    /// Metadata
    pub metadata: ArticleMetadata,
    /// Revision number
    pub revision: u32,
}

impl Article {
    /// Create revision 0 of an article
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        target_length: usize,
        dataset_id: impl Into<String>,
    ) -> Self {
        let body = body.into();
        Self {
            title: title.into(),
            metadata: ArticleMetadata {
                word_count: word_count(&body),
                target_length,
                dataset_id: dataset_id.into(),
            },
            body,
            revision: 0,
        }
    }

    /// Produce the next revision with new text, keeping target and dataset
    pub fn revise(&self, title: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            title: title.into(),
            metadata: ArticleMetadata {
                word_count: word_count(&body),
                ..self.metadata.clone()
            },
            body,
            revision: self.revision + 1,
        }
    }
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Outcome of checking one claim against the dataset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every figure in the claim appears in the dataset
    Confirmed,
    /// The dataset neither supports nor refutes the claim
    Unconfirmed,
    /// The dataset records a different figure
    Contradicted,
}

/// Fact-check result for one sentence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimCheck {
    /// Sentence containing the claim
    pub span: String,
    /// Numeric or date tokens extracted from the sentence
    pub figures: Vec<String>,
    /// Verdict
    pub verdict: Verdict,
}

/// Readability measurements for an article body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleReport {
    /// Number of sentences
    pub sentence_count: usize,
    /// Mean words per sentence
    pub mean_sentence_words: f64,
    /// Longest sentence in words
    pub max_sentence_words: usize,
    /// Sentences over the configured length
    pub long_sentences: Vec<String>,
    /// Banned phrases found in the body
    pub banned_phrases: Vec<String>,
}

/// Fact-check plus style feedback produced by the editor
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// Per-claim verdicts
    pub claims: Vec<ClaimCheck>,
    /// Style measurements
    pub style: StyleReport,
    /// Free-text notes for the rewrite and for readers of the job
    pub notes: Vec<String>,
    /// Whether the review could only be completed partially
    pub partial: bool,
}

impl ReviewFeedback {
    /// Feedback standing in for a review that produced nothing usable
    pub fn partial_only(reason: impl Into<String>) -> Self {
        Self {
            notes: vec![reason.into()],
            partial: true,
            ..Self::default()
        }
    }

    /// Claims with the given verdict
    pub fn count(&self, verdict: Verdict) -> usize {
        self.claims.iter().filter(|c| c.verdict == verdict).count()
    }
}

/// Pipeline stage of a job
///
/// Stages are ordered; a job only moves forward, except that `Failed` may be
/// entered from any non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Gathering provider data
    Collecting,
    /// Enriching with context
    Researching,
    /// Drafting the article
    Writing,
    /// Reviewing and rewriting
    Editing,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl Stage {
    /// Whether no further change is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// The stage that follows a successful run of this one
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Collecting => Some(Stage::Researching),
            Stage::Researching => Some(Stage::Writing),
            Stage::Writing => Some(Stage::Editing),
            Stage::Editing => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Collecting => "collecting",
            Stage::Researching => "researching",
            Stage::Writing => "writing",
            Stage::Editing => "editing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and waiting for a worker
    JobQueued {
        /// Job ID
        job_id: JobId,
        /// Subject identifier
        subject: String,
    },

    /// A stage attempt began
    StageStarted {
        /// Job ID
        job_id: JobId,
        /// Stage
        stage: Stage,
        /// Attempt number, starting at 1
        attempt: u32,
    },

    /// A stage attempt failed and will be retried
    StageRetrying {
        /// Job ID
        job_id: JobId,
        /// Stage
        stage: Stage,
        /// Attempt that failed
        attempt: u32,
        /// Error classification
        error_kind: ErrorKind,
        /// Error message
        error: String,
        /// Backoff before the next attempt
        delay_ms: u64,
    },

    /// A stage's result was folded into the job
    StageCompleted {
        /// Job ID
        job_id: JobId,
        /// Stage
        stage: Stage,
    },

    /// The review finished only partially; the job continues
    ReviewPartial {
        /// Job ID
        job_id: JobId,
        /// Why the review was partial
        reason: String,
    },

    /// Job reached `Done`
    JobCompleted {
        /// Job ID
        job_id: JobId,
        /// Final article revision
        revision: u32,
    },

    /// Job reached `Failed`
    JobFailed {
        /// Job ID
        job_id: JobId,
        /// Stage the job failed in
        stage: Stage,
        /// Error classification
        error_kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// Webhook delivery failed
    WebhookFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },
}
