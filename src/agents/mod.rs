//! The four pipeline stages.
//!
//! Each stage is a trait so the orchestrator can run any implementation:
//! - [`collector`] - [`DataCollector`] assembles a [`GameDataset`] from the provider
//! - [`researcher`] - [`Researcher`] adds contextual notes through a shared TTL cache
//! - [`writer`] - [`Writer`] drafts revision 0 of the article
//! - [`editor`] - [`Editor`] fact-checks, style-checks and rewrites
//!
//! Stages never touch job state; they return results that the orchestrator
//! folds into the job.

pub mod collector;
pub mod editor;
pub mod researcher;
pub mod writer;

pub use collector::DataCollector;
pub use editor::{Editor, fact_check, style_check};
pub use researcher::{GenerativeKnowledge, KnowledgeSource, ResearchCache, Researcher};
pub use writer::{ArticleKind, Writer};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Article, GameDataset, ResearchNotes, ReviewFeedback, Subject};

/// Collecting stage
#[async_trait]
pub trait CollectStage: Send + Sync {
    /// Gather provider data for `subject`
    async fn collect(&self, subject: &Subject) -> Result<GameDataset>;
}

/// Researching stage
#[async_trait]
pub trait ResearchStage: Send + Sync {
    /// Gather contextual notes for a collected dataset; missing topics are absent
    async fn enrich(&self, dataset: &GameDataset) -> Result<ResearchNotes>;
}

/// Writing stage
#[async_trait]
pub trait WriteStage: Send + Sync {
    /// Draft revision 0 of an article
    async fn draft(&self, dataset: &GameDataset, notes: &ResearchNotes) -> Result<Article>;
}

/// Editing stage
#[async_trait]
pub trait EditStage: Send + Sync {
    /// Review an article against its dataset and return the next revision
    async fn review(
        &self,
        article: &Article,
        dataset: &GameDataset,
    ) -> Result<(Article, ReviewFeedback)>;
}
