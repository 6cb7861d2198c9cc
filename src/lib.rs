//! # pressbox
//!
//! Multi-agent football journalism pipeline. A job takes one subject (a game,
//! team or player) through four stages:
//!
//! 1. **Collecting** - provider data from the sports data API, rate limited and retried
//! 2. **Researching** - contextual notes, shared across jobs through a TTL cache
//! 3. **Writing** - a draft article (revision 0) from the generation capability
//! 4. **Editing** - fact-check against the dataset, style check, then rewrite
//!
//! ## Design Philosophy
//!
//! pressbox is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Pluggable** - Each stage is a trait; the orchestrator runs any implementation
//! - **Failure-tolerant** - Transient failures are retried and every failure stays in job history
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use pressbox::{Config, JobId, Orchestrator, Subject, SubjectKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // RAPIDAPI_KEY and ANTHROPIC_API_KEY come from the environment
//!     let config = Config::from_env()?;
//!     pressbox::telemetry::init(&config.logging);
//!
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let subject = Subject::parse("fixture-123", SubjectKind::Game)?;
//!     let result = orchestrator.run(JobId::from("job-1"), subject).await?;
//!     if let Some(article) = result.article() {
//!         println!("# {}\n\n{}", article.title, article.body);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Pipeline stages: collector, researcher, writer, editor
pub mod agents;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Text generation capability
pub mod generation;
/// League name to provider id lookup
pub mod leagues;
/// Job orchestration: worker pool, stage retries, cancellation
pub mod pipeline;
/// Token bucket rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Sports data provider client
pub mod sports_data;
/// Logging setup
pub mod telemetry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use generation::{ClaudeGenerator, Generator, Prompt};
pub use pipeline::{Orchestrator, PipelineJob, PipelineResult, StageError, Stages};
pub use sports_data::{Endpoint, SportsDataClient};
pub use types::{
    Article, ClaimCheck, DatasetField, Event, GameDataset, JobId, ResearchEntry, ResearchNotes,
    ReviewFeedback, Stage, StyleReport, Subject, SubjectKind, Verdict,
};
