//! Per-job state and the terminal result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::types::{Article, GameDataset, JobId, ResearchNotes, ReviewFeedback, Stage, Subject};

/// One entry of a job's error history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    /// Stage the error happened in
    pub stage: Stage,
    /// Error classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// Attempt number within the stage (0 when the stage never started)
    pub attempt: u32,
    /// When it happened
    pub at: DateTime<Utc>,
}

impl StageError {
    pub(crate) fn new(stage: Stage, error: &Error, attempt: u32) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
            attempt,
            at: Utc::now(),
        }
    }
}

/// One end-to-end run for one subject
///
/// Only the orchestrator mutates a job. The stage moves forward one step at a
/// time or jumps to `Failed`; once `Done` or `Failed` every mutation is
/// refused with [`Error::InvalidTransition`]. Artifacts and error history are
/// kept on failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    id: JobId,
    subject: Subject,
    stage: Stage,
    dataset: Option<GameDataset>,
    notes: Option<ResearchNotes>,
    article: Option<Article>,
    feedback: Option<ReviewFeedback>,
    errors: Vec<StageError>,
    created_at: DateTime<Utc>,
}

impl PipelineJob {
    /// New job in `Collecting`
    pub fn new(id: JobId, subject: Subject) -> Self {
        Self {
            id,
            subject,
            stage: Stage::Collecting,
            dataset: None,
            notes: None,
            article: None,
            feedback: None,
            errors: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Job ID
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Subject being covered
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Collected dataset
    pub fn dataset(&self) -> Option<&GameDataset> {
        self.dataset.as_ref()
    }

    /// Research notes
    pub fn notes(&self) -> Option<&ResearchNotes> {
        self.notes.as_ref()
    }

    /// Latest article revision
    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    /// Review feedback
    pub fn feedback(&self) -> Option<&ReviewFeedback> {
        self.feedback.as_ref()
    }

    /// Every recorded error, oldest first
    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    /// When the job was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure_open(&self, to: Stage) -> Result<()> {
        if self.stage.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Move to the next stage
    pub(crate) fn advance(&mut self) -> Result<Stage> {
        let next = self.stage.next().ok_or_else(|| Error::InvalidTransition {
            from: self.stage.to_string(),
            to: "next".to_string(),
        })?;
        self.ensure_open(next)?;
        self.stage = next;
        Ok(next)
    }

    /// Move to `Failed`, keeping artifacts and history
    pub(crate) fn fail(&mut self) -> Result<()> {
        self.ensure_open(Stage::Failed)?;
        self.stage = Stage::Failed;
        Ok(())
    }

    pub(crate) fn record_error(&mut self, entry: StageError) -> Result<()> {
        self.ensure_open(self.stage)?;
        self.errors.push(entry);
        Ok(())
    }

    pub(crate) fn set_dataset(&mut self, dataset: GameDataset) -> Result<()> {
        self.ensure_open(self.stage)?;
        self.dataset = Some(dataset);
        Ok(())
    }

    pub(crate) fn set_notes(&mut self, notes: ResearchNotes) -> Result<()> {
        self.ensure_open(self.stage)?;
        self.notes = Some(notes);
        Ok(())
    }

    pub(crate) fn set_article(&mut self, article: Article) -> Result<()> {
        self.ensure_open(self.stage)?;
        self.article = Some(article);
        Ok(())
    }

    pub(crate) fn set_feedback(&mut self, feedback: ReviewFeedback) -> Result<()> {
        self.ensure_open(self.stage)?;
        self.feedback = Some(feedback);
        Ok(())
    }
}

/// Terminal outcome of a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The job in its terminal state
    pub job: PipelineJob,
    /// Wall time from worker start to terminal state
    #[serde(with = "crate::config::duration_ms_serde")]
    pub elapsed: Duration,
}

impl PipelineResult {
    /// Whether the job reached `Done`
    pub fn is_done(&self) -> bool {
        self.job.stage() == Stage::Done
    }

    /// Final article, if one was drafted (kept on failure too)
    pub fn article(&self) -> Option<&Article> {
        self.job.article()
    }

    /// Most recent error: for a failed job, the stage and kind it failed with
    pub fn last_error(&self) -> Option<&StageError> {
        self.job.errors().last()
    }

    /// Stage the job failed in
    pub fn failed_stage(&self) -> Option<Stage> {
        if self.job.stage() == Stage::Failed {
            self.last_error().map(|e| e.stage)
        } else {
            None
        }
    }
}
