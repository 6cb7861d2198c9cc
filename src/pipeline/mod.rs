//! Pipeline orchestration.
//!
//! The [`Orchestrator`] owns every job's lifecycle:
//! - a bounded worker pool (semaphore permits) runs independent jobs in parallel
//! - within a job, stages run strictly in order and each result is folded
//!   into the [`PipelineJob`] before the next stage starts
//! - each stage attempt is bounded by the stage timeout and retried with
//!   exponential backoff when the failure is transient
//! - every failed attempt lands in the job's error history; a failed job keeps
//!   its artifacts
//! - cancellation is cooperative: it is honored while queued, between stages
//!   and during retry backoff, never in the middle of a stage attempt

mod job;
mod notify;


pub use job::{PipelineJob, PipelineResult, StageError};
pub use notify::WebhookPayload;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{
    CollectStage, DataCollector, EditStage, Editor, GenerativeKnowledge, ResearchCache,
    ResearchStage, Researcher, WriteStage, Writer,
};
use crate::config::{Config, NotificationConfig, PipelineConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::generation::{ClaudeGenerator, Generator};
use crate::leagues::LeagueTable;
use crate::retry::Backoff;
use crate::sports_data::SportsDataClient;
use crate::types::{
    Article, Event, GameDataset, JobId, ResearchNotes, ReviewFeedback, Stage, Subject,
};

/// How long [`Orchestrator::shutdown`] waits for in-flight jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The four stage implementations a pipeline runs
#[derive(Clone)]
pub struct Stages {
    /// Collecting
    pub collector: Arc<dyn CollectStage>,
    /// Researching
    pub researcher: Arc<dyn ResearchStage>,
    /// Writing
    pub writer: Arc<dyn WriteStage>,
    /// Editing
    pub editor: Arc<dyn EditStage>,
}

impl Stages {
    /// Production stages sharing one sports data client and one generator
    pub fn from_config(config: &Config, generator: Arc<dyn Generator>) -> Result<Self> {
        let client = SportsDataClient::from_config(config)?;
        let leagues = LeagueTable::with_overrides(&config.leagues);
        let cache = Arc::new(ResearchCache::new(config.research.cache_ttl));

        Ok(Self {
            collector: Arc::new(DataCollector::new(
                client,
                config.collection.clone(),
                leagues,
            )),
            researcher: Arc::new(Researcher::new(
                Arc::new(GenerativeKnowledge::new(Arc::clone(&generator))),
                cache,
                &config.research,
            )),
            writer: Arc::new(Writer::new(Arc::clone(&generator), &config.writing)),
            editor: Arc::new(Editor::new(generator, config.editing.clone())),
        })
    }
}

/// Stage-level retry policy, separate from transport retries in the client
///
/// An incomplete dataset is retried unless the provider rejected the request
/// behind it; re-sending a rejected request cannot change the answer.
fn is_stage_retryable(error: &Error) -> bool {
    match error {
        Error::IncompleteDataset { cause, .. } => !matches!(
            cause,
            Some(
                ErrorKind::ClientRequestError
                    | ErrorKind::InvalidRequest
                    | ErrorKind::InvalidSubject
                    | ErrorKind::Config
            )
        ),
        Error::UpstreamUnavailable { .. }
        | Error::UpstreamStatus { .. }
        | Error::RateLimitExceeded { .. }
        | Error::MalformedResponse { .. }
        | Error::GenerationFailed(_)
        | Error::StageTimeout(_)
        | Error::Network(_) => true,
        _ => false,
    }
}

/// What a successful stage hands back for folding
enum Artifact {
    Dataset(GameDataset),
    Notes(ResearchNotes),
    Draft(Article),
    Review(Article, ReviewFeedback),
}

struct Inner {
    stages: Stages,
    config: PipelineConfig,
    notifications: NotificationConfig,
    event_tx: broadcast::Sender<Event>,
    pool: Arc<Semaphore>,
    active: Mutex<HashMap<JobId, CancellationToken>>,
    accepting_new: AtomicBool,
    next_job: AtomicU64,
}

/// A job's entry in the active map
///
/// Released explicitly once the job is terminal. If the job task panics the
/// guard is dropped instead and removes the entry from a spawned task, so the
/// id does not stay active forever.
struct ActiveSlot {
    inner: Arc<Inner>,
    id: Option<JobId>,
}

impl ActiveSlot {
    fn new(inner: Arc<Inner>, id: JobId) -> Self {
        Self {
            inner,
            id: Some(id),
        }
    }

    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            self.inner.active.lock().await.remove(&id);
        }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        tracing::error!(job_id = %id, "job task ended abnormally, releasing its id");
        if let Ok(mut active) = self.inner.active.try_lock() {
            active.remove(&id);
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move {
                inner.active.lock().await.remove(&id);
            });
        }
    }
}

/// Runs pipeline jobs (cloneable - all state is Arc-wrapped)
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("worker_pool_size", &self.inner.config.worker_pool_size)
            .field("available_workers", &self.inner.pool.available_permits())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator over explicit stages
    pub fn new(stages: Stages, config: PipelineConfig, notifications: NotificationConfig) -> Self {
        let (event_tx, _rx) = broadcast::channel(config.event_capacity.max(1));
        let workers = config.worker_pool_size.max(1);
        Self {
            inner: Arc::new(Inner {
                stages,
                pool: Arc::new(Semaphore::new(workers)),
                config,
                notifications,
                event_tx,
                active: Mutex::new(HashMap::new()),
                accepting_new: AtomicBool::new(true),
                next_job: AtomicU64::new(1),
            }),
        }
    }

    /// Fully wired production orchestrator
    ///
    /// Validates `config`, then builds the sports data client and the Claude
    /// generator from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings or missing credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let generator: Arc<dyn Generator> = Arc::new(ClaudeGenerator::new(&config.generation)?);
        let stages = Stages::from_config(config, generator)?;
        Ok(Self::new(
            stages,
            config.pipeline.clone(),
            config.notifications.clone(),
        ))
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    /// Jobs queued or running
    pub async fn active_jobs(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.inner.event_tx.send(event).ok();
    }

    /// Queue a job under a generated id (`job-1`, `job-2`, ...)
    pub async fn submit(&self, subject: Subject) -> Result<(JobId, JoinHandle<PipelineResult>)> {
        let id = JobId::new(format!(
            "job-{}",
            self.inner.next_job.fetch_add(1, Ordering::Relaxed)
        ));
        let handle = self.submit_as(id.clone(), subject).await?;
        Ok((id, handle))
    }

    /// Queue a job under a caller-chosen id
    ///
    /// The job waits for a free worker, then runs to a terminal state. The
    /// returned handle resolves to its [`PipelineResult`].
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] after [`Orchestrator::shutdown`], and
    /// [`Error::DuplicateJob`] while another job with `id` is active.
    pub async fn submit_as(
        &self,
        id: JobId,
        subject: Subject,
    ) -> Result<JoinHandle<PipelineResult>> {
        if !self.inner.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let token = CancellationToken::new();
        {
            let mut active = self.inner.active.lock().await;
            if active.contains_key(&id) {
                return Err(Error::DuplicateJob(id.to_string()));
            }
            active.insert(id.clone(), token.clone());
        }

        tracing::info!(job_id = %id, subject = %subject, "job queued");
        self.emit(Event::JobQueued {
            job_id: id.clone(),
            subject: subject.id.clone(),
        });

        let orchestrator = self.clone();
        Ok(tokio::spawn(async move {
            let slot = ActiveSlot::new(Arc::clone(&orchestrator.inner), id.clone());
            let result = orchestrator.run_queued(id, subject, token).await;
            slot.release().await;
            notify::trigger_webhooks(
                &orchestrator.inner.notifications,
                &orchestrator.inner.event_tx,
                &result,
            );
            result
        }))
    }

    /// Run one job to completion
    pub async fn run(&self, id: JobId, subject: Subject) -> Result<PipelineResult> {
        let handle = self.submit_as(id, subject).await?;
        join(handle).await
    }

    /// Run many jobs concurrently, bounded by the worker pool
    ///
    /// Returns one outcome per input, in input order. A job that could not be
    /// queued (duplicate id, shutdown) gets its submit error in place; every job
    /// that was queued is awaited. One job failing does not affect the others.
    pub async fn run_batch(&self, jobs: Vec<(JobId, Subject)>) -> Vec<Result<PipelineResult>> {
        let mut submitted = Vec::with_capacity(jobs.len());
        for (id, subject) in jobs {
            submitted.push(self.submit_as(id, subject).await);
        }

        let mut results = Vec::with_capacity(submitted.len());
        for handle in submitted {
            results.push(match handle {
                Ok(handle) => join(handle).await,
                Err(e) => Err(e),
            });
        }
        results
    }

    /// Run a batch, shutting the orchestrator down if `stop` resolves first
    ///
    /// On stop, every queued or running job is cancelled at its next
    /// checkpoint and the batch is still awaited, so each input gets an outcome.
    /// The orchestrator accepts no new jobs afterwards.
    pub async fn run_batch_until<F>(
        &self,
        jobs: Vec<(JobId, Subject)>,
        stop: F,
    ) -> Vec<Result<PipelineResult>>
    where
        F: Future<Output = ()>,
    {
        let batch = self.run_batch(jobs);
        tokio::pin!(batch);

        tokio::select! {
            results = &mut batch => results,
            () = stop => {
                tracing::info!("stop requested, cancelling outstanding jobs");
                if let Err(e) = self.shutdown().await {
                    tracing::warn!(error = %e, "shutdown did not complete cleanly");
                }
                batch.await
            }
        }
    }

    /// [`Orchestrator::run_batch_until`] stopped by SIGTERM or Ctrl+C
    pub async fn run_batch_until_signal(
        &self,
        jobs: Vec<(JobId, Subject)>,
    ) -> Vec<Result<PipelineResult>> {
        self.run_batch_until(jobs, shutdown_signal()).await
    }

    /// Cancel a queued or running job
    ///
    /// The job stops at its next checkpoint and ends `Failed` with a
    /// `cancelled` error. Other jobs are unaffected.
    pub async fn cancel(&self, id: &JobId) -> Result<()> {
        let active = self.inner.active.lock().await;
        let token = active
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        token.cancel();
        tracing::info!(job_id = %id, "job cancellation requested");
        Ok(())
    }

    /// Gracefully shut down the orchestrator
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels every queued or running job
    /// 3. Waits for them to settle (30 second timeout)
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating pipeline shutdown");

        // 1. Stop accepting new jobs
        self.inner.accepting_new.store(false, Ordering::SeqCst);

        // 2. Signal cancellation
        {
            let active = self.inner.active.lock().await;
            tracing::debug!(active_count = active.len(), "Cancelling active jobs");
            for (id, token) in active.iter() {
                tracing::debug!(job_id = %id, "Signaling cancellation");
                token.cancel();
            }
        }

        // 3. Wait for jobs to reach a terminal state
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs settled"),
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to settle, proceeding with shutdown");
            }
        }

        tracing::info!("Pipeline shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active_jobs().await;
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active jobs to settle");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Wait for a worker, then drive the job
    async fn run_queued(
        &self,
        id: JobId,
        subject: Subject,
        token: CancellationToken,
    ) -> PipelineResult {
        let started = Instant::now();
        let mut job = PipelineJob::new(id, subject);

        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.inner.pool).acquire_owned() => permit.ok(),
        };

        match permit {
            Some(_permit) => self.drive(&mut job, &token).await,
            None => {
                let error = if token.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::ShuttingDown
                };
                self.fail_job(&mut job, Stage::Collecting, error, 0);
            }
        }

        PipelineResult {
            job,
            elapsed: started.elapsed(),
        }
    }

    /// Run the job's stages in order until it is terminal
    async fn drive(&self, job: &mut PipelineJob, token: &CancellationToken) {
        let stages = self.inner.stages.clone();

        while !job.stage().is_terminal() {
            let stage = job.stage();
            if token.is_cancelled() {
                self.fail_job(job, stage, Error::Cancelled, 0);
                return;
            }

            // Every Err except a partial review is already in `failures`
            let mut failures = Vec::new();
            let outcome = match stage {
                Stage::Collecting => {
                    let subject = job.subject().clone();
                    self.run_stage(job.id(), stage, token, &mut failures, || {
                        stages.collector.collect(&subject)
                    })
                    .await
                    .map(Artifact::Dataset)
                }
                Stage::Researching => match job.dataset() {
                    Some(dataset) => self
                        .run_stage(job.id(), stage, token, &mut failures, || {
                            stages.researcher.enrich(dataset)
                        })
                        .await
                        .map(Artifact::Notes),
                    None => Err(missing_artifact(stage, "dataset", &mut failures)),
                },
                Stage::Writing => match (job.dataset(), job.notes()) {
                    (Some(dataset), Some(notes)) => self
                        .run_stage(job.id(), stage, token, &mut failures, || {
                            stages.writer.draft(dataset, notes)
                        })
                        .await
                        .map(Artifact::Draft),
                    _ => Err(missing_artifact(stage, "dataset or notes", &mut failures)),
                },
                Stage::Editing => match (job.article(), job.dataset()) {
                    (Some(article), Some(dataset)) => self
                        .run_stage(job.id(), stage, token, &mut failures, || {
                            stages.editor.review(article, dataset)
                        })
                        .await
                        .map(|(article, feedback)| Artifact::Review(article, feedback)),
                    _ => Err(missing_artifact(stage, "article or dataset", &mut failures)),
                },
                Stage::Done | Stage::Failed => return,
            };

            let attempt = u32::try_from(failures.len()).unwrap_or(u32::MAX) + 1;
            for failure in failures {
                if let Err(e) = job.record_error(failure) {
                    tracing::error!(job_id = %job.id(), error = %e, "could not record job error");
                }
            }

            let folded = match outcome {
                Ok(artifact) => fold(job, artifact),
                Err(Error::ReviewIncomplete { reason, partial }) => {
                    self.fold_partial_review(job, reason, partial, attempt)
                }
                Err(error) => {
                    self.finish_failed(job, stage, &error);
                    return;
                }
            };

            match folded.and_then(|()| job.advance()) {
                Ok(next) => self.complete_stage(job, stage, next),
                Err(e) => {
                    self.fail_job(job, stage, e, 0);
                    return;
                }
            }
        }
    }

    /// A partial review completes the stage with whatever the editor produced
    fn fold_partial_review(
        &self,
        job: &mut PipelineJob,
        reason: String,
        partial: Option<Box<(Article, ReviewFeedback)>>,
        attempt: u32,
    ) -> Result<()> {
        let recorded = Error::ReviewIncomplete {
            reason: reason.clone(),
            partial: None,
        };
        job.record_error(StageError::new(Stage::Editing, &recorded, attempt))?;

        tracing::warn!(job_id = %job.id(), %reason, "review incomplete, keeping partial result");
        self.emit(Event::ReviewPartial {
            job_id: job.id().clone(),
            reason: reason.clone(),
        });

        match partial {
            Some(partial) => {
                let (article, feedback) = *partial;
                job.set_article(article)?;
                job.set_feedback(feedback)
            }
            // Keep the writer's draft
            None => job.set_feedback(ReviewFeedback::partial_only(reason)),
        }
    }

    /// Attempt a stage under the timeout, retrying transient failures
    ///
    /// Every failed attempt is pushed onto `failures`. A partial review is
    /// returned straight away: it is an outcome, not a failure.
    async fn run_stage<T, F, Fut>(
        &self,
        job_id: &JobId,
        stage: Stage,
        token: &CancellationToken,
        failures: &mut Vec<StageError>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.inner.config.stage_timeout;
        let mut backoff = Backoff::new(&self.inner.config.stage_retry);
        let mut attempt = 1;

        loop {
            tracing::info!(job_id = %job_id, %stage, attempt, "stage started");
            self.emit(Event::StageStarted {
                job_id: job_id.clone(),
                stage,
                attempt,
            });

            let error = match tokio::time::timeout(timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e @ Error::ReviewIncomplete { .. })) => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => Error::StageTimeout(timeout),
            };
            failures.push(StageError::new(stage, &error, attempt));

            if !is_stage_retryable(&error) {
                return Err(error);
            }
            let Some(delay) = backoff.next_delay() else {
                return Err(error);
            };

            tracing::warn!(
                job_id = %job_id,
                %stage,
                attempt,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "stage failed, retrying"
            );
            self.emit(Event::StageRetrying {
                job_id: job_id.clone(),
                stage,
                attempt,
                error_kind: error.kind(),
                error: error.to_string(),
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = token.cancelled() => {
                    failures.push(StageError::new(stage, &Error::Cancelled, attempt));
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn complete_stage(&self, job: &PipelineJob, stage: Stage, next: Stage) {
        tracing::info!(job_id = %job.id(), %stage, %next, "stage completed");
        self.emit(Event::StageCompleted {
            job_id: job.id().clone(),
            stage,
        });

        if next == Stage::Done {
            let revision = job.article().map_or(0, |a| a.revision);
            tracing::info!(
                job_id = %job.id(),
                revision,
                errors = job.errors().len(),
                "job completed"
            );
            self.emit(Event::JobCompleted {
                job_id: job.id().clone(),
                revision,
            });
        }
    }

    /// Record `error`, then move the job to `Failed`
    fn fail_job(&self, job: &mut PipelineJob, stage: Stage, error: Error, attempt: u32) {
        if let Err(e) = job.record_error(StageError::new(stage, &error, attempt)) {
            tracing::error!(job_id = %job.id(), error = %e, "could not record job error");
        }
        self.finish_failed(job, stage, &error);
    }

    /// Move the job to `Failed`; `error` is already in its history
    fn finish_failed(&self, job: &mut PipelineJob, stage: Stage, error: &Error) {
        if let Err(e) = job.fail() {
            tracing::error!(job_id = %job.id(), error = %e, "job already terminal");
            return;
        }
        tracing::error!(
            job_id = %job.id(),
            %stage,
            error_kind = %error.kind(),
            error = %error,
            attempts = job.errors().iter().filter(|e| e.stage == stage).count(),
            "job failed"
        );
        self.emit(Event::JobFailed {
            job_id: job.id().clone(),
            stage,
            error_kind: error.kind(),
            error: error.to_string(),
        });
    }
}

fn fold(job: &mut PipelineJob, artifact: Artifact) -> Result<()> {
    match artifact {
        Artifact::Dataset(dataset) => job.set_dataset(dataset),
        Artifact::Notes(notes) => job.set_notes(notes),
        Artifact::Draft(article) => job.set_article(article),
        Artifact::Review(article, feedback) => {
            job.set_article(article)?;
            job.set_feedback(feedback)
        }
    }
}

fn missing_artifact(stage: Stage, what: &str, failures: &mut Vec<StageError>) -> Error {
    let error = Error::InvalidTransition {
        from: format!("{stage} without {what}"),
        to: stage.to_string(),
    };
    failures.push(StageError::new(stage, &error, 0));
    error
}

/// Resolves on SIGTERM (unix) or Ctrl+C; never resolves if neither can be watched
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("received Ctrl+C"),
                }
                return;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "could not register SIGTERM handler, watching Ctrl+C only"
                );
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C, batch will run to completion");
            std::future::pending::<()>().await;
        }
    }
}

async fn join(handle: JoinHandle<PipelineResult>) -> Result<PipelineResult> {
    handle
        .await
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!("job task failed: {e}")))
        })
}
