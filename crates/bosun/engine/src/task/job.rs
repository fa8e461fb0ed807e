//! Cluster job topologies
//!
//! A topology is a set of jobs run with bounded parallelism. Results are
//! folded by a [`ResponseCombiner`], which may also end the run early, and
//! the combined outcome is handed to a completion callback.

use async_trait::async_trait;
use bosun_types::FailureStrategy;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared state of one scheduled session
#[derive(Debug)]
pub struct JobContext {
    session_id: String,
    cancelled: AtomicBool,
}

impl JobContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Unit of cluster work
#[async_trait]
pub trait Job: Send + Sync {
    fn job_id(&self) -> String;

    /// Run the job; jobs should give up early once the context is cancelled
    async fn execute(&self, context: &JobContext) -> bool;
}

/// Jobs and the number that may run at once
pub struct JobTopology {
    jobs: Vec<Arc<dyn Job>>,
    parallelism: usize,
}

impl JobTopology {
    pub fn builder() -> JobTopologyBuilder {
        JobTopologyBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

#[derive(Default)]
pub struct JobTopologyBuilder {
    jobs: Vec<Arc<dyn Job>>,
    parallelism: Option<usize>,
}

impl JobTopologyBuilder {
    pub fn add_job(mut self, job: Arc<dyn Job>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn add_jobs(mut self, jobs: impl IntoIterator<Item = Arc<dyn Job>>) -> Self {
        self.jobs.extend(jobs);
        self
    }

    /// Jobs run at once; clamped to at least one
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism.max(1));
        self
    }

    pub fn build(self) -> JobTopology {
        JobTopology {
            jobs: self.jobs,
            parallelism: self.parallelism.unwrap_or(1),
        }
    }
}

/// Folds job results into the session outcome
pub trait ResponseCombiner: Send {
    fn combine(&mut self, job_id: &str, result: bool);

    /// True once no further job needs to run
    fn should_stop(&self) -> bool {
        false
    }

    fn result(&self) -> bool;
}

/// Succeeds only if every job that ran succeeded
#[derive(Debug)]
pub struct BooleanResponseCombiner {
    failure_strategy: FailureStrategy,
    failed: bool,
}

impl BooleanResponseCombiner {
    pub fn new(failure_strategy: FailureStrategy) -> Self {
        Self {
            failure_strategy,
            failed: false,
        }
    }
}

impl Default for BooleanResponseCombiner {
    fn default() -> Self {
        Self::new(FailureStrategy::Stop)
    }
}

impl ResponseCombiner for BooleanResponseCombiner {
    fn combine(&mut self, job_id: &str, result: bool) {
        if !result {
            debug!(job_id, "Job failed");
            self.failed = true;
        }
    }

    fn should_stop(&self) -> bool {
        self.failed && self.failure_strategy == FailureStrategy::Stop
    }

    fn result(&self) -> bool {
        !self.failed
    }
}

/// Outcome handed to the completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExecutionResult {
    pub session_id: String,
    pub result: bool,
    pub cancelled: bool,
}

pub type JobCompletionCallback = Box<dyn FnOnce(JobExecutionResult) + Send>;

/// Runs topologies in the background
pub trait JobExecutor: Send + Sync {
    /// Schedule `topology`; the session id, or `None` if it could not be scheduled
    fn schedule(
        &self,
        topology: JobTopology,
        combiner: Box<dyn ResponseCombiner>,
        callback: JobCompletionCallback,
    ) -> Option<String>;

    /// Ask a running session to stop; false if it is unknown
    fn cancel(&self, session_id: &str) -> bool;
}

/// [`JobExecutor`] spawning each session as a tokio task
#[derive(Default)]
pub struct TokioJobExecutor {
    sessions: Arc<DashMap<String, Arc<JobContext>>>,
}

impl TokioJobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn run(
        context: Arc<JobContext>,
        topology: JobTopology,
        mut combiner: Box<dyn ResponseCombiner>,
    ) -> bool {
        let mut pending = topology.jobs.into_iter();
        let mut running = FuturesUnordered::new();
        for job in pending.by_ref().take(topology.parallelism) {
            running.push(run_job(job, context.clone()));
        }

        while let Some((job_id, result)) = running.next().await {
            combiner.combine(&job_id, result);
            if combiner.should_stop() {
                info!(job_id = %job_id, "Stopping session after job failure");
                context.cancel();
                break;
            }
            if let Some(job) = pending.next() {
                running.push(run_job(job, context.clone()));
            }
        }
        combiner.result()
    }
}

async fn run_job(job: Arc<dyn Job>, context: Arc<JobContext>) -> (String, bool) {
    let job_id = job.job_id();
    if context.is_cancelled() {
        debug!(job_id = %job_id, "Skipping job of cancelled session");
        return (job_id, false);
    }
    let result = job.execute(&context).await;
    (job_id, result)
}

impl JobExecutor for TokioJobExecutor {
    fn schedule(
        &self,
        topology: JobTopology,
        combiner: Box<dyn ResponseCombiner>,
        callback: JobCompletionCallback,
    ) -> Option<String> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "No runtime to schedule jobs on");
                return None;
            }
        };
        let session_id = Uuid::new_v4().to_string();
        let context = Arc::new(JobContext::new(session_id.clone()));
        self.sessions.insert(session_id.clone(), context.clone());

        let sessions = self.sessions.clone();
        let span = info_span!("job_session", session_id = %session_id, jobs = topology.len());
        handle.spawn(
            async move {
                let result = Self::run(context.clone(), topology, combiner).await;
                sessions.remove(context.session_id());
                let cancelled = context.is_cancelled();
                debug!(result, cancelled, "Job session finished");
                callback(JobExecutionResult {
                    session_id: context.session_id().to_string(),
                    result,
                    cancelled,
                });
            }
            .instrument(span),
        );
        Some(session_id)
    }

    fn cancel(&self, session_id: &str) -> bool {
        match self.sessions.get(session_id) {
            Some(context) => {
                context.cancel();
                true
            }
            None => false,
        }
    }
}
