//! Per-task runner
//!
//! A runner owns the cluster jobs of one task run and tracks the task's
//! state as last read from the store. Its monitor returns once that state
//! is terminal, at which point the engine reaps it, or once the engine has
//! retired the runner.

use super::job::{BooleanResponseCombiner, Job, JobExecutionResult, JobExecutor, JobTopology};
use bosun_statestore::{is_stale, TaskStore};
use bosun_types::{run_task_id, ClusterOpSpec, TaskSpec, TaskState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Builds the cluster jobs that start and stop a task
pub trait TaskJobFactory: Send + Sync {
    fn start_job(&self, spec: &TaskSpec, op_spec: &ClusterOpSpec) -> Arc<dyn Job>;

    fn stop_job(&self, source_app_name: &str, task_id: &str, op_spec: &ClusterOpSpec) -> Arc<dyn Job>;
}

pub struct TaskRunner {
    source_app_name: String,
    task_id: String,
    tasks: Arc<dyn TaskStore>,
    jobs: Arc<dyn JobExecutor>,
    job_factory: Arc<dyn TaskJobFactory>,
    state: watch::Sender<Option<TaskState>>,
    retired: AtomicBool,
}

impl TaskRunner {
    pub fn new(
        source_app_name: impl Into<String>,
        task_id: impl Into<String>,
        tasks: Arc<dyn TaskStore>,
        jobs: Arc<dyn JobExecutor>,
        job_factory: Arc<dyn TaskJobFactory>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(None);
        Arc::new(Self {
            source_app_name: source_app_name.into(),
            task_id: task_id.into(),
            tasks,
            jobs,
            job_factory,
            state,
            retired: AtomicBool::new(false),
        })
    }

    pub fn source_app_name(&self) -> &str {
        &self.source_app_name
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn run_task_id(&self) -> String {
        run_task_id(&self.source_app_name, &self.task_id)
    }

    /// Last state seen by the runner; `None` until the first read
    pub fn current_state(&self) -> Option<TaskState> {
        *self.state.borrow()
    }

    /// Schedule the start job; the session id if it could be scheduled
    pub fn start_task(self: &Arc<Self>, spec: &TaskSpec, op_spec: &ClusterOpSpec) -> Option<String> {
        let job = self.job_factory.start_job(spec, op_spec);
        self.schedule(job, op_spec)
    }

    /// Schedule the stop job; the session id if it could be scheduled
    pub fn stop_task(self: &Arc<Self>, op_spec: &ClusterOpSpec) -> Option<String> {
        let job = self.job_factory.stop_job(&self.source_app_name, &self.task_id, op_spec);
        self.schedule(job, op_spec)
    }

    fn schedule(self: &Arc<Self>, job: Arc<dyn Job>, op_spec: &ClusterOpSpec) -> Option<String> {
        let topology = JobTopology::builder().add_job(job).build();
        let runner = self.clone();
        self.jobs.schedule(
            topology,
            Box::new(BooleanResponseCombiner::new(op_spec.failure_strategy)),
            Box::new(move |result| runner.handle_job_completion(result)),
        )
    }

    /// Stop following the task without reporting it completed
    ///
    /// Used once the engine no longer tracks this runner.
    pub(crate) fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            debug!(source_app = %self.source_app_name, task_id = %self.task_id, "Task runner retired");
            // Wake the monitor
            self.state.send_modify(|_| {});
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn handle_job_completion(&self, result: JobExecutionResult) {
        if result.result {
            if self.update_current_state().is_none() {
                warn!(
                    source_app = %self.source_app_name,
                    task_id = %self.task_id,
                    session_id = %result.session_id,
                    "No record for task after job"
                );
                self.set_state(TaskState::Lost);
            }
        } else {
            error!(
                source_app = %self.source_app_name,
                task_id = %self.task_id,
                session_id = %result.session_id,
                "Job for task failed"
            );
            self.set_state(TaskState::Lost);
        }
    }

    /// Refresh the state from the store
    ///
    /// An active task that has not been updated within the stale age is
    /// rewritten LOST and reported LOST. A record that disappears after the
    /// runner has seen it is reported LOST as well. `None` while the task
    /// has never been recorded.
    pub fn update_current_state(&self) -> Option<TaskState> {
        let Some(task) = self.tasks.task(&self.source_app_name, &self.task_id) else {
            self.current_state()?;
            info!(source_app = %self.source_app_name, task_id = %self.task_id, "Task record is gone");
            self.set_state(TaskState::Lost);
            return Some(TaskState::Lost);
        };
        if task.state.is_active() && is_stale(task.updated) {
            info!(source_app = %self.source_app_name, task_id = %self.task_id, "Stale task detected");
            let updated = self
                .tasks
                .update_task(&self.source_app_name, &self.task_id, &task.as_lost());
            info!(
                source_app = %self.source_app_name,
                task_id = %self.task_id,
                updated,
                "Stale mark status"
            );
            if updated {
                self.set_state(TaskState::Lost);
            }
            return Some(TaskState::Lost);
        }
        self.set_state(task.state);
        Some(task.state)
    }

    fn set_state(&self, state: TaskState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == Some(state) {
                return false;
            }
            *current = Some(state);
            true
        });
        if changed {
            info!(source_app = %self.source_app_name, task_id = %self.task_id, state = %state, "Task state changed");
        }
    }

    /// Wait for a terminal state, then hand the runner to `completed`
    ///
    /// A retired runner is not handed over.
    pub(crate) async fn monitor(self: Arc<Self>, completed: mpsc::UnboundedSender<Arc<TaskRunner>>) {
        let mut state = self.state.subscribe();
        loop {
            if self.is_retired() {
                debug!(source_app = %self.source_app_name, task_id = %self.task_id, "Task runner monitor retired");
                return;
            }
            if state.borrow_and_update().is_some_and(|s| s.is_terminal()) {
                break;
            }
            if state.changed().await.is_err() {
                break;
            }
        }
        debug!(source_app = %self.source_app_name, task_id = %self.task_id, "Task runner monitor done");
        let _ = completed.send(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::job::{JobContext, TokioJobExecutor};
    use async_trait::async_trait;
    use bosun_statestore::InMemoryTaskStore;
    use bosun_types::{ExecutorId, InstanceId, TaskInfo};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;
    use tokio::time::timeout;

    fn task(state: TaskState) -> TaskInfo {
        TaskInfo {
            source_app_name: "app".to_string(),
            task_id: "t1".to_string(),
            instance_id: InstanceId::new("ti-1"),
            executor_id: ExecutorId::new("e1"),
            hostname: "e1".to_string(),
            resources: vec![],
            state,
            result: None,
            error_message: None,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    /// Writes a fixed state for the task, or fails
    struct WriteState {
        tasks: Arc<InMemoryTaskStore>,
        state: Option<TaskState>,
    }

    #[async_trait]
    impl Job for WriteState {
        fn job_id(&self) -> String {
            "write-state".to_string()
        }

        async fn execute(&self, _context: &JobContext) -> bool {
            match self.state {
                Some(state) => self.tasks.update_task("app", "t1", &task(state)),
                None => false,
            }
        }
    }

    struct Jobs {
        tasks: Arc<InMemoryTaskStore>,
        start: Option<TaskState>,
    }

    impl TaskJobFactory for Jobs {
        fn start_job(&self, _spec: &TaskSpec, _op_spec: &ClusterOpSpec) -> Arc<dyn Job> {
            Arc::new(WriteState {
                tasks: self.tasks.clone(),
                state: self.start,
            })
        }

        fn stop_job(&self, _source_app_name: &str, _task_id: &str, _op_spec: &ClusterOpSpec) -> Arc<dyn Job> {
            Arc::new(WriteState {
                tasks: self.tasks.clone(),
                state: Some(TaskState::Stopped),
            })
        }
    }

    fn runner(tasks: &Arc<InMemoryTaskStore>, start: Option<TaskState>) -> Arc<TaskRunner> {
        TaskRunner::new(
            "app",
            "t1",
            tasks.clone(),
            Arc::new(TokioJobExecutor::new()),
            Arc::new(Jobs {
                tasks: tasks.clone(),
                start,
            }),
        )
    }

    #[test]
    fn test_stale_active_task_is_lost() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let runner = runner(&tasks, None);
        assert_eq!(runner.update_current_state(), None);

        let mut stale = task(TaskState::Running);
        stale.updated = Utc::now() - ChronoDuration::minutes(2);
        tasks.update_task("app", "t1", &stale);

        assert_eq!(runner.update_current_state(), Some(TaskState::Lost));
        assert_eq!(runner.current_state(), Some(TaskState::Lost));
        assert_eq!(tasks.task("app", "t1").map(|t| t.state), Some(TaskState::Lost));
    }

    #[test]
    fn test_fresh_task_state_is_tracked() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        tasks.update_task("app", "t1", &task(TaskState::Running));
        let runner = runner(&tasks, None);

        assert_eq!(runner.update_current_state(), Some(TaskState::Running));
        assert_eq!(runner.current_state(), Some(TaskState::Running));
        assert_eq!(runner.run_task_id(), "app-t1");
    }

    #[tokio::test]
    async fn test_monitor_completes_after_stop() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let runner = runner(&tasks, Some(TaskState::Running));
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(runner.clone().monitor(tx));

        let spec = TaskSpec::new("app", "t1", bosun_types::Executable::docker("t:1"));
        assert!(runner.start_task(&spec, &ClusterOpSpec::default()).is_some());
        timeout(Duration::from_secs(5), async {
            while runner.current_state() != Some(TaskState::Running) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(rx.try_recv().is_err());

        assert!(runner.stop_task(&ClusterOpSpec::default()).is_some());
        let done = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(done.run_task_id(), "app-t1");
        assert_eq!(done.current_state(), Some(TaskState::Stopped));
    }

    #[test]
    fn test_vanished_record_is_lost() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        tasks.update_task("app", "t1", &task(TaskState::Running));
        let runner = runner(&tasks, None);
        assert_eq!(runner.update_current_state(), Some(TaskState::Running));

        tasks.delete_task("app", "t1");
        assert_eq!(runner.update_current_state(), Some(TaskState::Lost));
        assert_eq!(runner.current_state(), Some(TaskState::Lost));
        assert!(tasks.task("app", "t1").is_none());
    }

    #[tokio::test]
    async fn test_retired_monitor_exits_without_handoff() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let runner = runner(&tasks, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = tokio::spawn(runner.clone().monitor(tx));

        runner.retire();
        timeout(Duration::from_secs(5), monitor).await.unwrap().unwrap();
        assert!(runner.is_retired());
        assert_eq!(runner.current_state(), None);
        // Sender dropped with the monitor, nothing was sent
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_start_marks_lost() {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let runner = runner(&tasks, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(runner.clone().monitor(tx));

        let spec = TaskSpec::new("app", "t1", bosun_types::Executable::docker("t:1"));
        assert!(runner.start_task(&spec, &ClusterOpSpec::default()).is_some());
        let done = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(done.current_state(), Some(TaskState::Lost));
    }
}
