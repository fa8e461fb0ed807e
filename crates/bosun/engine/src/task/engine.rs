//! Task engine
//!
//! Keeps one [`TaskRunner`] per live task run, keyed by `"<app>-<task>"`.
//! Runners are reaped once their task reaches a terminal state.

use super::job::JobExecutor;
use super::runner::{TaskJobFactory, TaskRunner};
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::validator::{check_resources, ensure_cmdl_args, ensure_whitelisted_volumes};
use bosun_statestore::{ClusterResourcesStore, LeadershipObserver, TaskStore};
use bosun_types::{
    run_task_id, ClusterOpSpec, LifecycleEvent, TaskInfo, TaskOperation, TaskSpec, TaskState,
    ValidationResult,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

pub struct TaskEngine {
    tasks: Arc<dyn TaskStore>,
    cluster: Arc<dyn ClusterResourcesStore>,
    jobs: Arc<dyn JobExecutor>,
    job_factory: Arc<dyn TaskJobFactory>,
    leadership: Arc<LeadershipObserver>,
    events: Arc<dyn EventBus>,
    config: EngineConfig,
    runners: DashMap<String, Arc<TaskRunner>>,
    completed_tx: mpsc::UnboundedSender<Arc<TaskRunner>>,
}

impl TaskEngine {
    /// Create the engine and spawn its reaper and store watcher
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        cluster: Arc<dyn ClusterResourcesStore>,
        jobs: Arc<dyn JobExecutor>,
        job_factory: Arc<dyn TaskJobFactory>,
        leadership: Arc<LeadershipObserver>,
        events: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let state_changes = tasks.subscribe_state_changes();
        let engine = Arc::new(Self {
            tasks,
            cluster,
            jobs,
            job_factory,
            leadership,
            events,
            config,
            runners: DashMap::new(),
            completed_tx,
        });

        tokio::spawn(
            Self::reap_completed(Arc::downgrade(&engine), completed_rx)
                .instrument(info_span!("task_runner_reaper")),
        );
        tokio::spawn(
            Self::watch_state_changes(Arc::downgrade(&engine), state_changes)
                .instrument(info_span!("task_state_watcher")),
        );
        engine
    }

    #[instrument(skip(self, operation), fields(job_type = "TASK"))]
    pub fn handle_task_op(&self, operation: TaskOperation) -> ValidationResult {
        match operation {
            TaskOperation::Create { spec, op_spec } => self.create_task(&spec, &op_spec),
            TaskOperation::Kill {
                source_app_name,
                task_id,
                op_spec,
            } => {
                let Some(runner) = self.runner(&source_app_name, &task_id) else {
                    return ValidationResult::failure(format!(
                        "Either task does not exist or has already finished for {}/{}",
                        source_app_name, task_id
                    ));
                };
                match runner.stop_task(&op_spec) {
                    Some(_) => ValidationResult::success(),
                    None => ValidationResult::failure("Could not schedule job to stop the task."),
                }
            }
        }
    }

    fn create_task(&self, spec: &TaskSpec, op_spec: &ClusterOpSpec) -> ValidationResult {
        let mut errors = ensure_whitelisted_volumes(&spec.volumes, &self.config.admission);
        errors.extend(ensure_cmdl_args(&spec.args, &self.config.admission));
        errors.extend(check_resources(self.cluster.as_ref(), &spec.resources, 1));
        if !errors.is_empty() {
            return ValidationResult::failures(errors);
        }

        let id = run_task_id(&spec.source_app_name, &spec.task_id);
        let duplicate = || {
            ValidationResult::failure(format!(
                "Task already exists for {}/{} with taskID: {}",
                spec.source_app_name, spec.task_id, id
            ))
        };
        if self.tasks.task(&spec.source_app_name, &spec.task_id).is_some() {
            return duplicate();
        }
        let runner = match self.runners.entry(id.clone()) {
            Entry::Occupied(_) => return duplicate(),
            Entry::Vacant(entry) => entry
                .insert(self.create_runner(&spec.source_app_name, &spec.task_id))
                .clone(),
        };

        match runner.start_task(spec, op_spec) {
            Some(session_id) => {
                info!(run_task_id = %id, session_id = %session_id, "Task start scheduled");
                ValidationResult::success()
            }
            None => {
                self.runners.remove_if(&id, |_, r| Arc::ptr_eq(r, &runner));
                runner.retire();
                ValidationResult::failure("Could not schedule job to start the task.")
            }
        }
    }

    /// Runner for a task, created if missing
    pub fn register_task_runner(&self, source_app_name: &str, task_id: &str) -> Arc<TaskRunner> {
        self.runners
            .entry(run_task_id(source_app_name, task_id))
            .or_insert_with(|| self.create_runner(source_app_name, task_id))
            .clone()
    }

    /// Kill a task that runs on the cluster without a runner
    pub fn handle_zombie_task(&self, source_app_name: &str, task_id: &str) {
        if self.runner(source_app_name, task_id).is_some() {
            debug!(source_app = %source_app_name, task_id = %task_id, "Task exists as expected");
            return;
        }
        info!(source_app = %source_app_name, task_id = %task_id, "Task is zombie and needs to be killed");
        let runner = self.register_task_runner(source_app_name, task_id);
        if runner.stop_task(&self.config.default_op_spec).is_none() {
            warn!(source_app = %source_app_name, task_id = %task_id, "Could not schedule job to kill zombie task");
        }
    }

    /// Stored active tasks that have a live runner
    pub fn active_tasks(&self) -> Vec<TaskInfo> {
        let runners: Vec<Arc<TaskRunner>> = self.runners.iter().map(|r| r.value().clone()).collect();
        runners
            .iter()
            .filter_map(|runner| self.tasks.task(runner.source_app_name(), runner.task_id()))
            .filter(|task| task.state.is_active())
            .collect()
    }

    pub fn runner(&self, source_app_name: &str, task_id: &str) -> Option<Arc<TaskRunner>> {
        self.runners
            .get(&run_task_id(source_app_name, task_id))
            .map(|r| r.value().clone())
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    /// Refresh every runner from the store; leader only
    pub fn monitor_runners(&self) {
        if !self.leadership.is_leader() {
            info!("Task check skipped as this node is not the leader");
            return;
        }
        let runners: Vec<Arc<TaskRunner>> = self.runners.iter().map(|r| r.value().clone()).collect();
        for runner in runners {
            if runner.update_current_state() == Some(TaskState::Lost) {
                info!(
                    source_app = %runner.source_app_name(),
                    task_id = %runner.task_id(),
                    "Task is lost. Runner will be stopped."
                );
            }
        }
        debug!("Task check completed");
    }

    /// Run [`TaskEngine::monitor_runners`] on the configured interval
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let period = self.config.task_monitor_interval();
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let Some(engine) = engine.upgrade() else {
                        break;
                    };
                    engine.monitor_runners();
                }
                debug!("Task monitor exited");
            }
            .instrument(info_span!("task_monitor")),
        )
    }

    fn create_runner(&self, source_app_name: &str, task_id: &str) -> Arc<TaskRunner> {
        let runner = TaskRunner::new(
            source_app_name,
            task_id,
            self.tasks.clone(),
            self.jobs.clone(),
            self.job_factory.clone(),
        );
        let span = info_span!("task_runner", run_task_id = %runner.run_task_id());
        tokio::spawn(runner.clone().monitor(self.completed_tx.clone()).instrument(span));
        runner
    }

    async fn reap_completed(engine: Weak<Self>, mut completed_rx: mpsc::UnboundedReceiver<Arc<TaskRunner>>) {
        while let Some(runner) = completed_rx.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            engine
                .runners
                .remove_if(&runner.run_task_id(), |_, r| Arc::ptr_eq(r, &runner));
            info!(
                source_app = %runner.source_app_name(),
                task_id = %runner.task_id(),
                state = ?runner.current_state(),
                "Task completed"
            );
            engine.events.publish(LifecycleEvent::TaskCompleted {
                source_app_name: runner.source_app_name().to_string(),
                task_id: runner.task_id().to_string(),
            });
        }
    }

    async fn watch_state_changes(engine: Weak<Self>, mut state_changes: broadcast::Receiver<TaskInfo>) {
        loop {
            let task = match state_changes.recv().await {
                Ok(task) => task,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Task state watcher lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(engine) = engine.upgrade() else {
                break;
            };
            engine.events.publish(LifecycleEvent::TaskStateChange {
                source_app_name: task.source_app_name.clone(),
                task_id: task.task_id.clone(),
                state: task.state,
            });
            if task.state != TaskState::Running {
                continue;
            }
            if !engine.leadership.is_leader() {
                debug!("Zombie task check skipped as node is not leader");
                continue;
            }
            engine.handle_zombie_task(&task.source_app_name, &task.task_id);
        }
    }
}

impl Drop for TaskEngine {
    fn drop(&mut self) {
        for runner in self.runners.iter() {
            runner.retire();
        }
    }
}
