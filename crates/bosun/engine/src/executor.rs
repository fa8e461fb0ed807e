//! State machine executor
//!
//! One executor owns one machine and drives it on its own tokio task. After
//! each pass it parks while the machine sits in a paused state, and wakes
//! when an update is staged or the executor is stopped. The loop ends on a
//! terminal state or once the machine reports it has been stopped.

use crate::config::RetrySpec;
use bosun_statemachine::{StateMachine, StateMachineTypes};
use bosun_types::DeployableId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Machine kind with a lifecycle: some states park the executor, some end it
pub trait LifecycleMachine: StateMachineTypes {
    fn is_paused(state: &Self::State) -> bool;

    fn is_terminal(state: &Self::State) -> bool;
}

pub struct StateMachineExecutor<M: LifecycleMachine> {
    deployable_id: DeployableId,
    job_type: &'static str,
    machine: StateMachine<M>,
    wake: AtomicBool,
    resume: Notify,
    stopped: AtomicBool,
    handle: Mutex<Option<JoinHandle<Option<M::State>>>>,
    completed: Option<mpsc::UnboundedSender<Arc<Self>>>,
    stop_retry: RetrySpec,
    error_backoff: Duration,
}

impl<M: LifecycleMachine> StateMachineExecutor<M> {
    pub fn new(
        deployable_id: DeployableId,
        job_type: &'static str,
        machine: StateMachine<M>,
        stop_retry: RetrySpec,
        error_backoff: Duration,
    ) -> Self {
        Self {
            deployable_id,
            job_type,
            machine,
            wake: AtomicBool::new(false),
            resume: Notify::new(),
            stopped: AtomicBool::new(false),
            handle: Mutex::new(None),
            completed: None,
            stop_retry,
            error_backoff,
        }
    }

    /// Hand the executor to `sender` once its loop exits
    pub fn with_completion_handler(mut self, sender: mpsc::UnboundedSender<Arc<Self>>) -> Self {
        self.completed = Some(sender);
        self
    }

    pub fn deployable_id(&self) -> &DeployableId {
        &self.deployable_id
    }

    pub fn job_type(&self) -> &'static str {
        self.job_type
    }

    pub fn state_machine(&self) -> &StateMachine<M> {
        &self.machine
    }

    pub fn current_state(&self) -> M::State {
        self.machine.current_state()
    }

    /// True while the loop task is alive
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the loop task; a second call is ignored
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.stopped.load(Ordering::SeqCst) {
            warn!(deployable_id = %self.deployable_id, "State machine executor already started or stopped");
            return;
        }
        let span = info_span!(
            "state_machine",
            deployable_id = %self.deployable_id,
            job_type = self.job_type
        );
        let executor = self.clone();
        *handle = Some(tokio::spawn(executor.run().instrument(span)));
    }

    /// Stage an update and wake the loop; false if one is already pending
    pub fn notify_update(&self, update: M::Update) -> bool {
        if !self.machine.notify_update(update) {
            return false;
        }
        self.wake.store(true, Ordering::SeqCst);
        self.resume.notify_one();
        true
    }

    /// Stop the machine and wait, bounded by the retry spec, for the loop to end
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!(deployable_id = %self.deployable_id, "State machine executor already stopped");
            return;
        }
        self.machine.stop();
        self.resume.notify_one();

        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            info!(deployable_id = %self.deployable_id, "State machine was never started");
            return;
        };

        if !self.stop_retry.wait_until(|| handle.is_finished()).await {
            warn!(
                deployable_id = %self.deployable_id,
                "Could not ensure state machine has shut down. There might be a leak somewhere."
            );
            handle.abort();
            return;
        }

        match handle.await {
            Ok(state) => info!(
                deployable_id = %self.deployable_id,
                final_state = ?state,
                "State machine has shut down"
            ),
            Err(e) if e.is_cancelled() => {
                info!(deployable_id = %self.deployable_id, "State machine has been stopped by cancellation")
            }
            Err(e) => error!(
                deployable_id = %self.deployable_id,
                error = %e,
                "State machine shut down with error"
            ),
        }
    }

    async fn run(self: Arc<Self>) -> Option<M::State> {
        info!("State machine started");
        let mut state = None;
        loop {
            match self.machine.execute().await {
                Ok(None) => break,
                Ok(Some(current)) => {
                    state = Some(current);
                    if M::is_terminal(&current) {
                        break;
                    }
                    if M::is_paused(&current) {
                        self.park(current).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error running action");
                    tokio::time::sleep(self.error_backoff).await;
                    let current = self.machine.current_state();
                    if M::is_paused(&current) {
                        self.park(current).await;
                    }
                }
            }
        }
        info!(final_state = ?state, "State machine exited");
        if let Some(completed) = &self.completed {
            let _ = completed.send(self.clone());
        }
        state
    }

    async fn park(&self, state: M::State) {
        info!(state = %state, "State machine suspended");
        loop {
            if self.wake.swap(false, Ordering::SeqCst) || self.machine.is_stopped() {
                break;
            }
            self.resume.notified().await;
        }
        info!("State machine resumed");
    }
}
