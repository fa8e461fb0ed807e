//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bosun_engine::application::{ApplicationAction, ApplicationContext, ApplicationMachine};
use bosun_engine::{ApplicationLifecycleEngine, BroadcastEventBus, EngineConfig};
use bosun_statemachine::{Action, ActionError, ActionFactory, MachineContext, MachineState, StateData};
use bosun_statestore::{
    ApplicationStateStore, CachingProxyApplicationStore, CachingProxyInstanceStore,
    InMemoryApplicationStore, InMemoryClusterResources, InMemoryInstanceStore, InstanceInfoStore,
    LeadershipObserver,
};
use bosun_types::{
    ApplicationOperation, ApplicationSpec, ApplicationState, ClusterOpSpec, DeployableId,
    EventEnvelope, Executable, ExecutorId, ExecutorResourceSnapshot, InstanceId, InstanceInfo,
    InstanceState, LifecycleEvent,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "bosun_engine=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn app_spec() -> ApplicationSpec {
    ApplicationSpec::new("TEST_APP", "1", Executable::docker("test:1")).with_resources(1, 512)
}

pub fn create_op(instances: u64) -> ApplicationOperation {
    ApplicationOperation::Create {
        spec: app_spec(),
        instances,
        op_spec: ClusterOpSpec::default(),
    }
}

/// Cluster double: instance work lands directly in the instance store
pub struct SimulatedCluster {
    pub applications: Arc<dyn ApplicationStateStore>,
    pub instances: Arc<dyn InstanceInfoStore>,
}

impl SimulatedCluster {
    fn healthy_instances(&self, app_id: &DeployableId) -> Vec<InstanceInfo> {
        self.instances.instances(app_id, &[InstanceState::Healthy], true)
    }

    /// Start or stop instances until exactly `count` are healthy
    fn converge(&self, app_id: &DeployableId, app_name: &str, count: u64) {
        let healthy = self.healthy_instances(app_id);
        let current = healthy.len() as u64;
        if current > count {
            for instance in healthy.iter().skip(count as usize) {
                self.instances.delete_instance_state(app_id, &instance.instance_id);
            }
            return;
        }
        for _ in current..count {
            let instance_id = InstanceId::generate();
            let info = InstanceInfo {
                app_id: app_id.clone(),
                app_name: app_name.to_string(),
                instance_id: instance_id.clone(),
                executor_id: ExecutorId::new("e1"),
                hostname: "e1".to_string(),
                resources: vec![],
                state: InstanceState::Healthy,
                error_message: None,
                created: Utc::now(),
                updated: Utc::now(),
            };
            self.instances.update_instance_state(app_id, &instance_id, &info);
        }
    }

    fn settled(count: u64) -> ApplicationState {
        if count > 0 {
            ApplicationState::Running
        } else {
            ApplicationState::Monitoring
        }
    }
}

type Transition = Result<Option<MachineState<ApplicationMachine>>, ActionError>;

struct Step {
    name: &'static str,
    cluster: Arc<SimulatedCluster>,
    run: fn(&SimulatedCluster, &ApplicationContext, &MachineState<ApplicationMachine>) -> Transition,
}

#[async_trait]
impl Action<ApplicationMachine> for Step {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        context: &ApplicationContext,
        current: &MachineState<ApplicationMachine>,
    ) -> Transition {
        (self.run)(&self.cluster, context, current)
    }
}

fn create(cluster: &SimulatedCluster, context: &ApplicationContext, current: &MachineState<ApplicationMachine>) -> Transition {
    let count = current.data.instances;
    if !cluster.applications.update_application_state(context.app_id(), &current.data) {
        return Err(ActionError::Failed("could not record app".to_string()));
    }
    cluster.converge(context.app_id(), &context.spec().name, count);
    context.updates().ack();
    Ok(Some(StateData::from_previous(current, SimulatedCluster::settled(count))))
}

fn scale(cluster: &SimulatedCluster, context: &ApplicationContext, current: &MachineState<ApplicationMachine>) -> Transition {
    let Some(ApplicationOperation::Scale { required_instances, .. }) = context.updates().get() else {
        return Ok(None);
    };
    cluster.converge(context.app_id(), &context.spec().name, required_instances);
    context.updates().ack();
    Ok(Some(StateData::from_previous(current, SimulatedCluster::settled(required_instances))))
}

fn recover(_cluster: &SimulatedCluster, context: &ApplicationContext, current: &MachineState<ApplicationMachine>) -> Transition {
    context.updates().ack();
    Ok(Some(StateData::from_previous(current, ApplicationState::ScalingRequested)))
}

fn stop_or_replace(cluster: &SimulatedCluster, context: &ApplicationContext, current: &MachineState<ApplicationMachine>) -> Transition {
    context.updates().ack();
    let healthy = cluster.healthy_instances(context.app_id()).len() as u64;
    Ok(Some(StateData::from_previous(current, SimulatedCluster::settled(healthy))))
}

fn destroy(cluster: &SimulatedCluster, context: &ApplicationContext, current: &MachineState<ApplicationMachine>) -> Transition {
    cluster.converge(context.app_id(), &context.spec().name, 0);
    context.updates().ack();
    Ok(Some(StateData::from_previous(current, ApplicationState::Destroyed)))
}

fn unrouted(_cluster: &SimulatedCluster, _context: &ApplicationContext, _current: &MachineState<ApplicationMachine>) -> Transition {
    Err(ActionError::Failed("routing is built into the engine".to_string()))
}

pub struct SimulatedActions {
    cluster: Arc<SimulatedCluster>,
}

impl ActionFactory<ApplicationMachine> for SimulatedActions {
    fn create(&self, key: ApplicationAction) -> Arc<dyn Action<ApplicationMachine>> {
        let (name, run): (&'static str, fn(&SimulatedCluster, &ApplicationContext, &MachineState<ApplicationMachine>) -> Transition) =
            match key {
                ApplicationAction::Create => ("create", create),
                ApplicationAction::Scale => ("scale", scale),
                ApplicationAction::Recover => ("recover", recover),
                ApplicationAction::StopInstances => ("stop_instances", stop_or_replace),
                ApplicationAction::ReplaceInstances => ("replace_instances", stop_or_replace),
                ApplicationAction::Destroy => ("destroy", destroy),
                ApplicationAction::Route => ("route", unrouted),
            };
        Arc::new(Step {
            name,
            cluster: self.cluster.clone(),
            run,
        })
    }
}

pub struct Harness {
    pub engine: Arc<ApplicationLifecycleEngine>,
    pub applications: Arc<CachingProxyApplicationStore>,
    pub instances: Arc<CachingProxyInstanceStore>,
    pub events: Arc<BroadcastEventBus>,
    pub leadership: LeadershipObserver,
}

/// Application engine over caching proxies and a single four core executor
pub fn harness() -> Harness {
    harness_over(Arc::new(InMemoryApplicationStore::new()))
}

/// Same as [`harness`] with `applications` as the durable app store
pub fn harness_over(applications: Arc<dyn ApplicationStateStore>) -> Harness {
    init_tracing();
    let leadership = LeadershipObserver::new(true);
    let applications = CachingProxyApplicationStore::new(applications, &leadership);
    let instances = CachingProxyInstanceStore::new(Arc::new(InMemoryInstanceStore::new()), &leadership);
    let resources = Arc::new(InMemoryClusterResources::new());
    resources.add_executor(ExecutorResourceSnapshot {
        executor_id: ExecutorId::new("e1"),
        hostname: "e1".to_string(),
        free_cores: BTreeMap::from([(0, (0..4).collect())]),
        free_memory: BTreeMap::from([(0, 4096)]),
        layout: None,
        blacklisted: false,
    });
    let config = EngineConfig::default();
    let events = Arc::new(BroadcastEventBus::from_config(&config));
    let actions = Arc::new(SimulatedActions {
        cluster: Arc::new(SimulatedCluster {
            applications: applications.clone(),
            instances: instances.clone(),
        }),
    });
    let engine = ApplicationLifecycleEngine::for_applications(
        applications.clone(),
        instances.clone(),
        resources,
        actions,
        events.clone(),
        config,
    );
    Harness {
        engine,
        applications,
        instances,
        events,
        leadership,
    }
}

pub async fn wait_for_state(engine: &ApplicationLifecycleEngine, app_id: &DeployableId, state: ApplicationState) {
    timeout(Duration::from_secs(5), async {
        while engine.current_state(app_id) != Some(state) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {}", app_id, state));
}

/// Application states published until `last` is seen
pub async fn collect_states(
    rx: &mut broadcast::Receiver<EventEnvelope>,
    last: ApplicationState,
) -> Vec<ApplicationState> {
    let mut states = Vec::new();
    let seen = timeout(Duration::from_secs(5), async {
        loop {
            let envelope = rx.recv().await.expect("event stream closed");
            if let LifecycleEvent::ApplicationStateChange { state, .. } = envelope.event {
                states.push(state);
                if state == last {
                    break;
                }
            }
        }
    })
    .await;
    assert!(seen.is_ok(), "{} was never published, saw {:?}", last, states);
    states
}
