//! Local service transition table

use super::LocalServiceAction;
use bosun_statemachine::Transition;
use bosun_types::LocalServiceState::{self, *};

const ROUTED: [LocalServiceState; 9] = [
    ActivationRequested,
    DeactivationRequested,
    ConfigTestingRequested,
    UpdatingInstancesCount,
    AdjustingInstances,
    ReplacingInstances,
    StoppingInstances,
    DestroyRequested,
    Destroyed,
];

fn route(from: LocalServiceState) -> Transition<LocalServiceState, LocalServiceAction> {
    Transition::new(
        from,
        LocalServiceAction::Route,
        ROUTED.into_iter().chain(std::iter::once(from)),
    )
}

pub fn local_service_transitions() -> Vec<Transition<LocalServiceState, LocalServiceAction>> {
    vec![
        Transition::new(Init, LocalServiceAction::Create, [Inactive, Active, Destroyed]),
        route(Active),
        route(Inactive),
        route(ConfigTesting),
        Transition::new(ActivationRequested, LocalServiceAction::Activate, [Active, Destroyed]),
        Transition::new(DeactivationRequested, LocalServiceAction::Deactivate, [Inactive, Destroyed]),
        Transition::new(
            ConfigTestingRequested,
            LocalServiceAction::DeployTestInstance,
            [ConfigTesting, Inactive, Destroyed],
        ),
        Transition::new(
            UpdatingInstancesCount,
            LocalServiceAction::UpdateInstanceCount,
            [Active, Inactive, ConfigTesting, Destroyed],
        ),
        Transition::new(
            AdjustingInstances,
            LocalServiceAction::AdjustInstances,
            [Active, Inactive, ConfigTesting, EmergencyDeactivationRequested],
        ),
        Transition::new(
            ReplacingInstances,
            LocalServiceAction::ReplaceInstances,
            [ReplacingInstances, Active, Inactive, ConfigTesting],
        ),
        Transition::new(
            StoppingInstances,
            LocalServiceAction::StopInstances,
            [Active, Inactive, ConfigTesting],
        ),
        Transition::new(
            EmergencyDeactivationRequested,
            LocalServiceAction::EmergencyDeactivation,
            [EmergencyDeactivationRequested, DeactivationRequested],
        ),
        Transition::new(DestroyRequested, LocalServiceAction::Destroy, [Destroyed]),
    ]
}

/// States in which the actor waits for the next operation
pub fn is_paused(state: &LocalServiceState) -> bool {
    matches!(state, Active | Inactive | ConfigTesting | EmergencyDeactivationRequested)
}
