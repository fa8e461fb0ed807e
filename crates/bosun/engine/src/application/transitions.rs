//! Application transition table

use super::ApplicationAction;
use bosun_statemachine::Transition;
use bosun_types::ApplicationState::{self, *};

pub fn application_transitions() -> Vec<Transition<ApplicationState, ApplicationAction>> {
    vec![
        Transition::new(Init, ApplicationAction::Create, [Monitoring, Running]),
        Transition::new(
            Monitoring,
            ApplicationAction::Route,
            [OutageDetected, DestroyRequested, ScalingRequested, Monitoring],
        ),
        Transition::new(
            Running,
            ApplicationAction::Route,
            [
                StopInstancesRequested,
                ScalingRequested,
                ReplaceInstancesRequested,
                OutageDetected,
                Running,
            ],
        ),
        Transition::new(OutageDetected, ApplicationAction::Recover, [ScalingRequested]),
        Transition::new(
            ScalingRequested,
            ApplicationAction::Scale,
            [ScalingRequested, Running, Monitoring],
        ),
        Transition::new(
            ReplaceInstancesRequested,
            ApplicationAction::ReplaceInstances,
            [Running, Monitoring],
        ),
        Transition::new(
            StopInstancesRequested,
            ApplicationAction::StopInstances,
            [Running, Monitoring],
        ),
        Transition::new(DestroyRequested, ApplicationAction::Destroy, [Destroyed]),
    ]
}

/// States in which the actor waits for the next operation
pub fn is_paused(state: &ApplicationState) -> bool {
    matches!(state, Monitoring | Running)
}
