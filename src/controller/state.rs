use super::collaborators::InterventionOutcome;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Stopped,
    Listening,
    Predictive,
    Soothing,
    Cooldown,
}

impl ControllerState {
    pub fn label(self) -> &'static str {
        match self {
            ControllerState::Stopped => "stopped",
            ControllerState::Listening => "listening",
            ControllerState::Predictive => "predictive",
            ControllerState::Soothing => "soothing",
            ControllerState::Cooldown => "cooldown",
        }
    }

    /// Whether an unrest event is in progress.
    pub fn is_intervening(self) -> bool {
        matches!(self, ControllerState::Soothing | ControllerState::Cooldown)
    }
}

/// Why the controller moved between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    SessionStarted,
    StartConfirmed,
    RisingTrend,
    PredictiveEscalated,
    PredictiveTimeout,
    PredictiveCalmed,
    CalmConfirmed,
    Retriggered,
    CooldownElapsed,
    PanicStop,
    SessionStopped,
    OutputFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: ControllerState,
    pub to: ControllerState,
    pub reason: TransitionReason,
    pub score: f32,
    pub at_ms: u64,
}

/// Everything the controller tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    Transition(StateTransition),
    Outcome(InterventionOutcome),
}
