//! Seams between the controller and the components it drives or informs.

use super::state::ControllerEvent;
use crate::error::PipelineError;
use crate::lock_or_recover;
use crate::synth::{SoundKind, SoundProfile, SynthCommand};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Playback control as seen by the controller. Requests must not block on
/// the audio device.
pub trait SoundOutput: Send {
    /// Start playback, or switch profile and volume if already playing.
    fn play(&mut self, profile: SoundProfile, volume: f32) -> Result<(), PipelineError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), PipelineError>;
    fn stop(&mut self) -> Result<(), PipelineError>;
    fn is_playing(&self) -> bool;
}

#[derive(Debug, Default)]
struct ProbeState {
    commands: Vec<SynthCommand>,
    playing: bool,
    volume: f32,
    profile: Option<SoundProfile>,
    fail_play: bool,
}

/// Records every command; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct OutputProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl OutputProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `play` fail as if the sink could not be opened.
    pub fn fail_play(&self, fail: bool) {
        lock_or_recover(&self.state, "OutputProbe::fail_play").fail_play = fail;
    }

    pub fn commands(&self) -> Vec<SynthCommand> {
        lock_or_recover(&self.state, "OutputProbe::commands")
            .commands
            .clone()
    }

    pub fn volume(&self) -> f32 {
        lock_or_recover(&self.state, "OutputProbe::volume").volume
    }

    pub fn playing(&self) -> bool {
        lock_or_recover(&self.state, "OutputProbe::playing").playing
    }

    pub fn profile(&self) -> Option<SoundProfile> {
        lock_or_recover(&self.state, "OutputProbe::profile").profile
    }
}

impl SoundOutput for OutputProbe {
    fn play(&mut self, profile: SoundProfile, volume: f32) -> Result<(), PipelineError> {
        let mut state = lock_or_recover(&self.state, "OutputProbe::play");
        if state.fail_play {
            return Err(PipelineError::InitializationFailure {
                device: "playback",
                reason: "probe configured to fail".to_string(),
            });
        }
        let command = if state.playing {
            SynthCommand::ChangeProfile(profile)
        } else {
            SynthCommand::Start(profile)
        };
        state.commands.push(command);
        state.commands.push(SynthCommand::SetVolume(volume));
        state.playing = true;
        state.volume = volume;
        state.profile = Some(profile);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), PipelineError> {
        let mut state = lock_or_recover(&self.state, "OutputProbe::set_volume");
        state.commands.push(SynthCommand::SetVolume(volume));
        state.volume = volume;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        let mut state = lock_or_recover(&self.state, "OutputProbe::stop");
        state.commands.push(SynthCommand::Stop);
        state.playing = false;
        state.volume = 0.0;
        state.profile = None;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing()
    }
}

/// What the selection policy picked for one intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileChoice {
    pub kind: SoundKind,
    /// Intervention level, 1..=3.
    pub level: u8,
    /// Metadata only; never changes controller behavior.
    pub is_exploration: bool,
}

impl ProfileChoice {
    /// Share of the volume cap used at this level.
    pub fn volume_fraction(&self) -> f32 {
        match self.level {
            0 | 1 => 0.5,
            2 => 0.75,
            _ => 1.0,
        }
    }
}

pub trait ProfileSelector: Send {
    fn select_best_profile(&mut self, baseline_mode: bool) -> ProfileChoice;
}

/// Always picks the same sound and level.
#[derive(Debug, Clone, Copy)]
pub struct FixedProfileSelector {
    choice: ProfileChoice,
}

impl FixedProfileSelector {
    pub fn new(kind: SoundKind, level: u8) -> Self {
        Self {
            choice: ProfileChoice {
                kind,
                level: level.clamp(1, 3),
                is_exploration: false,
            },
        }
    }
}

impl Default for FixedProfileSelector {
    fn default() -> Self {
        Self::new(SoundKind::OceanBreath, 2)
    }
}

impl ProfileSelector for FixedProfileSelector {
    fn select_best_profile(&mut self, _baseline_mode: bool) -> ProfileChoice {
        self.choice
    }
}

/// Summary of one completed unrest event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InterventionOutcome {
    pub kind: SoundKind,
    pub level: u8,
    pub baseline_mode: bool,
    pub effective: bool,
    pub delta_score: f32,
    pub trigger_score: f32,
    pub peak_score: f32,
    pub duration_ms: u64,
    pub was_exploration: bool,
}

pub trait OutcomeReporter: Send {
    fn on_intervention_complete(&mut self, outcome: &InterventionOutcome);
}

/// Writes each outcome as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutcomeReporter;

impl OutcomeReporter for TracingOutcomeReporter {
    fn on_intervention_complete(&mut self, outcome: &InterventionOutcome) {
        tracing::info!(
            sound = outcome.kind.label(),
            level = outcome.level,
            baseline_mode = outcome.baseline_mode,
            effective = outcome.effective,
            delta_score = outcome.delta_score,
            peak_score = outcome.peak_score,
            duration_ms = outcome.duration_ms,
            exploration = outcome.was_exploration,
            "intervention complete"
        );
    }
}

/// Forwards outcomes as [`ControllerEvent::Outcome`], then to an optional
/// downstream reporter.
pub struct ChannelOutcomeReporter {
    sender: Sender<ControllerEvent>,
    downstream: Option<Box<dyn OutcomeReporter>>,
}

impl ChannelOutcomeReporter {
    pub fn new(sender: Sender<ControllerEvent>) -> Self {
        Self {
            sender,
            downstream: None,
        }
    }

    pub fn with_downstream(mut self, downstream: Box<dyn OutcomeReporter>) -> Self {
        self.downstream = Some(downstream);
        self
    }
}

impl OutcomeReporter for ChannelOutcomeReporter {
    fn on_intervention_complete(&mut self, outcome: &InterventionOutcome) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.sender.send(ControllerEvent::Outcome(*outcome));
        if let Some(downstream) = self.downstream.as_mut() {
            downstream.on_intervention_complete(outcome);
        }
    }
}
