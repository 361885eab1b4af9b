//! Intervention state machine.
//!
//! The controller consumes one [`UnrestScore`] at a time on the analysis
//! worker and drives a [`SoundOutput`] through the listening, predictive,
//! soothing and cooldown phases of an unrest event. Every guard is a
//! "held continuously for N seconds" check measured on score timestamps.

mod collaborators;
mod state;
#[cfg(test)]
mod tests;

use crate::analysis::UnrestScore;
use crate::config::InterventionConfig;
use crate::error::PipelineError;
use crate::gradient::GradientEstimator;
use crate::synth::SoundProfile;

pub use collaborators::{
    ChannelOutcomeReporter, FixedProfileSelector, InterventionOutcome, OutcomeReporter,
    OutputProbe, ProfileChoice, ProfileSelector, SoundOutput, TracingOutcomeReporter,
};
pub use state::{ControllerEvent, ControllerState, StateTransition, TransitionReason};

pub type TransitionListener = Box<dyn FnMut(&StateTransition) + Send>;

/// Start instants of each pending confirmation.
#[derive(Debug, Default, Clone, Copy)]
struct ConfirmTimers {
    start: Option<u64>,
    predictive: Option<u64>,
    calm: Option<u64>,
    retrigger: Option<u64>,
    above_start: Option<u64>,
}

/// Returns true once `condition` has held for `secs` seconds. A false
/// condition restarts the confirmation.
fn held(since: &mut Option<u64>, condition: bool, now_ms: u64, secs: u32) -> bool {
    if !condition {
        *since = None;
        return false;
    }
    let started = *since.get_or_insert(now_ms);
    now_ms.saturating_sub(started) >= u64::from(secs) * 1_000
}

#[derive(Debug, Clone, Copy)]
struct Episode {
    choice: ProfileChoice,
    baseline_mode: bool,
    intervention_volume: f32,
    soothing: bool,
    trigger_score: f32,
    peak_score: f32,
    last_score: f32,
    started_ms: u64,
    soothing_since: u64,
    last_escalation_ms: Option<u64>,
    escalations: u32,
}

#[derive(Debug, Clone, Copy)]
struct Cooldown {
    started_ms: u64,
    total_ms: u64,
    start_volume: f32,
    remaining_ms: u64,
}

pub struct InterventionController {
    config: InterventionConfig,
    output: Box<dyn SoundOutput>,
    selector: Box<dyn ProfileSelector>,
    reporter: Box<dyn OutcomeReporter>,
    listener: Option<TransitionListener>,
    state: ControllerState,
    timers: ConfirmTimers,
    episode: Option<Episode>,
    cooldown: Option<Cooldown>,
    predictive_since: Option<u64>,
    volume: f32,
    last_score: f32,
    last_score_ms: Option<u64>,
}

impl InterventionController {
    pub fn new(
        config: InterventionConfig,
        output: Box<dyn SoundOutput>,
        selector: Box<dyn ProfileSelector>,
        reporter: Box<dyn OutcomeReporter>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            output,
            selector,
            reporter,
            listener: None,
            state: ControllerState::Stopped,
            timers: ConfirmTimers::default(),
            episode: None,
            cooldown: None,
            predictive_since: None,
            volume: 0.0,
            last_score: 0.0,
            last_score_ms: None,
        })
    }

    pub fn set_transition_listener(&mut self, listener: TransitionListener) {
        self.listener = Some(listener);
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &InterventionConfig {
        &self.config
    }

    /// Replace the tunables. Only allowed between sessions.
    pub fn set_config(&mut self, config: InterventionConfig) -> Result<(), PipelineError> {
        if self.state != ControllerState::Stopped {
            return Err(PipelineError::InvalidConfig(format!(
                "intervention config can only change while stopped (state: {})",
                self.state.label()
            )));
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Volume most recently requested from the output.
    pub fn current_volume(&self) -> f32 {
        self.volume
    }

    pub fn cooldown_remaining_secs(&self) -> u32 {
        match (self.state, self.cooldown) {
            (ControllerState::Cooldown, Some(cooldown)) => cooldown.remaining_ms.div_ceil(1_000) as u32,
            _ => 0,
        }
    }

    /// Escalations used by the current unrest event.
    pub fn escalations(&self) -> u32 {
        self.episode.map_or(0, |episode| episode.escalations)
    }

    pub fn last_score(&self) -> f32 {
        self.last_score
    }

    /// Enter LISTENING. Returns `None` when a session is already running.
    ///
    /// If the baseline sound cannot be started the controller stays STOPPED
    /// and the output error is returned.
    pub fn start(&mut self, now_ms: u64) -> Result<Option<StateTransition>, PipelineError> {
        if self.state != ControllerState::Stopped {
            return Ok(None);
        }
        self.clear();
        self.last_score = 0.0;
        self.last_score_ms = None;
        if self.config.baseline_enabled() {
            let profile = SoundProfile::for_kind(self.config.baseline_kind);
            if let Err(err) = self.output.play(profile, self.config.baseline_volume) {
                let _ = self.output.stop();
                tracing::error!(error = %err, "baseline playback failed; staying stopped");
                return Err(err);
            }
            self.volume = self.config.baseline_volume;
        }
        Ok(Some(self.transition(
            ControllerState::Listening,
            TransitionReason::SessionStarted,
            now_ms,
        )))
    }

    /// Evaluate one score. At most one transition happens per call.
    pub fn process_score(
        &mut self,
        score: &UnrestScore,
        gradient: &GradientEstimator,
    ) -> Result<Option<StateTransition>, PipelineError> {
        if self.state == ControllerState::Stopped {
            return Ok(None);
        }
        let now = score.timestamp_ms;
        if let Some(previous_ms) = self.last_score_ms {
            if now < previous_ms {
                return Err(PipelineError::InvalidTimestamp {
                    previous_ms,
                    next_ms: now,
                });
            }
        }
        self.last_score_ms = Some(now);
        let value = score.value;
        self.last_score = value;
        if let Some(episode) = self.episode.as_mut() {
            episode.last_score = value;
            if episode.soothing {
                episode.peak_score = episode.peak_score.max(value);
            }
        }

        match self.state {
            ControllerState::Stopped => Ok(None),
            ControllerState::Listening => self.evaluate_listening(value, gradient, now),
            ControllerState::Predictive => self.evaluate_predictive(value, gradient, now),
            ControllerState::Soothing => self.evaluate_soothing(value, now),
            ControllerState::Cooldown => self.evaluate_cooldown(value, now),
        }
    }

    /// Advance the cooldown fade. Driven by a 1 Hz timer; times earlier than
    /// the cooldown start are treated as the start.
    pub fn tick(&mut self, now_ms: u64) -> Result<Option<StateTransition>, PipelineError> {
        if self.state != ControllerState::Cooldown {
            return Ok(None);
        }
        self.advance_cooldown(now_ms)
    }

    /// Immediate silence and a return to LISTENING from any active state.
    pub fn panic_stop(&mut self, now_ms: u64) -> Result<Option<StateTransition>, PipelineError> {
        if self.state == ControllerState::Stopped {
            return Ok(None);
        }
        self.report_outcome(now_ms);
        let result = self.output.stop();
        self.clear();
        let transition = self.transition(ControllerState::Listening, TransitionReason::PanicStop, now_ms);
        if let Err(err) = result {
            return Err(self.fault(now_ms, err));
        }
        Ok(Some(transition))
    }

    /// End the session: stop output and clear every timer.
    pub fn stop(&mut self, now_ms: u64) -> Result<Option<StateTransition>, PipelineError> {
        if self.state == ControllerState::Stopped {
            return Ok(None);
        }
        self.report_outcome(now_ms);
        let result = self.output.stop();
        self.clear();
        let transition = self.transition(
            ControllerState::Stopped,
            TransitionReason::SessionStopped,
            now_ms,
        );
        result.map(|_| Some(transition))
    }

    fn evaluate_listening(
        &mut self,
        value: f32,
        gradient: &GradientEstimator,
        now: u64,
    ) -> Result<Option<StateTransition>, PipelineError> {
        let cfg = &self.config;
        let above = value >= cfg.start_threshold;
        if held(&mut self.timers.start, above, now, cfg.start_confirm_sec) {
            return self
                .enter_soothing(value, now, TransitionReason::StartConfirmed)
                .map(Some);
        }
        if cfg.predictive_enabled {
            let rising = gradient.should_trigger_predictive(
                value,
                cfg.predictive_gradient_threshold,
                cfg.start_threshold,
            );
            if held(&mut self.timers.predictive, rising, now, cfg.predictive_confirm_sec) {
                return self.enter_predictive(value, now).map(Some);
            }
        }
        Ok(None)
    }

    fn evaluate_predictive(
        &mut self,
        value: f32,
        gradient: &GradientEstimator,
        now: u64,
    ) -> Result<Option<StateTransition>, PipelineError> {
        let cfg = &self.config;
        let dwell_ms = now.saturating_sub(self.predictive_since.unwrap_or(now));
        if value >= cfg.predictive_escalation_threshold {
            return self
                .enter_soothing(value, now, TransitionReason::PredictiveEscalated)
                .map(Some);
        }
        if dwell_ms >= u64::from(cfg.predictive_timeout_sec) * 1_000 {
            return self
                .enter_soothing(value, now, TransitionReason::PredictiveTimeout)
                .map(Some);
        }
        if gradient.has_calming_trend(cfg.predictive_calm_gradient)
            && dwell_ms >= u64::from(cfg.predictive_min_dwell_sec) * 1_000
        {
            // Predictive-only episodes are never reported.
            self.episode = None;
            self.predictive_since = None;
            self.apply_baseline(now)?;
            return Ok(Some(self.transition(
                ControllerState::Listening,
                TransitionReason::PredictiveCalmed,
                now,
            )));
        }
        Ok(None)
    }

    fn evaluate_soothing(&mut self, value: f32, now: u64) -> Result<Option<StateTransition>, PipelineError> {
        let Some(mut episode) = self.episode else {
            return Err(self.fault(
                now,
                PipelineError::InvalidConfig("soothing without an active episode".to_string()),
            ));
        };
        let cfg = &self.config;

        let above = value >= cfg.start_threshold;
        if above {
            let since = *self.timers.above_start.get_or_insert(now);
            let anchor = since.max(episode.last_escalation_ms.unwrap_or(episode.soothing_since));
            if episode.escalations < cfg.max_escalations
                && now.saturating_sub(anchor) >= u64::from(cfg.escalation_interval_sec) * 1_000
            {
                let volume = (self.volume + cfg.escalation_volume_step).min(cfg.volume_cap);
                if let Err(err) = self.output.set_volume(volume) {
                    return Err(self.fault(now, err));
                }
                episode.escalations += 1;
                episode.last_escalation_ms = Some(now);
                episode.choice.level = (episode.choice.level + 1).min(3);
                episode.intervention_volume = volume;
                self.volume = volume;
                self.episode = Some(episode);
                tracing::info!(
                    escalations = episode.escalations,
                    volume,
                    score = value,
                    "intervention escalated"
                );
            }
        } else {
            self.timers.above_start = None;
        }

        let cfg = &self.config;
        let settled = now.saturating_sub(episode.soothing_since) >= u64::from(cfg.min_soothing_sec) * 1_000;
        if !settled {
            self.timers.calm = None;
            return Ok(None);
        }
        let calm = value <= cfg.calm_threshold;
        if held(&mut self.timers.calm, calm, now, cfg.calm_confirm_sec) {
            return Ok(Some(self.enter_cooldown(now)));
        }
        Ok(None)
    }

    fn evaluate_cooldown(&mut self, value: f32, now: u64) -> Result<Option<StateTransition>, PipelineError> {
        let cfg = &self.config;
        let rising = value >= cfg.retrigger_threshold;
        if held(&mut self.timers.retrigger, rising, now, cfg.retrigger_confirm_sec) {
            let restored = self
                .cooldown
                .map(|cooldown| cooldown.start_volume)
                .or(self.episode.map(|episode| episode.intervention_volume))
                .unwrap_or(self.volume);
            if let Err(err) = self.output.set_volume(restored) {
                return Err(self.fault(now, err));
            }
            self.volume = restored;
            self.cooldown = None;
            self.timers.calm = None;
            self.timers.above_start = None;
            if let Some(episode) = self.episode.as_mut() {
                episode.soothing_since = now;
                episode.peak_score = episode.peak_score.max(value);
            }
            return Ok(Some(self.transition(
                ControllerState::Soothing,
                TransitionReason::Retriggered,
                now,
            )));
        }
        self.advance_cooldown(now)
    }

    fn enter_predictive(&mut self, value: f32, now: u64) -> Result<StateTransition, PipelineError> {
        let episode = self.new_episode(now, value);
        let gentle = (episode.intervention_volume * self.config.predictive_volume_fraction)
            .max(self.config.baseline_volume)
            .min(self.config.volume_cap);
        if let Err(err) = self.output.play(SoundProfile::for_kind(episode.choice.kind), gentle) {
            return Err(self.fault(now, err));
        }
        self.volume = gentle;
        self.episode = Some(episode);
        self.predictive_since = Some(now);
        self.timers.predictive = None;
        self.timers.start = None;
        Ok(self.transition(ControllerState::Predictive, TransitionReason::RisingTrend, now))
    }

    fn enter_soothing(
        &mut self,
        value: f32,
        now: u64,
        reason: TransitionReason,
    ) -> Result<StateTransition, PipelineError> {
        let from_predictive = self.state == ControllerState::Predictive;
        let mut episode = match self.episode.filter(|_| from_predictive) {
            Some(episode) => episode,
            None => self.new_episode(now, value),
        };
        episode.soothing = true;
        episode.trigger_score = value;
        episode.peak_score = value;
        episode.last_score = value;
        episode.started_ms = now;
        episode.soothing_since = now;

        let result = if from_predictive {
            self.output.set_volume(episode.intervention_volume)
        } else {
            self.output.play(
                SoundProfile::for_kind(episode.choice.kind),
                episode.intervention_volume,
            )
        };
        if let Err(err) = result {
            return Err(self.fault(now, err));
        }
        self.volume = episode.intervention_volume;
        self.episode = Some(episode);
        self.predictive_since = None;
        self.timers = ConfirmTimers::default();
        Ok(self.transition(ControllerState::Soothing, reason, now))
    }

    fn enter_cooldown(&mut self, now: u64) -> StateTransition {
        let total_ms = u64::from(self.config.cooldown_sec) * 1_000;
        self.cooldown = Some(Cooldown {
            started_ms: now,
            total_ms,
            start_volume: self.volume,
            remaining_ms: total_ms,
        });
        self.timers.calm = None;
        self.timers.retrigger = None;
        self.timers.above_start = None;
        self.transition(ControllerState::Cooldown, TransitionReason::CalmConfirmed, now)
    }

    fn advance_cooldown(&mut self, now: u64) -> Result<Option<StateTransition>, PipelineError> {
        let Some(cooldown) = self.cooldown.as_mut() else {
            return Ok(None);
        };
        let elapsed = now.saturating_sub(cooldown.started_ms);
        cooldown.remaining_ms = cooldown.remaining_ms.min(cooldown.total_ms.saturating_sub(elapsed));
        let Cooldown {
            total_ms,
            start_volume,
            remaining_ms,
            ..
        } = *cooldown;

        if remaining_ms == 0 {
            self.report_outcome(now);
            self.episode = None;
            self.cooldown = None;
            self.timers = ConfirmTimers::default();
            self.apply_baseline(now)?;
            return Ok(Some(self.transition(
                ControllerState::Listening,
                TransitionReason::CooldownElapsed,
                now,
            )));
        }

        let floor = self.config.baseline_volume;
        let span = (start_volume - floor).max(0.0);
        let target = floor + span * (remaining_ms as f32 / total_ms.max(1) as f32);
        if (target - self.volume).abs() > 1e-4 {
            if let Err(err) = self.output.set_volume(target) {
                return Err(self.fault(now, err));
            }
            self.volume = target;
        }
        Ok(None)
    }

    /// Baseline-only output, or silence when the baseline is off.
    fn apply_baseline(&mut self, now: u64) -> Result<(), PipelineError> {
        let result = if self.config.baseline_enabled() {
            let profile = SoundProfile::for_kind(self.config.baseline_kind);
            self.output.play(profile, self.config.baseline_volume)
        } else {
            self.output.stop()
        };
        if let Err(err) = result {
            return Err(self.fault(now, err));
        }
        self.volume = if self.config.baseline_enabled() {
            self.config.baseline_volume
        } else {
            0.0
        };
        Ok(())
    }

    fn new_episode(&mut self, now: u64, value: f32) -> Episode {
        let baseline_mode = self.config.baseline_enabled();
        let choice = self.selector.select_best_profile(baseline_mode);
        let cap = self.config.volume_cap;
        let intervention_volume = (cap * choice.volume_fraction())
            .max(self.config.baseline_volume)
            .min(cap);
        Episode {
            choice,
            baseline_mode,
            intervention_volume,
            soothing: false,
            trigger_score: value,
            peak_score: value,
            last_score: value,
            started_ms: now,
            soothing_since: now,
            last_escalation_ms: None,
            escalations: 0,
        }
    }

    /// Report the active unrest event once, then forget it.
    fn report_outcome(&mut self, now: u64) {
        let Some(episode) = self.episode.take() else {
            return;
        };
        if !episode.soothing {
            return;
        }
        let outcome = InterventionOutcome {
            kind: episode.choice.kind,
            level: episode.choice.level,
            baseline_mode: episode.baseline_mode,
            effective: episode.last_score <= self.config.calm_threshold,
            delta_score: episode.trigger_score - episode.last_score,
            trigger_score: episode.trigger_score,
            peak_score: episode.peak_score,
            duration_ms: now.saturating_sub(episode.started_ms),
            was_exploration: episode.choice.is_exploration,
        };
        self.reporter.on_intervention_complete(&outcome);
    }

    /// Output failures leave the session unusable: report, silence, STOPPED.
    fn fault(&mut self, now: u64, err: PipelineError) -> PipelineError {
        tracing::error!(error = %err, state = self.state.label(), "sound output failed");
        self.report_outcome(now);
        let _ = self.output.stop();
        self.clear();
        self.transition(ControllerState::Stopped, TransitionReason::OutputFault, now);
        err
    }

    fn clear(&mut self) {
        self.timers = ConfirmTimers::default();
        self.episode = None;
        self.cooldown = None;
        self.predictive_since = None;
        self.volume = 0.0;
    }

    fn transition(&mut self, to: ControllerState, reason: TransitionReason, now: u64) -> StateTransition {
        let transition = StateTransition {
            from: self.state,
            to,
            reason,
            score: self.last_score,
            at_ms: now,
        };
        self.state = to;
        tracing::info!(
            from = transition.from.label(),
            to = to.label(),
            reason = ?reason,
            score = transition.score,
            at_ms = now,
            volume = self.volume,
            "controller transition"
        );
        if let Some(listener) = self.listener.as_mut() {
            listener(&transition);
        }
        transition
    }
}
