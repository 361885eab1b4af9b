use super::*;
use crate::analysis::Direction;
use crate::config::{GradientConfig, InterventionConfig};
use crate::synth::{SoundKind, SynthCommand};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};

fn config() -> InterventionConfig {
    InterventionConfig {
        start_threshold: 70.0,
        start_confirm_sec: 1,
        calm_threshold: 35.0,
        calm_confirm_sec: 3,
        retrigger_threshold: 55.0,
        retrigger_confirm_sec: 1,
        cooldown_sec: 10,
        min_soothing_sec: 0,
        baseline_volume: 0.1,
        ..InterventionConfig::default()
    }
}

struct Harness {
    controller: InterventionController,
    probe: OutputProbe,
    events: Receiver<ControllerEvent>,
    gradient: GradientEstimator,
}

impl Harness {
    fn new(config: InterventionConfig) -> Self {
        let probe = OutputProbe::new();
        let (tx, events) = crossbeam_channel::unbounded();
        let controller = InterventionController::new(
            config,
            Box::new(probe.clone()),
            Box::new(FixedProfileSelector::new(SoundKind::OceanBreath, 2)),
            Box::new(ChannelOutcomeReporter::new(tx)),
        )
        .expect("valid intervention config");
        Self {
            controller,
            probe,
            events,
            gradient: GradientEstimator::new(GradientConfig::default()).expect("gradient config"),
        }
    }

    fn started(config: InterventionConfig) -> Self {
        let mut harness = Self::new(config);
        harness.controller.start(0).expect("start");
        harness
    }

    fn try_feed(&mut self, value: f32, at_ms: u64) -> Result<Option<StateTransition>, PipelineError> {
        self.gradient.add_measurement(value, at_ms)?;
        let score = UnrestScore::new(value, Direction::Stable, at_ms);
        self.controller.process_score(&score, &self.gradient)
    }

    fn feed(&mut self, value: f32, at_ms: u64) -> Option<StateTransition> {
        self.try_feed(value, at_ms).expect("score accepted")
    }

    /// Feed `value` every 500 ms over `[from, to]`, returning the first transition.
    fn feed_span(&mut self, value: f32, from: u64, to: u64) -> Option<StateTransition> {
        let mut first = None;
        for at in (from..=to).step_by(500) {
            if let Some(transition) = self.feed(value, at) {
                first.get_or_insert(transition);
            }
        }
        first
    }

    /// Soothing at 1000 ms, cooldown at 5000 ms.
    fn into_cooldown(&mut self) {
        self.feed(72.0, 0);
        let soothing = self.feed(72.0, 1_000).expect("soothing");
        assert_eq!(soothing.to, ControllerState::Soothing);
        let cooldown = self.feed_span(30.0, 2_000, 5_000).expect("cooldown");
        assert_eq!(cooldown.to, ControllerState::Cooldown);
        assert_eq!(cooldown.at_ms, 5_000);
    }

    fn outcomes(&self) -> Vec<InterventionOutcome> {
        self.events
            .try_iter()
            .filter_map(|event| match event {
                ControllerEvent::Outcome(outcome) => Some(outcome),
                ControllerEvent::Transition(_) => None,
            })
            .collect()
    }
}

#[test]
fn start_requires_confirmation_window() {
    let mut h = Harness::started(config());
    assert_eq!(h.controller.state(), ControllerState::Listening);
    assert_eq!(h.feed(72.0, 0), None);
    assert_eq!(h.feed(73.0, 500), None);
    let transition = h.feed(74.0, 1_000).expect("third sample confirms");
    assert_eq!(transition.from, ControllerState::Listening);
    assert_eq!(transition.to, ControllerState::Soothing);
    assert_eq!(transition.reason, TransitionReason::StartConfirmed);
    assert!((h.controller.current_volume() - 0.6).abs() < 1e-6);
    assert_eq!(h.probe.profile().map(|p| p.kind), Some(SoundKind::OceanBreath));
}

#[test]
fn dip_below_start_restarts_confirmation() {
    let mut h = Harness::started(config());
    h.feed(75.0, 0);
    h.feed(60.0, 500);
    assert_eq!(h.feed(75.0, 1_000), None);
    assert_eq!(h.feed(75.0, 1_500), None);
    assert!(h.feed(75.0, 2_000).is_some());
}

#[test]
fn calm_confirmation_resets_on_single_loud_sample() {
    let mut h = Harness::started(config());
    h.feed(72.0, 0);
    h.feed(72.0, 1_000);
    assert_eq!(h.feed_span(30.0, 2_000, 4_000), None);
    assert_eq!(h.feed(40.0, 4_500), None);
    assert_eq!(h.feed_span(30.0, 5_000, 7_500), None);
    assert_eq!(h.controller.state(), ControllerState::Soothing);
    let transition = h.feed(30.0, 8_000).expect("calm held for three seconds");
    assert_eq!(transition.to, ControllerState::Cooldown);
    assert_eq!(h.controller.cooldown_remaining_secs(), 10);
}

#[test]
fn calm_checks_wait_for_minimum_soothing_time() {
    let mut h = Harness::started(InterventionConfig {
        min_soothing_sec: 5,
        ..config()
    });
    h.feed(72.0, 0);
    h.feed(72.0, 1_000);
    let transition = h.feed_span(20.0, 1_500, 12_000).expect("eventually calm");
    assert_eq!(transition.to, ControllerState::Cooldown);
    assert_eq!(transition.at_ms, 9_000);
}

#[test]
fn retrigger_restores_intervention_volume_without_restart() {
    let mut h = Harness::started(config());
    h.into_cooldown();
    h.controller.tick(7_000).unwrap();
    assert!(h.controller.current_volume() < 0.6);
    assert_eq!(h.controller.cooldown_remaining_secs(), 8);

    assert_eq!(h.feed(60.0, 7_500), None);
    let transition = h.feed(60.0, 8_500).expect("retrigger confirmed");
    assert_eq!(transition.to, ControllerState::Soothing);
    assert_eq!(transition.reason, TransitionReason::Retriggered);
    assert_eq!(h.controller.cooldown_remaining_secs(), 0);
    assert!((h.controller.current_volume() - 0.6).abs() < 1e-6);
    assert!((h.probe.volume() - 0.6).abs() < 1e-6);
    assert!(!h.probe.commands().contains(&SynthCommand::Stop));
    assert!(h.outcomes().is_empty());
}

#[test]
fn cooldown_fades_monotonically_to_exact_baseline() {
    let mut h = Harness::started(config());
    h.into_cooldown();
    let mut volumes = vec![h.controller.current_volume()];
    let mut last = None;
    for at in (6_000..=15_000).step_by(1_000) {
        if let Some(transition) = h.controller.tick(at).unwrap() {
            last = Some(transition);
        }
        volumes.push(h.controller.current_volume());
    }
    assert!(volumes.windows(2).all(|w| w[1] <= w[0]), "{volumes:?}");
    assert!(volumes.iter().all(|v| *v >= 0.1), "{volumes:?}");

    let transition = last.expect("cooldown elapsed");
    assert_eq!(transition.to, ControllerState::Listening);
    assert_eq!(transition.reason, TransitionReason::CooldownElapsed);
    assert_eq!(h.controller.current_volume(), 0.1);
    assert_eq!(h.probe.volume(), 0.1);
    assert_eq!(h.probe.profile().map(|p| p.kind), Some(SoundKind::Pink));

    let outcomes = h.outcomes();
    assert_eq!(outcomes.len(), 1);
    let outcome = outcomes[0];
    assert!(outcome.effective);
    assert_eq!(outcome.trigger_score, 72.0);
    assert!((outcome.delta_score - 42.0).abs() < 1e-4);
    assert_eq!(outcome.duration_ms, 14_000);
    assert!(!outcome.was_exploration);
}

#[test]
fn fade_without_baseline_ends_in_silence() {
    let mut h = Harness::started(InterventionConfig {
        baseline_volume: 0.0,
        ..config()
    });
    h.into_cooldown();
    h.controller.tick(15_000).unwrap();
    assert_eq!(h.controller.state(), ControllerState::Listening);
    assert!(!h.probe.playing());
    assert_eq!(h.controller.current_volume(), 0.0);
}

#[test]
fn playback_failure_on_start_stays_stopped() {
    let mut h = Harness::new(config());
    h.probe.fail_play(true);
    let err = h.controller.start(0).unwrap_err();
    assert!(matches!(err, PipelineError::InitializationFailure { .. }));
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(!h.probe.playing());

    h.probe.fail_play(false);
    assert!(h.controller.start(10).unwrap().is_some());
    assert_eq!(h.controller.state(), ControllerState::Listening);
}

#[test]
fn playback_failure_mid_session_forces_stop() {
    let mut h = Harness::started(InterventionConfig {
        baseline_volume: 0.0,
        ..config()
    });
    h.probe.fail_play(true);
    h.feed(80.0, 0);
    assert!(h.try_feed(80.0, 1_000).is_err());
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(h.outcomes().is_empty());
}

#[test]
fn outcome_reported_once_per_event() {
    let mut h = Harness::started(config());
    h.feed(72.0, 0);
    h.feed(72.0, 1_000);
    h.feed(90.0, 1_500);
    h.controller.stop(2_000).unwrap();
    h.controller.stop(2_500).unwrap();
    let outcomes = h.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].peak_score, 90.0);
    assert!(!outcomes[0].effective);
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(!h.probe.playing());
}

#[test]
fn panic_stop_silences_and_returns_to_listening() {
    let mut h = Harness::started(config());
    h.feed(72.0, 0);
    h.feed(72.0, 1_000);
    let transition = h.controller.panic_stop(1_200).unwrap().expect("panic transition");
    assert_eq!(transition.to, ControllerState::Listening);
    assert_eq!(transition.reason, TransitionReason::PanicStop);
    assert!(!h.probe.playing());
    assert_eq!(h.controller.current_volume(), 0.0);
    assert_eq!(h.outcomes().len(), 1);

    // Timers were cleared: a new event needs a full confirmation again.
    assert_eq!(h.feed(72.0, 1_500), None);
    assert!(h.feed(72.0, 2_500).is_some());
    h.controller.stop(3_000).unwrap();
    assert_eq!(h.outcomes().len(), 1);
}

#[test]
fn escalation_is_bounded_and_capped() {
    let mut h = Harness::started(InterventionConfig {
        escalation_interval_sec: 2,
        max_escalations: 2,
        escalation_volume_step: 0.1,
        min_soothing_sec: 60,
        ..config()
    });
    h.feed(80.0, 0);
    h.feed(80.0, 1_000);
    h.feed_span(85.0, 1_500, 20_000);
    assert_eq!(h.controller.state(), ControllerState::Soothing);
    assert_eq!(h.controller.escalations(), 2);
    let volume = h.controller.current_volume();
    assert!(volume <= h.controller.config().volume_cap);
    assert!(volume > 0.75, "{volume}");
}

#[test]
fn predictive_trend_starts_gentle_sound_then_escalates() {
    let mut h = Harness::started(InterventionConfig {
        predictive_enabled: true,
        ..config()
    });
    assert_eq!(h.feed(20.0, 0), None);
    assert_eq!(h.feed(25.0, 500), None);
    assert_eq!(h.feed(30.0, 1_000), None);
    let predictive = h.feed(35.0, 1_500).expect("rising trend confirmed");
    assert_eq!(predictive.to, ControllerState::Predictive);
    assert!((h.controller.current_volume() - 0.3).abs() < 1e-6);

    let soothing = h.feed(58.0, 2_000).expect("escalates below start threshold");
    assert_eq!(soothing.to, ControllerState::Soothing);
    assert_eq!(soothing.reason, TransitionReason::PredictiveEscalated);
    assert!((h.controller.current_volume() - 0.6).abs() < 1e-6);
    let starts = h
        .probe
        .commands()
        .iter()
        .filter(|c| matches!(c, SynthCommand::Start(_) | SynthCommand::ChangeProfile(_)))
        .count();
    assert_eq!(starts, 2, "baseline start plus one switch to the intervention sound");
}

#[test]
fn predictive_calms_after_dwell_without_reporting() {
    let mut h = Harness::started(InterventionConfig {
        predictive_enabled: true,
        ..config()
    });
    for (i, value) in [20.0, 25.0, 30.0, 35.0].into_iter().enumerate() {
        h.feed(value, i as u64 * 500);
    }
    assert_eq!(h.controller.state(), ControllerState::Predictive);
    let transition = h.feed_span(10.0, 2_000, 9_000).expect("calms down");
    assert_eq!(transition.to, ControllerState::Listening);
    assert_eq!(transition.reason, TransitionReason::PredictiveCalmed);
    assert_eq!(transition.at_ms, 6_500);
    assert_eq!(h.controller.current_volume(), 0.1);
    assert!(h.outcomes().is_empty());
}

#[test]
fn predictive_times_out_into_soothing() {
    let mut h = Harness::started(InterventionConfig {
        predictive_enabled: true,
        predictive_timeout_sec: 6,
        predictive_calm_gradient: -50.0,
        ..config()
    });
    for (i, value) in [20.0, 25.0, 30.0, 35.0].into_iter().enumerate() {
        h.feed(value, i as u64 * 500);
    }
    let transition = h.feed_span(40.0, 2_000, 10_000).expect("timeout");
    assert_eq!(transition.reason, TransitionReason::PredictiveTimeout);
    assert_eq!(transition.at_ms, 7_500);
}

#[test]
fn config_changes_only_while_stopped() {
    let mut h = Harness::new(config());
    let louder = InterventionConfig {
        volume_cap: 0.5,
        ..config()
    };
    assert!(h.controller.set_config(louder).is_ok());
    h.controller.start(0).unwrap();
    assert!(matches!(
        h.controller.set_config(config()),
        Err(PipelineError::InvalidConfig(_))
    ));
    assert_eq!(h.controller.config().volume_cap, 0.5);

    let broken = InterventionConfig {
        calm_threshold: 90.0,
        ..config()
    };
    h.controller.stop(100).unwrap();
    assert!(h.controller.set_config(broken).is_err());
}

#[test]
fn rejects_scores_from_the_past() {
    let mut h = Harness::started(config());
    h.feed(10.0, 1_000);
    let stale = UnrestScore::new(10.0, Direction::Stable, 500);
    let err = h.controller.process_score(&stale, &h.gradient).unwrap_err();
    assert_eq!(
        err,
        PipelineError::InvalidTimestamp {
            previous_ms: 1_000,
            next_ms: 500
        }
    );
    assert_eq!(h.controller.state(), ControllerState::Listening);
}

#[test]
fn listener_sees_every_transition() {
    let mut h = Harness::new(config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.controller
        .set_transition_listener(Box::new(move |t| sink.lock().unwrap().push(t.to)));
    h.controller.start(0).unwrap();
    h.feed(72.0, 0);
    h.feed(72.0, 1_000);
    h.controller.stop(1_500).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ControllerState::Listening,
            ControllerState::Soothing,
            ControllerState::Stopped
        ]
    );
}
