//! Frames in, scores and controller decisions out.
//!
//! [`AnalysisPipeline`] is the body of the analysis worker; the offline
//! runner drives the same code from an in-memory buffer with stream time.

use crate::analysis::{FeatureExtractor, FrameWindow, ScoreMeter, UnrestScore};
use crate::config::SessionConfig;
use crate::controller::{
    ChannelOutcomeReporter, ControllerEvent, ControllerState, InterventionController,
    InterventionOutcome, OutcomeReporter, OutputProbe, ProfileSelector, StateTransition,
};
use crate::error::PipelineError;
use crate::gradient::GradientEstimator;
use crate::synth::SynthCommand;
use serde::Serialize;
use std::time::Instant;

/// Clock used to stamp scores.
#[derive(Debug, Clone, Copy)]
pub enum TimeSource {
    /// Milliseconds of audio consumed. Deterministic; used offline.
    Stream,
    /// Milliseconds since the given instant. Used by live sessions.
    WallClock(Instant),
}

pub struct AnalysisPipeline {
    window: FrameWindow,
    extractor: FeatureExtractor,
    gradient: GradientEstimator,
    meter: ScoreMeter,
    time: TimeSource,
    frames_processed: u64,
    frames_skipped: u64,
}

impl AnalysisPipeline {
    pub fn new(config: &SessionConfig, meter: ScoreMeter, time: TimeSource) -> Result<Self, PipelineError> {
        let analysis = &config.analysis;
        Ok(Self {
            window: FrameWindow::new(analysis.frame_samples, analysis.hop_samples, analysis.sample_rate),
            extractor: FeatureExtractor::new(analysis.clone())?,
            gradient: GradientEstimator::new(config.gradient.clone())?,
            meter,
            time,
            frames_processed: 0,
            frames_skipped: 0,
        })
    }

    pub fn now_ms(&self) -> u64 {
        match self.time {
            TimeSource::Stream => self.window.stream_ms(),
            TimeSource::WallClock(started) => started.elapsed().as_millis() as u64,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn gradient(&self) -> &GradientEstimator {
        &self.gradient
    }

    /// Feed one capture chunk. Every completed frame is scored and handed to
    /// the controller; `on_score` sees each score with the transition it
    /// caused, if any.
    ///
    /// Malformed frames are counted and skipped; the rest of the chunk is
    /// still scored and the skip comes back as a [`PipelineError::TransientRead`].
    /// Controller and clock errors are returned as soon as they happen.
    pub fn push_chunk<F>(
        &mut self,
        chunk: &[f32],
        controller: &mut InterventionController,
        mut on_score: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(&UnrestScore, Option<&StateTransition>),
    {
        let mut rest = chunk;
        let mut skipped: Option<(u64, String)> = None;
        while !rest.is_empty() {
            let used = self.window.fill(rest);
            rest = &rest[used..];
            let Some(frame) = self.window.take_ready() else {
                continue;
            };
            let timestamp_ms = match self.time {
                TimeSource::Stream => frame.timestamp_ms,
                TimeSource::WallClock(started) => started.elapsed().as_millis() as u64,
            };
            let features = match self.extractor.extract_features(frame) {
                Ok(features) => features,
                Err(PipelineError::InvalidFrame(reason)) => {
                    self.frames_skipped += 1;
                    tracing::debug!(%reason, skipped = self.frames_skipped, "skipping frame");
                    match &mut skipped {
                        Some((count, _)) => *count += 1,
                        None => skipped = Some((1, reason)),
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            let value = self.extractor.compute_unrest_score(&features);
            self.gradient.add_measurement(value, timestamp_ms)?;
            let score = UnrestScore::new(value, self.gradient.trend().direction(), timestamp_ms);
            self.meter.set(score.value);
            let transition = controller.process_score(&score, &self.gradient)?;
            self.frames_processed += 1;
            on_score(&score, transition.as_ref());
        }
        match skipped {
            Some((count, reason)) => Err(PipelineError::TransientRead(format!(
                "skipped {count} frame(s): {reason}"
            ))),
            None => Ok(()),
        }
    }

    /// Forget all rolling state.
    pub fn reset(&mut self) {
        self.window.reset();
        self.extractor.reset();
        self.gradient.reset();
        self.meter.set(0.0);
        self.frames_processed = 0;
        self.frames_skipped = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CooldownSample {
    pub at_ms: u64,
    pub volume: f32,
    pub remaining_secs: u32,
}

/// Everything an offline run observed.
#[derive(Debug, Clone)]
pub struct OfflineRun {
    pub scores: Vec<UnrestScore>,
    pub transitions: Vec<StateTransition>,
    pub outcomes: Vec<InterventionOutcome>,
    pub cooldown_trace: Vec<CooldownSample>,
    pub commands: Vec<SynthCommand>,
    /// Controller state once the audio ran out, before the closing stop.
    pub end_state: ControllerState,
    pub end_volume: f32,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub duration_ms: u64,
}

impl OfflineRun {
    pub fn peak_score(&self) -> f32 {
        self.scores.iter().map(|s| s.value).fold(0.0, f32::max)
    }

    /// First transition into `state`.
    pub fn first_entry(&self, state: ControllerState) -> Option<&StateTransition> {
        self.transitions.iter().find(|t| t.to == state)
    }
}

/// Run a mono analysis-rate buffer through the full pipeline with stream
/// time and a simulated 1 Hz cooldown tick. The session is stopped at the
/// end so every started intervention is reported.
pub fn offline_session_from_pcm(
    samples: &[f32],
    config: &SessionConfig,
    selector: Box<dyn ProfileSelector>,
    reporter: Box<dyn OutcomeReporter>,
) -> Result<OfflineRun, PipelineError> {
    config.validate()?;
    let probe = OutputProbe::new();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let reporter = ChannelOutcomeReporter::new(events_tx).with_downstream(reporter);
    let mut controller = InterventionController::new(
        config.intervention.clone(),
        Box::new(probe.clone()),
        selector,
        Box::new(reporter),
    )?;
    let mut pipeline = AnalysisPipeline::new(config, ScoreMeter::new(), TimeSource::Stream)?;

    let mut scores = Vec::new();
    let mut transitions = Vec::new();
    let mut cooldown_trace = Vec::new();
    transitions.extend(controller.start(0)?);

    let mut next_tick_ms = 1_000;
    for chunk in samples.chunks(config.analysis.hop_samples) {
        let pushed = pipeline.push_chunk(chunk, &mut controller, |score, transition| {
            scores.push(*score);
            transitions.extend(transition.copied());
        });
        match pushed {
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::debug!(error = %err, "offline chunk partially skipped"),
            Ok(()) => {}
        }
        while pipeline.now_ms() >= next_tick_ms {
            transitions.extend(controller.tick(next_tick_ms)?);
            if controller.state() == ControllerState::Cooldown {
                cooldown_trace.push(CooldownSample {
                    at_ms: next_tick_ms,
                    volume: controller.current_volume(),
                    remaining_secs: controller.cooldown_remaining_secs(),
                });
            }
            next_tick_ms += 1_000;
        }
    }

    let duration_ms = pipeline.now_ms();
    let end_state = controller.state();
    let end_volume = controller.current_volume();
    transitions.extend(controller.stop(duration_ms)?);

    let outcomes = events_rx
        .try_iter()
        .filter_map(|event| match event {
            ControllerEvent::Outcome(outcome) => Some(outcome),
            ControllerEvent::Transition(_) => None,
        })
        .collect();

    Ok(OfflineRun {
        scores,
        transitions,
        outcomes,
        cooldown_trace,
        commands: probe.commands(),
        end_state,
        end_volume,
        frames_processed: pipeline.frames_processed(),
        frames_skipped: pipeline.frames_skipped(),
        duration_ms,
    })
}
