//! Live monitoring session: capture, analysis, and synthesis workers.
//!
//! Capture hands mono chunks to the analysis worker over a bounded channel;
//! the analysis worker owns the extractor, the gradient estimator, and the
//! controller; the controller drives the synthesis worker through an
//! unbounded command queue. Only the synthesis worker ever waits on a device.

use crate::analysis::{ScoreMeter, UnrestScore};
use crate::audio::{CaptureSource, FrameSender, PlaybackSink};
use crate::config::{SessionConfig, SynthConfig};
use crate::controller::{
    ChannelOutcomeReporter, ControllerEvent, ControllerState, InterventionController,
    OutcomeReporter, ProfileSelector, SoundOutput,
};
use crate::error::PipelineError;
use crate::lock_or_recover;
use crate::pipeline::{AnalysisPipeline, TimeSource};
use crate::synth::{SoundProfile, SoundSynthesizer, SynthCommand};
use crossbeam_channel::{
    bounded, never, select, tick, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const TICK_INTERVAL_MS: u64 = 1_000;
const SYNTH_IDLE_POLL: Duration = Duration::from_millis(50);
const SCORE_CHANNEL_CAPACITY: usize = 256;

type FatalSlot = Arc<Mutex<Option<PipelineError>>>;

/// Which clock stamps scores and drives the cooldown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionClock {
    /// Elapsed real time. Right for devices.
    #[default]
    WallClock,
    /// Audio consumed. Lets recorded input run faster than real time.
    Stream,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub clock: SessionClock,
}

/// Snapshot published by the analysis worker after every score and tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: ControllerState,
    pub score: f32,
    pub cooldown_remaining_secs: u32,
    pub volume: f32,
    pub frames_processed: u64,
    pub stream_ms: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: ControllerState::Stopped,
            score: 0.0,
            cooldown_remaining_secs: 0,
            volume: 0.0,
            frames_processed: 0,
            stream_ms: 0,
        }
    }
}

/// Totals handed back by [`Session::stop`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub dropped_chunks: usize,
    pub duration_ms: u64,
    #[serde(skip)]
    pub fatal: Option<PipelineError>,
}

enum SessionControl {
    PanicStop,
    Stop,
}

/// Controller-side view of the synthesis worker. Commands are queued and
/// applied at the next buffer boundary.
struct SynthHandle {
    commands: Sender<SynthCommand>,
    playing: bool,
}

impl SynthHandle {
    fn send(&self, command: SynthCommand) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::WorkerDisconnected("synthesis"))
    }
}

impl SoundOutput for SynthHandle {
    fn play(&mut self, profile: SoundProfile, volume: f32) -> Result<(), PipelineError> {
        let command = if self.playing {
            SynthCommand::ChangeProfile(profile)
        } else {
            SynthCommand::Start(profile)
        };
        self.send(command)?;
        self.send(SynthCommand::SetVolume(volume))?;
        self.playing = true;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), PipelineError> {
        self.send(SynthCommand::SetVolume(volume))
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        self.playing = false;
        self.send(SynthCommand::Stop)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

struct AnalysisSummary {
    frames_processed: u64,
    frames_skipped: u64,
    duration_ms: u64,
}

pub struct Session {
    stop_flag: Arc<AtomicBool>,
    input_exhausted: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    fatal: FatalSlot,
    status: Arc<Mutex<SessionStatus>>,
    meter: ScoreMeter,
    control: Sender<SessionControl>,
    events: Receiver<ControllerEvent>,
    scores: Receiver<UnrestScore>,
    capture: Option<JoinHandle<Result<(), PipelineError>>>,
    analysis: Option<JoinHandle<AnalysisSummary>>,
    synth: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session on the wall clock.
    pub fn start(
        config: SessionConfig,
        capture: Box<dyn CaptureSource>,
        sink: Box<dyn PlaybackSink>,
        selector: Box<dyn ProfileSelector>,
        reporter: Box<dyn OutcomeReporter>,
    ) -> Result<Self, PipelineError> {
        Self::start_with(config, capture, sink, selector, reporter, SessionOptions::default())
    }

    /// Validate, then bring the workers up in order: synthesis, capture,
    /// analysis. Each one confirms start-up before the next is spawned; any
    /// failure tears down what is already running and is returned as is.
    pub fn start_with(
        config: SessionConfig,
        mut capture: Box<dyn CaptureSource>,
        sink: Box<dyn PlaybackSink>,
        selector: Box<dyn ProfileSelector>,
        reporter: Box<dyn OutcomeReporter>,
        options: SessionOptions,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        if capture.sample_rate() != config.analysis.sample_rate {
            return Err(PipelineError::InvalidConfig(format!(
                "capture source '{}' delivers {} Hz but analysis expects {} Hz",
                capture.describe(),
                capture.sample_rate(),
                config.analysis.sample_rate
            )));
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let input_exhausted = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicUsize::new(0));
        let fatal: FatalSlot = Arc::new(Mutex::new(None));
        let status = Arc::new(Mutex::new(SessionStatus::default()));
        let meter = ScoreMeter::new();

        let (command_tx, command_rx) = unbounded();
        let synth = {
            let (ready_tx, ready_rx) = bounded(1);
            let synth_config = config.synth.clone();
            let stop_flag = Arc::clone(&stop_flag);
            let fatal = Arc::clone(&fatal);
            let handle = spawn_worker("hushwatch-synth", move || {
                synth_worker(synth_config, sink, command_rx, ready_tx, stop_flag, fatal)
            })?;
            if let Err(err) = await_ready(ready_rx, "synthesis") {
                let _ = handle.join();
                return Err(err);
            }
            handle
        };

        let (frames_tx, frames_rx) = bounded(config.analysis.channel_capacity);
        let capture = {
            let (ready_tx, ready_rx) = bounded(1);
            let frames = FrameSender::new(frames_tx, Arc::clone(&dropped));
            let stop = Arc::clone(&stop_flag);
            let fatal = Arc::clone(&fatal);
            let started = spawn_worker("hushwatch-capture", move || {
                // Holds the frame channel open until a failure is on record,
                // so the analysis worker never mistakes it for end of input.
                let keep_open = frames.clone();
                let result = capture.run(frames, ready_tx, Arc::clone(&stop));
                match &result {
                    Err(err) if stop.load(Ordering::Relaxed) => {
                        tracing::debug!(error = %err, "capture worker exited during shutdown");
                    }
                    Err(err) => record_fatal(&fatal, &stop, err.clone()),
                    Ok(()) => {}
                }
                drop(keep_open);
                result
            });
            let handle = match started {
                Ok(handle) => handle,
                Err(err) => {
                    shutdown_synth(&stop_flag, command_tx, synth);
                    return Err(err);
                }
            };
            if let Err(err) = await_ready(ready_rx, "capture") {
                let _ = handle.join();
                shutdown_synth(&stop_flag, command_tx, synth);
                return Err(err);
            }
            handle
        };

        let (events_tx, events_rx) = unbounded();
        let (scores_tx, scores_rx) = bounded(SCORE_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = unbounded();
        let analysis = {
            let (ready_tx, ready_rx) = bounded(1);
            let worker = AnalysisWorker {
                config,
                output: SynthHandle {
                    commands: command_tx,
                    playing: false,
                },
                selector,
                reporter: Box::new(ChannelOutcomeReporter::new(events_tx.clone()).with_downstream(reporter)),
                events: events_tx,
                scores: scores_tx,
                meter: meter.clone(),
                status: Arc::clone(&status),
                stop_flag: Arc::clone(&stop_flag),
                input_exhausted: Arc::clone(&input_exhausted),
                fatal: Arc::clone(&fatal),
                clock: options.clock,
            };
            let started = spawn_worker("hushwatch-analysis", move || {
                worker.run(frames_rx, control_rx, ready_tx)
            });
            let handle = match started {
                Ok(handle) => handle,
                Err(err) => {
                    stop_flag.store(true, Ordering::Relaxed);
                    let _ = capture.join();
                    let _ = synth.join();
                    return Err(err);
                }
            };
            if let Err(err) = await_ready(ready_rx, "analysis") {
                stop_flag.store(true, Ordering::Relaxed);
                let _ = handle.join();
                let _ = capture.join();
                let _ = synth.join();
                return Err(err);
            }
            handle
        };

        tracing::info!("session started");
        Ok(Self {
            stop_flag,
            input_exhausted,
            dropped,
            fatal,
            status,
            meter,
            control: control_tx,
            events: events_rx,
            scores: scores_rx,
            capture: Some(capture),
            analysis: Some(analysis),
            synth: Some(synth),
        })
    }

    /// Transitions and intervention outcomes, in order.
    pub fn events(&self) -> &Receiver<ControllerEvent> {
        &self.events
    }

    /// Every score, best effort. Scores are dropped when nobody drains this.
    pub fn scores(&self) -> &Receiver<UnrestScore> {
        &self.scores
    }

    pub fn status(&self) -> SessionStatus {
        *lock_or_recover(&self.status, "Session::status")
    }

    /// Latest score without going through the status lock.
    pub fn score_meter(&self) -> &ScoreMeter {
        &self.meter
    }

    pub fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The capture source ran out and every delivered chunk was analyzed.
    pub fn input_exhausted(&self) -> bool {
        self.input_exhausted.load(Ordering::Relaxed)
    }

    /// A worker hit an unrecoverable error; the session is winding down.
    pub fn fatal_error(&self) -> Option<PipelineError> {
        lock_or_recover(&self.fatal, "Session::fatal_error").clone()
    }

    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Silence now and go back to listening.
    pub fn panic_stop(&self) -> Result<(), PipelineError> {
        self.control
            .send(SessionControl::PanicStop)
            .map_err(|_| PipelineError::WorkerDisconnected("analysis"))
    }

    /// Stop every worker and wait for them.
    pub fn stop(mut self) -> SessionReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SessionReport {
        let _ = self.control.send(SessionControl::Stop);
        let summary = self.analysis.take().and_then(|handle| match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                tracing::error!("analysis worker panicked");
                None
            }
        });
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture.take() {
            if handle.join().is_err() {
                tracing::error!("capture worker panicked");
            }
        }
        if let Some(handle) = self.synth.take() {
            if handle.join().is_err() {
                tracing::error!("synthesis worker panicked");
            }
        }
        let report = SessionReport {
            frames_processed: summary.as_ref().map_or(0, |s| s.frames_processed),
            frames_skipped: summary.as_ref().map_or(0, |s| s.frames_skipped),
            dropped_chunks: self.dropped_chunks(),
            duration_ms: summary.as_ref().map_or(0, |s| s.duration_ms),
            fatal: self.fatal_error(),
        };
        tracing::info!(
            frames = report.frames_processed,
            skipped = report.frames_skipped,
            dropped = report.dropped_chunks,
            fatal = report.fatal.as_ref().map(|err| err.label()),
            "session stopped"
        );
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.analysis.is_some() || self.capture.is_some() || self.synth.is_some() {
            self.shutdown();
        }
    }
}

fn spawn_worker<T, F>(name: &str, body: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|err| PipelineError::InitializationFailure {
            device: "session",
            reason: format!("failed to spawn {name}: {err}"),
        })
}

fn await_ready(
    ready: Receiver<Result<(), PipelineError>>,
    worker: &'static str,
) -> Result<(), PipelineError> {
    ready
        .recv()
        .unwrap_or(Err(PipelineError::WorkerDisconnected(worker)))
}

fn shutdown_synth(stop_flag: &AtomicBool, commands: Sender<SynthCommand>, synth: JoinHandle<()>) {
    stop_flag.store(true, Ordering::Relaxed);
    drop(commands);
    let _ = synth.join();
}

fn record_fatal(fatal: &FatalSlot, stop_flag: &AtomicBool, err: PipelineError) {
    tracing::error!(error = %err, kind = err.label(), "session fault");
    let mut slot = lock_or_recover(fatal, "record_fatal");
    if slot.is_none() {
        *slot = Some(err);
    }
    stop_flag.store(true, Ordering::Relaxed);
}

/// Renders buffers while a sound is active and idles on the command queue
/// otherwise. Commands only land between buffers.
fn synth_worker(
    config: SynthConfig,
    mut sink: Box<dyn PlaybackSink>,
    commands: Receiver<SynthCommand>,
    ready: Sender<Result<(), PipelineError>>,
    stop_flag: Arc<AtomicBool>,
    fatal: FatalSlot,
) {
    let mut synth = match SoundSynthesizer::new(config.clone()) {
        Ok(synth) => synth,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if let Err(err) = sink.open(config.sample_rate, config.buffer_frames) {
        let _ = ready.send(Err(err));
        return;
    }
    tracing::info!(sink = %sink.describe(), sample_rate = config.sample_rate, "synthesis worker ready");
    let _ = ready.send(Ok(()));

    let mut disconnected = false;
    while !stop_flag.load(Ordering::Relaxed) {
        if !synth.is_playing() {
            if disconnected {
                break;
            }
            match commands.recv_timeout(SYNTH_IDLE_POLL) {
                Ok(command) => synth.apply(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        loop {
            match commands.try_recv() {
                Ok(command) => synth.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    if synth.is_playing() {
                        synth.stop();
                    }
                    break;
                }
            }
        }
        if synth.is_playing() {
            if let Err(err) = sink.write(synth.render_next_buffer()) {
                record_fatal(&fatal, &stop_flag, err);
                break;
            }
        }
    }
    sink.close();
    tracing::debug!("synthesis worker exited");
}

struct AnalysisWorker {
    config: SessionConfig,
    output: SynthHandle,
    selector: Box<dyn ProfileSelector>,
    reporter: Box<dyn OutcomeReporter>,
    events: Sender<ControllerEvent>,
    scores: Sender<UnrestScore>,
    meter: ScoreMeter,
    status: Arc<Mutex<SessionStatus>>,
    stop_flag: Arc<AtomicBool>,
    input_exhausted: Arc<AtomicBool>,
    fatal: FatalSlot,
    clock: SessionClock,
}

impl AnalysisWorker {
    fn run(
        self,
        frames: Receiver<Vec<f32>>,
        control: Receiver<SessionControl>,
        ready: Sender<Result<(), PipelineError>>,
    ) -> AnalysisSummary {
        let AnalysisWorker {
            config,
            output,
            selector,
            reporter,
            events,
            scores,
            meter,
            status,
            stop_flag,
            input_exhausted,
            fatal,
            clock,
        } = self;

        let time = match clock {
            SessionClock::WallClock => TimeSource::WallClock(Instant::now()),
            SessionClock::Stream => TimeSource::Stream,
        };
        let built = AnalysisPipeline::new(&config, meter, time).and_then(|pipeline| {
            InterventionController::new(config.intervention.clone(), Box::new(output), selector, reporter)
                .map(|controller| (pipeline, controller))
        });
        let (mut pipeline, mut controller) = match built {
            Ok(parts) => parts,
            Err(err) => {
                let _ = ready.send(Err(err));
                return AnalysisSummary::empty();
            }
        };
        let listener_events = events.clone();
        controller.set_transition_listener(Box::new(move |transition| {
            let _ = listener_events.send(ControllerEvent::Transition(*transition));
        }));
        if let Err(err) = controller.start(0) {
            let _ = ready.send(Err(err));
            return AnalysisSummary::empty();
        }
        let _ = ready.send(Ok(()));

        let ticker = tick(Duration::from_millis(TICK_INTERVAL_MS));
        let idle: Receiver<Vec<f32>> = never();
        let mut exhausted = false;
        let mut next_tick_ms = TICK_INTERVAL_MS;
        let publish = |score: &UnrestScore| {
            let _ = scores.try_send(*score);
        };

        loop {
            let step: Result<Flow, PipelineError> = select! {
                recv(if exhausted { &idle } else { &frames }) -> chunk => match chunk {
                    Ok(chunk) => {
                        match pipeline.push_chunk(&chunk, &mut controller, |score, _| publish(score)) {
                            Err(err) if err.is_fatal() => Err(err),
                            pushed => {
                                if let Err(err) = pushed {
                                    tracing::debug!(error = %err, "chunk partially skipped");
                                }
                                drive_ticks(&mut controller, pipeline.now_ms(), &mut next_tick_ms)
                            }
                        }
                    }
                    Err(_) if stop_flag.load(Ordering::Relaxed) => Ok(Flow::Exit),
                    Err(_) => {
                        tracing::info!(frames = pipeline.frames_processed(), "capture input exhausted");
                        input_exhausted.store(true, Ordering::Relaxed);
                        exhausted = true;
                        Ok(Flow::Continue)
                    }
                },
                recv(ticker) -> _ => {
                    if stop_flag.load(Ordering::Relaxed) {
                        Ok(Flow::Exit)
                    } else if clock == SessionClock::WallClock {
                        drive_ticks(&mut controller, pipeline.now_ms(), &mut next_tick_ms)
                    } else {
                        Ok(Flow::Continue)
                    }
                },
                recv(control) -> message => match message {
                    Ok(SessionControl::PanicStop) => {
                        tracing::info!("panic stop requested");
                        controller.panic_stop(pipeline.now_ms()).map(|_| Flow::Continue)
                    }
                    Ok(SessionControl::Stop) | Err(_) => Ok(Flow::Exit),
                },
            };
            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(err) if err.is_fatal() => {
                    record_fatal(&fatal, &stop_flag, err);
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "recoverable analysis error"),
            }
            let mut snapshot = lock_or_recover(&status, "AnalysisWorker::status");
            *snapshot = SessionStatus {
                state: controller.state(),
                score: controller.last_score(),
                cooldown_remaining_secs: controller.cooldown_remaining_secs(),
                volume: controller.current_volume(),
                frames_processed: pipeline.frames_processed(),
                stream_ms: pipeline.now_ms(),
            };
        }

        let now = pipeline.now_ms();
        if let Err(err) = controller.stop(now) {
            tracing::warn!(error = %err, "controller stop failed");
        }
        lock_or_recover(&status, "AnalysisWorker::final_status").state = controller.state();
        AnalysisSummary {
            frames_processed: pipeline.frames_processed(),
            frames_skipped: pipeline.frames_skipped(),
            duration_ms: now,
        }
    }
}

impl AnalysisSummary {
    fn empty() -> Self {
        Self {
            frames_processed: 0,
            frames_skipped: 0,
            duration_ms: 0,
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

/// Fire the 1 Hz cooldown tick for every whole second up to `now_ms`.
fn drive_ticks(
    controller: &mut InterventionController,
    now_ms: u64,
    next_tick_ms: &mut u64,
) -> Result<Flow, PipelineError> {
    while now_ms >= *next_tick_ms {
        controller.tick(*next_tick_ms)?;
        *next_tick_ms += TICK_INTERVAL_MS;
    }
    Ok(Flow::Continue)
}
