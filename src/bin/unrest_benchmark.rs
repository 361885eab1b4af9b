use std::f32::consts::PI;

use anyhow::{Context, Result};
use clap::Parser;
use hushwatch::config::{
    InterventionConfig, SessionConfig, DEFAULT_ANALYSIS_SAMPLE_RATE, DEFAULT_CALM_THRESHOLD,
    DEFAULT_START_THRESHOLD,
};
use hushwatch::controller::{ControllerState, FixedProfileSelector, TracingOutcomeReporter};
use hushwatch::offline_session_from_pcm;
use hushwatch::synth::SoundKind;

/// Offline scenario harness for the unrest pipeline.
#[derive(Debug, Parser)]
#[command(about = "Run a synthetic silence/cry/silence clip through the unrest pipeline")]
struct Args {
    /// Human-friendly label recorded in the output metrics
    #[arg(long, default_value = "scenario")]
    label: String,

    /// Leading silence (milliseconds)
    #[arg(long, default_value_t = 5_000)]
    lead_ms: u64,

    /// Duration of the synthetic cry (milliseconds)
    #[arg(long, default_value_t = 4_000)]
    cry_ms: u64,

    /// Trailing silence (milliseconds)
    #[arg(long, default_value_t = 20_000)]
    tail_ms: u64,

    /// Fundamental of the synthetic cry (Hz)
    #[arg(long, default_value_t = 420.0)]
    cry_pitch_hz: f32,

    /// Peak amplitude of the synthetic cry (0-1]
    #[arg(long, default_value_t = 0.4)]
    cry_amplitude: f32,

    #[arg(long = "start-threshold", default_value_t = DEFAULT_START_THRESHOLD)]
    start_threshold: f32,

    #[arg(long = "start-confirm-sec", default_value_t = 1)]
    start_confirm_sec: u32,

    #[arg(long = "calm-threshold", default_value_t = DEFAULT_CALM_THRESHOLD)]
    calm_threshold: f32,

    #[arg(long = "calm-confirm-sec", default_value_t = 3)]
    calm_confirm_sec: u32,

    #[arg(long = "min-soothing-sec", default_value_t = 2)]
    min_soothing_sec: u32,

    #[arg(long = "cooldown-sec", default_value_t = 8)]
    cooldown_sec: u32,

    #[arg(long = "baseline-volume", default_value_t = 0.1)]
    baseline_volume: f32,

    /// JSON session config; replaces every tunable flag above
    #[arg(long = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_session_config(&args)?;
    let clip = synthesize_clip(&args, config.analysis.sample_rate);
    let run = offline_session_from_pcm(
        &clip,
        &config,
        Box::new(FixedProfileSelector::default()),
        Box::new(TracingOutcomeReporter),
    )?;

    let entered = |state| {
        run.first_entry(state)
            .map_or_else(|| "none".to_string(), |t| t.at_ms.to_string())
    };
    let outcome = run.outcomes.first();
    println!(
        "unrest_metrics|label={}|duration_ms={}|frames_processed={}|frames_skipped={}|peak_score={:.1}|soothing_at_ms={}|cooldown_at_ms={}|transitions={}|outcomes={}|effective={}|delta_score={:.1}|end_state={}|end_volume={:.3}",
        args.label,
        run.duration_ms,
        run.frames_processed,
        run.frames_skipped,
        run.peak_score(),
        entered(ControllerState::Soothing),
        entered(ControllerState::Cooldown),
        run.transitions.len(),
        run.outcomes.len(),
        outcome.is_some_and(|o| o.effective),
        outcome.map_or(0.0, |o| o.delta_score),
        run.end_state.label(),
        run.end_volume,
    );

    Ok(())
}

fn build_session_config(args: &Args) -> Result<SessionConfig> {
    if let Some(path) = &args.config_file {
        return SessionConfig::from_json_file(path)
            .with_context(|| format!("failed to load '{}'", path.display()));
    }
    let config = SessionConfig {
        intervention: InterventionConfig {
            start_threshold: args.start_threshold,
            start_confirm_sec: args.start_confirm_sec,
            calm_threshold: args.calm_threshold,
            calm_confirm_sec: args.calm_confirm_sec,
            min_soothing_sec: args.min_soothing_sec,
            cooldown_sec: args.cooldown_sec,
            baseline_volume: args.baseline_volume,
            ..InterventionConfig::default()
        },
        ..SessionConfig::default()
    };
    config.validate().context("invalid benchmark flags")?;
    Ok(config)
}

/// Silence, a four-partial harmonic cry, then silence.
fn synthesize_clip(args: &Args, sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate.max(1) as u64;
    let to_samples = |ms: u64| (ms * rate / 1_000) as usize;
    let partials = [(1.0f32, 1.0f32), (2.0, 0.6), (3.0, 0.4), (4.0, 0.25)];
    let norm: f32 = partials.iter().map(|(_, amp)| amp).sum();
    let mut samples = vec![0.0; to_samples(args.lead_ms)];
    for n in 0..to_samples(args.cry_ms) {
        let t = n as f32 / sample_rate as f32;
        let stack: f32 = partials
            .iter()
            .map(|(k, amp)| amp * (2.0 * PI * args.cry_pitch_hz * k * t).sin())
            .sum();
        samples.push(args.cry_amplitude * stack / norm);
    }
    samples.resize(samples.len() + to_samples(args.tail_ms), 0.0);
    samples
}
