//! Command-line parsing, session configuration, and validation helpers.

mod defaults;
mod session;
#[cfg(test)]
mod tests;
mod validation;

use crate::synth::SoundKind;
use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_ANALYSIS_FRAME_SAMPLES, DEFAULT_ANALYSIS_HOP_SAMPLES, DEFAULT_ANALYSIS_SAMPLE_RATE,
    DEFAULT_BASELINE_KIND, DEFAULT_BASELINE_VOLUME, DEFAULT_CALM_CONFIRM_SEC,
    DEFAULT_CALM_THRESHOLD, DEFAULT_COOLDOWN_SEC, DEFAULT_FFT_SIZE, DEFAULT_MAX_ESCALATIONS,
    DEFAULT_MIN_SOOTHING_SEC, DEFAULT_PREDICTIVE_ESCALATION_THRESHOLD,
    DEFAULT_PREDICTIVE_GRADIENT, DEFAULT_RETRIGGER_CONFIRM_SEC, DEFAULT_RETRIGGER_THRESHOLD,
    DEFAULT_SAFETY_CAP, DEFAULT_START_CONFIRM_SEC, DEFAULT_START_THRESHOLD,
    DEFAULT_SYNTH_BUFFER_FRAMES, DEFAULT_SYNTH_SAMPLE_RATE, DEFAULT_VOLUME_CAP,
};
pub use session::{
    AnalysisConfig, Band, GradientConfig, InterventionConfig, ScoreWeights, SessionConfig,
    SynthConfig,
};

/// CLI options for the hushwatch monitor. Validated values keep the session sane.
#[derive(Debug, Parser, Clone)]
#[command(about = "hushwatch: adaptive soothing-sound monitor", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long, env = "HUSHWATCH_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Preferred audio output device name
    #[arg(long, env = "HUSHWATCH_OUTPUT_DEVICE")]
    pub output_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print detected audio output devices and exit
    #[arg(long = "list-output-devices", default_value_t = false)]
    pub list_output_devices: bool,

    /// Stop the session after this many seconds (0 = run until stdin closes)
    #[arg(long = "duration-secs", default_value_t = 0)]
    pub duration_secs: u64,

    /// JSON session config file; flags below are ignored when supplied
    #[arg(long = "config-file", env = "HUSHWATCH_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Enable file logging (JSON lines)
    #[arg(long = "logs", env = "HUSHWATCH_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", env = "HUSHWATCH_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Print a score line for every analysis window
    #[arg(long = "print-scores", default_value_t = false)]
    pub print_scores: bool,

    /// Score that starts an intervention (0-100)
    #[arg(long = "start-threshold", default_value_t = DEFAULT_START_THRESHOLD)]
    pub start_threshold: f32,

    /// Seconds the start threshold must hold
    #[arg(long = "start-confirm-sec", default_value_t = DEFAULT_START_CONFIRM_SEC)]
    pub start_confirm_sec: u32,

    /// Score considered calm (0-100)
    #[arg(long = "calm-threshold", default_value_t = DEFAULT_CALM_THRESHOLD)]
    pub calm_threshold: f32,

    /// Seconds the calm threshold must hold
    #[arg(long = "calm-confirm-sec", default_value_t = DEFAULT_CALM_CONFIRM_SEC)]
    pub calm_confirm_sec: u32,

    /// Score that re-enters soothing during cooldown (0-100)
    #[arg(long = "retrigger-threshold", default_value_t = DEFAULT_RETRIGGER_THRESHOLD)]
    pub retrigger_threshold: f32,

    /// Seconds the retrigger threshold must hold
    #[arg(long = "retrigger-confirm-sec", default_value_t = DEFAULT_RETRIGGER_CONFIRM_SEC)]
    pub retrigger_confirm_sec: u32,

    /// Cooldown fadeout duration (seconds)
    #[arg(long = "cooldown-sec", default_value_t = DEFAULT_COOLDOWN_SEC)]
    pub cooldown_sec: u32,

    /// Minimum soothing time before calm checks apply (seconds)
    #[arg(long = "min-soothing-sec", default_value_t = DEFAULT_MIN_SOOTHING_SEC)]
    pub min_soothing_sec: u32,

    /// Maximum volume raises within one unrest event
    #[arg(long = "max-escalations", default_value_t = DEFAULT_MAX_ESCALATIONS)]
    pub max_escalations: u32,

    /// Intervention volume ceiling (0-1]
    #[arg(long = "volume-cap", default_value_t = DEFAULT_VOLUME_CAP)]
    pub volume_cap: f32,

    /// Background sound volume kept between interventions (0 = off)
    #[arg(long = "baseline-volume", default_value_t = DEFAULT_BASELINE_VOLUME)]
    pub baseline_volume: f32,

    /// Background sound profile
    #[arg(long = "baseline-sound", value_enum, default_value_t = DEFAULT_BASELINE_KIND)]
    pub baseline_sound: SoundKind,

    /// Sound profile used for interventions
    #[arg(long = "sound", value_enum, default_value_t = SoundKind::OceanBreath)]
    pub sound: SoundKind,

    /// Intervention level (1-3)
    #[arg(long = "level", default_value_t = 2)]
    pub level: u8,

    /// Enable predictive pre-emption on rising trends
    #[arg(long = "predictive", default_value_t = false)]
    pub predictive: bool,

    /// Gradient (score/second) that arms predictive mode
    #[arg(long = "predictive-gradient", default_value_t = DEFAULT_PREDICTIVE_GRADIENT)]
    pub predictive_gradient: f32,

    /// Score that escalates predictive mode into soothing
    #[arg(
        long = "predictive-escalation-threshold",
        default_value_t = DEFAULT_PREDICTIVE_ESCALATION_THRESHOLD
    )]
    pub predictive_escalation_threshold: f32,

    /// Output sample rate for the synthesizer (Hz)
    #[arg(long = "output-sample-rate", default_value_t = DEFAULT_SYNTH_SAMPLE_RATE)]
    pub output_sample_rate: u32,

    /// Frames per synthesized output buffer
    #[arg(long = "output-buffer-frames", default_value_t = DEFAULT_SYNTH_BUFFER_FRAMES)]
    pub output_buffer_frames: usize,
}
