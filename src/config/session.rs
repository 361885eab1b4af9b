//! Immutable per-component configuration snapshots.
//!
//! Each stage receives its own struct at construction so independent sessions
//! (and tests) can run side by side with different tunables.

use super::defaults::*;
use crate::error::PipelineError;
use crate::synth::SoundKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl Band {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, hz: f32) -> bool {
        hz >= self.low_hz && hz < self.high_hz
    }
}

/// Relative weight of each normalized sub-score in the raw unrest value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub pitch: f32,
    pub energy: f32,
    pub cry_band: f32,
    pub harmonic: f32,
    pub tonality: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pitch: 0.30,
            energy: 0.20,
            cry_band: 0.20,
            harmonic: 0.10,
            tonality: 0.20,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f32 {
        self.pitch + self.energy + self.cry_band + self.harmonic + self.tonality
    }
}

/// Tunables for feature extraction and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub hop_samples: usize,
    pub fft_size: usize,
    pub pitch_window: usize,
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub silence_rms: f32,
    pub impulse_energy_ratio: f32,
    pub impulse_crest_factor: f32,
    pub impulse_hold_frames: u32,
    pub cry_band: Band,
    pub harmonic_band: Band,
    pub adult_pitch: Band,
    pub infant_pitch: Band,
    pub clarity_threshold: f32,
    pub strong_pitch_threshold: f32,
    pub strong_pitch_boost: f32,
    pub adult_discount: f32,
    pub weights: ScoreWeights,
    pub energy_floor_db: f32,
    pub energy_ceiling_db: f32,
    pub silence_decay: f32,
    pub noise_decay: f32,
    pub impulse_decay: f32,
    pub consistency_jump: f32,
    pub consistency_window: usize,
    pub ema_alpha: f32,
    pub channel_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_ANALYSIS_SAMPLE_RATE,
            frame_samples: DEFAULT_ANALYSIS_FRAME_SAMPLES,
            hop_samples: DEFAULT_ANALYSIS_HOP_SAMPLES,
            fft_size: DEFAULT_FFT_SIZE,
            pitch_window: DEFAULT_PITCH_WINDOW,
            min_pitch_hz: 70.0,
            max_pitch_hz: 700.0,
            silence_rms: DEFAULT_SILENCE_RMS,
            impulse_energy_ratio: 10.0,
            impulse_crest_factor: 4.0,
            impulse_hold_frames: 6,
            cry_band: Band::new(250.0, 600.0),
            harmonic_band: Band::new(600.0, 2_500.0),
            adult_pitch: Band::new(80.0, 220.0),
            infant_pitch: Band::new(220.0, 700.0),
            clarity_threshold: 0.35,
            strong_pitch_threshold: 0.5,
            strong_pitch_boost: 1.2,
            adult_discount: 0.2,
            weights: ScoreWeights::default(),
            energy_floor_db: -50.0,
            energy_ceiling_db: -10.0,
            silence_decay: 0.5,
            noise_decay: 0.8,
            impulse_decay: 0.9,
            consistency_jump: 40.0,
            consistency_window: 3,
            ema_alpha: 0.3,
            channel_capacity: DEFAULT_CAPTURE_CHANNEL_CAPACITY,
        }
    }
}

impl AnalysisConfig {
    /// Shortest autocorrelation lag (highest pitch) searched.
    pub fn min_lag(&self) -> usize {
        ((self.sample_rate as f32 / self.max_pitch_hz).floor() as usize).max(2)
    }

    /// Longest autocorrelation lag (lowest pitch) searched.
    pub fn max_lag(&self) -> usize {
        (self.sample_rate as f32 / self.min_pitch_hz).ceil() as usize
    }

    pub fn hop_ms(&self) -> u64 {
        (self.hop_samples as u64 * 1_000) / u64::from(self.sample_rate.max(1))
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(8_000..=96_000).contains(&self.sample_rate) {
            return invalid(format!(
                "analysis sample_rate must be between 8000 and 96000 Hz, got {}",
                self.sample_rate
            ));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 {
            return invalid(format!(
                "fft_size must be a power of two >= 64, got {}",
                self.fft_size
            ));
        }
        if self.frame_samples < self.fft_size {
            return invalid(format!(
                "frame_samples ({}) must be at least fft_size ({})",
                self.frame_samples, self.fft_size
            ));
        }
        if self.hop_samples == 0 || self.hop_samples > self.frame_samples {
            return invalid(format!(
                "hop_samples must be between 1 and frame_samples ({}), got {}",
                self.frame_samples, self.hop_samples
            ));
        }
        if !(self.min_pitch_hz > 0.0 && self.min_pitch_hz < self.max_pitch_hz) {
            return invalid(format!(
                "pitch range must satisfy 0 < min < max, got {}..{}",
                self.min_pitch_hz, self.max_pitch_hz
            ));
        }
        if self.max_pitch_hz * 2.0 > self.sample_rate as f32 {
            return invalid(format!(
                "max_pitch_hz ({}) exceeds the analysis Nyquist frequency",
                self.max_pitch_hz
            ));
        }
        if self.pitch_window + self.max_lag() > self.frame_samples {
            return invalid(format!(
                "pitch_window ({}) plus the longest lag ({}) must fit in frame_samples ({})",
                self.pitch_window,
                self.max_lag(),
                self.frame_samples
            ));
        }
        for (name, band) in [
            ("cry_band", self.cry_band),
            ("harmonic_band", self.harmonic_band),
            ("adult_pitch", self.adult_pitch),
            ("infant_pitch", self.infant_pitch),
        ] {
            if !(band.low_hz >= 0.0 && band.low_hz < band.high_hz) {
                return invalid(format!(
                    "{name} must satisfy 0 <= low < high, got {}..{}",
                    band.low_hz, band.high_hz
                ));
            }
        }
        for (name, value) in [
            ("silence_rms", self.silence_rms),
            ("clarity_threshold", self.clarity_threshold),
            ("strong_pitch_threshold", self.strong_pitch_threshold),
            ("adult_discount", self.adult_discount),
            ("silence_decay", self.silence_decay),
            ("noise_decay", self.noise_decay),
            ("impulse_decay", self.impulse_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return invalid(format!(
                "ema_alpha must be within (0, 1], got {}",
                self.ema_alpha
            ));
        }
        if self.strong_pitch_boost < 1.0 {
            return invalid(format!(
                "strong_pitch_boost must be >= 1.0, got {}",
                self.strong_pitch_boost
            ));
        }
        if self.energy_floor_db >= self.energy_ceiling_db {
            return invalid(format!(
                "energy_floor_db ({}) must be below energy_ceiling_db ({})",
                self.energy_floor_db, self.energy_ceiling_db
            ));
        }
        if self.weights.total() <= 0.0 {
            return invalid("score weights must sum to a positive value".to_string());
        }
        if self.consistency_window == 0 {
            return invalid("consistency_window must be at least 1".to_string());
        }
        if !(1..=1024).contains(&self.channel_capacity) {
            return invalid(format!(
                "channel_capacity must be between 1 and 1024, got {}",
                self.channel_capacity
            ));
        }
        Ok(())
    }
}

/// Trend cut points and smoothing window for the gradient estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    pub window_size: usize,
    pub fast_cut: f32,
    pub moderate_cut: f32,
    pub slow_cut: f32,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_GRADIENT_WINDOW,
            fast_cut: 5.0,
            moderate_cut: 2.0,
            slow_cut: 0.5,
        }
    }
}

impl GradientConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(2..=64).contains(&self.window_size) {
            return invalid(format!(
                "gradient window_size must be between 2 and 64, got {}",
                self.window_size
            ));
        }
        if !(0.0 < self.slow_cut && self.slow_cut < self.moderate_cut && self.moderate_cut < self.fast_cut)
        {
            return invalid(format!(
                "gradient cut points must satisfy 0 < slow < moderate < fast, got {}/{}/{}",
                self.slow_cut, self.moderate_cut, self.fast_cut
            ));
        }
        Ok(())
    }
}

/// Thresholds and timings for the intervention state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    pub start_threshold: f32,
    pub start_confirm_sec: u32,
    pub calm_threshold: f32,
    pub calm_confirm_sec: u32,
    pub retrigger_threshold: f32,
    pub retrigger_confirm_sec: u32,
    pub cooldown_sec: u32,
    pub min_soothing_sec: u32,
    pub max_escalations: u32,
    pub escalation_interval_sec: u32,
    pub escalation_volume_step: f32,
    pub volume_cap: f32,
    pub baseline_volume: f32,
    pub baseline_kind: SoundKind,
    pub predictive_enabled: bool,
    pub predictive_gradient_threshold: f32,
    pub predictive_confirm_sec: u32,
    pub predictive_escalation_threshold: f32,
    pub predictive_calm_gradient: f32,
    pub predictive_min_dwell_sec: u32,
    pub predictive_timeout_sec: u32,
    pub predictive_volume_fraction: f32,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            start_threshold: DEFAULT_START_THRESHOLD,
            start_confirm_sec: DEFAULT_START_CONFIRM_SEC,
            calm_threshold: DEFAULT_CALM_THRESHOLD,
            calm_confirm_sec: DEFAULT_CALM_CONFIRM_SEC,
            retrigger_threshold: DEFAULT_RETRIGGER_THRESHOLD,
            retrigger_confirm_sec: DEFAULT_RETRIGGER_CONFIRM_SEC,
            cooldown_sec: DEFAULT_COOLDOWN_SEC,
            min_soothing_sec: DEFAULT_MIN_SOOTHING_SEC,
            max_escalations: DEFAULT_MAX_ESCALATIONS,
            escalation_interval_sec: DEFAULT_ESCALATION_INTERVAL_SEC,
            escalation_volume_step: DEFAULT_ESCALATION_VOLUME_STEP,
            volume_cap: DEFAULT_VOLUME_CAP,
            baseline_volume: DEFAULT_BASELINE_VOLUME,
            baseline_kind: DEFAULT_BASELINE_KIND,
            predictive_enabled: false,
            predictive_gradient_threshold: DEFAULT_PREDICTIVE_GRADIENT,
            predictive_confirm_sec: DEFAULT_PREDICTIVE_CONFIRM_SEC,
            predictive_escalation_threshold: DEFAULT_PREDICTIVE_ESCALATION_THRESHOLD,
            predictive_calm_gradient: DEFAULT_PREDICTIVE_CALM_GRADIENT,
            predictive_min_dwell_sec: DEFAULT_PREDICTIVE_MIN_DWELL_SEC,
            predictive_timeout_sec: DEFAULT_PREDICTIVE_TIMEOUT_SEC,
            predictive_volume_fraction: DEFAULT_PREDICTIVE_VOLUME_FRACTION,
        }
    }
}

impl InterventionConfig {
    pub fn baseline_enabled(&self) -> bool {
        self.baseline_volume > 0.0
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("start_threshold", self.start_threshold),
            ("calm_threshold", self.calm_threshold),
            ("retrigger_threshold", self.retrigger_threshold),
            (
                "predictive_escalation_threshold",
                self.predictive_escalation_threshold,
            ),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 100], got {value}"));
            }
        }
        if self.calm_threshold >= self.start_threshold {
            return invalid(format!(
                "calm_threshold ({}) must be below start_threshold ({})",
                self.calm_threshold, self.start_threshold
            ));
        }
        if self.retrigger_threshold <= self.calm_threshold {
            return invalid(format!(
                "retrigger_threshold ({}) must be above calm_threshold ({})",
                self.retrigger_threshold, self.calm_threshold
            ));
        }
        if self.predictive_escalation_threshold >= self.start_threshold {
            return invalid(format!(
                "predictive_escalation_threshold ({}) must be below start_threshold ({})",
                self.predictive_escalation_threshold, self.start_threshold
            ));
        }
        for (name, value) in [
            ("start_confirm_sec", self.start_confirm_sec),
            ("calm_confirm_sec", self.calm_confirm_sec),
            ("retrigger_confirm_sec", self.retrigger_confirm_sec),
            ("predictive_confirm_sec", self.predictive_confirm_sec),
        ] {
            if value > MAX_CONFIRM_SEC {
                return invalid(format!(
                    "{name} must be at most {MAX_CONFIRM_SEC} seconds, got {value}"
                ));
            }
        }
        if !(1..=MAX_COOLDOWN_SEC).contains(&self.cooldown_sec) {
            return invalid(format!(
                "cooldown_sec must be between 1 and {MAX_COOLDOWN_SEC}, got {}",
                self.cooldown_sec
            ));
        }
        if !(self.volume_cap > 0.0 && self.volume_cap <= 1.0) {
            return invalid(format!(
                "volume_cap must be within (0, 1], got {}",
                self.volume_cap
            ));
        }
        if !(0.0..=self.volume_cap).contains(&self.baseline_volume) {
            return invalid(format!(
                "baseline_volume must be within [0, volume_cap={}], got {}",
                self.volume_cap, self.baseline_volume
            ));
        }
        if !(0.0..=1.0).contains(&self.escalation_volume_step) {
            return invalid(format!(
                "escalation_volume_step must be within [0, 1], got {}",
                self.escalation_volume_step
            ));
        }
        if self.escalation_interval_sec == 0 {
            return invalid("escalation_interval_sec must be at least 1".to_string());
        }
        if !(self.predictive_volume_fraction > 0.0 && self.predictive_volume_fraction <= 1.0) {
            return invalid(format!(
                "predictive_volume_fraction must be within (0, 1], got {}",
                self.predictive_volume_fraction
            ));
        }
        if !self.predictive_gradient_threshold.is_finite()
            || self.predictive_gradient_threshold <= 0.0
        {
            return invalid(format!(
                "predictive_gradient_threshold must be a positive rate, got {}",
                self.predictive_gradient_threshold
            ));
        }
        if self.predictive_calm_gradient >= self.predictive_gradient_threshold {
            return invalid(format!(
                "predictive_calm_gradient ({}) must be below predictive_gradient_threshold ({})",
                self.predictive_calm_gradient, self.predictive_gradient_threshold
            ));
        }
        if self.predictive_timeout_sec < self.predictive_min_dwell_sec {
            return invalid(format!(
                "predictive_timeout_sec ({}) cannot be shorter than predictive_min_dwell_sec ({})",
                self.predictive_timeout_sec, self.predictive_min_dwell_sec
            ));
        }
        Ok(())
    }
}

/// Output-side synthesis parameters. Independent from the analysis rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub buffer_frames: usize,
    pub safety_cap: f32,
    pub volume_time_constant_ms: f32,
    pub lfo_min_gain: f32,
    pub lfo_max_gain: f32,
    pub cutoff_hysteresis_hz: f32,
    pub shush_floor: f32,
    pub seed: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SYNTH_SAMPLE_RATE,
            buffer_frames: DEFAULT_SYNTH_BUFFER_FRAMES,
            safety_cap: DEFAULT_SAFETY_CAP,
            volume_time_constant_ms: DEFAULT_VOLUME_TIME_CONSTANT_MS,
            lfo_min_gain: 0.85,
            lfo_max_gain: 1.15,
            cutoff_hysteresis_hz: 5.0,
            shush_floor: 0.2,
            seed: None,
        }
    }
}

impl SynthConfig {
    pub fn buffer_duration_ms(&self) -> f32 {
        self.buffer_frames as f32 * 1_000.0 / self.sample_rate.max(1) as f32
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return invalid(format!(
                "synth sample_rate must be between 8000 and 192000 Hz, got {}",
                self.sample_rate
            ));
        }
        if !(64..=16_384).contains(&self.buffer_frames) {
            return invalid(format!(
                "buffer_frames must be between 64 and 16384, got {}",
                self.buffer_frames
            ));
        }
        if !(self.safety_cap > 0.0 && self.safety_cap <= 1.0) {
            return invalid(format!(
                "safety_cap must be within (0, 1], got {}",
                self.safety_cap
            ));
        }
        if self.volume_time_constant_ms.is_nan() || self.volume_time_constant_ms <= 0.0 {
            return invalid(format!(
                "volume_time_constant_ms must be positive, got {}",
                self.volume_time_constant_ms
            ));
        }
        if !(0.0 < self.lfo_min_gain && self.lfo_min_gain <= 1.0 && self.lfo_max_gain >= 1.0) {
            return invalid(format!(
                "LFO clamp band must straddle unity, got [{}, {}]",
                self.lfo_min_gain, self.lfo_max_gain
            ));
        }
        if self.cutoff_hysteresis_hz < 0.0 {
            return invalid(format!(
                "cutoff_hysteresis_hz must be non-negative, got {}",
                self.cutoff_hysteresis_hz
            ));
        }
        if !(0.0..1.0).contains(&self.shush_floor) {
            return invalid(format!(
                "shush_floor must be within [0, 1), got {}",
                self.shush_floor
            ));
        }
        Ok(())
    }
}

/// Everything one monitoring session needs, swappable only between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub analysis: AnalysisConfig,
    pub gradient: GradientConfig,
    pub intervention: InterventionConfig,
    pub synth: SynthConfig,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.analysis.validate()?;
        self.gradient.validate()?;
        self.intervention.validate()?;
        self.synth.validate()?;
        if self.intervention.volume_cap > self.synth.safety_cap {
            return invalid(format!(
                "volume_cap ({}) exceeds the synthesizer safety cap ({})",
                self.intervention.volume_cap, self.synth.safety_cap
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON session file. Missing keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let config: SessionConfig = serde_json::from_str(raw)
            .map_err(|err| PipelineError::InvalidConfig(format!("malformed session config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::InvalidConfig(format!(
                "failed to read session config '{}': {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }
}

fn invalid<T>(message: String) -> Result<T, PipelineError> {
    Err(PipelineError::InvalidConfig(message))
}
