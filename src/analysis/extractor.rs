use super::frame::AudioFrame;
use super::pitch::PitchDetector;
use super::spectrum::SpectrumAnalyzer;
use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use std::collections::VecDeque;

/// Scores below this snap to zero while decaying.
const DECAY_FLOOR: f32 = 0.5;
const MIN_RMS: f32 = 1e-6;

/// Acoustic features of one analysis window. Band energies are fractions of
/// the total spectral power.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureSet {
    pub rms_energy: f32,
    pub peak: f32,
    pub cry_band_energy: f32,
    pub harmonic_band_energy: f32,
    pub spectral_centroid: f32,
    pub spectral_flatness: f32,
    pub pitch_hz: f32,
    pub pitch_strength: f32,
    pub is_impulsive: bool,
    pub is_silent: bool,
}

/// Turns frames into features and features into a smoothed 0-100 score.
///
/// Holds the rolling state for impulse suppression, the consistency filter,
/// and the moving average. Call [`FeatureExtractor::reset`] between sessions.
pub struct FeatureExtractor {
    config: AnalysisConfig,
    spectrum: SpectrumAnalyzer,
    pitch: PitchDetector,
    previous_energy: Option<f32>,
    impulse_hold: u32,
    history: VecDeque<f32>,
    smoothed: f32,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            spectrum: SpectrumAnalyzer::new(config.fft_size, config.sample_rate),
            pitch: PitchDetector::new(config.pitch_window, config.min_lag(), config.max_lag()),
            previous_energy: None,
            impulse_hold: 0,
            history: VecDeque::with_capacity(config.consistency_window + 1),
            smoothed: 0.0,
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Current smoothed score.
    pub fn smoothed_score(&self) -> f32 {
        self.smoothed
    }

    pub fn extract_features(&mut self, frame: &AudioFrame) -> Result<FeatureSet, PipelineError> {
        frame.check(self.config.frame_samples, self.config.sample_rate)?;
        let samples = &frame.samples;

        let mut energy = 0.0f32;
        let mut peak = 0.0f32;
        for sample in samples.iter() {
            energy += sample * sample;
            peak = peak.max(sample.abs());
        }
        let mean_square = energy / samples.len() as f32;
        let rms = mean_square.sqrt();
        let crest = if rms > MIN_RMS { peak / rms } else { 0.0 };

        let onset = self
            .previous_energy
            .map(|previous| mean_square > previous.max(f32::MIN_POSITIVE) * self.config.impulse_energy_ratio)
            .unwrap_or(false);
        let transient = onset && crest > self.config.impulse_crest_factor;
        self.previous_energy = Some(mean_square);

        let mut features = FeatureSet {
            rms_energy: rms,
            peak,
            ..FeatureSet::default()
        };

        if rms < self.config.silence_rms {
            features.is_silent = true;
            self.impulse_hold = self.impulse_hold.saturating_sub(1);
            features.is_impulsive = transient || self.impulse_hold > 0;
            return Ok(features);
        }

        let summary = self.spectrum.analyze(
            samples,
            self.config.cry_band,
            self.config.harmonic_band,
        );
        let estimate = self.pitch.detect(samples, frame.sample_rate);
        features.cry_band_energy = summary.cry_band_fraction;
        features.harmonic_band_energy = summary.harmonic_band_fraction;
        features.spectral_centroid = summary.centroid_hz;
        features.spectral_flatness = summary.flatness;
        features.pitch_hz = estimate.hz;
        features.pitch_strength = estimate.strength;

        if transient {
            self.impulse_hold = self.config.impulse_hold_frames;
        } else if self.impulse_hold > 0 {
            // A sustained, strongly pitched frame ends the hold early; claps
            // and knocks never qualify.
            let sustained = crest <= self.config.impulse_crest_factor
                && estimate.strength >= self.config.strong_pitch_threshold;
            self.impulse_hold = if sustained { 0 } else { self.impulse_hold - 1 };
        }
        features.is_impulsive = transient || self.impulse_hold > 0;
        Ok(features)
    }

    /// Fold one feature set into the smoothed score, always within [0, 100].
    pub fn compute_unrest_score(&mut self, features: &FeatureSet) -> f32 {
        if features.is_silent {
            return self.decay(self.config.silence_decay);
        }
        if features.is_impulsive {
            return self.decay(self.config.impulse_decay);
        }
        let voiced = self.config.infant_pitch.contains(features.pitch_hz)
            || self.config.adult_pitch.contains(features.pitch_hz);
        if features.pitch_strength < self.config.clarity_threshold || !voiced {
            return self.decay(self.config.noise_decay);
        }

        let raw = self.raw_score(features);
        let filtered = self.consistency_filter(raw);
        let alpha = self.config.ema_alpha;
        self.smoothed = (alpha * filtered + (1.0 - alpha) * self.smoothed).clamp(0.0, 100.0);
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.previous_energy = None;
        self.impulse_hold = 0;
        self.history.clear();
        self.smoothed = 0.0;
    }

    fn raw_score(&self, features: &FeatureSet) -> f32 {
        let cfg = &self.config;
        let weights = cfg.weights;

        let pitch = ((features.pitch_strength - cfg.clarity_threshold)
            / (1.0 - cfg.clarity_threshold).max(f32::EPSILON))
        .clamp(0.0, 1.0);
        let level_db = 20.0 * features.rms_energy.max(MIN_RMS).log10();
        let energy = ((level_db - cfg.energy_floor_db) / (cfg.energy_ceiling_db - cfg.energy_floor_db))
            .clamp(0.0, 1.0);
        let cry = features.cry_band_energy.clamp(0.0, 1.0);
        let harmonic = (features.harmonic_band_energy * 2.0).clamp(0.0, 1.0);
        let tonality = (1.0 - features.spectral_flatness).clamp(0.0, 1.0);

        let weighted = weights.pitch * pitch
            + weights.energy * energy
            + weights.cry_band * cry
            + weights.harmonic * harmonic
            + weights.tonality * tonality;
        let mut raw = 100.0 * weighted / weights.total();
        if features.pitch_strength > cfg.strong_pitch_threshold {
            raw *= cfg.strong_pitch_boost;
        }
        if cfg.adult_pitch.contains(features.pitch_hz) {
            raw *= cfg.adult_discount;
        }
        raw.clamp(0.0, 100.0)
    }

    /// Blend large jumps with the recent average so one odd frame cannot
    /// swing the score.
    fn consistency_filter(&mut self, raw: f32) -> f32 {
        let filtered = if self.history.is_empty() {
            raw
        } else {
            let average = self.history.iter().sum::<f32>() / self.history.len() as f32;
            if (raw - average).abs() > self.config.consistency_jump {
                (raw + average) * 0.5
            } else {
                raw
            }
        };
        self.remember(raw);
        filtered
    }

    fn decay(&mut self, factor: f32) -> f32 {
        self.smoothed *= factor;
        if self.smoothed < DECAY_FLOOR {
            self.smoothed = 0.0;
        }
        self.remember(self.smoothed);
        self.smoothed
    }

    fn remember(&mut self, value: f32) {
        self.history.push_back(value);
        while self.history.len() > self.config.consistency_window {
            self.history.pop_front();
        }
    }
}
