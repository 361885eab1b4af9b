use crate::config::Band;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const POWER_EPSILON: f32 = 1e-12;

/// Summary of the Welch-averaged power spectrum of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct SpectralSummary {
    pub(super) cry_band_fraction: f32,
    pub(super) harmonic_band_fraction: f32,
    pub(super) centroid_hz: f32,
    pub(super) flatness: f32,
}

/// Hann-windowed FFT with every buffer sized at construction.
pub(super) struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    power: Vec<f32>,
    bin_hz: f32,
}

impl SpectrumAnalyzer {
    pub(super) fn new(fft_size: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            fft_size,
            window: hann_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            power: vec![0.0; fft_size / 2 + 1],
            bin_hz: sample_rate as f32 / fft_size as f32,
        }
    }

    /// Average the power spectrum over half-overlapping segments of `samples`.
    pub(super) fn analyze(&mut self, samples: &[f32], cry: Band, harmonic: Band) -> SpectralSummary {
        self.power.fill(0.0);
        let step = (self.fft_size / 2).max(1);
        let mut segments = 0usize;
        let mut start = 0usize;
        while start + self.fft_size <= samples.len() {
            let segment = &samples[start..start + self.fft_size];
            for ((slot, sample), weight) in self.buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new(sample * weight, 0.0);
            }
            self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
            for (power, bin) in self.power.iter_mut().zip(&self.buffer) {
                *power += bin.norm_sqr();
            }
            segments += 1;
            start += step;
        }
        if segments == 0 {
            return SpectralSummary::default();
        }
        let scale = 1.0 / segments as f32;
        for power in self.power.iter_mut() {
            *power *= scale;
        }
        self.summarize(cry, harmonic)
    }

    fn summarize(&self, cry: Band, harmonic: Band) -> SpectralSummary {
        // DC carries no pitch information.
        let bins = &self.power[1..];
        let mut total = 0.0f32;
        let mut cry_energy = 0.0f32;
        let mut harmonic_energy = 0.0f32;
        let mut weighted_freq = 0.0f32;
        let mut magnitude_sum = 0.0f32;
        let mut log_sum = 0.0f32;

        for (offset, power) in bins.iter().enumerate() {
            let hz = (offset + 1) as f32 * self.bin_hz;
            total += power;
            if cry.contains(hz) {
                cry_energy += power;
            }
            if harmonic.contains(hz) {
                harmonic_energy += power;
            }
            let magnitude = power.sqrt();
            weighted_freq += hz * magnitude;
            magnitude_sum += magnitude;
            log_sum += (power + POWER_EPSILON).ln();
        }

        if total <= POWER_EPSILON {
            return SpectralSummary::default();
        }
        let count = bins.len() as f32;
        let geometric = (log_sum / count).exp();
        let arithmetic = total / count + POWER_EPSILON;
        SpectralSummary {
            cry_band_fraction: (cry_energy / total).clamp(0.0, 1.0),
            harmonic_band_fraction: (harmonic_energy / total).clamp(0.0, 1.0),
            centroid_hz: if magnitude_sum > 0.0 {
                weighted_freq / magnitude_sum
            } else {
                0.0
            },
            flatness: (geometric / arithmetic).clamp(0.0, 1.0),
        }
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f32;
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
        .collect()
}
