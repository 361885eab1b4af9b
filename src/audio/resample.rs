//! Device-rate to analysis-rate conversion.
//!
//! Microphones usually run at 44.1 or 48 kHz while analysis wants 16 kHz.
//! Decimation runs a short windowed-sinc low-pass first so content above the
//! analysis Nyquist frequency does not fold back into the cry band.

use crate::error::PipelineError;
use std::f32::consts::PI;

pub(crate) const MIN_DEVICE_RATE: u32 = 2_000;
pub(crate) const MAX_DEVICE_RATE: u32 = 384_000;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

/// Converts fixed-size device blocks to fixed-size analysis blocks. Filter
/// taps and the scratch buffer are sized once at construction.
pub(crate) struct RateConverter {
    device_rate: u32,
    target_rate: u32,
    ratio: f32,
    taps: Vec<f32>,
    filtered: Vec<f32>,
}

impl RateConverter {
    pub(crate) fn new(device_rate: u32, target_rate: u32) -> Result<Self, PipelineError> {
        if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
            return Err(PipelineError::InitializationFailure {
                device: "capture",
                reason: format!("unsupported input sample rate {device_rate} Hz"),
            });
        }
        if target_rate == 0 {
            return Err(PipelineError::InvalidConfig(
                "analysis sample rate must be positive".to_string(),
            ));
        }
        let taps = if device_rate > target_rate {
            let cutoff = (target_rate as f32 * 0.5 / device_rate as f32).min(0.499);
            design_low_pass(cutoff, downsampling_tap_count(device_rate, target_rate))
        } else {
            Vec::new()
        };
        Ok(Self {
            device_rate,
            target_rate,
            ratio: target_rate as f32 / device_rate as f32,
            taps,
            filtered: Vec::new(),
        })
    }

    /// Device samples needed to produce `target_len` analysis samples.
    pub(crate) fn device_len(&self, target_len: usize) -> usize {
        let num = target_len as u64 * u64::from(self.device_rate);
        num.div_ceil(u64::from(self.target_rate)).max(1) as usize
    }

    /// Resample `input` into exactly `out.len()` samples. Missing tail
    /// samples repeat the last input value.
    pub(crate) fn convert_into(&mut self, input: &[f32], out: &mut [f32]) {
        if input.is_empty() {
            out.fill(0.0);
            return;
        }
        if self.taps.is_empty() {
            resample_linear_into(input, self.ratio, out);
            return;
        }
        self.filtered.clear();
        low_pass_into(input, &self.taps, &mut self.filtered);
        resample_linear_into(&self.filtered, self.ratio, out);
    }
}

/// Linear interpolation at `ratio` output samples per input sample.
fn resample_linear_into(input: &[f32], ratio: f32, out: &mut [f32]) {
    let last = input.last().copied().unwrap_or(0.0);
    for (i, slot) in out.iter_mut().enumerate() {
        let position = i as f32 / ratio;
        let index = position.floor() as usize;
        let frac = position - index as f32;
        *slot = match (input.get(index), input.get(index + 1)) {
            (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
            _ => last,
        };
    }
}

/// Centered FIR; samples outside the block count as zero.
fn low_pass_into(input: &[f32], taps: &[f32], out: &mut Vec<f32>) {
    let half = taps.len() / 2;
    out.extend((0..input.len()).map(|n| {
        taps.iter()
            .enumerate()
            .filter_map(|(k, tap)| {
                (n + k)
                    .checked_sub(half)
                    .and_then(|idx| input.get(idx))
                    .map(|sample| sample * tap)
            })
            .sum::<f32>()
    }));
}

/// Odd tap count growing with the decimation ratio.
pub(crate) fn downsampling_tap_count(device_rate: u32, target_rate: u32) -> usize {
    let ratio = device_rate as f32 / target_rate.max(1) as f32;
    let mut taps = (ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

/// Hamming-windowed sinc, normalized to unity DC gain.
pub(crate) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    if taps <= 1 {
        return vec![1.0];
    }
    let m = (taps - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let centered = n as f32 - m / 2.0;
            let ideal = if centered == 0.0 {
                2.0 * normalized_cutoff
            } else {
                (2.0 * PI * normalized_cutoff * centered).sin() / (PI * centered)
            };
            let window = 0.54 - 0.46 * (2.0 * PI * n as f32 / m).cos();
            ideal * window
        })
        .collect();
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        coeffs.iter_mut().for_each(|c| *c /= sum);
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(hz: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * hz * n as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn low_pass_has_unity_dc_gain() {
        let taps = design_low_pass(0.16, 13);
        assert_eq!(taps.len(), 13);
        assert!((taps.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tap_count_is_odd_and_bounded() {
        for rate in [16_001, 44_100, 48_000, 96_000, 384_000] {
            let taps = downsampling_tap_count(rate, 16_000);
            assert_eq!(taps % 2, 1);
            assert!((11..=MAX_DOWNSAMPLING_TAPS).contains(&taps));
        }
    }

    #[test]
    fn rejects_out_of_range_device_rates() {
        assert!(RateConverter::new(0, 16_000).is_err());
        assert!(RateConverter::new(1_000_000, 16_000).is_err());
    }

    #[test]
    fn same_rate_is_a_copy() {
        let mut converter = RateConverter::new(16_000, 16_000).unwrap();
        let input = tone(440.0, 16_000, 256);
        let mut out = vec![0.0; 256];
        converter.convert_into(&input, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn decimation_keeps_cry_band_and_drops_ultrasonics() {
        let mut converter = RateConverter::new(48_000, 16_000).unwrap();
        assert_eq!(converter.device_len(2_048), 6_144);
        let mut out = vec![0.0; 2_048];

        converter.convert_into(&tone(400.0, 48_000, 6_144), &mut out);
        let kept = rms(&out[200..1_800]);
        assert!((kept - 0.707).abs() < 0.05, "{kept}");

        converter.convert_into(&tone(15_000.0, 48_000, 6_144), &mut out);
        let folded = rms(&out[200..1_800]);
        assert!(folded < 0.2, "{folded}");
    }
}
