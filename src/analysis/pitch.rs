/// Fraction of the global correlation peak a shorter lag must reach to win.
/// Picking the first strong peak avoids octave-down errors.
const PEAK_ACCEPT_RATIO: f32 = 0.85;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct PitchEstimate {
    pub(super) hz: f32,
    pub(super) strength: f32,
}

/// Normalized autocorrelation over a fixed lag range.
pub(super) struct PitchDetector {
    window: usize,
    min_lag: usize,
    max_lag: usize,
    correlations: Vec<f32>,
}

impl PitchDetector {
    pub(super) fn new(window: usize, min_lag: usize, max_lag: usize) -> Self {
        let min_lag = min_lag.max(1);
        let max_lag = max_lag.max(min_lag + 2);
        Self {
            window: window.max(1),
            min_lag,
            max_lag,
            correlations: vec![0.0; max_lag + 2],
        }
    }

    /// Estimate pitch from the newest `window + max_lag` samples.
    pub(super) fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchEstimate {
        let needed = self.window + self.max_lag;
        if samples.len() < needed || sample_rate == 0 {
            return PitchEstimate::default();
        }
        let segment = &samples[samples.len() - needed..];
        let head = &segment[..self.window];
        let head_energy: f32 = head.iter().map(|s| s * s).sum();
        if head_energy <= f32::EPSILON {
            return PitchEstimate::default();
        }

        let mut lag_energy: f32 = segment[self.min_lag..self.min_lag + self.window]
            .iter()
            .map(|s| s * s)
            .sum();
        let mut best = f32::MIN;
        for lag in self.min_lag..=self.max_lag {
            if lag > self.min_lag {
                let leaving = segment[lag - 1];
                let entering = segment[lag + self.window - 1];
                lag_energy = (lag_energy - leaving * leaving + entering * entering).max(0.0);
            }
            let dot: f32 = head
                .iter()
                .zip(&segment[lag..lag + self.window])
                .map(|(a, b)| a * b)
                .sum();
            let denom = (head_energy * lag_energy).sqrt();
            let r = if denom > f32::EPSILON { dot / denom } else { 0.0 };
            self.correlations[lag] = r;
            best = best.max(r);
        }
        if best <= 0.0 {
            return PitchEstimate::default();
        }

        let accept = best * PEAK_ACCEPT_RATIO;
        let chosen = (self.min_lag..=self.max_lag)
            .find(|&lag| {
                let r = self.correlations[lag];
                let left = if lag > self.min_lag {
                    self.correlations[lag - 1]
                } else {
                    f32::MIN
                };
                let right = if lag < self.max_lag {
                    self.correlations[lag + 1]
                } else {
                    f32::MIN
                };
                r >= accept && r >= left && r >= right
            })
            .unwrap_or(self.min_lag);

        let refined = self.interpolate(chosen);
        PitchEstimate {
            hz: sample_rate as f32 / refined,
            strength: self.correlations[chosen].clamp(0.0, 1.0),
        }
    }

    /// Parabolic refinement of the chosen lag.
    fn interpolate(&self, lag: usize) -> f32 {
        if lag <= self.min_lag || lag >= self.max_lag {
            return lag as f32;
        }
        let left = self.correlations[lag - 1];
        let center = self.correlations[lag];
        let right = self.correlations[lag + 1];
        let denom = left - 2.0 * center + right;
        if denom.abs() <= f32::EPSILON {
            return lag as f32;
        }
        let shift = (0.5 * (left - right) / denom).clamp(-0.5, 0.5);
        lag as f32 + shift
    }
}
