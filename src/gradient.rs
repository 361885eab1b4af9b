//! Rate-of-change tracking over recent unrest scores.

use crate::analysis::Direction;
use crate::config::GradientConfig;
use crate::error::PipelineError;
use serde::Serialize;
use std::collections::VecDeque;

/// Seven ordered buckets of the smoothed gradient, in score units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    RisingFast,
    Rising,
    RisingSlow,
    Stable,
    FallingSlow,
    Falling,
    FallingFast,
}

impl Trend {
    pub fn classify(gradient: f32, config: &GradientConfig) -> Self {
        if gradient > config.fast_cut {
            Trend::RisingFast
        } else if gradient > config.moderate_cut {
            Trend::Rising
        } else if gradient > config.slow_cut {
            Trend::RisingSlow
        } else if gradient >= -config.slow_cut {
            Trend::Stable
        } else if gradient >= -config.moderate_cut {
            Trend::FallingSlow
        } else if gradient >= -config.fast_cut {
            Trend::Falling
        } else {
            Trend::FallingFast
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Trend::RisingFast | Trend::Rising | Trend::RisingSlow => Direction::Rising,
            Trend::Stable => Direction::Stable,
            Trend::FallingSlow | Trend::Falling | Trend::FallingFast => Direction::Falling,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Trend::RisingFast => "rising_fast",
            Trend::Rising => "rising",
            Trend::RisingSlow => "rising_slow",
            Trend::Stable => "stable",
            Trend::FallingSlow => "falling_slow",
            Trend::Falling => "falling",
            Trend::FallingFast => "falling_fast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GradientSample {
    score: f32,
    timestamp_ms: u64,
}

/// Ring buffer of `window_size + 1` scores; the smoothed gradient is the
/// mean of the last `window_size` instantaneous gradients.
#[derive(Debug, Clone)]
pub struct GradientEstimator {
    config: GradientConfig,
    samples: VecDeque<GradientSample>,
    instants: VecDeque<f32>,
    instant: f32,
    smoothed: f32,
}

impl GradientEstimator {
    pub fn new(config: GradientConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            samples: VecDeque::with_capacity(config.window_size + 1),
            instants: VecDeque::with_capacity(config.window_size),
            instant: 0.0,
            smoothed: 0.0,
            config,
        })
    }

    /// Record a score and return the updated smoothed gradient.
    pub fn add_measurement(&mut self, score: f32, timestamp_ms: u64) -> Result<f32, PipelineError> {
        if let Some(last) = self.samples.back() {
            if timestamp_ms < last.timestamp_ms {
                return Err(PipelineError::InvalidTimestamp {
                    previous_ms: last.timestamp_ms,
                    next_ms: timestamp_ms,
                });
            }
        }
        self.samples.push_back(GradientSample {
            score,
            timestamp_ms,
        });
        while self.samples.len() > self.config.window_size + 1 {
            self.samples.pop_front();
        }

        if let (Some(oldest), Some(newest)) = (self.samples.front(), self.samples.back()) {
            let elapsed_ms = newest.timestamp_ms - oldest.timestamp_ms;
            if elapsed_ms > 0 {
                self.instant = (newest.score - oldest.score) * 1_000.0 / elapsed_ms as f32;
                self.instants.push_back(self.instant);
                while self.instants.len() > self.config.window_size {
                    self.instants.pop_front();
                }
                self.smoothed = self.instants.iter().sum::<f32>() / self.instants.len() as f32;
            }
        }
        Ok(self.smoothed)
    }

    pub fn instant_gradient(&self) -> f32 {
        self.instant
    }

    pub fn smoothed_gradient(&self) -> f32 {
        self.smoothed
    }

    pub fn trend(&self) -> Trend {
        Trend::classify(self.smoothed, &self.config)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Rising fast enough while still below `max_score`.
    pub fn should_trigger_predictive(&self, current_score: f32, threshold: f32, max_score: f32) -> bool {
        !self.instants.is_empty() && self.smoothed >= threshold && current_score < max_score
    }

    /// Smoothed gradient strictly below `threshold`.
    pub fn has_calming_trend(&self, threshold: f32) -> bool {
        self.smoothed < threshold
    }

    /// Linear extrapolation, clamped to the score range.
    pub fn predict_score(&self, current_score: f32, seconds_ahead: f32) -> f32 {
        (current_score + self.smoothed * seconds_ahead).clamp(0.0, 100.0)
    }

    /// Seconds until `target_score` is reached, if the trend is heading there.
    pub fn predict_time_to_reach(&self, current_score: f32, target_score: f32) -> Option<f32> {
        if (target_score - current_score).abs() <= f32::EPSILON {
            return Some(0.0);
        }
        let heading_there = match self.trend().direction() {
            Direction::Rising => target_score > current_score,
            Direction::Falling => target_score < current_score,
            Direction::Stable => false,
        };
        if !heading_there || self.smoothed == 0.0 {
            return None;
        }
        Some((target_score - current_score) / self.smoothed)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.instants.clear();
        self.instant = 0.0;
        self.smoothed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> GradientEstimator {
        GradientEstimator::new(GradientConfig::default()).expect("default gradient config")
    }

    fn feed(estimator: &mut GradientEstimator, scores: &[f32], spacing_ms: u64) -> f32 {
        let mut smoothed = 0.0;
        for (i, score) in scores.iter().enumerate() {
            smoothed = estimator
                .add_measurement(*score, i as u64 * spacing_ms)
                .expect("monotonic timestamps");
        }
        smoothed
    }

    #[test]
    fn rising_scores_classify_as_rising() {
        let mut est = estimator();
        let smoothed = feed(&mut est, &[20.0, 20.0, 20.0, 30.0, 30.0, 40.0], 500);
        assert!(smoothed > 0.0);
        assert!((smoothed - 3.933).abs() < 0.01, "{smoothed}");
        assert!(matches!(est.trend(), Trend::Rising | Trend::RisingSlow));
    }

    #[test]
    fn buckets_follow_cut_points() {
        let cfg = GradientConfig::default();
        assert_eq!(Trend::classify(6.0, &cfg), Trend::RisingFast);
        assert_eq!(Trend::classify(5.0, &cfg), Trend::Rising);
        assert_eq!(Trend::classify(1.0, &cfg), Trend::RisingSlow);
        assert_eq!(Trend::classify(0.5, &cfg), Trend::Stable);
        assert_eq!(Trend::classify(-0.5, &cfg), Trend::Stable);
        assert_eq!(Trend::classify(-1.0, &cfg), Trend::FallingSlow);
        assert_eq!(Trend::classify(-3.0, &cfg), Trend::Falling);
        assert_eq!(Trend::classify(-5.1, &cfg), Trend::FallingFast);
    }

    #[test]
    fn rejects_time_going_backwards() {
        let mut est = estimator();
        est.add_measurement(10.0, 1_000).unwrap();
        let err = est.add_measurement(10.0, 900).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidTimestamp {
                previous_ms: 1_000,
                next_ms: 900
            }
        );
    }

    #[test]
    fn duplicate_timestamps_do_not_divide_by_zero() {
        let mut est = estimator();
        est.add_measurement(10.0, 0).unwrap();
        let smoothed = est.add_measurement(90.0, 0).unwrap();
        assert_eq!(smoothed, 0.0);
    }

    #[test]
    fn predictions_respect_direction() {
        let mut est = estimator();
        feed(&mut est, &[10.0, 20.0, 30.0, 40.0], 1_000);
        assert!((est.smoothed_gradient() - 10.0).abs() < 1e-4);
        assert_eq!(est.predict_score(40.0, 10.0), 100.0);
        let eta = est.predict_time_to_reach(40.0, 70.0).expect("rising toward target");
        assert!((eta - 3.0).abs() < 1e-4);
        assert_eq!(est.predict_time_to_reach(40.0, 20.0), None);
        assert!(est.should_trigger_predictive(40.0, 2.0, 70.0));
        assert!(!est.should_trigger_predictive(75.0, 2.0, 70.0));
        assert!(!est.has_calming_trend(0.0));
    }

    #[test]
    fn stable_trend_never_predicts_arrival() {
        let mut est = estimator();
        feed(&mut est, &[50.0, 50.0, 50.0], 500);
        assert_eq!(est.trend(), Trend::Stable);
        assert_eq!(est.predict_time_to_reach(50.0, 80.0), None);
        assert!(est.has_calming_trend(0.5));
        assert!(!est.has_calming_trend(0.0), "a flat trend has not fallen below zero");
    }

    #[test]
    fn reset_matches_fresh_estimator() {
        let mut used = estimator();
        feed(&mut used, &[5.0, 60.0, 10.0], 250);
        used.reset();
        let mut fresh = estimator();
        let a = feed(&mut used, &[20.0, 25.0, 40.0], 500);
        let b = feed(&mut fresh, &[20.0, 25.0, 40.0], 500);
        assert_eq!(a, b);
        assert_eq!(used.trend(), fresh.trend());
        assert_eq!(used.sample_count(), fresh.sample_count());
    }
}
