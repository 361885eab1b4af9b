use super::{AudioFrame, FeatureExtractor, FeatureSet, FrameWindow};
use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use std::f32::consts::PI;

const RATE: u32 = 16_000;
const FRAME: usize = 4_096;

fn extractor() -> FeatureExtractor {
    FeatureExtractor::new(AnalysisConfig::default()).expect("default analysis config")
}

/// Cry-like harmonic stack starting at absolute sample `offset`.
fn cry(hz: f32, offset: usize, len: usize) -> Vec<f32> {
    let partials = [(1.0f32, 1.0f32), (2.0, 0.6), (3.0, 0.4), (4.0, 0.25)];
    (offset..offset + len)
        .map(|n| {
            let t = n as f32 / RATE as f32;
            let sum: f32 = partials
                .iter()
                .map(|(k, amp)| amp * (2.0 * PI * hz * k * t).sin())
                .sum();
            0.4 * sum / 2.25
        })
        .collect()
}

fn frame(samples: Vec<f32>, index: u64) -> AudioFrame {
    AudioFrame::new(samples, RATE, index * 128)
}

fn score_frames(extractor: &mut FeatureExtractor, frames: &[Vec<f32>]) -> Vec<f32> {
    frames
        .iter()
        .enumerate()
        .map(|(i, samples)| {
            let features = extractor
                .extract_features(&frame(samples.clone(), i as u64))
                .expect("valid frame");
            extractor.compute_unrest_score(&features)
        })
        .collect()
}

fn voiced(pitch_hz: f32) -> FeatureSet {
    FeatureSet {
        rms_energy: 0.1,
        peak: 0.3,
        cry_band_energy: 0.5,
        harmonic_band_energy: 0.3,
        spectral_centroid: 600.0,
        spectral_flatness: 0.1,
        pitch_hz,
        pitch_strength: 0.6,
        is_impulsive: false,
        is_silent: false,
    }
}

#[test]
fn window_emits_first_frame_then_every_hop() {
    let mut window = FrameWindow::new(FRAME, 2_048, RATE);
    let input = vec![0.25f32; FRAME + 2 * 2_048 + 100];
    let mut emitted = Vec::new();
    let mut first_ptr = None;
    for chunk in input.chunks(1_000) {
        let mut rest = chunk;
        while !rest.is_empty() {
            let used = window.fill(rest);
            rest = &rest[used..];
            if let Some(frame) = window.take_ready() {
                assert_eq!(frame.len(), FRAME);
                let ptr = frame.samples.as_ptr();
                assert_eq!(*first_ptr.get_or_insert(ptr), ptr);
                emitted.push(frame.timestamp_ms);
            }
        }
    }
    assert_eq!(emitted, vec![256, 384, 512]);
}

#[test]
fn window_shifts_by_hop() {
    let mut window = FrameWindow::new(8, 4, RATE);
    let ramp: Vec<f32> = (0..12).map(|n| n as f32).collect();
    let mut frames = Vec::new();
    let mut rest = &ramp[..];
    while !rest.is_empty() {
        let used = window.fill(rest);
        rest = &rest[used..];
        if let Some(frame) = window.take_ready() {
            frames.push(frame.samples.clone());
        }
    }
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
}

#[test]
fn rejects_malformed_frames() {
    let mut extractor = extractor();
    let empty = AudioFrame::new(Vec::new(), RATE, 0);
    assert!(matches!(
        extractor.extract_features(&empty),
        Err(PipelineError::InvalidFrame(_))
    ));
    let short = AudioFrame::new(vec![0.0; 100], RATE, 0);
    assert!(extractor.extract_features(&short).is_err());
    let mut samples = vec![0.0; FRAME];
    samples[17] = f32::NAN;
    assert!(extractor.extract_features(&AudioFrame::new(samples, RATE, 0)).is_err());
    let wrong_rate = AudioFrame::new(vec![0.0; FRAME], 44_100, 0);
    assert!(extractor.extract_features(&wrong_rate).is_err());
}

#[test]
fn extracts_cry_features_from_harmonic_stack() {
    let mut extractor = extractor();
    let features = extractor
        .extract_features(&frame(cry(400.0, 0, FRAME), 0))
        .expect("features");
    assert!(!features.is_silent);
    assert!(!features.is_impulsive);
    assert!((features.pitch_hz - 400.0).abs() < 10.0, "{features:?}");
    assert!(features.pitch_strength > 0.9);
    assert!(features.cry_band_energy > 0.4);
    assert!(features.harmonic_band_energy > 0.2);
    assert!(features.spectral_flatness < 0.2);
}

#[test]
fn sustained_cry_crosses_start_threshold() {
    let mut extractor = extractor();
    let frames: Vec<Vec<f32>> = (0..12).map(|i| cry(420.0, i * 2_048, FRAME)).collect();
    let scores = score_frames(&mut extractor, &frames);
    assert!(scores.windows(2).all(|w| w[1] >= w[0] - 1e-3), "{scores:?}");
    assert!(*scores.last().unwrap() > 70.0, "{scores:?}");
}

#[test]
fn silence_decays_to_zero_without_spiking() {
    let mut extractor = extractor();
    let loud: Vec<Vec<f32>> = (0..10).map(|i| cry(400.0, i * 2_048, FRAME)).collect();
    let peak = *score_frames(&mut extractor, &loud).last().unwrap();
    assert!(peak > 50.0);

    let quiet: Vec<Vec<f32>> = (0..12).map(|_| vec![0.0; FRAME]).collect();
    let scores = score_frames(&mut extractor, &quiet);
    let mut previous = peak;
    for score in &scores {
        assert!(*score <= previous);
        previous = *score;
    }
    assert_eq!(*scores.last().unwrap(), 0.0);
}

#[test]
fn infant_pitch_outscores_adult_pitch() {
    let infant = extractor().compute_unrest_score(&voiced(400.0));
    let adult = extractor().compute_unrest_score(&voiced(150.0));
    assert!(infant > adult, "infant {infant} adult {adult}");
}

#[test]
fn unclear_pitch_decays_instead_of_scoring() {
    let mut extractor = extractor();
    let first = extractor.compute_unrest_score(&voiced(400.0));
    let unclear = FeatureSet {
        pitch_strength: 0.2,
        ..voiced(400.0)
    };
    let second = extractor.compute_unrest_score(&unclear);
    assert!((second - first * 0.8).abs() < 1e-4);
}

#[test]
fn scores_stay_in_range_for_arbitrary_features() {
    let mut extractor = extractor();
    let mut state = 0x9e37_79b9u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as f32 / u32::MAX as f32
    };
    for _ in 0..2_000 {
        let features = FeatureSet {
            rms_energy: next(),
            peak: next(),
            cry_band_energy: next(),
            harmonic_band_energy: next(),
            spectral_centroid: next() * 8_000.0,
            spectral_flatness: next(),
            pitch_hz: 60.0 + next() * 700.0,
            pitch_strength: next(),
            is_impulsive: next() > 0.9,
            is_silent: next() > 0.9,
        };
        let score = extractor.compute_unrest_score(&features);
        assert!((0.0..=100.0).contains(&score), "{score}");
    }
}

#[test]
fn click_in_silence_is_suppressed() {
    let mut extractor = extractor();
    let mut frames = vec![vec![0.0; FRAME]; 2];
    let mut click = vec![0.0; FRAME];
    for (i, sample) in click.iter_mut().skip(3_900).take(60).enumerate() {
        *sample = if i % 2 == 0 { 0.9 } else { -0.9 };
    }
    frames.push(click);
    let mut scores = Vec::new();
    for (i, samples) in frames.into_iter().enumerate() {
        let features = extractor
            .extract_features(&frame(samples, i as u64))
            .expect("valid frame");
        if i == 2 {
            assert!(features.is_impulsive);
        }
        scores.push(extractor.compute_unrest_score(&features));
    }
    assert!(scores.iter().all(|s| *s == 0.0));
}

#[test]
fn reset_matches_fresh_extractor() {
    let frames: Vec<Vec<f32>> = (0..6).map(|i| cry(380.0, i * 2_048, FRAME)).collect();
    let mut used = extractor();
    score_frames(&mut used, &frames);
    score_frames(&mut used, &[vec![0.0; FRAME]]);
    used.reset();
    assert_eq!(used.smoothed_score(), 0.0);

    let mut fresh = extractor();
    assert_eq!(
        score_frames(&mut used, &frames),
        score_frames(&mut fresh, &frames)
    );
}
