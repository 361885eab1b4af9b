use super::generators::{
    BrownNoise, LivingNoise, NoiseGenerator, NoiseSource, OnePole, PinkNoise, ShushPulse,
};
use super::{
    lfo_gain, one_pole_coefficient, shush_envelope, SoundKind, SoundProfile, SoundSynthesizer,
    SynthCommand,
};
use crate::config::SynthConfig;
use std::f32::consts::TAU;

fn seeded_config() -> SynthConfig {
    SynthConfig {
        seed: Some(0x5eed),
        ..SynthConfig::default()
    }
}

fn synth() -> SoundSynthesizer {
    SoundSynthesizer::new(seeded_config()).expect("valid synth config")
}

#[test]
fn lfo_gain_stays_in_band_for_pathological_depths() {
    for depth in [0.0f32, 0.12, 0.5, 1.0, 10.0] {
        for step in 0..720 {
            let phase = step as f32 * TAU / 720.0;
            let gain = lfo_gain(depth, phase, 0.85, 1.15);
            assert!(
                (0.85..=1.15).contains(&gain),
                "depth {depth} phase {phase} produced {gain}"
            );
        }
    }
}

#[test]
fn one_pole_coefficient_is_strictly_inside_unit_interval() {
    for cutoff in [100.0f32, 250.0, 1_000.0, 4_000.0, 10_000.0] {
        let a = one_pole_coefficient(cutoff, 44_100.0);
        assert!(a > 0.0 && a < 1.0, "cutoff {cutoff} gave {a}");
    }
    assert!(one_pole_coefficient(100.0, 44_100.0) > one_pole_coefficient(10_000.0, 44_100.0));
}

#[test]
fn one_pole_only_retunes_past_hysteresis() {
    let mut filter = OnePole::new(800.0, 44_100.0);
    let before = filter.coefficient();
    assert!(!filter.retune(803.0, 5.0));
    assert_eq!(filter.coefficient(), before);
    assert!(filter.retune(810.0, 5.0));
    assert!(filter.coefficient() < before);
}

#[test]
fn brown_noise_stays_bounded() {
    let mut noise = NoiseSource::new(Some(1));
    let mut brown = BrownNoise::new();
    let profile = SoundProfile::for_kind(SoundKind::Brown);
    for _ in 0..200_000 {
        let sample = brown.next_sample(&profile, &mut noise);
        assert!((-1.0..=1.0).contains(&sample));
    }
}

#[test]
fn pink_noise_low_octaves_hold_between_refreshes() {
    let mut noise = NoiseSource::new(Some(2));
    let mut pink = PinkNoise::new();
    let profile = SoundProfile::for_kind(SoundKind::Pink);
    let mut energy = 0.0f32;
    for _ in 0..44_100 {
        let sample = pink.next_sample(&profile, &mut noise);
        assert!((-1.0..=1.0).contains(&sample));
        energy += sample * sample;
    }
    assert!(energy > 0.0);
}

#[test]
fn living_noise_keeps_filter_coefficient_valid_while_drifting() {
    let config = seeded_config();
    let mut noise = NoiseSource::new(Some(3));
    let mut living = LivingNoise::new(&config);
    let profile = SoundProfile {
        drift_rate_hz: 5.0,
        ..SoundProfile::for_kind(SoundKind::OceanBreath)
    };
    for _ in 0..44_100 {
        let sample = living.next_sample(&profile, &mut noise);
        assert!((-1.0..=1.0).contains(&sample));
        let a = living.filter_coefficient();
        assert!(a > 0.0 && a < 1.0);
    }
}

#[test]
fn shush_envelope_never_mutes() {
    for step in 0..360 {
        let phase = step as f32 * TAU / 360.0;
        let env = shush_envelope(phase, 0.2);
        assert!((0.2..=1.0).contains(&env));
    }
    let config = seeded_config();
    let mut shush = ShushPulse::new(&config);
    let mut noise = NoiseSource::new(Some(4));
    let profile = SoundProfile::for_kind(SoundKind::ShushPulse);
    let peak = (0..44_100)
        .map(|_| shush.next_sample(&profile, &mut noise).abs())
        .fold(0.0f32, f32::max);
    assert!(peak > 0.0 && peak <= 1.0);
}

#[test]
fn renders_silence_when_stopped() {
    let mut synth = synth();
    assert!(!synth.is_playing());
    assert!(synth.render_next_buffer().iter().all(|s| *s == 0.0));
}

#[test]
fn volume_ramps_toward_target_without_jumping() {
    let mut synth = synth();
    synth.start(SoundProfile::for_kind(SoundKind::Pink));
    synth.set_target_volume(0.6);
    let mut previous = synth.current_volume();
    assert_eq!(previous, 0.0);
    for _ in 0..40 {
        synth.render_next_buffer();
        let current = synth.current_volume();
        assert!(current >= previous);
        assert!(current - previous <= 0.6 * 0.25, "jumped {previous} -> {current}");
        previous = current;
    }
    assert!((synth.current_volume() - 0.6).abs() < 0.01);
}

#[test]
fn safety_cap_holds_on_every_sample() {
    let mut synth = synth();
    synth.start(SoundProfile::for_kind(SoundKind::White));
    synth.set_target_volume(5.0);
    assert_eq!(synth.target_volume(), synth.config().safety_cap);
    for _ in 0..100 {
        let cap = synth.config().safety_cap;
        assert!(synth.render_next_buffer().iter().all(|s| s.abs() <= cap));
    }
}

#[test]
fn non_finite_volume_requests_are_treated_as_silence() {
    let mut synth = synth();
    synth.set_target_volume(f32::NAN);
    assert_eq!(synth.target_volume(), 0.0);
}

#[test]
fn profile_change_waits_for_buffer_boundary() {
    let mut synth = synth();
    synth.start(SoundProfile::for_kind(SoundKind::Brown));
    synth.set_target_volume(0.4);
    synth.render_next_buffer();
    synth.apply(SynthCommand::ChangeProfile(SoundProfile::for_kind(
        SoundKind::OceanBreath,
    )));
    assert_eq!(synth.active_profile().map(|p| p.kind), Some(SoundKind::Brown));
    synth.render_next_buffer();
    assert_eq!(
        synth.active_profile().map(|p| p.kind),
        Some(SoundKind::OceanBreath)
    );
}

#[test]
fn start_while_playing_does_not_restart_volume() {
    let mut synth = synth();
    synth.start(SoundProfile::for_kind(SoundKind::Pink));
    synth.set_target_volume(0.5);
    for _ in 0..10 {
        synth.render_next_buffer();
    }
    let level = synth.current_volume();
    synth.start(SoundProfile::for_kind(SoundKind::Brown));
    assert_eq!(synth.current_volume(), level);
    assert!(synth.is_playing());
}

#[test]
fn render_reuses_the_same_buffer() {
    let mut synth = synth();
    synth.start(SoundProfile::for_kind(SoundKind::OceanBreath));
    synth.set_target_volume(0.3);
    let first = synth.render_next_buffer().as_ptr();
    for _ in 0..8 {
        assert_eq!(synth.render_next_buffer().as_ptr(), first);
    }
    assert_eq!(synth.render_next_buffer().len(), synth.config().buffer_frames);
}

#[test]
fn stop_returns_to_fresh_state() {
    let mut used = synth();
    used.start(SoundProfile::for_kind(SoundKind::OceanBreath));
    used.set_target_volume(0.5);
    for _ in 0..5 {
        used.render_next_buffer();
    }
    used.apply(SynthCommand::Stop);
    assert!(!used.is_playing());
    assert_eq!(used.current_volume(), 0.0);
    assert_eq!(used.target_volume(), 0.0);

    let mut fresh = synth();
    for synth in [&mut used, &mut fresh] {
        synth.start(SoundProfile::for_kind(SoundKind::OceanBreath));
        synth.set_target_volume(0.5);
    }
    for _ in 0..3 {
        let a = used.render_next_buffer().to_vec();
        let b = fresh.render_next_buffer().to_vec();
        assert_eq!(a, b);
    }
}
