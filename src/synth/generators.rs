//! Per-kind noise generators. Every generator owns its state and advances one
//! sample at a time without allocating.

use super::profile::{SoundKind, SoundProfile};
use crate::config::SynthConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

const PINK_OCTAVES: usize = 8;
const BROWN_STEP: f32 = 0.02;
const BROWN_LEAK: f32 = 0.998;
const BROWN_GAIN: f32 = 3.0;
const PINK_GAIN: f32 = 2.5;
const LIVING_GAIN: f32 = 3.0;
const SHUSH_GAIN: f32 = 0.7;
const WHITE_GAIN: f32 = 0.5;
const MIN_CUTOFF_HZ: f32 = 20.0;

/// Uniform white noise in [-1, 1].
pub(crate) struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    pub(crate) fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Restart the sequence; seeded sources replay exactly.
    pub(crate) fn reset(&mut self, seed: Option<u64>) {
        *self = Self::new(seed);
    }

    #[inline]
    pub(crate) fn white(&mut self) -> f32 {
        self.rng.gen_range(-1.0f32..=1.0)
    }
}

pub(crate) trait NoiseGenerator: Send {
    fn next_sample(&mut self, profile: &SoundProfile, noise: &mut NoiseSource) -> f32;
    fn reset(&mut self);
}

/// LFO gain `1 + depth * sin(phase)`, hard-limited so modulation can never pump.
pub fn lfo_gain(depth: f32, phase: f32, min_gain: f32, max_gain: f32) -> f32 {
    (1.0 + depth * phase.sin()).clamp(min_gain, max_gain)
}

/// One-pole lowpass coefficient `a = exp(-2*pi*fc/fs)`.
pub fn one_pole_coefficient(cutoff_hz: f32, sample_rate: f32) -> f32 {
    let nyquist_guard = sample_rate * 0.45;
    let cutoff = cutoff_hz.clamp(MIN_CUTOFF_HZ, nyquist_guard.max(MIN_CUTOFF_HZ));
    (-TAU * cutoff / sample_rate).exp()
}

#[inline]
fn advance_phase(phase: &mut f32, rate_hz: f32, sample_rate: f32) {
    *phase += TAU * rate_hz / sample_rate;
    if *phase >= TAU {
        *phase -= TAU;
    }
    if *phase < 0.0 {
        *phase = phase.rem_euclid(TAU);
    }
}

pub(crate) struct BrownNoise {
    state: f32,
}

impl BrownNoise {
    pub(crate) fn new() -> Self {
        Self { state: 0.0 }
    }
}

impl NoiseGenerator for BrownNoise {
    fn next_sample(&mut self, _profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        self.state += noise.white() * BROWN_STEP;
        self.state *= BROWN_LEAK;
        self.state = self.state.clamp(-1.0, 1.0);
        (self.state * BROWN_GAIN).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Voss-McCartney pink noise: octave `i` refreshes whenever bit `i` of the
/// running counter flips.
pub(crate) struct PinkNoise {
    octaves: [f32; PINK_OCTAVES],
    counter: u32,
}

impl PinkNoise {
    pub(crate) fn new() -> Self {
        Self {
            octaves: [0.0; PINK_OCTAVES],
            counter: 0,
        }
    }

    #[inline]
    fn raw(&mut self, noise: &mut NoiseSource) -> f32 {
        let next = self.counter.wrapping_add(1);
        let flipped = self.counter ^ next;
        self.counter = next;
        let mut sum = 0.0;
        for (bit, octave) in self.octaves.iter_mut().enumerate() {
            if flipped & (1 << bit) != 0 {
                *octave = noise.white();
            }
            sum += *octave;
        }
        sum / PINK_OCTAVES as f32
    }
}

impl NoiseGenerator for PinkNoise {
    fn next_sample(&mut self, _profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        (self.raw(noise) * PINK_GAIN).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.octaves = [0.0; PINK_OCTAVES];
        self.counter = 0;
    }
}

/// Lowpass whose coefficient is only re-derived when the cutoff moves past a
/// hysteresis band.
pub(crate) struct OnePole {
    coefficient: f32,
    cutoff_hz: f32,
    memory: f32,
    sample_rate: f32,
}

impl OnePole {
    pub(crate) fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self {
            coefficient: one_pole_coefficient(cutoff_hz, sample_rate),
            cutoff_hz,
            memory: 0.0,
            sample_rate,
        }
    }

    /// Returns true when the coefficient was recomputed.
    pub(crate) fn retune(&mut self, cutoff_hz: f32, hysteresis_hz: f32) -> bool {
        if (cutoff_hz - self.cutoff_hz).abs() <= hysteresis_hz {
            return false;
        }
        self.cutoff_hz = cutoff_hz;
        self.coefficient = one_pole_coefficient(cutoff_hz, self.sample_rate);
        true
    }

    #[inline]
    pub(crate) fn process(&mut self, input: f32) -> f32 {
        self.memory = (1.0 - self.coefficient) * input + self.coefficient * self.memory;
        self.memory
    }

    #[cfg(test)]
    pub(crate) fn coefficient(&self) -> f32 {
        self.coefficient
    }

    fn reset(&mut self, cutoff_hz: f32) {
        self.memory = 0.0;
        self.cutoff_hz = cutoff_hz;
        self.coefficient = one_pole_coefficient(cutoff_hz, self.sample_rate);
    }
}

/// "Ocean Breath": pink base, drifting lowpass, clamped amplitude LFO.
pub(crate) struct LivingNoise {
    pink: PinkNoise,
    filter: OnePole,
    lfo_phase: f32,
    drift_phase: f32,
    sample_rate: f32,
    min_gain: f32,
    max_gain: f32,
    hysteresis_hz: f32,
    rest_cutoff_hz: f32,
}

impl LivingNoise {
    pub(crate) fn new(config: &SynthConfig) -> Self {
        let sample_rate = config.sample_rate as f32;
        let reference = SoundProfile::for_kind(SoundKind::OceanBreath);
        let rest_cutoff_hz = (reference.drift_cutoff_min + reference.drift_cutoff_max) * 0.5;
        Self {
            pink: PinkNoise::new(),
            filter: OnePole::new(rest_cutoff_hz, sample_rate),
            lfo_phase: 0.0,
            drift_phase: 0.0,
            sample_rate,
            min_gain: config.lfo_min_gain,
            max_gain: config.lfo_max_gain,
            hysteresis_hz: config.cutoff_hysteresis_hz,
            rest_cutoff_hz,
        }
    }

    #[cfg(test)]
    pub(crate) fn filter_coefficient(&self) -> f32 {
        self.filter.coefficient()
    }
}

impl NoiseGenerator for LivingNoise {
    fn next_sample(&mut self, profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        let base = self.pink.raw(noise);

        if profile.drift_enabled {
            let low = profile.drift_cutoff_min.min(profile.drift_cutoff_max);
            let high = profile.drift_cutoff_min.max(profile.drift_cutoff_max);
            let center = (low + high) * 0.5;
            let swing = (high - low) * 0.5;
            let cutoff = center + swing * self.drift_phase.sin();
            self.filter.retune(cutoff, self.hysteresis_hz);
            advance_phase(&mut self.drift_phase, profile.drift_rate_hz, self.sample_rate);
        }

        let filtered = self.filter.process(base);
        let gain = lfo_gain(profile.lfo_depth, self.lfo_phase, self.min_gain, self.max_gain);
        advance_phase(&mut self.lfo_phase, profile.lfo_rate_hz, self.sample_rate);
        (filtered * gain * LIVING_GAIN).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.pink.reset();
        self.filter.reset(self.rest_cutoff_hz);
        self.lfo_phase = 0.0;
        self.drift_phase = 0.0;
    }
}

/// White noise under a half-rectified sine envelope that never fully mutes.
pub(crate) struct ShushPulse {
    phase: f32,
    sample_rate: f32,
    floor: f32,
}

impl ShushPulse {
    pub(crate) fn new(config: &SynthConfig) -> Self {
        Self {
            phase: 0.0,
            sample_rate: config.sample_rate as f32,
            floor: config.shush_floor,
        }
    }
}

/// Shush envelope for a given phase; always within [floor, 1].
pub fn shush_envelope(phase: f32, floor: f32) -> f32 {
    floor + (1.0 - floor) * phase.sin().max(0.0)
}

impl NoiseGenerator for ShushPulse {
    fn next_sample(&mut self, profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        let envelope = shush_envelope(self.phase, self.floor);
        advance_phase(&mut self.phase, profile.lfo_rate_hz, self.sample_rate);
        noise.white() * envelope * SHUSH_GAIN
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

pub(crate) struct WhiteNoise;

impl NoiseGenerator for WhiteNoise {
    fn next_sample(&mut self, _profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        noise.white() * WHITE_GAIN
    }

    fn reset(&mut self) {}
}

/// Lookup table of generators, one slot per [`SoundKind`].
pub(crate) struct GeneratorBank {
    slots: [Box<dyn NoiseGenerator>; SoundKind::COUNT],
}

impl GeneratorBank {
    pub(crate) fn new(config: &SynthConfig) -> Self {
        // Order follows SoundKind::index.
        let slots: [Box<dyn NoiseGenerator>; SoundKind::COUNT] = [
            Box::new(BrownNoise::new()),
            Box::new(PinkNoise::new()),
            Box::new(LivingNoise::new(config)),
            Box::new(ShushPulse::new(config)),
            Box::new(WhiteNoise),
        ];
        Self { slots }
    }

    #[inline]
    pub(crate) fn next_sample(&mut self, profile: &SoundProfile, noise: &mut NoiseSource) -> f32 {
        self.slots[profile.kind.index()].next_sample(profile, noise)
    }

    pub(crate) fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.reset();
        }
    }
}
