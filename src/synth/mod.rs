//! Procedural soothing-sound synthesis.
//!
//! The synthesizer renders fixed-size mono buffers from pre-allocated state.
//! Profile and volume requests are staged and only take effect at the next
//! buffer boundary, so the rendering loop never allocates and never jumps.

mod generators;
mod profile;
#[cfg(test)]
mod tests;

use crate::config::SynthConfig;
use crate::error::PipelineError;
use generators::{GeneratorBank, NoiseSource};

pub use generators::{lfo_gain, one_pole_coefficient, shush_envelope};
pub use profile::{SoundKind, SoundProfile};

/// One-shot requests delivered to the synthesis worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthCommand {
    Start(SoundProfile),
    ChangeProfile(SoundProfile),
    SetVolume(f32),
    Stop,
}

pub struct SoundSynthesizer {
    config: SynthConfig,
    bank: GeneratorBank,
    noise: NoiseSource,
    buffer: Vec<f32>,
    active: Option<SoundProfile>,
    staged: Option<SoundProfile>,
    playing: bool,
    current_volume: f32,
    target_volume: f32,
    smoothing: f32,
}

impl SoundSynthesizer {
    pub fn new(config: SynthConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let smoothing = 1.0 - (-config.buffer_duration_ms() / config.volume_time_constant_ms).exp();
        Ok(Self {
            bank: GeneratorBank::new(&config),
            noise: NoiseSource::new(config.seed),
            buffer: vec![0.0; config.buffer_frames],
            active: None,
            staged: None,
            playing: false,
            current_volume: 0.0,
            target_volume: 0.0,
            smoothing,
            config,
        })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Begin playback, or hand the profile over at the next boundary when
    /// already playing so the stream never restarts.
    pub fn start(&mut self, profile: SoundProfile) {
        if self.playing {
            self.request_profile_change(profile);
            return;
        }
        self.playing = true;
        self.active = Some(profile);
        self.staged = None;
        self.current_volume = 0.0;
    }

    /// Silence output and clear all generator state.
    pub fn stop(&mut self) {
        self.playing = false;
        self.active = None;
        self.staged = None;
        self.current_volume = 0.0;
        self.target_volume = 0.0;
        self.bank.reset();
        self.noise.reset(self.config.seed);
    }

    pub fn set_target_volume(&mut self, volume: f32) {
        self.target_volume = if volume.is_finite() {
            volume.clamp(0.0, self.config.safety_cap)
        } else {
            0.0
        };
    }

    pub fn request_profile_change(&mut self, profile: SoundProfile) {
        self.staged = Some(profile);
    }

    pub fn apply(&mut self, command: SynthCommand) {
        match command {
            SynthCommand::Start(profile) => self.start(profile),
            SynthCommand::ChangeProfile(profile) => self.request_profile_change(profile),
            SynthCommand::SetVolume(volume) => self.set_target_volume(volume),
            SynthCommand::Stop => self.stop(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_volume(&self) -> f32 {
        self.current_volume
    }

    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn active_profile(&self) -> Option<SoundProfile> {
        self.active
    }

    /// Render the next buffer into the internal scratch space.
    pub fn render_next_buffer(&mut self) -> &[f32] {
        let Some(mut profile) = self.active.filter(|_| self.playing) else {
            self.buffer.fill(0.0);
            return &self.buffer;
        };

        let mut outgoing = None;
        if let Some(next) = self.staged.take() {
            if next.kind != profile.kind {
                outgoing = Some(profile);
            }
            profile = next;
            self.active = Some(next);
        }

        let start_volume = self.current_volume;
        let mut end_volume =
            start_volume + (self.target_volume - start_volume) * self.smoothing;
        if (self.target_volume - end_volume).abs() < 1e-4 {
            end_volume = self.target_volume;
        }
        self.current_volume = end_volume;

        let cap = self.config.safety_cap;
        let len = self.buffer.len();
        let step = 1.0 / len as f32;
        let Self {
            bank,
            noise,
            buffer,
            ..
        } = &mut *self;
        for (index, slot) in buffer.iter_mut().enumerate() {
            let t = index as f32 * step;
            let gain = (start_volume + (end_volume - start_volume) * t).min(cap);
            let mut sample = bank.next_sample(&profile, noise);
            if let Some(old) = outgoing.as_ref() {
                let faded = bank.next_sample(old, noise);
                sample = faded * (1.0 - t) + sample * t;
            }
            *slot = (sample * gain).clamp(-cap, cap);
        }
        &self.buffer
    }
}
