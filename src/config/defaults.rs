use crate::synth::SoundKind;

pub const DEFAULT_ANALYSIS_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_ANALYSIS_FRAME_SAMPLES: usize = 4_096;
pub const DEFAULT_ANALYSIS_HOP_SAMPLES: usize = 2_048;
pub const DEFAULT_FFT_SIZE: usize = 512;
pub const DEFAULT_PITCH_WINDOW: usize = 1_024;
pub const DEFAULT_SILENCE_RMS: f32 = 0.008;
pub const DEFAULT_CAPTURE_CHANNEL_CAPACITY: usize = 32;

pub const DEFAULT_GRADIENT_WINDOW: usize = 5;

pub const DEFAULT_START_THRESHOLD: f32 = 70.0;
pub const DEFAULT_START_CONFIRM_SEC: u32 = 3;
pub const DEFAULT_CALM_THRESHOLD: f32 = 35.0;
pub const DEFAULT_CALM_CONFIRM_SEC: u32 = 10;
pub const DEFAULT_RETRIGGER_THRESHOLD: f32 = 55.0;
pub const DEFAULT_RETRIGGER_CONFIRM_SEC: u32 = 2;
pub const DEFAULT_COOLDOWN_SEC: u32 = 120;
pub const DEFAULT_MIN_SOOTHING_SEC: u32 = 30;
pub const DEFAULT_MAX_ESCALATIONS: u32 = 2;
pub const DEFAULT_ESCALATION_INTERVAL_SEC: u32 = 45;
pub const DEFAULT_ESCALATION_VOLUME_STEP: f32 = 0.1;
pub const DEFAULT_VOLUME_CAP: f32 = 0.8;
pub const DEFAULT_BASELINE_VOLUME: f32 = 0.0;
pub const DEFAULT_BASELINE_KIND: SoundKind = SoundKind::Pink;

pub const DEFAULT_PREDICTIVE_GRADIENT: f32 = 2.0;
pub const DEFAULT_PREDICTIVE_CONFIRM_SEC: u32 = 1;
pub const DEFAULT_PREDICTIVE_ESCALATION_THRESHOLD: f32 = 55.0;
pub const DEFAULT_PREDICTIVE_CALM_GRADIENT: f32 = 0.5;
pub const DEFAULT_PREDICTIVE_MIN_DWELL_SEC: u32 = 5;
pub const DEFAULT_PREDICTIVE_TIMEOUT_SEC: u32 = 60;
pub const DEFAULT_PREDICTIVE_VOLUME_FRACTION: f32 = 0.5;

pub const DEFAULT_SYNTH_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_SYNTH_BUFFER_FRAMES: usize = 1_024;
pub const DEFAULT_SAFETY_CAP: f32 = 0.8;
pub const DEFAULT_VOLUME_TIME_CONSTANT_MS: f32 = 100.0;

pub(super) const MAX_COOLDOWN_SEC: u32 = 3_600;
pub(super) const MAX_CONFIRM_SEC: u32 = 600;
pub(super) const MAX_SESSION_DURATION_SEC: u64 = 24 * 3_600;
pub(super) const MAX_DEVICE_NAME_LEN: usize = 256;
