use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Procedural noise families the synthesizer can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Brown,
    Pink,
    OceanBreath,
    ShushPulse,
    White,
}

impl SoundKind {
    pub const COUNT: usize = 5;
    pub const ALL: [SoundKind; SoundKind::COUNT] = [
        SoundKind::Brown,
        SoundKind::Pink,
        SoundKind::OceanBreath,
        SoundKind::ShushPulse,
        SoundKind::White,
    ];

    /// Slot of this kind in the generator bank.
    pub const fn index(self) -> usize {
        match self {
            SoundKind::Brown => 0,
            SoundKind::Pink => 1,
            SoundKind::OceanBreath => 2,
            SoundKind::ShushPulse => 3,
            SoundKind::White => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SoundKind::Brown => "brown",
            SoundKind::Pink => "pink",
            SoundKind::OceanBreath => "ocean_breath",
            SoundKind::ShushPulse => "shush_pulse",
            SoundKind::White => "white",
        }
    }
}

/// Immutable description of how a profile should sound. Applied by the
/// synthesizer only at a buffer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundProfile {
    pub kind: SoundKind,
    pub lfo_rate_hz: f32,
    pub lfo_depth: f32,
    pub drift_enabled: bool,
    pub drift_rate_hz: f32,
    pub drift_cutoff_min: f32,
    pub drift_cutoff_max: f32,
}

impl SoundProfile {
    /// Reference descriptor for each kind.
    pub const fn for_kind(kind: SoundKind) -> Self {
        match kind {
            SoundKind::OceanBreath => Self {
                kind,
                lfo_rate_hz: 0.1,
                lfo_depth: 0.12,
                drift_enabled: true,
                drift_rate_hz: 0.02,
                drift_cutoff_min: 400.0,
                drift_cutoff_max: 1_200.0,
            },
            SoundKind::ShushPulse => Self {
                kind,
                lfo_rate_hz: 0.8,
                lfo_depth: 1.0,
                drift_enabled: false,
                drift_rate_hz: 0.0,
                drift_cutoff_min: 0.0,
                drift_cutoff_max: 0.0,
            },
            _ => Self {
                kind,
                lfo_rate_hz: 0.0,
                lfo_depth: 0.0,
                drift_enabled: false,
                drift_rate_hz: 0.0,
                drift_cutoff_min: 0.0,
                drift_cutoff_max: 0.0,
            },
        }
    }
}

impl From<SoundKind> for SoundProfile {
    fn from(kind: SoundKind) -> Self {
        SoundProfile::for_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_indices_are_unique_and_dense() {
        let mut seen = [false; SoundKind::COUNT];
        for kind in SoundKind::ALL {
            assert!(!seen[kind.index()], "{kind:?} shares a slot");
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|slot| *slot));
    }

    #[test]
    fn living_profile_drifts_between_distinct_cutoffs() {
        let profile = SoundProfile::for_kind(SoundKind::OceanBreath);
        assert!(profile.drift_enabled);
        assert!(profile.drift_cutoff_min < profile.drift_cutoff_max);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(SoundKind::OceanBreath.label(), "ocean_breath");
        assert_eq!(SoundKind::ShushPulse.label(), "shush_pulse");
    }
}
