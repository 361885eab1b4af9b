use serde::Serialize;

/// Coarse direction attached to every published score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rising,
    Falling,
    Stable,
}

/// The only artifact that leaves the analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnrestScore {
    pub value: f32,
    pub trend: Direction,
    pub timestamp_ms: u64,
}

impl UnrestScore {
    /// Build a score, clamping the value into [0, 100].
    pub fn new(value: f32, trend: Direction, timestamp_ms: u64) -> Self {
        let value = if value.is_finite() {
            value.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            value,
            trend,
            timestamp_ms,
        }
    }
}
