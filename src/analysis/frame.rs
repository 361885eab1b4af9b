use crate::error::PipelineError;

/// Fixed-length mono window normalized to [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// End of the window, in milliseconds since the session started.
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1_000 / u64::from(self.sample_rate)
    }

    /// Reject frames the extractor cannot analyze.
    pub fn check(&self, expected_len: usize, expected_rate: u32) -> Result<(), PipelineError> {
        if self.samples.is_empty() {
            return Err(PipelineError::InvalidFrame("frame is empty".to_string()));
        }
        if self.sample_rate == 0 || self.sample_rate != expected_rate {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {expected_rate} Hz, got {} Hz",
                self.sample_rate
            )));
        }
        if self.samples.len() != expected_len {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {expected_len} samples, got {}",
                self.samples.len()
            )));
        }
        if let Some(index) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(PipelineError::InvalidFrame(format!(
                "non-finite sample at index {index}"
            )));
        }
        Ok(())
    }
}

/// Assembles overlapping analysis frames from arbitrarily sized chunks.
///
/// The first frame is ready once `frame_samples` have arrived; every later
/// frame follows after another `hop_samples`. The frame buffer is allocated
/// once and shifted in place.
pub struct FrameWindow {
    frame: AudioFrame,
    hop: usize,
    filled: usize,
    ready: bool,
    consumed: u64,
}

impl FrameWindow {
    pub fn new(frame_samples: usize, hop_samples: usize, sample_rate: u32) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame: AudioFrame::new(vec![0.0; frame_samples], sample_rate, 0),
            hop: hop_samples.clamp(1, frame_samples),
            filled: 0,
            ready: false,
            consumed: 0,
        }
    }

    /// Copy as many samples as fit before the next frame is complete and
    /// return how many were taken. Call [`FrameWindow::take_ready`] after each
    /// fill.
    pub fn fill(&mut self, samples: &[f32]) -> usize {
        let frame_len = self.frame.samples.len();
        if self.filled == frame_len {
            self.frame.samples.copy_within(self.hop.., 0);
            self.filled = frame_len - self.hop;
        }
        let take = (frame_len - self.filled).min(samples.len());
        self.frame.samples[self.filled..self.filled + take].copy_from_slice(&samples[..take]);
        self.filled += take;
        self.consumed += take as u64;
        if self.filled == frame_len && take > 0 {
            self.frame.timestamp_ms = self.stream_ms();
            self.ready = true;
        }
        take
    }

    /// The completed frame, handed out once.
    pub fn take_ready(&mut self) -> Option<&AudioFrame> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        Some(&self.frame)
    }

    /// Milliseconds of audio consumed so far.
    pub fn stream_ms(&self) -> u64 {
        if self.frame.sample_rate == 0 {
            return 0;
        }
        self.consumed * 1_000 / u64::from(self.frame.sample_rate)
    }

    pub fn reset(&mut self) {
        self.frame.samples.fill(0.0);
        self.frame.timestamp_ms = 0;
        self.filled = 0;
        self.ready = false;
        self.consumed = 0;
    }
}
