//! Playback-side collaborator contract and an in-memory sink.

use crate::error::PipelineError;
use crate::lock_or_recover;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Destination for rendered mono buffers.
///
/// `open` failures are initialization failures; `write` failures are runtime
/// failures. `write` may block while the device drains, and that is the
/// only place the synthesis worker is allowed to wait.
pub trait PlaybackSink: Send {
    fn open(&mut self, sample_rate: u32, buffer_frames: usize) -> Result<(), PipelineError>;
    fn write(&mut self, buffer: &[f32]) -> Result<(), PipelineError>;
    fn close(&mut self);
    fn describe(&self) -> String;
}

const DEFAULT_RETAINED_SAMPLES: usize = 1 << 20;

#[derive(Debug, Default)]
struct MemoryState {
    sample_rate: u32,
    open: bool,
    closed: bool,
    writes: usize,
    peak: f32,
    retained: Vec<f32>,
}

/// Test sink. Clones share the same recording so a test can keep a handle
/// after moving the sink into a session.
#[derive(Debug, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    paced: bool,
    fail_open: bool,
    fail_after: Option<usize>,
    retain_limit: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// A sink that sleeps one buffer duration per write, like a device.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            paced: true,
            fail_open: false,
            fail_after: None,
            retain_limit: DEFAULT_RETAINED_SAMPLES,
        }
    }

    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Accept `writes` buffers, then fail every later write.
    pub fn fail_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    pub fn writes(&self) -> usize {
        lock_or_recover(&self.state, "MemorySink::writes").writes
    }

    /// Largest absolute sample value seen so far.
    pub fn peak(&self) -> f32 {
        lock_or_recover(&self.state, "MemorySink::peak").peak
    }

    pub fn retained(&self) -> Vec<f32> {
        lock_or_recover(&self.state, "MemorySink::retained")
            .retained
            .clone()
    }

    pub fn is_open(&self) -> bool {
        lock_or_recover(&self.state, "MemorySink::is_open").open
    }

    pub fn was_closed(&self) -> bool {
        lock_or_recover(&self.state, "MemorySink::was_closed").closed
    }
}

impl PlaybackSink for MemorySink {
    fn open(&mut self, sample_rate: u32, _buffer_frames: usize) -> Result<(), PipelineError> {
        if self.fail_open {
            return Err(PipelineError::InitializationFailure {
                device: "playback",
                reason: "memory sink configured to fail".to_string(),
            });
        }
        let mut state = lock_or_recover(&self.state, "MemorySink::open");
        state.sample_rate = sample_rate;
        state.open = true;
        state.closed = false;
        Ok(())
    }

    fn write(&mut self, buffer: &[f32]) -> Result<(), PipelineError> {
        let sample_rate = {
            let mut state = lock_or_recover(&self.state, "MemorySink::write");
            if !state.open {
                return Err(PipelineError::PlaybackWrite("sink is not open".to_string()));
            }
            if self.fail_after.is_some_and(|limit| state.writes >= limit) {
                return Err(PipelineError::PlaybackWrite(format!(
                    "injected failure after {} writes",
                    state.writes
                )));
            }
            state.writes += 1;
            state.peak = buffer.iter().fold(state.peak, |peak, s| peak.max(s.abs()));
            let room = self.retain_limit.saturating_sub(state.retained.len());
            let keep = buffer.len().min(room);
            state.retained.extend_from_slice(&buffer[..keep]);
            state.sample_rate
        };
        if self.paced && sample_rate > 0 {
            std::thread::sleep(Duration::from_secs_f64(
                buffer.len() as f64 / f64::from(sample_rate),
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock_or_recover(&self.state, "MemorySink::close");
        state.open = false;
        state.closed = true;
    }

    fn describe(&self) -> String {
        "memory sink".to_string()
    }
}
