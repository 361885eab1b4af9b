//! Capture-side collaborators: the worker contract and the frame hand-off.

use crate::error::PipelineError;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of the start-up handshake a source sends before audio flows.
pub type ReadySender = Sender<Result<(), PipelineError>>;

/// A producer of mono analysis-rate sample chunks.
///
/// `run` owns the capture worker thread until `stop_flag` is raised or the
/// frame receiver is dropped. It must send exactly one message on `ready`:
/// `Ok(())` once audio is about to flow, or the initialization error.
pub trait CaptureSource: Send {
    /// Rate of the chunks handed to `frames`.
    fn sample_rate(&self) -> u32;

    fn describe(&self) -> String;

    fn run(
        &mut self,
        frames: FrameSender,
        ready: ReadySender,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<(), PipelineError>;
}

/// Bounded hand-off to the analysis worker. When the analysis side falls
/// behind, the newest chunk is dropped and counted instead of blocking the
/// device.
#[derive(Clone)]
pub struct FrameSender {
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameSender {
    pub fn new(sender: Sender<Vec<f32>>, dropped: Arc<AtomicUsize>) -> Self {
        Self { sender, dropped }
    }

    /// Returns false once the receiving side is gone.
    pub fn deliver(&self, chunk: Vec<f32>) -> bool {
        match self.sender.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Wait for room instead of dropping. Only for sources that are not tied
    /// to a real-time device clock.
    pub fn deliver_blocking(&self, chunk: Vec<f32>) -> bool {
        self.sender.send(chunk).is_ok()
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.dropped)
    }
}

/// Replays an in-memory mono buffer as if it came from a device.
///
/// Unpaced sources (the default) block on a full channel so nothing is lost;
/// paced sources sleep one chunk duration between sends and drop like a real
/// device would.
#[derive(Debug, Clone)]
pub struct PcmSource {
    samples: Vec<f32>,
    sample_rate: u32,
    chunk_samples: usize,
    paced: bool,
}

impl PcmSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            chunk_samples: (sample_rate as usize / 10).max(1),
            paced: false,
        }
    }

    pub fn with_chunk_samples(mut self, chunk_samples: usize) -> Self {
        self.chunk_samples = chunk_samples.max(1);
        self
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl CaptureSource for PcmSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("pcm buffer ({} samples @ {} Hz)", self.samples.len(), self.sample_rate)
    }

    fn run(
        &mut self,
        frames: FrameSender,
        ready: ReadySender,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<(), PipelineError> {
        if self.sample_rate == 0 {
            let err = PipelineError::InitializationFailure {
                device: "capture",
                reason: "pcm source has a zero sample rate".to_string(),
            };
            let _ = ready.send(Err(err.clone()));
            return Err(err);
        }
        let _ = ready.send(Ok(()));
        let pace = Duration::from_secs_f64(self.chunk_samples as f64 / f64::from(self.sample_rate));
        for chunk in self.samples.chunks(self.chunk_samples) {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            let delivered = if self.paced {
                std::thread::sleep(pace);
                frames.deliver(chunk.to_vec())
            } else {
                frames.deliver_blocking(chunk.to_vec())
            };
            if !delivered {
                break;
            }
        }
        tracing::debug!(
            dropped = frames.dropped(),
            "pcm source exhausted"
        );
        Ok(())
    }
}
