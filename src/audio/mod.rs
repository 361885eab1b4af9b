//! Device collaborators for the capture and playback paths.
//!
//! Capture delivers mono chunks at the analysis rate; playback accepts mono
//! buffers at the synthesis rate. The two rates are independent.

mod capture;
mod dispatch;
mod microphone;
mod playback;
mod resample;
mod speaker;

pub use capture::{CaptureSource, FrameSender, PcmSource, ReadySender};
pub use microphone::Microphone;
pub use playback::{MemorySink, PlaybackSink};
pub use speaker::Speaker;
