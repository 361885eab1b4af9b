//! Acoustic feature extraction and unrest scoring.
//!
//! Frames are analyzed in place from short rolling buffers. Nothing in this
//! module keeps audio beyond the frame currently being scored; only the
//! derived [`UnrestScore`] is meant to leave the pipeline.

mod extractor;
mod frame;
mod meter;
mod pitch;
mod score;
mod spectrum;
#[cfg(test)]
mod tests;

pub use extractor::{FeatureExtractor, FeatureSet};
pub use frame::{AudioFrame, FrameWindow};
pub use meter::ScoreMeter;
pub use score::{Direction, UnrestScore};
