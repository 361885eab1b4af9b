//! hushwatch: listens for infant unrest and answers with adaptive soothing
//! sounds.
//!
//! Audio flows capture -> [`analysis`] -> [`gradient`] -> [`controller`] ->
//! [`synth`] -> playback. [`session`] runs that chain live on three worker
//! threads; [`pipeline`] runs it offline from a buffer.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod gradient;
mod lock;
pub mod pipeline;
pub mod session;
pub mod synth;
pub mod telemetry;

pub(crate) use lock::lock_or_recover;

pub use error::PipelineError;
pub use pipeline::{offline_session_from_pcm, OfflineRun};
pub use session::{Session, SessionReport, SessionStatus};
