//! Live microphone capture via CPAL.
//!
//! The device callback only downmixes and cuts device-rate blocks; the
//! capture worker thread resamples each block to one analysis hop and hands
//! it to the analysis worker.

use super::capture::{CaptureSource, FrameSender, ReadySender};
use super::dispatch::BlockDispatcher;
use super::resample::RateConverter;
use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Microphone {
    device: cpal::Device,
    target_rate: u32,
    hop_samples: usize,
    channel_capacity: usize,
}

impl Microphone {
    pub fn list_devices() -> Result<Vec<String>, PipelineError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| init_failure("capture", err))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    /// Open the named input device, or the system default.
    pub fn open(preferred_device: Option<&str>, analysis: &AnalysisConfig) -> Result<Self, PipelineError> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => host
                .input_devices()
                .map_err(|err| init_failure("capture", err))?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| PipelineError::InitializationFailure {
                    device: "capture",
                    reason: format!("input device '{name}' not found"),
                })?,
            None => host
                .default_input_device()
                .ok_or_else(|| PipelineError::InitializationFailure {
                    device: "capture",
                    reason: format!("no default input device. {}", mic_permission_hint()),
                })?,
        };
        Ok(Self {
            device,
            target_rate: analysis.sample_rate,
            hop_samples: analysis.hop_samples,
            channel_capacity: analysis.channel_capacity,
        })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string())
    }

    /// Build and start the input stream. The returned stream must stay on
    /// this thread.
    fn start_stream(
        &self,
        frames: &FrameSender,
        failed: &Arc<AtomicBool>,
    ) -> Result<(cpal::Stream, Receiver<Vec<f32>>, RateConverter), PipelineError> {
        let supported = self
            .device
            .default_input_config()
            .map_err(classify_stream_error)?;
        let format = supported.sample_format();
        let stream_config: StreamConfig = supported.config();
        let device_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels.max(1));
        let converter = RateConverter::new(device_rate, self.target_rate)?;
        let block_len = converter.device_len(self.hop_samples);
        let (raw_tx, raw_rx) = bounded::<Vec<f32>>(self.channel_capacity.max(1));
        let counter = frames.dropped_counter();
        let dispatcher = Arc::new(Mutex::new(BlockDispatcher::new(
            block_len,
            raw_tx,
            Arc::clone(&counter),
        )));

        tracing::info!(
            device = %self.device_name(),
            format = ?format,
            device_rate,
            channels,
            block_len,
            "opening input stream"
        );

        let err_flag = Arc::clone(failed);
        let err_fn = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "input stream error");
            err_flag.store(true, Ordering::Relaxed);
        };
        let stream = match format {
            SampleFormat::F32 => {
                let (dispatcher, counter) = (Arc::clone(&dispatcher), Arc::clone(&counter));
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| match dispatcher.try_lock() {
                        Ok(mut pump) => pump.push(data, channels, |s| s),
                        Err(_) => {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let (dispatcher, counter) = (Arc::clone(&dispatcher), Arc::clone(&counter));
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| match dispatcher.try_lock() {
                        Ok(mut pump) => pump.push(data, channels, |s| s as f32 / 32_768.0),
                        Err(_) => {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let (dispatcher, counter) = (Arc::clone(&dispatcher), Arc::clone(&counter));
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| match dispatcher.try_lock() {
                        Ok(mut pump) => {
                            pump.push(data, channels, |s| (s as f32 - 32_768.0) / 32_768.0)
                        }
                        Err(_) => {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(PipelineError::InitializationFailure {
                    device: "capture",
                    reason: format!("unsupported sample format {other:?}"),
                })
            }
        }
        .map_err(classify_stream_error)?;

        stream.play().map_err(classify_stream_error)?;
        Ok((stream, raw_rx, converter))
    }
}

impl CaptureSource for Microphone {
    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn describe(&self) -> String {
        self.device_name()
    }

    fn run(
        &mut self,
        frames: FrameSender,
        ready: ReadySender,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<(), PipelineError> {
        let failed = Arc::new(AtomicBool::new(false));
        let (stream, raw_rx, mut converter) = match self.start_stream(&frames, &failed) {
            Ok(parts) => parts,
            Err(err) => {
                let _ = ready.send(Err(err.clone()));
                return Err(err);
            }
        };
        let _ = ready.send(Ok(()));

        let result = pump_blocks(
            &raw_rx,
            &mut converter,
            self.hop_samples,
            &frames,
            &stop_flag,
            &failed,
        );

        if let Err(err) = stream.pause() {
            tracing::debug!(error = %err, "failed to pause input stream");
        }
        drop(stream);
        tracing::info!(dropped = frames.dropped(), "input stream closed");
        result
    }
}

/// Resample device blocks into analysis hops until stopped. A latched stream
/// error ends the loop with an error; the callback side may still hold its
/// sender, so the channel alone never reports a lost device.
fn pump_blocks(
    raw_rx: &Receiver<Vec<f32>>,
    converter: &mut RateConverter,
    hop_samples: usize,
    frames: &FrameSender,
    stop_flag: &AtomicBool,
    failed: &AtomicBool,
) -> Result<(), PipelineError> {
    while !stop_flag.load(Ordering::Relaxed) {
        if failed.load(Ordering::Relaxed) {
            return Err(PipelineError::WorkerDisconnected("capture"));
        }
        match raw_rx.recv_timeout(POLL_INTERVAL) {
            Ok(block) => {
                let mut hop = vec![0.0; hop_samples];
                converter.convert_into(&block, &mut hop);
                if !frames.deliver(hop) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PipelineError::WorkerDisconnected("capture"));
            }
        }
    }
    Ok(())
}

fn init_failure(device: &'static str, err: impl Display) -> PipelineError {
    PipelineError::InitializationFailure {
        device,
        reason: err.to_string(),
    }
}

/// Backends report refused microphone access as generic errors; pick those
/// out so the caller can show a permission hint instead of retrying.
fn classify_stream_error(err: impl Display) -> PipelineError {
    let message = err.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized") {
        PipelineError::PermissionDenied(format!("{message}. {}", mic_permission_hint()))
    } else {
        init_failure("capture", message)
    }
}

pub(crate) fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: allow microphone access for this terminal under Privacy & Security > Microphone"
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio access and that the input is not muted"
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: enable microphone access under Privacy & Security > Microphone"
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "check the operating system's microphone permissions"
    }
}
