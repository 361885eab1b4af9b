//! CPAL output sink.
//!
//! `cpal::Stream` cannot leave the thread that built it, so a dedicated
//! device thread owns the stream and the synthesis worker only touches the
//! producer half of a lock-free ring.

use super::playback::PlaybackSink;
use crate::error::PipelineError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ring depth in output buffers.
const RING_BUFFERS: usize = 4;
/// How long a write may wait for the device before the device counts as wedged.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const WRITE_POLL: Duration = Duration::from_millis(2);

struct OpenStream {
    producer: HeapProd<f32>,
    shutdown: Sender<()>,
    thread: JoinHandle<()>,
}

pub struct Speaker {
    preferred_device: Option<String>,
    failed: Arc<AtomicBool>,
    stream: Option<OpenStream>,
}

impl Speaker {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self {
            preferred_device,
            failed: Arc::new(AtomicBool::new(false)),
            stream: None,
        }
    }

    pub fn list_devices() -> Result<Vec<String>, PipelineError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|err| playback_init(err.to_string()))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

impl PlaybackSink for Speaker {
    fn open(&mut self, sample_rate: u32, buffer_frames: usize) -> Result<(), PipelineError> {
        self.close();
        self.failed.store(false, Ordering::Relaxed);
        let (producer, consumer) = HeapRb::<f32>::new(buffer_frames.max(64) * RING_BUFFERS).split();
        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let preferred = self.preferred_device.clone();
        let failed = Arc::clone(&self.failed);
        let thread = std::thread::Builder::new()
            .name("hushwatch-speaker".to_string())
            .spawn(move || device_thread(preferred, sample_rate, consumer, failed, ready_tx, shutdown_rx))
            .map_err(|err| playback_init(format!("failed to spawn device thread: {err}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stream = Some(OpenStream {
                    producer,
                    shutdown: shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(playback_init("device thread exited during start-up".to_string()))
            }
        }
    }

    fn write(&mut self, buffer: &[f32]) -> Result<(), PipelineError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(PipelineError::PlaybackWrite("speaker is not open".to_string()));
        };
        let started = Instant::now();
        let mut written = 0;
        while written < buffer.len() {
            if self.failed.load(Ordering::Relaxed) {
                return Err(PipelineError::PlaybackWrite(
                    "output stream reported an error".to_string(),
                ));
            }
            written += stream.producer.push_slice(&buffer[written..]);
            if written == buffer.len() {
                break;
            }
            if started.elapsed() > STALL_TIMEOUT {
                return Err(PipelineError::PlaybackWrite(format!(
                    "output device stopped consuming ({} samples queued)",
                    stream.producer.occupied_len()
                )));
            }
            std::thread::sleep(WRITE_POLL);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(OpenStream {
            shutdown, thread, ..
        }) = self.stream.take()
        {
            drop(shutdown);
            if thread.join().is_err() {
                tracing::warn!("speaker device thread panicked");
            }
        }
    }

    fn describe(&self) -> String {
        self.preferred_device
            .clone()
            .unwrap_or_else(|| "default output device".to_string())
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.close();
    }
}

fn device_thread(
    preferred: Option<String>,
    sample_rate: u32,
    consumer: HeapCons<f32>,
    failed: Arc<AtomicBool>,
    ready: Sender<Result<(), PipelineError>>,
    shutdown: Receiver<()>,
) {
    let stream = match build_stream(preferred.as_deref(), sample_rate, consumer, failed) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    // Blocks until the sink drops its end.
    let _ = shutdown.recv();
    if let Err(err) = stream.pause() {
        tracing::debug!(error = %err, "failed to pause output stream");
    }
    tracing::info!("output stream closed");
}

fn build_stream(
    preferred: Option<&str>,
    sample_rate: u32,
    mut consumer: HeapCons<f32>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, PipelineError> {
    let host = cpal::default_host();
    let device = match preferred {
        Some(name) => host
            .output_devices()
            .map_err(|err| playback_init(err.to_string()))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| playback_init(format!("output device '{name}' not found")))?,
        None => host
            .default_output_device()
            .ok_or_else(|| playback_init("no default output device".to_string()))?,
    };
    let supported = device
        .default_output_config()
        .map_err(|err| playback_init(err.to_string()))?;
    let format = supported.sample_format();
    let mut config: StreamConfig = supported.config();
    config.sample_rate = SampleRate(sample_rate);
    let channels = usize::from(config.channels.max(1));
    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown output device".to_string()),
        format = ?format,
        sample_rate,
        channels,
        "opening output stream"
    );

    let err_flag = Arc::clone(&failed);
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!(error = %err, "output stream error");
        err_flag.store(true, Ordering::Relaxed);
    };
    // Mono in, every output channel gets the same sample; underruns play silence.
    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                for frame in data.chunks_mut(channels) {
                    frame.fill(consumer.try_pop().unwrap_or(0.0));
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.try_pop().unwrap_or(0.0).clamp(-1.0, 1.0);
                    frame.fill((sample * i16::MAX as f32) as i16);
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.try_pop().unwrap_or(0.0).clamp(-1.0, 1.0);
                    frame.fill((sample * 32_767.0 + 32_768.0) as u16);
                }
            },
            err_fn,
            None,
        ),
        other => return Err(playback_init(format!("unsupported sample format {other:?}"))),
    }
    .map_err(|err| playback_init(err.to_string()))?;
    stream
        .play()
        .map_err(|err| playback_init(err.to_string()))?;
    Ok(stream)
}

fn playback_init(reason: String) -> PipelineError {
    PipelineError::InitializationFailure {
        device: "playback",
        reason,
    }
}
