//! hushwatch entrypoint: live unrest monitor with adaptive soothing sounds.
//!
//! # Architecture
//!
//! - Capture worker: microphone stream, resampled to the analysis rate
//! - Analysis worker: scoring, trend estimation, intervention state machine
//! - Synthesis worker: renders the active sound into the speaker ring
//! - Main thread: stdin commands and JSON-lines output

mod cli_utils;
mod input;
mod output;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{after, never, select, tick, Receiver};
use hushwatch::audio::{Microphone, Speaker};
use hushwatch::config::AppConfig;
use hushwatch::controller::{FixedProfileSelector, TracingOutcomeReporter};
use hushwatch::telemetry::init_tracing;
use hushwatch::Session;
use std::time::Duration;

use crate::cli_utils::{list_devices, DeviceDirection};
use crate::input::{spawn_input_thread, InputCommand};
use crate::output::{emit, emit_event, OutputLine};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);

    if config.list_input_devices || config.list_output_devices {
        if config.list_input_devices {
            list_devices(DeviceDirection::Input)?;
        }
        if config.list_output_devices {
            list_devices(DeviceDirection::Output)?;
        }
        return Ok(());
    }

    let session_config = config.session_config()?;
    let microphone = Microphone::open(config.input_device.as_deref(), &session_config.analysis)
        .context("failed to open the microphone")?;
    let input_name = microphone.device_name();
    let speaker = Speaker::new(config.output_device.clone());
    let output_name = config
        .output_device
        .clone()
        .unwrap_or_else(|| "default output device".to_string());
    let session = Session::start(
        session_config,
        Box::new(microphone),
        Box::new(speaker),
        Box::new(FixedProfileSelector::new(config.sound, config.level)),
        Box::new(TracingOutcomeReporter),
    )
    .context("failed to start the monitoring session")?;
    emit(&OutputLine::Started {
        input: &input_name,
        output: &output_name,
    })?;

    let commands = spawn_input_thread();
    let loop_result = run_event_loop(&session, &commands, &config);
    let report = session.stop();
    emit(&OutputLine::Stopped(&report))?;
    loop_result?;
    if let Some(err) = report.fatal {
        emit(&OutputLine::error(&err))?;
        bail!("session ended with a fatal error: {err}");
    }
    Ok(())
}

fn run_event_loop(session: &Session, commands: &Receiver<InputCommand>, config: &AppConfig) -> Result<()> {
    let deadline = if config.duration_secs > 0 {
        after(Duration::from_secs(config.duration_secs))
    } else {
        never()
    };
    let idle_scores = never();
    let closed_stdin = never();
    let scores = if config.print_scores {
        session.scores()
    } else {
        &idle_scores
    };
    let status_ticker = tick(STATUS_INTERVAL);
    let mut stdin_open = true;
    let mut running = true;

    while running {
        select! {
            recv(session.events()) -> event => match event {
                Ok(event) => emit_event(&event)?,
                Err(_) => running = false,
            },
            recv(scores) -> score => {
                if let Ok(score) = score {
                    emit(&OutputLine::Score(&score))?;
                }
            },
            recv(if stdin_open { commands } else { &closed_stdin }) -> command => {
                match command.unwrap_or(InputCommand::Closed) {
                    InputCommand::PanicStop => session.panic_stop()?,
                    InputCommand::Status => emit(&OutputLine::Status(&session.status()))?,
                    InputCommand::Quit => running = false,
                    InputCommand::Closed => {
                        stdin_open = false;
                        running = config.duration_secs > 0;
                    }
                }
            },
            recv(status_ticker) -> _ => {
                running = session.is_running();
                emit(&OutputLine::Status(&session.status()))?;
            },
            recv(deadline) -> _ => running = false,
        }
    }
    Ok(())
}
