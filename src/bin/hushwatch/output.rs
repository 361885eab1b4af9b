//! JSON lines on stdout. Every line carries an `event` tag.

use anyhow::Result;
use hushwatch::analysis::UnrestScore;
use hushwatch::controller::ControllerEvent;
use hushwatch::{PipelineError, SessionReport, SessionStatus};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum OutputLine<'a> {
    Started {
        input: &'a str,
        output: &'a str,
    },
    Score(&'a UnrestScore),
    Status(&'a SessionStatus),
    Stopped(&'a SessionReport),
    Error {
        kind: &'static str,
        message: String,
    },
}

impl OutputLine<'_> {
    pub(crate) fn error(err: &PipelineError) -> Self {
        OutputLine::Error {
            kind: err.label(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn render<T: Serialize>(line: &T) -> Result<String> {
    Ok(serde_json::to_string(line)?)
}

pub(crate) fn emit<T: Serialize>(line: &T) -> Result<()> {
    let rendered = render(line)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    stdout.flush()?;
    Ok(())
}

pub(crate) fn emit_event(event: &ControllerEvent) -> Result<()> {
    emit(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hushwatch::analysis::Direction;
    use hushwatch::controller::{ControllerState, StateTransition, TransitionReason};

    #[test]
    fn score_lines_are_tagged() {
        let score = UnrestScore::new(42.5, Direction::Rising, 1_280);
        let line = render(&OutputLine::Score(&score)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "score");
        assert_eq!(value["value"], 42.5);
        assert_eq!(value["timestamp_ms"], 1_280);
    }

    #[test]
    fn controller_events_keep_their_own_tag() {
        let event = ControllerEvent::Transition(StateTransition {
            from: ControllerState::Listening,
            to: ControllerState::Soothing,
            reason: TransitionReason::StartConfirmed,
            score: 74.0,
            at_ms: 9_000,
        });
        let line = render(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "transition");
        assert_eq!(value["at_ms"], 9_000);
    }

    #[test]
    fn errors_carry_their_label() {
        let line = render(&OutputLine::error(&PipelineError::PlaybackWrite("gone".into()))).unwrap();
        assert!(line.contains("\"kind\":\"playback_write\""), "{line}");
    }
}
