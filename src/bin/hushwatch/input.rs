//! Line commands read from stdin.

use crossbeam_channel::{unbounded, Receiver};
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputCommand {
    PanicStop,
    Quit,
    Status,
    /// stdin reached EOF or failed.
    Closed,
}

pub(crate) fn parse_command(line: &str) -> Option<InputCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "panic" => Some(InputCommand::PanicStop),
        "q" | "quit" | "exit" => Some(InputCommand::Quit),
        "s" | "status" => Some(InputCommand::Status),
        _ => None,
    }
}

/// Read stdin on a detached thread. The thread ends after sending `Closed`.
pub(crate) fn spawn_input_thread() -> Receiver<InputCommand> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("unknown command '{}'; use p (panic stop), s (status) or q (quit)", line.trim()),
            }
        }
        let _ = tx.send(InputCommand::Closed);
    });
    rx
}
