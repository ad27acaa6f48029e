use std::io::{self, Write};

use serde::Serialize;

use crate::error::Cancel;
use crate::request::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

/// Machine-readable form of a cancelled request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelReport {
    pub code: String,
    pub message: String,
    pub cause: Option<String>,
}

impl From<&Cancel> for CancelReport {
    fn from(cancel: &Cancel) -> Self {
        Self {
            code: cancel.reason_code(),
            message: cancel.to_string(),
            cause: std::error::Error::source(cancel).map(ToString::to_string),
        }
    }
}

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }

    pub fn print_cancel(cancel: &Cancel) -> io::Result<()> {
        Self::print(&CancelReport::from(cancel))
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines on stderr for interactive use.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let dim = "\x1b[2m";
        let reset = "\x1b[0m";
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{dim}{} ({} ms){reset}",
                event.message,
                elapsed.as_millis()
            ),
            None => eprintln!("{dim}{}{reset}", event.message),
        }
    }
}
