//! Operator terminal abstraction.
//!
//! Sessions never touch stdin/stdout directly: they read operator lines and
//! display peer messages through a [`Console`], which is either wired to the
//! process's standard streams or to in-memory channels.

use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

/// Green console colour
const GREEN: &str = "\x1b[32m";

/// Reset console colour
const RESET: &str = "\x1b[0m";

/// Something shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// Status or diagnostic line
    Notice(String),
    /// Line received from a peer
    Message(String),
}

/// Shared handle to the operator's terminal
#[derive(Clone)]
pub struct Console {
    input: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    output: mpsc::UnboundedSender<ConsoleEvent>,
}

/// The far side of an in-memory console
pub struct ConsoleIo {
    /// Feeds operator input lines
    pub input: mpsc::UnboundedSender<String>,
    /// Receives everything displayed
    pub output: mpsc::UnboundedReceiver<ConsoleEvent>,
}

impl Console {
    /// Create a console backed by in-memory channels
    pub fn channel() -> (Self, ConsoleIo) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let console = Self {
            input: Arc::new(Mutex::new(input_rx)),
            output: output_tx,
        };
        let io = ConsoleIo {
            input: input_tx,
            output: output_rx,
        };
        (console, io)
    }

    /// Create a console wired to stdin and stdout
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stdio(color: bool) -> Self {
        let (console, io) = Self::channel();
        let ConsoleIo { input, output } = io;

        tokio::spawn(read_stdin(input));
        tokio::spawn(print_events(output, color, std::io::stdout()));

        console
    }

    /// Next raw operator line, including its trailing newline
    ///
    /// Returns `None` once operator input is closed. Concurrent callers are
    /// served one line each, in the order they asked.
    pub async fn read_line(&self) -> Option<String> {
        self.input.lock().await.recv().await
    }

    /// Display a line received from a peer
    pub fn message(&self, text: impl Into<String>) {
        let _ = self.output.send(ConsoleEvent::Message(text.into()));
    }

    /// Display a status line
    pub fn notice(&self, text: impl Into<String>) {
        let _ = self.output.send(ConsoleEvent::Notice(text.into()));
    }
}

async fn read_stdin(input: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(tokio::io::stdin());

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                log::debug!("stdin closed");
                break;
            }
            Ok(_) => {
                if input.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::error!("Error reading from stdin: {}", e);
                break;
            }
        }
    }
}

/// Render console events, starting with the input prompt
async fn print_events<W: Write>(
    mut output: mpsc::UnboundedReceiver<ConsoleEvent>,
    color: bool,
    mut out: W,
) {
    if write!(out, "> ").and_then(|()| out.flush()).is_err() {
        return;
    }

    while let Some(event) = output.recv().await {
        let result = match event {
            ConsoleEvent::Notice(text) => writeln!(out, "{text}"),
            ConsoleEvent::Message(text) if color => write!(out, "{GREEN}{text}{RESET}\n> "),
            ConsoleEvent::Message(text) => write!(out, "{text}\n> "),
        };

        if result.and_then(|()| out.flush()).is_err() {
            break;
        }
    }
}
