//! Background output worker.
//!
//! Every line a run prints goes through one [`OutputWorker`]: normal lines to
//! the output stream, error lines and transient status lines to the error
//! stream. The worker owns both streams on a dedicated thread running a
//! current-thread tokio runtime, so the pipeline never blocks on a slow
//! terminal for longer than it takes the bounded queue to drain.
//!
//! The pipeline side of the queue is a plain `std` channel: callers may be
//! running inside a tokio runtime of their own, where blocking on a tokio
//! channel panics. A small pump thread moves events onto the worker's tokio
//! channel.

use std::io::{self, BufWriter, Write};
use std::sync::mpsc as queue;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::{Result, SiftError};

/// Capacity of the queue between the pipeline and the worker
pub const QUEUE_DEPTH: usize = 50;

/// Minimum interval between two status line updates
pub const STATUS_THROTTLE: Duration = Duration::from_millis(100);

/// Console width used when `COLUMNS` isn't set
pub const DEFAULT_DISPLAY_WIDTH: usize = 80;

/// One message for the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A line of normal output
    Line(String),
    /// A transient status line, overwritten by the next one
    Status(String),
    /// An error or warning line
    Error(String),
}

/// Output worker settings
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Written after every normal line
    pub line_separator: String,
    /// Status lines are shortened to fit this many characters
    pub display_width: usize,
    /// Status lines with a level above this are dropped
    pub verbosity: i32,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            line_separator: "\n".to_string(),
            display_width: display_width(),
            verbosity: 0,
        }
    }
}

/// Console width from the `COLUMNS` environment variable
pub fn display_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&w| w > 0)
        .unwrap_or(DEFAULT_DISPLAY_WIDTH)
}

/// Shorten `msg` to fit `width` characters by replacing its middle with "..."
pub fn truncate_middle(msg: &str, width: usize) -> String {
    let chars: Vec<char> = msg.chars().collect();
    if chars.len() < width {
        return msg.to_string();
    }
    let half = (width / 2).saturating_sub(2);
    let left: String = chars[..half].iter().collect();
    let right: String = chars[chars.len() - half..].iter().collect();
    format!("{}...{}", left, right)
}

/// Handle to the running output worker
pub struct OutputWorker {
    sender: Option<queue::SyncSender<OutputEvent>>,
    handle: Option<JoinHandle<io::Result<()>>>,
    verbosity: i32,
}

impl OutputWorker {
    /// Start the worker thread. `stream` receives normal lines; `err_stream`
    /// receives errors and status lines.
    pub fn spawn<W, E>(stream: W, err_stream: E, options: OutputOptions) -> Result<Self>
    where
        W: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let (sender, incoming) = queue::sync_channel(QUEUE_DEPTH);
        let verbosity = options.verbosity;
        let handle = thread::Builder::new()
            .name("sifter-output".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()?;
                let (forward, receiver) = mpsc::channel(QUEUE_DEPTH);
                let pump = thread::Builder::new()
                    .name("sifter-output-queue".to_string())
                    .spawn(move || pump_events(incoming, forward))?;
                let console = Console::new(stream, err_stream, options);
                let result = runtime.block_on(console.run(receiver));
                let _ = pump.join();
                result
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            verbosity,
        })
    }

    /// Queue a normal output line
    pub fn line(&self, text: impl Into<String>) {
        self.send(OutputEvent::Line(text.into()));
    }

    /// Queue an error line
    pub fn error(&self, text: impl Into<String>) {
        self.send(OutputEvent::Error(text.into()));
    }

    /// Offer a status line shown when the current verbosity is at least
    /// `level`. Dropped when the queue is full; a newer status follows soon.
    pub fn status(&self, level: i32, text: impl Into<String>) {
        if self.verbosity < level {
            return;
        }
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(OutputEvent::Status(text.into()));
        }
    }

    pub fn verbosity(&self) -> i32 {
        self.verbosity
    }

    fn send(&self, event: OutputEvent) {
        if let Some(sender) = &self.sender {
            // a closed queue means the worker already failed; finish() reports why
            let _ = sender.send(event);
        }
    }

    /// Close the queue and wait for everything queued to be written
    pub fn finish(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SiftError::Output("output worker panicked".to_string()))?
                .map_err(SiftError::from),
            None => Ok(()),
        }
    }
}

/// Move events from the pipeline's queue to the worker's runtime. Runs on
/// its own thread, outside any runtime, so `blocking_send` is allowed.
fn pump_events(incoming: queue::Receiver<OutputEvent>, forward: mpsc::Sender<OutputEvent>) {
    for event in incoming {
        if forward.blocking_send(event).is_err() {
            break;
        }
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Worker-side state: the two streams and what's on the status line
struct Console<W: Write, E: Write> {
    stream: BufWriter<W>,
    err_stream: E,
    options: OutputOptions,
    status_width: usize,
}

impl<W: Write, E: Write> Console<W, E> {
    fn new(stream: W, err_stream: E, options: OutputOptions) -> Self {
        Self {
            stream: BufWriter::new(stream),
            err_stream,
            options,
            status_width: 0,
        }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<OutputEvent>) -> io::Result<()> {
        let mut throttle: Option<Instant> = None;
        let mut pending: Option<String> = None;

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(OutputEvent::Line(text)) => {
                        self.clear_status()?;
                        self.stream.write_all(text.as_bytes())?;
                        self.stream.write_all(self.options.line_separator.as_bytes())?;
                        pending = None;
                    }
                    Some(OutputEvent::Error(text)) => {
                        self.clear_status()?;
                        self.stream.flush()?;
                        writeln!(self.err_stream, "{}", text)?;
                        pending = None;
                    }
                    Some(OutputEvent::Status(text)) => {
                        if throttle.is_none() {
                            self.show_status(&text)?;
                            throttle = Some(Instant::now() + STATUS_THROTTLE);
                        } else {
                            pending = Some(text);
                        }
                    }
                    None => break,
                },
                _ = sleep_until(throttle.unwrap_or_else(Instant::now)), if throttle.is_some() => {
                    throttle = None;
                    if let Some(text) = pending.take() {
                        self.show_status(&text)?;
                        throttle = Some(Instant::now() + STATUS_THROTTLE);
                    }
                }
            }
        }

        self.clear_status()?;
        self.stream.flush()?;
        self.err_stream.flush()
    }

    fn show_status(&mut self, text: &str) -> io::Result<()> {
        self.clear_status()?;
        let text = truncate_middle(text, self.options.display_width);
        write!(self.err_stream, "{}", text)?;
        self.err_stream.flush()?;
        self.status_width = text.chars().count();
        Ok(())
    }

    fn clear_status(&mut self) -> io::Result<()> {
        if self.status_width > 0 {
            write!(self.err_stream, "\r{}\r", " ".repeat(self.status_width))?;
            self.err_stream.flush()?;
            self.status_width = 0;
        }
        Ok(())
    }
}

/// An in-memory stream that can be handed to the worker and read back
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
