//! crates/transport/src/drain.rs
//!
//! Concurrent line-oriented draining of child process output streams.
//!
//! Each attached stream gets its own reader thread. Readers forward complete
//! lines over a shared channel and send a final `Finished` marker once the
//! stream reaches end-of-file or fails. The draining thread stops only after
//! every stream has finished, so no pipe is left full while another is read.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Which process of a run produced a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The sending side of a pipeline.
    Producer,
    /// The receiving side of a pipeline.
    Consumer,
    /// A standalone command.
    Command,
}

impl Stage {
    /// Lowercase name used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard stream of a child process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Identifies one monitored stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamSource {
    /// Process that owns the stream.
    pub stage: Stage,
    /// Which of its streams.
    pub kind: StreamKind,
}

impl StreamSource {
    /// Creates a stream identifier.
    #[must_use]
    pub const fn new(stage: Stage, kind: StreamKind) -> Self {
        Self { stage, kind }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = match self.kind {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        };
        write!(f, "{}-{stream}", self.stage)
    }
}

enum StreamMessage {
    Line(StreamSource, String),
    Error(io::Error),
    Finished,
}

/// Fans in lines from several streams.
pub struct StreamMultiplexer {
    sender: Sender<StreamMessage>,
    receiver: Receiver<StreamMessage>,
    readers: Vec<JoinHandle<()>>,
}

impl Default for StreamMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMultiplexer {
    /// Creates a multiplexer with no attached streams.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            readers: Vec::new(),
        }
    }

    /// Starts a reader thread for `reader`.
    pub fn attach<R>(&mut self, reader: R, source: StreamSource)
    where
        R: Read + Send + 'static,
    {
        let sender = self.sender.clone();
        self.readers
            .push(thread::spawn(move || forward_lines(reader, source, &sender)));
    }

    /// Delivers every line to `on_line` until all streams have finished.
    ///
    /// # Errors
    ///
    /// Returns the first read error reported by any stream, after the
    /// remaining streams have been drained to completion.
    pub fn drain<F>(self, mut on_line: F) -> io::Result<()>
    where
        F: FnMut(StreamSource, &str),
    {
        let Self {
            sender,
            receiver,
            readers,
        } = self;
        drop(sender);

        let mut open = readers.len();
        let mut first_error = None;
        while open > 0 {
            match receiver.recv() {
                Ok(StreamMessage::Line(source, line)) => on_line(source, &line),
                Ok(StreamMessage::Error(error)) => {
                    first_error.get_or_insert(error);
                }
                Ok(StreamMessage::Finished) => open -= 1,
                // Every sender is gone: a reader thread panicked.
                Err(_) => break,
            }
        }

        for reader in readers {
            if reader.join().is_err() && first_error.is_none() {
                first_error = Some(io::Error::other("stream reader thread panicked"));
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn forward_lines<R: Read>(reader: R, source: StreamSource, sender: &Sender<StreamMessage>) {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buffer.last(), Some(b'\n' | b'\r')) {
                    buffer.pop();
                }
                let line = String::from_utf8_lossy(&buffer).into_owned();
                if sender.send(StreamMessage::Line(source, line)).is_err() {
                    return;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                let _ = sender.send(StreamMessage::Error(error));
                break;
            }
        }
    }
    let _ = sender.send(StreamMessage::Finished);
}
