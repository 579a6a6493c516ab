use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use memchr::memchr_iter;
use tokio_util::sync::CancellationToken;

use super::decode::LineDecoder;
use super::extract::TailExtractor;
use super::rotation::{FileIdentity, Rotation, RotationDetector};
use super::window::{Window, WindowReader};
use crate::config::{RotationStart, TailConfig};
use crate::error::{Result, TailError};

/// Blocks the follow loop between polls.
pub trait Sleeper {
    fn sleep(&mut self, interval: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Receives completed lines. The follow loop waits for `accept` to return
/// before reading further, so a slow sink slows the loop down.
pub trait LineSink {
    fn accept(&mut self, line: &str) -> io::Result<()>;
}

impl<F> LineSink for F
where
    F: FnMut(&str) -> io::Result<()>,
{
    fn accept(&mut self, line: &str) -> io::Result<()> {
        self(line)
    }
}

/// Writes one line per `accept` and flushes.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> LineSink for WriterSink<W> {
    fn accept(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}

/// The most recent `capacity` lines, oldest first.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    lines: VecDeque<String>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Swap the newest line for `line`
    pub fn replace_last(&mut self, line: String) {
        self.lines.pop_back();
        self.push(line);
    }

    pub fn reset(&mut self, lines: Vec<String>) {
        self.lines.clear();
        for line in lines {
            self.push(line);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Splits forward-read chunks into lines, carrying an unterminated
/// remainder from one chunk (and one poll) to the next.
pub struct LineSplitter {
    decoder: LineDecoder,
    pending: Vec<u8>,
    /// File offset of the first pending byte
    pending_start: u64,
}

impl LineSplitter {
    pub fn new(config: &TailConfig) -> Self {
        Self {
            decoder: LineDecoder::new(config),
            pending: Vec::new(),
            pending_start: 0,
        }
    }

    /// Drop the remainder and expect the next chunk at `offset`.
    pub fn reset(&mut self, offset: u64) {
        self.pending.clear();
        self.pending_start = offset;
    }

    pub fn feed(&mut self, chunk: Window<'_>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut from = 0;

        for pos in memchr_iter(b'\n', chunk.bytes) {
            self.pending.extend_from_slice(&chunk.bytes[from..pos]);
            lines.push(self.decoder.decode(&self.pending, self.pending_start, true)?);
            self.pending.clear();
            from = pos + 1;
            self.pending_start = chunk.start + from as u64;
        }

        self.pending.extend_from_slice(&chunk.bytes[from..]);
        Ok(lines)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Initialized,
    Polling,
    Reading,
    /// Old handle dropped; waiting for the path to be reopened
    Rotated,
    Stopped,
}

struct OpenFile {
    reader: WindowReader,
    identity: FileIdentity,
    /// Size seen at the last poll
    size: u64,
}

/// Polls a file for appended bytes after seeding itself with its last lines.
pub struct FollowEngine<S: Sleeper = ThreadSleeper> {
    path: PathBuf,
    config: TailConfig,
    sleeper: S,
    state: FollowState,
    window: SlidingWindow,
    splitter: LineSplitter,
    open: Option<OpenFile>,
    /// The newest window entry was seeded without its `\n` yet
    partial_seeded: bool,
    recovery_attempts: u32,
}

impl<S: Sleeper> FollowEngine<S> {
    pub fn new(path: impl Into<PathBuf>, n: usize, config: TailConfig, sleeper: S) -> Self {
        let splitter = LineSplitter::new(&config);
        Self {
            path: path.into(),
            config,
            sleeper,
            state: FollowState::Initialized,
            window: SlidingWindow::new(n),
            splitter,
            open: None,
            partial_seeded: false,
            recovery_attempts: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Byte offset the next forward read starts at, if a file is open.
    pub fn cursor(&self) -> Option<u64> {
        self.open.as_ref().map(|open| open.reader.cursor())
    }

    /// Seed the window from the file's last lines and emit the complete ones.
    /// Open-time errors are fatal here and never retried.
    pub fn initialize<K: LineSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| TailError::open(&self.path, e))?;
        self.seed(file)?;

        let complete = self.window.len() - usize::from(self.partial_seeded && !self.window.is_empty());
        for line in self.window.iter().take(complete) {
            sink.accept(line)?;
        }

        tracing::info!(
            path = %self.path.display(),
            lines = self.window.len(),
            cursor = ?self.cursor(),
            "Following file"
        );
        self.state = FollowState::Polling;
        Ok(())
    }

    /// Poll until `cancel` fires or an unrecoverable error occurs.
    /// Cancellation is checked before every sleep and every poll.
    pub fn run<K: LineSink + ?Sized>(&mut self, sink: &mut K, cancel: &CancellationToken) -> Result<()> {
        let result = self.poll_until_cancelled(sink, cancel);
        self.state = FollowState::Stopped;
        if let Err(e) = &result {
            tracing::debug!(path = %self.path.display(), error = %e, "Follow stopped");
        }
        result
    }

    fn poll_until_cancelled<K: LineSink + ?Sized>(
        &mut self,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.state == FollowState::Initialized {
            self.initialize(sink)?;
        }

        let interval = self.config.poll_interval();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.sleeper.sleep(interval);
            if cancel.is_cancelled() {
                break;
            }
            self.poll(sink)?;
        }

        tracing::debug!(path = %self.path.display(), "Follow cancelled");
        Ok(())
    }

    /// One poll cycle: stat the path, then read appended bytes or recover
    /// from rotation.
    pub fn poll<K: LineSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        self.state = FollowState::Polling;

        let (identity, size, cursor) = match &self.open {
            Some(open) => (open.identity, open.size, open.reader.cursor()),
            None => return self.recover(sink),
        };

        let seen = match RotationDetector::detect(&identity, size, &self.path) {
            Ok(seen) => seen,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "File disappeared");
                self.discard();
                return self.recovery_pending();
            }
            Err(e) => return Err(e.into()),
        };

        match seen.rotation {
            Rotation::Unchanged => {
                if seen.size > cursor {
                    self.read_delta(seen.size, sink)?;
                }
            }
            Rotation::Truncated | Rotation::Replaced => {
                tracing::info!(
                    path = %self.path.display(),
                    rotation = ?seen.rotation,
                    old_size = size,
                    new_size = seen.size,
                    "File rotated, reopening"
                );
                self.discard();
                self.recover(sink)?;
            }
        }

        if self.open.is_some() {
            self.state = FollowState::Polling;
        }
        Ok(())
    }

    fn read_delta<K: LineSink + ?Sized>(&mut self, end: u64, sink: &mut K) -> Result<()> {
        self.state = FollowState::Reading;

        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };
        let splitter = &mut self.splitter;
        let window = &mut self.window;
        let partial_seeded = &mut self.partial_seeded;

        let from = open.reader.cursor();
        let mut emitted = 0usize;
        open.reader.read_forward(end, |chunk| {
            for line in splitter.feed(chunk)? {
                sink.accept(&line)?;
                if std::mem::take(partial_seeded) {
                    window.replace_last(line);
                } else {
                    window.push(line);
                }
                emitted += 1;
            }
            Ok(())
        })?;
        open.size = end;

        tracing::debug!(
            path = %self.path.display(),
            from,
            to = end,
            lines = emitted,
            "Read appended bytes"
        );
        Ok(())
    }

    /// Forget the old handle and anything read through it.
    fn discard(&mut self) {
        self.open = None;
        self.splitter.reset(0);
        self.partial_seeded = false;
        self.state = FollowState::Rotated;
    }

    fn recover<K: LineSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        self.state = FollowState::Rotated;

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.recovery_pending(),
            Err(e) => return Err(TailError::open(&self.path, e)),
        };

        if self.recovery_attempts > 0 {
            tracing::info!(
                path = %self.path.display(),
                attempts = self.recovery_attempts,
                "File is back"
            );
        }
        self.recovery_attempts = 0;

        match self.config.rotation_start {
            RotationStart::Beginning => {
                let metadata = file.metadata()?;
                self.window.clear();
                self.splitter.reset(0);
                self.open = Some(OpenFile {
                    reader: WindowReader::new(file, 0, self.config.window_size_bytes),
                    identity: FileIdentity::of(&metadata),
                    size: 0,
                });
                if metadata.len() > 0 {
                    self.read_delta(metadata.len(), sink)?;
                }
            }
            RotationStart::End => self.seed(file)?,
        }
        Ok(())
    }

    fn recovery_pending(&mut self) -> Result<()> {
        self.state = FollowState::Rotated;
        self.recovery_attempts += 1;

        if let Some(max) = self.config.max_rotation_retries {
            if self.recovery_attempts > max {
                return Err(TailError::RotationRecoveryPending {
                    path: self.path.clone(),
                    attempts: self.recovery_attempts,
                });
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            attempts = self.recovery_attempts,
            "Waiting for file to reappear"
        );
        Ok(())
    }

    /// Fill the window from the file's last lines and park the cursor at
    /// the end, or at the start of an unterminated last line.
    fn seed(&mut self, file: File) -> Result<()> {
        let identity = FileIdentity::of(&file.metadata()?);
        let extraction = TailExtractor::new(&self.config).extract_handle(file, self.window.capacity())?;
        let cursor = extraction.end - extraction.partial_tail;

        self.window.reset(extraction.lines);
        self.partial_seeded = extraction.partial_tail > 0;
        self.splitter.reset(cursor);
        self.open = Some(OpenFile {
            reader: WindowReader::new(extraction.file, cursor, self.config.window_size_bytes),
            identity,
            size: extraction.end,
        });
        Ok(())
    }
}
