use memchr::memrchr;

use super::decode::LineDecoder;
use super::window::Window;
use crate::config::TailConfig;
use crate::error::Result;

/// Rebuilds lines from windows delivered back to front.
///
/// Bytes of the line under construction are kept raw, last byte first, until
/// the `\n` in front of them (or the beginning of the file) shows up. Only
/// then is the span reversed and decoded, so windows may cut through
/// multi-byte characters freely.
pub struct BackwardLineAssembler {
    decoder: LineDecoder,
    /// Current fragment in reverse byte order
    pending: Vec<u8>,
    /// Whether the current fragment is followed by a `\n`
    terminated: bool,
    /// Whether the last byte of the file has been seen
    started: bool,
    /// Length of an unterminated final segment, known once it completes
    partial_tail: u64,
    /// Completed lines, last line first
    lines: Vec<String>,
}

impl BackwardLineAssembler {
    pub fn new(config: &TailConfig) -> Self {
        Self {
            decoder: LineDecoder::new(config),
            pending: Vec::new(),
            terminated: false,
            started: false,
            partial_tail: 0,
            lines: Vec::new(),
        }
    }

    /// Consume the next window toward the start of the file. Stops scanning
    /// as soon as `limit` lines are complete and returns `true` in that case.
    pub fn push_window(&mut self, window: Window<'_>, limit: usize) -> Result<bool> {
        let bytes = window.bytes;
        let mut end = bytes.len();

        if !self.started && end > 0 {
            self.started = true;
            // The file's final `\n` closes the last line without opening another
            if bytes[end - 1] == b'\n' {
                self.terminated = true;
                end -= 1;
            }
        }

        while self.lines.len() < limit {
            match memrchr(b'\n', &bytes[..end]) {
                Some(pos) => {
                    self.pending.extend(bytes[pos + 1..end].iter().rev());
                    self.complete(window.start + pos as u64 + 1)?;
                    end = pos;
                }
                None => {
                    self.pending.extend(bytes[..end].iter().rev());
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Flush the first line of the file once the scan reached offset 0.
    pub fn finish(&mut self) -> Result<()> {
        if !self.pending.is_empty() || self.terminated {
            self.complete(0)?;
        }
        Ok(())
    }

    /// Lines collected so far, in file order.
    pub fn into_lines(mut self) -> Vec<String> {
        self.lines.reverse();
        self.lines
    }

    /// Byte length of the final segment when the file does not end in `\n`.
    pub fn partial_tail(&self) -> u64 {
        self.partial_tail
    }

    fn complete(&mut self, offset: u64) -> Result<()> {
        if self.lines.is_empty() && !self.terminated {
            self.partial_tail = self.pending.len() as u64;
        }

        self.pending.reverse();
        let line = self.decoder.decode(&self.pending, offset, self.terminated)?;
        self.lines.push(line);

        self.pending.clear();
        self.terminated = true;
        Ok(())
    }
}
