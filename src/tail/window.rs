use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;

/// One chunk of the file and the offset of its first byte.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub start: u64,
    pub bytes: &'a [u8],
}

/// Random-access reader over an owned file handle.
///
/// Moves its cursor backward one window at a time during extraction and
/// forward during follow. Dropping the reader closes the file.
pub struct WindowReader {
    file: File,
    cursor: u64,
    window_size: usize,
    buf: Vec<u8>,
}

impl WindowReader {
    pub fn new(file: File, cursor: u64, window_size: usize) -> Self {
        Self {
            file,
            cursor,
            window_size: window_size.max(1),
            buf: Vec::new(),
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read the window ending at the cursor and move the cursor to its start.
    /// Returns `None` once the cursor is at the beginning of the file.
    pub fn read_window_backward(&mut self) -> Result<Option<Window<'_>>> {
        if self.cursor == 0 {
            return Ok(None);
        }

        let start = self.cursor.saturating_sub(self.window_size as u64);
        let len = (self.cursor - start) as usize;
        self.fill(start, len)?;
        self.cursor = start;

        Ok(Some(Window {
            start,
            bytes: &self.buf[..len],
        }))
    }

    /// Read `[cursor, end)` in window-sized chunks, handing each chunk to
    /// `on_chunk` before the next one is read. The cursor ends at `end`.
    pub fn read_forward<F>(&mut self, end: u64, mut on_chunk: F) -> Result<()>
    where
        F: FnMut(Window<'_>) -> Result<()>,
    {
        while self.cursor < end {
            let start = self.cursor;
            let len = (end - start).min(self.window_size as u64) as usize;
            self.fill(start, len)?;
            self.cursor = start + len as u64;
            on_chunk(Window {
                start,
                bytes: &self.buf[..len],
            })?;
        }
        Ok(())
    }

    pub fn into_file(self) -> File {
        self.file
    }

    /// A file that shrank under us surfaces as `UnexpectedEof`.
    fn fill(&mut self, start: u64, len: usize) -> Result<()> {
        self.buf.resize(len, 0);
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut self.buf[..len])?;
        Ok(())
    }
}
