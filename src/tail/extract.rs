use std::fs::File;
use std::path::Path;

use super::assembler::BackwardLineAssembler;
use super::window::WindowReader;
use crate::config::TailConfig;
use crate::error::{Result, TailError};

/// Result of a backward extraction over an owned handle.
pub struct Extraction {
    /// Up to `n` lines in file order
    pub lines: Vec<String>,
    /// The handle, handed back for follow mode
    pub file: File,
    /// File length when the extraction started
    pub end: u64,
    /// Byte length of an unterminated final segment, 0 if the file ends in `\n`
    pub partial_tail: u64,
}

/// Collects the last `n` lines of a file by scanning it backward.
pub struct TailExtractor<'a> {
    config: &'a TailConfig,
}

impl<'a> TailExtractor<'a> {
    pub fn new(config: &'a TailConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, path: &Path, n: usize) -> Result<Vec<String>> {
        let file = File::open(path).map_err(|e| TailError::open(path, e))?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let extraction = self.extract_handle(file, n)?;
        tracing::debug!(
            path = %path.display(),
            lines = extraction.lines.len(),
            size = extraction.end,
            "Extracted tail"
        );
        Ok(extraction.lines)
    }

    /// Extract from an already opened handle and give the handle back.
    ///
    /// Always scans at least to the last `\n` so `partial_tail` is exact,
    /// even when `n` is 0.
    pub fn extract_handle(&self, file: File, n: usize) -> Result<Extraction> {
        let end = file.metadata()?.len();
        let limit = n.max(1);

        let mut reader = WindowReader::new(file, end, self.config.window_size_bytes);
        let mut assembler = BackwardLineAssembler::new(self.config);

        let (mut lines, partial_tail) = loop {
            match reader.read_window_backward()? {
                Some(window) => {
                    if assembler.push_window(window, limit)? {
                        let partial_tail = assembler.partial_tail();
                        break (assembler.into_lines(), partial_tail);
                    }
                }
                None => {
                    assembler.finish()?;
                    let partial_tail = assembler.partial_tail();
                    break (assembler.into_lines(), partial_tail);
                }
            }
        };

        if n == 0 {
            lines.clear();
        }

        Ok(Extraction {
            lines,
            file: reader.into_file(),
            end,
            partial_tail,
        })
    }
}
