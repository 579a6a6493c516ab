//! Backward tail extraction and incremental follow.

mod assembler;
mod decode;
mod extract;
mod follow;
mod rotation;
mod window;

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::TailConfig;
use crate::error::Result;

pub use assembler::BackwardLineAssembler;
pub use decode::LineDecoder;
pub use extract::{Extraction, TailExtractor};
pub use follow::{
    FollowEngine, FollowState, LineSink, LineSplitter, Sleeper, SlidingWindow, ThreadSleeper,
    WriterSink,
};
pub use rotation::{FileIdentity, Observation, Rotation, RotationDetector};
pub use window::{Window, WindowReader};

/// Last-lines extraction plus follow mode over a file path.
pub trait Tail {
    /// Return at most `n` lines from the end of the file, in file order.
    fn tail(&self, path: &Path, n: usize) -> Result<Vec<String>>;

    /// Emit the last `n` lines, then every newly completed line, until
    /// `cancel` fires or an unrecoverable error occurs.
    fn follow(
        &self,
        path: &Path,
        n: usize,
        sink: &mut dyn LineSink,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Reads windows backward from the end of the file; the only strategy that
/// never touches bytes in front of the requested lines.
#[derive(Debug, Clone, Default)]
pub struct ChunkedTail {
    config: TailConfig,
}

impl ChunkedTail {
    pub fn new(config: TailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TailConfig {
        &self.config
    }
}

impl Tail for ChunkedTail {
    fn tail(&self, path: &Path, n: usize) -> Result<Vec<String>> {
        TailExtractor::new(&self.config).extract(path, n)
    }

    fn follow(
        &self,
        path: &Path,
        n: usize,
        sink: &mut dyn LineSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        FollowEngine::new(path, n, self.config.clone(), ThreadSleeper).run(sink, cancel)
    }
}

/// Last `n` lines of `path`.
pub fn tail(path: &Path, n: usize, config: &TailConfig) -> Result<Vec<String>> {
    ChunkedTail::new(config.clone()).tail(path, n)
}

/// Follow `path`, sending lines to `sink` until `cancel` fires.
pub fn follow<K: LineSink>(
    path: &Path,
    n: usize,
    config: &TailConfig,
    mut sink: K,
    cancel: &CancellationToken,
) -> Result<()> {
    ChunkedTail::new(config.clone()).follow(path, n, &mut sink, cancel)
}
