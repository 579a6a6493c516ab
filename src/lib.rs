//! Read the last lines of a file by scanning it backward in fixed-size
//! windows, and keep following it as it grows, gets truncated or is replaced.

pub mod config;
pub mod error;
pub mod tail;

pub use config::TailConfig;
pub use error::{Result, TailError};
pub use tail::{follow, tail, ChunkedTail, LineSink, Tail};
