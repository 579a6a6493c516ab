use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Encoding;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed byte sequence in the line starting at `offset`
    #[error("Malformed {encoding} sequence in line at byte {offset}")]
    Decode { offset: u64, encoding: Encoding },

    /// The followed path is gone and has not come back yet
    #[error("{} unavailable during rotation (attempt {attempts})", path.display())]
    RotationRecoveryPending { path: PathBuf, attempts: u32 },
}

impl TailError {
    /// Classify an error raised while opening `path`.
    pub fn open(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TailError::FileNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => TailError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => TailError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, TailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_classification() {
        let path = Path::new("/var/log/app.log");

        let err = TailError::open(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, TailError::FileNotFound { .. }));
        assert_eq!(err.to_string(), "File not found: /var/log/app.log");

        let err = TailError::open(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, TailError::PermissionDenied { .. }));

        let err = TailError::open(path, io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(err, TailError::Io(_)));
    }

    #[test]
    fn test_decode_message() {
        let err = TailError::Decode {
            offset: 42,
            encoding: Encoding::Utf8,
        };
        assert_eq!(err.to_string(), "Malformed utf-8 sequence in line at byte 42");
    }
}
