//! Rotation detection for followed files.
//!
//! A file counts as replaced when its stable identifier changes (delete and
//! recreate, rename and recreate) and as truncated when it shrank while
//! keeping its identifier. Truncation followed by a rewrite that outgrows the
//! old size within one poll interval looks like growth and is not detected.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

/// Stable identifier of a file: device and inode on Unix, creation time
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    volume: u64,
    index: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            volume: metadata.dev(),
            index: metadata.ino(),
        }
    }

    /// Fallback for non-Unix: creation time, or 0 when the platform has none,
    /// which leaves only size-based detection.
    #[cfg(not(unix))]
    pub fn of(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            volume: 0,
            index: created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Unchanged,
    Truncated,
    Replaced,
}

/// What one poll saw at the followed path.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub rotation: Rotation,
    pub identity: FileIdentity,
    pub size: u64,
}

pub struct RotationDetector;

impl RotationDetector {
    /// Stat `path` and compare it with the previous observation.
    /// A missing path surfaces as `io::ErrorKind::NotFound`.
    pub fn detect(previous: &FileIdentity, previous_size: u64, path: &Path) -> io::Result<Observation> {
        let metadata = fs::metadata(path)?;
        let identity = FileIdentity::of(&metadata);
        let size = metadata.len();

        Ok(Observation {
            rotation: Self::classify(previous, previous_size, &identity, size),
            identity,
            size,
        })
    }

    pub fn classify(
        previous: &FileIdentity,
        previous_size: u64,
        current: &FileIdentity,
        current_size: u64,
    ) -> Rotation {
        if previous != current {
            Rotation::Replaced
        } else if current_size < previous_size {
            Rotation::Truncated
        } else {
            Rotation::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn identity_of(path: &Path) -> FileIdentity {
        FileIdentity::of(&fs::metadata(path).unwrap())
    }

    #[test]
    fn test_classify() {
        let a = FileIdentity { volume: 1, index: 10 };
        let b = FileIdentity { volume: 1, index: 11 };

        assert_eq!(RotationDetector::classify(&a, 100, &a, 100), Rotation::Unchanged);
        assert_eq!(RotationDetector::classify(&a, 100, &a, 150), Rotation::Unchanged);
        assert_eq!(RotationDetector::classify(&a, 100, &a, 10), Rotation::Truncated);
        assert_eq!(RotationDetector::classify(&a, 100, &b, 100), Rotation::Replaced);
        assert_eq!(RotationDetector::classify(&a, 100, &b, 0), Rotation::Replaced);
    }

    #[test]
    fn test_growth_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\n").unwrap();
        let identity = identity_of(&path);

        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"b\n").unwrap();
        drop(f);

        let seen = RotationDetector::detect(&identity, 2, &path).unwrap();
        assert_eq!(seen.rotation, Rotation::Unchanged);
        assert_eq!(seen.size, 4);
    }

    #[test]
    fn test_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a long line\n").unwrap();
        let identity = identity_of(&path);

        // Opening with truncate keeps the inode
        OpenOptions::new().write(true).truncate(true).open(&path).unwrap();

        let seen = RotationDetector::detect(&identity, 12, &path).unwrap();
        assert_eq!(seen.rotation, Rotation::Truncated);
        assert_eq!(seen.size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_replacement_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let next = dir.path().join("app.log.new");
        fs::write(&path, "old\n").unwrap();
        let identity = identity_of(&path);

        fs::write(&next, "new content\n").unwrap();
        fs::rename(&next, &path).unwrap();

        let seen = RotationDetector::detect(&identity, 4, &path).unwrap();
        assert_eq!(seen.rotation, Rotation::Replaced);
        assert_ne!(seen.identity, identity);
    }

    #[test]
    fn test_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\n").unwrap();
        let identity = identity_of(&path);
        fs::remove_file(&path).unwrap();

        let err = RotationDetector::detect(&identity, 2, &path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
