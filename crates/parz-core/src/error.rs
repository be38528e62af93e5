use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to process {}: {source}", path.display())]
    Entry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt archive {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker thread panicked: {0}")]
    WorkerPanic(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// How the supervisor treats a reported error.
///
/// Recoverable errors are counted and logged but let the rest of the run
/// proceed; a fatal error additionally raises the cancellation flag so every
/// pipeline unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Recoverable,
    Fatal,
}

impl ParzError {
    /// Classifies this error for the supervisor.
    ///
    /// Corrupt streams and worker panics poison the run. Plain I/O failures
    /// are isolated to the entry they occurred on, unless the output device
    /// itself is exhausted.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Codec { .. } | Self::WorkerPanic(_) | Self::Other(_) => Severity::Fatal,
            Self::Io(source)
            | Self::Entry { source, .. }
            | Self::Archive { source, .. } => {
                if storage_exhausted(source) {
                    Severity::Fatal
                } else {
                    Severity::Recoverable
                }
            }
            Self::Cancelled => Severity::Recoverable,
        }
    }

    /// The filesystem path this error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Entry { path, .. } | Self::Archive { path, .. } | Self::Codec { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

fn storage_exhausted(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded | io::ErrorKind::WriteZero
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_and_panic_errors_are_fatal() {
        let codec = ParzError::Codec {
            path: PathBuf::from("a.tar.zst"),
            source: io::Error::other("bad frame"),
        };
        assert_eq!(codec.severity(), Severity::Fatal);
        assert_eq!(
            ParzError::WorkerPanic("boom".to_string()).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn entry_errors_are_recoverable_unless_storage_is_exhausted() {
        let missing = ParzError::Entry {
            path: PathBuf::from("gone.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(missing.severity(), Severity::Recoverable);

        let full = ParzError::Entry {
            path: PathBuf::from("big.bin"),
            source: io::Error::new(io::ErrorKind::StorageFull, "device full"),
        };
        assert_eq!(full.severity(), Severity::Fatal);
    }

    #[test]
    fn cancellation_is_not_fatal() {
        assert_eq!(ParzError::Cancelled.severity(), Severity::Recoverable);
    }
}
