use thiserror::Error;

use crate::manifest::ManifestError;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spec error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("invalid write offset {0} for the current volume state")]
    InvalidWriteOffset(u64),

    #[error("volume is not readable before the first chunk arrives")]
    NotReadable,

    #[error("offset {0} is outside the logical volume")]
    OffsetOutOfRange(u64),

    #[error("reservation is not available in the current volume state")]
    ResizeUnavailable,

    #[error("spec entry {path:?} starts at {start}, expected {expected}")]
    DiscontiguousLayout {
        path: String,
        start: u64,
        expected: u64,
    },

    #[error("authored size {authored} disagrees with the spec total {spec}")]
    AuthoredSizeMismatch { authored: u64, spec: u64 },

    #[error("volume not registered: {0}")]
    VolumeNotFound(String),
}
