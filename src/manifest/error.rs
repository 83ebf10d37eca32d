use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("spec is not valid utf-8")]
    NotUtf8,

    #[error("spec record {0} has no size field")]
    MissingSize(usize),

    #[error("invalid size in spec record {line}: {field:?}")]
    InvalidSize { line: usize, field: String },

    #[error("unsafe spec path: {0:?}")]
    UnsafePath(String),

    #[error("spec path {0:?} is reserved for the spec itself")]
    ReservedPath(String),

    #[error("spec record {0} exceeds the record length cap")]
    RecordTooLong(usize),

    #[error("spec contains no records")]
    Empty,

    #[error("first spec record must describe the spec file, got {0:?}")]
    BadSelfEntry(String),

    #[error("spec declares itself as {declared} bytes but the spec file holds {actual}")]
    SelfEntrySizeMismatch { declared: u64, actual: u64 },

    #[error("chunk head does not begin with the spec sentinel")]
    MissingSentinel,

    #[error("truncated spec header")]
    TruncatedHeader,

    #[error("spec body ends before the declared size")]
    Truncated,
}
