//! Protocol constants for the storage substrate.

// ============================================================================
// Multi-file spec
// ============================================================================

/// Filename of the multi-file spec.
///
/// Doubles as the magic prefix of chunk 0: a swarm whose first bytes equal
/// this string is a multi-file swarm.
pub const SPEC_FILENAME: &str = "META-INF-multifilespec.txt";

/// Path separator used inside spec records regardless of host OS.
pub const SPEC_PATH_SEPARATOR: &str = "/";

/// Longest accepted spec record, path and size field included.
pub const MAX_SPEC_RECORD_LEN: usize = 2048;
