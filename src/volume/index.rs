//! Offset lookup over the ordered backing-file table.

use super::backing::BackingFile;
use super::error::VolumeError;

/// Finds the backing file whose logical range contains `offset`.
///
/// `files` must be sorted by start offset with disjoint exact ranges; the
/// volume state machine maintains that invariant. Returns `None` when the
/// offset falls outside the union of ranges, which indicates a logic error
/// upstream. Zero-size entries cover no offset and are never returned.
pub(crate) fn find_by_offset(files: &[BackingFile], offset: u64) -> Option<usize> {
    let idx = files.partition_point(|file| file.limit() <= offset);
    files.get(idx).filter(|file| file.contains(offset))?;
    Some(idx)
}

/// Checks that the table is sorted, contiguous, and anchored at offset zero.
pub(crate) fn check_contiguous(files: &[BackingFile]) -> Result<(), VolumeError> {
    let mut expected = 0u64;
    for file in files {
        if file.start() != expected {
            return Err(VolumeError::DiscontiguousLayout {
                path: file.spec_path().to_string(),
                start: file.start(),
                expected,
            });
        }
        expected = file.limit();
    }
    Ok(())
}
