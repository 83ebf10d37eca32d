use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::VolumeError;
use crate::manifest::spec_to_os_path;

/// One physical file inside the logical volume.
///
/// Covers the logical byte range `[start, start + size)`; positional I/O is
/// expressed in file-local coordinates. The file handle is owned for the
/// lifetime of the value and closes on drop.
#[derive(Debug)]
pub struct BackingFile {
    spec_path: String,
    os_path: PathBuf,
    start: u64,
    size: u64,
    file: File,
}

impl BackingFile {
    /// Opens (creating if missing) the physical file for a spec entry,
    /// resolved under `base_dir`.
    ///
    /// Missing parent directories named by the spec path are created. The
    /// file is never truncated on open, so a partially materialized volume
    /// keeps its bytes across reopens.
    pub fn open(
        base_dir: &Path,
        spec_path: &str,
        start: u64,
        size: u64,
    ) -> Result<Self, VolumeError> {
        let os_path = base_dir.join(spec_to_os_path(spec_path));
        Self::open_at(os_path, spec_path, start, size)
    }

    /// Opens a spec entry backed by an explicit physical path.
    ///
    /// Used for the spec file itself, whose physical file is the volume
    /// root rather than a path derived from its record.
    pub(crate) fn open_at(
        os_path: PathBuf,
        spec_path: &str,
        start: u64,
        size: u64,
    ) -> Result<Self, VolumeError> {
        if let Some(parent) = os_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&os_path)?;

        debug!(
            "opened backing file {} for range [{}, {})",
            os_path.display(),
            start,
            start + size
        );

        Ok(Self {
            spec_path: spec_path.to_string(),
            os_path,
            start,
            size,
            file,
        })
    }

    /// Positional write of the whole buffer at a file-local offset.
    pub fn write_at(&self, buf: &[u8], local_off: u64) -> Result<usize, VolumeError> {
        pwrite_all(&self.file, buf, local_off)?;
        Ok(buf.len())
    }

    /// Positional read at a file-local offset. May return fewer bytes than
    /// requested when the physical file ends short.
    pub fn read_at(&self, buf: &mut [u8], local_off: u64) -> Result<usize, VolumeError> {
        Ok(pread(&self.file, buf, local_off)?)
    }

    /// Extends (or trims) the physical file to exactly the declared size so
    /// positional writes at any in-range offset succeed.
    pub fn resize_reserved(&self) -> Result<(), VolumeError> {
        self.file.set_len(self.size)?;
        Ok(())
    }

    /// Current physical length of the file on disk.
    pub fn disk_size(&self) -> Result<u64, VolumeError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn spec_path(&self) -> &str {
        &self.spec_path
    }

    pub fn os_path(&self) -> &Path {
        &self.os_path
    }

    /// First logical offset covered by this file.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last logical offset covered by this file. Meaningful only for
    /// non-empty entries.
    pub fn end(&self) -> u64 {
        self.limit().saturating_sub(1)
    }

    /// One past the last logical offset covered by this file.
    pub fn limit(&self) -> u64 {
        self.start + self.size
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.limit()
    }
}

// Positional I/O shims over the platform primitives. Neither variant moves
// the file cursor.

#[cfg(unix)]
pub(crate) fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
pub(crate) fn pwrite_all(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(windows)]
pub(crate) fn pwrite_all(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}
