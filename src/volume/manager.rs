use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::backing::{self, BackingFile};
use super::error::VolumeError;
use super::index;
use crate::constants::SPEC_FILENAME;
use crate::manifest::{parse_inline_header, Manifest, ManifestError};

/// Lifecycle phase of a [`Volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumePhase {
    /// Nothing on disk yet; the first chunk decides the swarm kind.
    Init,
    /// Single-file swarm.
    SingleFile,
    /// Multi-file swarm whose spec size is known but whose spec body has not
    /// fully arrived.
    SpecSizeKnown,
    /// Multi-file swarm with a fully parsed spec.
    Complete,
}

#[derive(Debug)]
enum State {
    Init { postponed_reserve: Option<u64> },
    SingleFile { file: File },
    SpecSizeKnown { files: Vec<BackingFile> },
    Complete { files: Vec<BackingFile> },
}

/// A logical byte-addressable volume backing one swarm.
///
/// The volume is backed either by a single file or by a concatenation of
/// files laid out according to a multi-file spec. A seeder adopts what is
/// already on disk; a leecher starts from a missing path and materializes
/// the volume from positional chunk writes, the first of which reveals the
/// swarm kind.
///
/// Operations are synchronous and take the caller's thread; concurrent
/// callers must serialize externally (see [`VolumeManager`]).
#[derive(Debug)]
pub struct Volume {
    root_path: PathBuf,
    base_dir: PathBuf,
    /// Declared spec size, valid once discovered. Zero before that.
    spec_size: u64,
    /// Authored total size injected by the hash-tree layer, if any.
    authored_size: Option<u64>,
    state: State,
}

impl Volume {
    /// Opens a volume rooted at `root_path`.
    ///
    /// An existing file whose head equals the spec sentinel is adopted as a
    /// multi-file spec and parsed from disk. Any other existing file enters
    /// single-file mode. A missing path leaves the volume waiting for the
    /// first chunk.
    ///
    /// Content entries of a multi-file spec resolve relative to the parent
    /// directory of `root_path`.
    pub fn open(root_path: impl Into<PathBuf>) -> Result<Self, VolumeError> {
        let root_path = root_path.into();
        let base_dir = match root_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut volume = Self {
            root_path,
            base_dir,
            spec_size: 0,
            authored_size: None,
            state: State::Init {
                postponed_reserve: None,
            },
        };

        let disk_size = match std::fs::metadata(&volume.root_path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "volume root is not a regular file",
                )
                .into());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "volume root {} missing, waiting for the first chunk",
                    volume.root_path.display()
                );
                return Ok(volume);
            }
            Err(err) => return Err(err.into()),
        };

        if head_matches_sentinel(&volume.root_path)? {
            debug!(
                "found multi-file spec at {}, seeding it",
                volume.root_path.display()
            );
            volume.spec_size = disk_size;
            let spec = BackingFile::open_at(volume.root_path.clone(), SPEC_FILENAME, 0, disk_size)?;
            let mut files = vec![spec];
            let parsed = parse_spec(&volume.base_dir, &mut files);
            volume.state = State::Complete { files };
            parsed?;
        } else {
            debug!(
                "found single file at {}, seeding it",
                volume.root_path.display()
            );
            volume.open_single()?;
        }

        Ok(volume)
    }

    /// Writes `buf` into the logical volume at `offset`.
    ///
    /// In the initial phase only offset 0 is accepted, and the chunk's head
    /// decides the swarm kind: a spec sentinel starts a multi-file volume,
    /// anything else a single-file one. In a multi-file volume the buffer is
    /// split at backing-file boundaries.
    ///
    /// Returns the number of bytes accepted. A count shorter than
    /// `buf.len()` means a tail write beyond a file boundary failed after
    /// the head landed; the caller retries the remainder.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, VolumeError> {
        match &mut self.state {
            State::SingleFile { file } => {
                backing::pwrite_all(file, buf, offset)?;
                Ok(buf.len())
            }
            State::Init { .. } => {
                if offset != 0 {
                    return Err(VolumeError::InvalidWriteOffset(offset));
                }

                if buf.starts_with(SPEC_FILENAME.as_bytes()) {
                    let spec_size = parse_inline_header(buf)?;
                    debug!("first chunk carries a multi-file spec of {spec_size} bytes");
                    let spec = BackingFile::open_at(
                        self.root_path.clone(),
                        SPEC_FILENAME,
                        0,
                        spec_size,
                    )?;
                    self.spec_size = spec_size;
                    self.state = State::SpecSizeKnown { files: vec![spec] };
                    self.write_spec_part(buf, offset)
                } else {
                    debug!("first chunk is raw content, single-file swarm");
                    self.open_single()?;
                    self.write_at(buf, offset)
                }
            }
            State::SpecSizeKnown { .. } => self.write_spec_part(buf, offset),
            State::Complete { files } => {
                let Some(idx) = index::find_by_offset(files, offset) else {
                    return Err(VolumeError::OffsetOutOfRange(offset));
                };
                let (head, tail) = write_buffer(&files[idx], buf, offset)?;
                if tail == 0 {
                    return Ok(head);
                }
                match self.write_at(&buf[head..], offset + head as u64) {
                    Ok(n) => Ok(head + n),
                    Err(err) => {
                        warn!(
                            "tail write at offset {} failed after {} bytes: {}",
                            offset + head as u64,
                            head,
                            err
                        );
                        Ok(head)
                    }
                }
            }
        }
    }

    /// Reads up to `buf.len()` bytes from the logical volume at `offset`.
    ///
    /// Reads that straddle backing-file boundaries continue into the next
    /// file until the buffer is full or the end of the volume is reached.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VolumeError> {
        match &self.state {
            State::SingleFile { file } => Ok(backing::pread(file, buf, offset)?),
            State::Init { .. } => Err(VolumeError::NotReadable),
            State::SpecSizeKnown { files } | State::Complete { files } => {
                let Some(idx) = index::find_by_offset(files, offset) else {
                    return Err(VolumeError::OffsetOutOfRange(offset));
                };
                let file = &files[idx];
                // Clamp to the entry's logical range so an oversized
                // physical file cannot bleed bytes across the boundary.
                let span = (file.limit() - offset).min(buf.len() as u64) as usize;
                let got = file.read_at(&mut buf[..span], offset - file.start())?;

                if got > 0 && got < buf.len() && offset + got as u64 != self.end_of_volume() {
                    let more = self.read_at(&mut buf[got..], offset + got as u64)?;
                    Ok(got + more)
                } else {
                    Ok(got)
                }
            }
        }
    }

    /// Reserves `size` bytes of backing storage.
    ///
    /// In the initial phase the request is postponed and replayed if the
    /// volume turns out to be single-file; multi-file sizing always comes
    /// from the spec. In a complete multi-file volume a growing request
    /// extends every backing file to its declared size; shrinking is
    /// ignored.
    pub fn resize_reserved(&mut self, size: u64) -> Result<(), VolumeError> {
        match &mut self.state {
            State::SingleFile { file } => {
                debug!("resizing single file to {size} bytes");
                file.set_len(size)?;
                Ok(())
            }
            State::Init { postponed_reserve } => {
                debug!("postponing {size}-byte reservation until the swarm kind is known");
                *postponed_reserve = Some(size);
                Ok(())
            }
            State::SpecSizeKnown { .. } => Err(VolumeError::ResizeUnavailable),
            State::Complete { files } => {
                let current = aggregate_disk_size(files)?;
                if size > current {
                    debug!("growing backing files from {current} to their declared sizes");
                    for file in files.iter() {
                        file.resize_reserved()?;
                    }
                } else {
                    debug!("ignoring shrink of reserved size {current} to {size}");
                }
                Ok(())
            }
        }
    }

    /// Physical bytes currently reserved on disk for this volume.
    pub fn reserved_size(&self) -> Result<u64, VolumeError> {
        match &self.state {
            State::SingleFile { file } => Ok(file.metadata()?.len()),
            State::Complete { files } => aggregate_disk_size(files),
            _ => Err(VolumeError::ResizeUnavailable),
        }
    }

    /// Injects the authored total size from the hash-tree layer.
    ///
    /// Once the spec is complete the spec total is authoritative; a
    /// disagreeing authored size is an error, here or at the moment the
    /// spec completes.
    pub fn set_authored_size(&mut self, size: u64) -> Result<(), VolumeError> {
        if let State::Complete { files } = &self.state {
            let total = files.last().map(BackingFile::limit).unwrap_or(0);
            if total != size {
                return Err(VolumeError::AuthoredSizeMismatch {
                    authored: size,
                    spec: total,
                });
            }
        }
        self.authored_size = Some(size);
        Ok(())
    }

    pub fn phase(&self) -> VolumePhase {
        match &self.state {
            State::Init { .. } => VolumePhase::Init,
            State::SingleFile { .. } => VolumePhase::SingleFile,
            State::SpecSizeKnown { .. } => VolumePhase::SpecSizeKnown,
            State::Complete { .. } => VolumePhase::Complete,
        }
    }

    /// Declared spec size; zero until discovered.
    pub fn spec_size(&self) -> u64 {
        self.spec_size
    }

    /// Total logical size, once known: the spec total for a complete
    /// multi-file volume, otherwise the injected authored size.
    pub fn total_size(&self) -> Option<u64> {
        match &self.state {
            State::Complete { files } => files.last().map(BackingFile::limit),
            _ => self.authored_size,
        }
    }

    /// Backing-file table; empty outside the multi-file phases.
    pub fn files(&self) -> &[BackingFile] {
        match &self.state {
            State::SpecSizeKnown { files } | State::Complete { files } => files,
            _ => &[],
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn is_single_file(&self) -> bool {
        matches!(self.state, State::SingleFile { .. })
    }

    pub fn is_multi_file(&self) -> bool {
        matches!(
            self.state,
            State::SpecSizeKnown { .. } | State::Complete { .. }
        )
    }

    /// Writes a chunk slice into the spec's backing file and completes the
    /// spec when its last byte arrives. Content bytes overflowing the spec
    /// in the same chunk are dispatched to the freshly opened content files.
    fn write_spec_part(&mut self, buf: &[u8], offset: u64) -> Result<usize, VolumeError> {
        let State::SpecSizeKnown { files } = &mut self.state else {
            unreachable!("spec-part writes occur only while the spec is incomplete");
        };

        let spec_limit = files[0].limit();
        if offset >= spec_limit {
            // The spec body arrives contiguously from offset zero; bytes
            // addressed past it before completion are a protocol violation.
            return Err(VolumeError::InvalidWriteOffset(offset));
        }
        let (head, tail) = write_buffer(&files[0], buf, offset)?;

        if offset + head as u64 != spec_limit {
            return Ok(head);
        }

        debug!("multi-file spec complete at {spec_limit} bytes, parsing");
        let mut files = std::mem::take(files);
        let parsed = parse_spec(&self.base_dir, &mut files);
        self.state = State::Complete { files };
        parsed?;
        self.check_authored()?;

        if tail == 0 {
            return Ok(head);
        }
        match self.write_at(&buf[head..], offset + head as u64) {
            Ok(n) => Ok(head + n),
            Err(err) => {
                warn!(
                    "content tail after spec failed at offset {}: {}",
                    offset + head as u64,
                    err
                );
                Ok(head)
            }
        }
    }

    fn open_single(&mut self) -> Result<(), VolumeError> {
        if let Some(parent) = self.root_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.root_path)?;

        let postponed = match &mut self.state {
            State::Init { postponed_reserve } => postponed_reserve.take(),
            _ => None,
        };
        if let Some(size) = postponed {
            debug!("replaying postponed {size}-byte reservation");
            file.set_len(size)?;
        }

        self.state = State::SingleFile { file };
        Ok(())
    }

    fn end_of_volume(&self) -> u64 {
        if let State::Complete { files } = &self.state {
            if let Some(last) = files.last() {
                return last.limit();
            }
        }
        self.authored_size.unwrap_or(self.spec_size)
    }

    fn check_authored(&self) -> Result<(), VolumeError> {
        if let (Some(authored), Some(total)) = (self.authored_size, self.total_size()) {
            if authored != total {
                return Err(VolumeError::AuthoredSizeMismatch {
                    authored,
                    spec: total,
                });
            }
        }
        Ok(())
    }
}

/// Writes the in-range head of `buf` into `file` and returns
/// `(head_len, tail_len)`, the split at the file's end boundary.
///
/// `offset` must lie inside the file's logical range.
fn write_buffer(
    file: &BackingFile,
    buf: &[u8],
    offset: u64,
) -> Result<(usize, usize), VolumeError> {
    let head = (file.limit() - offset).min(buf.len() as u64) as usize;
    file.write_at(&buf[..head], offset - file.start())?;
    Ok((head, buf.len() - head))
}

/// Reads the spec body from its backing file, validates it, and appends one
/// backing file per content record.
fn parse_spec(base_dir: &Path, files: &mut Vec<BackingFile>) -> Result<(), VolumeError> {
    let spec_size = files[0].size();
    let mut body = vec![0u8; spec_size as usize];
    let mut filled = 0;
    while filled < body.len() {
        let got = files[0].read_at(&mut body[filled..], filled as u64)?;
        if got == 0 {
            return Err(ManifestError::Truncated.into());
        }
        filled += got;
    }

    let manifest = Manifest::parse(&body)?;
    manifest.verify_self_entry(spec_size)?;

    let mut offset = spec_size;
    for entry in &manifest.entries()[1..] {
        let file = BackingFile::open(base_dir, &entry.spec_path, offset, entry.size)?;
        offset += file.size();
        files.push(file);
    }
    index::check_contiguous(files)?;

    debug!(
        "parsed multi-file spec: {} entries, {} bytes total",
        files.len(),
        offset
    );
    Ok(())
}

fn head_matches_sentinel(path: &Path) -> Result<bool, VolumeError> {
    let mut file = File::open(path)?;
    let mut head = [0u8; SPEC_FILENAME.len()];
    let mut filled = 0;
    while filled < head.len() {
        let got = file.read(&mut head[filled..])?;
        if got == 0 {
            return Ok(false);
        }
        filled += got;
    }
    Ok(&head[..] == SPEC_FILENAME.as_bytes())
}

fn aggregate_disk_size(files: &[BackingFile]) -> Result<u64, VolumeError> {
    files
        .iter()
        .try_fold(0u64, |sum, file| Ok(sum + file.disk_size()?))
}

/// Registry of open volumes keyed by swarm identifier.
///
/// Each volume sits behind its own lock, serializing callers the way the
/// substrate requires, while the registry itself may be shared freely.
pub struct VolumeManager {
    volumes: RwLock<HashMap<String, Arc<Mutex<Volume>>>>,
}

impl VolumeManager {
    pub fn new() -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a volume at `root_path` and registers it under `swarm_id`.
    pub fn open(
        &self,
        swarm_id: impl Into<String>,
        root_path: impl Into<PathBuf>,
    ) -> Result<(), VolumeError> {
        let volume = Volume::open(root_path)?;
        self.register(swarm_id, volume);
        Ok(())
    }

    pub fn register(&self, swarm_id: impl Into<String>, volume: Volume) {
        self.volumes
            .write()
            .insert(swarm_id.into(), Arc::new(Mutex::new(volume)));
    }

    pub fn unregister(&self, swarm_id: &str) -> bool {
        self.volumes.write().remove(swarm_id).is_some()
    }

    pub fn contains(&self, swarm_id: &str) -> bool {
        self.volumes.read().contains_key(swarm_id)
    }

    pub fn write(&self, swarm_id: &str, buf: &[u8], offset: u64) -> Result<usize, VolumeError> {
        let volume = self.get(swarm_id)?;
        let mut volume = volume.lock();
        volume.write_at(buf, offset)
    }

    pub fn read(&self, swarm_id: &str, offset: u64, len: usize) -> Result<Bytes, VolumeError> {
        let volume = self.get(swarm_id)?;
        let volume = volume.lock();
        let mut buf = vec![0u8; len];
        let got = volume.read_at(&mut buf, offset)?;
        buf.truncate(got);
        Ok(Bytes::from(buf))
    }

    pub fn resize_reserved(&self, swarm_id: &str, size: u64) -> Result<(), VolumeError> {
        let volume = self.get(swarm_id)?;
        let mut volume = volume.lock();
        volume.resize_reserved(size)
    }

    pub fn reserved_size(&self, swarm_id: &str) -> Result<u64, VolumeError> {
        let volume = self.get(swarm_id)?;
        let volume = volume.lock();
        volume.reserved_size()
    }

    fn get(&self, swarm_id: &str) -> Result<Arc<Mutex<Volume>>, VolumeError> {
        self.volumes
            .read()
            .get(swarm_id)
            .cloned()
            .ok_or_else(|| VolumeError::VolumeNotFound(swarm_id.to_string()))
    }
}

impl Default for VolumeManager {
    fn default() -> Self {
        Self::new()
    }
}
