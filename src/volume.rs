//! Logical volume storage for swarm content.
//!
//! A swarm presents its content as one flat byte-addressable volume. This
//! module maps that volume onto disk: a single file, or a spec-described
//! concatenation of files with chunk writes split at file boundaries.
//!
//! # Components
//!
//! - [`Volume`] - Per-swarm volume state machine
//! - [`BackingFile`] - One physical file at a known logical range
//! - [`VolumeManager`] - Registry of volumes across swarms
//! - [`VolumePhase`] - Observable lifecycle phase
//!
//! # Examples
//!
//! ## Materializing a volume from chunk writes
//!
//! ```no_run
//! use swarmstore::volume::{Volume, VolumePhase};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Nothing on disk yet: the first chunk decides the swarm kind.
//! let mut volume = Volume::open("downloads/payload")?;
//! assert_eq!(volume.phase(), VolumePhase::Init);
//!
//! volume.write_at(b"first chunk of content", 0)?;
//! assert_eq!(volume.phase(), VolumePhase::SingleFile);
//!
//! let mut buf = [0u8; 5];
//! volume.read_at(&mut buf, 6)?;
//! # Ok(())
//! # }
//! ```

mod backing;
mod error;
mod index;
mod manager;

pub use backing::BackingFile;
pub use error::VolumeError;
pub use manager::{Volume, VolumeManager, VolumePhase};

#[cfg(test)]
mod tests;
