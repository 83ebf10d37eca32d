//! swarmstore - a storage substrate for content-distribution swarms
//!
//! This library backs the flat byte-addressable volume a swarm presents to
//! its chunk-transfer layer with on-disk storage: one file for single-file
//! swarms, or a spec-described concatenation of files for multi-file swarms.
//! Both roles a peer plays are covered: a seeder adopts data already on
//! disk, a leecher materializes the volume from out-of-order chunk writes.
//!
//! # Modules
//!
//! - [`manifest`] - Multi-file spec format, path policy, inline header
//! - [`volume`] - Volume state machine, backing files, swarm registry
//! - [`constants`] - Spec sentinel and wire-format limits

pub mod constants;
pub mod manifest;
pub mod volume;

pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use volume::{BackingFile, Volume, VolumeError, VolumeManager, VolumePhase};
