//! Multi-file spec handling.
//!
//! A multi-file swarm distributes a textual spec as the first file of its
//! logical volume. The spec enumerates every file's relative path and byte
//! size in offset order, and its own first record describes the spec file
//! itself. This module owns the wire format: record parsing, the inline
//! chunk-0 header, the path-safety policy, and separator translation between
//! spec form (`/`) and the host OS.
//!
//! # Security
//!
//! Spec paths are validated before any file is created: absolute paths and
//! paths containing `..` are rejected so a hostile spec cannot escape the
//! volume directory.

mod error;
mod spec;

pub use error::ManifestError;
pub use spec::{
    os_to_spec_path, parse_inline_header, spec_to_os_path, validate_spec_path, Manifest,
    ManifestEntry,
};
