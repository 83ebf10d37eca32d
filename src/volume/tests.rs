use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::*;
use crate::constants::SPEC_FILENAME;
use crate::manifest::{spec_to_os_path, Manifest, ManifestEntry, ManifestError};

fn sample_manifest() -> Manifest {
    Manifest::from_entries(vec![
        ManifestEntry::new("a/b", 3),
        ManifestEntry::new("c", 5),
    ])
    .expect("sample manifest")
}

/// First chunk of the sample multi-file swarm: the encoded spec followed by
/// the content of `a/b` and `c`.
fn sample_chunk() -> (Vec<u8>, u64) {
    let encoded = sample_manifest().encode();
    let spec_size = encoded.len() as u64;
    let mut chunk = encoded;
    chunk.extend_from_slice(b"xyz");
    chunk.extend_from_slice(b"12345");
    (chunk, spec_size)
}

/// Seeds a multi-file swarm on disk and returns the spec file path and the
/// spec size.
fn seed_files(dir: &Path, files: &[(&str, &[u8])]) -> (PathBuf, u64) {
    let manifest = Manifest::from_entries(
        files
            .iter()
            .map(|(path, data)| ManifestEntry::new(*path, data.len() as u64))
            .collect(),
    )
    .expect("seed manifest");

    let root = dir.join(SPEC_FILENAME);
    std::fs::write(&root, manifest.encode()).unwrap();

    for (path, data) in files {
        let os_path = dir.join(spec_to_os_path(path));
        if let Some(parent) = os_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(os_path, data).unwrap();
    }

    (root, manifest.entries()[0].size)
}

#[test]
fn first_raw_chunk_selects_single_file_mode() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("v");

    let mut volume = Volume::open(&root).unwrap();
    assert_eq!(volume.phase(), VolumePhase::Init);

    assert_eq!(volume.write_at(b"ABCDEFGH", 0).unwrap(), 8);
    assert_eq!(volume.phase(), VolumePhase::SingleFile);
    assert!(volume.is_single_file());

    let mut buf = [0u8; 8];
    assert_eq!(volume.read_at(&mut buf, 0).unwrap(), 8);
    assert_eq!(&buf, b"ABCDEFGH");
    assert_eq!(std::fs::read(&root).unwrap(), b"ABCDEFGH");
}

#[test]
fn init_phase_rejects_nonzero_writes_and_all_reads() {
    let temp = TempDir::new().unwrap();
    let mut volume = Volume::open(temp.path().join("v")).unwrap();

    assert!(matches!(
        volume.write_at(b"late", 5).unwrap_err(),
        VolumeError::InvalidWriteOffset(5)
    ));

    let mut buf = [0u8; 4];
    assert!(matches!(
        volume.read_at(&mut buf, 0).unwrap_err(),
        VolumeError::NotReadable
    ));
}

#[test]
fn manifest_and_content_in_one_chunk() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("m");
    let (chunk, spec_size) = sample_chunk();

    let mut volume = Volume::open(&root).unwrap();
    assert_eq!(volume.write_at(&chunk, 0).unwrap(), chunk.len());

    assert_eq!(volume.phase(), VolumePhase::Complete);
    let files = volume.files();
    assert_eq!(files.len(), 3);
    assert_eq!(files[0].spec_path(), SPEC_FILENAME);
    assert_eq!(files[1].spec_path(), "a/b");
    assert_eq!((files[1].start(), files[1].end()), (spec_size, spec_size + 2));
    assert_eq!(files[2].spec_path(), "c");
    assert_eq!(
        (files[2].start(), files[2].end()),
        (spec_size + 3, spec_size + 7)
    );
    assert_eq!(volume.total_size(), Some(spec_size + 8));

    // Content bytes were routed to their own files next to the spec.
    assert_eq!(std::fs::read(temp.path().join("a").join("b")).unwrap(), b"xyz");
    assert_eq!(std::fs::read(temp.path().join("c")).unwrap(), b"12345");
    // The spec body landed in the volume root.
    assert_eq!(std::fs::read(&root).unwrap(), sample_manifest().encode());
}

#[test]
fn manifest_split_across_two_chunks() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("m");
    let (chunk, spec_size) = sample_chunk();

    let mut volume = Volume::open(&root).unwrap();

    // First fragment ends inside the spec body.
    assert_eq!(volume.write_at(&chunk[..35], 0).unwrap(), 35);
    assert_eq!(volume.phase(), VolumePhase::SpecSizeKnown);
    assert_eq!(volume.spec_size(), spec_size);
    assert_eq!(volume.files().len(), 1);

    // The rest completes the spec and carries content bytes.
    assert_eq!(volume.write_at(&chunk[35..], 35).unwrap(), chunk.len() - 35);
    assert_eq!(volume.phase(), VolumePhase::Complete);
    assert_eq!(volume.files().len(), 3);

    assert_eq!(std::fs::read(temp.path().join("a").join("b")).unwrap(), b"xyz");
    assert_eq!(std::fs::read(temp.path().join("c")).unwrap(), b"12345");

    // A volume-wide read returns spec and content as one flat byte space.
    let mut all = vec![0u8; chunk.len()];
    assert_eq!(volume.read_at(&mut all, 0).unwrap(), chunk.len());
    assert_eq!(all, chunk);
}

#[test]
fn spec_writes_beyond_the_spec_are_rejected_until_complete() {
    let temp = TempDir::new().unwrap();
    let (chunk, spec_size) = sample_chunk();

    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    volume.write_at(&chunk[..30], 0).unwrap();
    assert_eq!(volume.phase(), VolumePhase::SpecSizeKnown);

    let err = volume.write_at(b"early", spec_size + 1).unwrap_err();
    assert!(matches!(err, VolumeError::InvalidWriteOffset(_)));
}

#[test]
fn existing_spec_file_is_adopted_for_seeding() {
    let temp = TempDir::new().unwrap();
    let (root, spec_size) = seed_files(
        temp.path(),
        &[("d", b"0123456789"), ("e", b"abcdefghij")],
    );

    let volume = Volume::open(&root).unwrap();
    assert_eq!(volume.phase(), VolumePhase::Complete);
    assert_eq!(volume.files().len(), 3);
    assert_eq!(volume.total_size(), Some(spec_size + 20));

    let mut buf = [0u8; 10];
    assert_eq!(volume.read_at(&mut buf, spec_size).unwrap(), 10);
    assert_eq!(&buf, b"0123456789");
}

#[test]
fn existing_plain_file_is_adopted_as_single_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("payload");
    std::fs::write(&root, b"already here").unwrap();

    let volume = Volume::open(&root).unwrap();
    assert_eq!(volume.phase(), VolumePhase::SingleFile);

    let mut buf = [0u8; 12];
    assert_eq!(volume.read_at(&mut buf, 0).unwrap(), 12);
    assert_eq!(&buf, b"already here");
}

#[test]
fn reads_straddle_file_boundaries() {
    let temp = TempDir::new().unwrap();
    let (root, spec_size) = seed_files(
        temp.path(),
        &[("d", b"0123456789"), ("e", b"abcdefghij")],
    );
    let volume = Volume::open(&root).unwrap();

    // Last four bytes of `d`, first four of `e`.
    let mut buf = [0u8; 8];
    assert_eq!(volume.read_at(&mut buf, spec_size + 6).unwrap(), 8);
    assert_eq!(&buf, b"6789abcd");
}

#[test]
fn writes_straddle_file_boundaries() {
    let temp = TempDir::new().unwrap();
    let (root, spec_size) = seed_files(
        temp.path(),
        &[("d", b"0123456789"), ("e", b"abcdefghij")],
    );
    let mut volume = Volume::open(&root).unwrap();

    assert_eq!(volume.write_at(b"XXXYYY", spec_size + 7).unwrap(), 6);

    let mut buf = [0u8; 6];
    assert_eq!(volume.read_at(&mut buf, spec_size + 7).unwrap(), 6);
    assert_eq!(&buf, b"XXXYYY");

    assert_eq!(std::fs::read(temp.path().join("d")).unwrap(), b"0123456XXX");
    assert_eq!(std::fs::read(temp.path().join("e")).unwrap(), b"YYYdefghij");
}

#[test]
fn spec_with_parent_escape_is_rejected() {
    let temp = TempDir::new().unwrap();
    let body = b"META-INF-multifilespec.txt 40\n../evil 4\n";
    assert_eq!(body.len(), 40);

    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    let err = volume.write_at(body, 0).unwrap_err();
    assert!(matches!(
        err,
        VolumeError::Manifest(ManifestError::UnsafePath(_))
    ));

    // The volume ends in the terminal multi-file phase with only the spec
    // entry; the malicious range is simply absent.
    assert_eq!(volume.phase(), VolumePhase::Complete);
    assert_eq!(volume.files().len(), 1);

    let mut buf = [0u8; 4];
    assert!(matches!(
        volume.read_at(&mut buf, 40).unwrap_err(),
        VolumeError::OffsetOutOfRange(40)
    ));
}

#[test]
fn seed_with_lying_self_entry_fails_to_open() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join(SPEC_FILENAME);
    // Declares 39 bytes; the file actually holds 34.
    std::fs::write(&root, b"META-INF-multifilespec.txt 39\nc 5\n").unwrap();

    let err = Volume::open(&root).unwrap_err();
    assert!(matches!(
        err,
        VolumeError::Manifest(ManifestError::SelfEntrySizeMismatch { .. })
    ));
}

#[test]
fn postponed_reserve_is_replayed_for_single_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("v");

    let mut volume = Volume::open(&root).unwrap();
    volume.resize_reserved(1000).unwrap();
    assert!(matches!(
        volume.reserved_size().unwrap_err(),
        VolumeError::ResizeUnavailable
    ));

    volume.write_at(b"data", 0).unwrap();
    assert_eq!(volume.reserved_size().unwrap(), 1000);
    assert_eq!(std::fs::metadata(&root).unwrap().len(), 1000);
}

#[test]
fn postponed_reserve_is_dropped_for_multi_file() {
    let temp = TempDir::new().unwrap();
    let (chunk, spec_size) = sample_chunk();

    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    volume.resize_reserved(5000).unwrap();
    volume.write_at(&chunk, 0).unwrap();

    // Multi-file sizing comes from the spec, not the postponed request.
    assert_eq!(volume.reserved_size().unwrap(), spec_size + 8);
}

#[test]
fn resize_reserved_grows_to_declared_sizes_and_never_shrinks() {
    let temp = TempDir::new().unwrap();
    let manifest = sample_manifest();
    let encoded = manifest.encode();
    let spec_size = encoded.len() as u64;

    // Deliver only the spec; the content files exist but are empty.
    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    volume.write_at(&encoded, 0).unwrap();
    assert_eq!(volume.reserved_size().unwrap(), spec_size);

    volume.resize_reserved(spec_size + 8).unwrap();
    assert_eq!(volume.reserved_size().unwrap(), spec_size + 8);
    assert_eq!(std::fs::metadata(temp.path().join("a").join("b")).unwrap().len(), 3);
    assert_eq!(std::fs::metadata(temp.path().join("c")).unwrap().len(), 5);

    // Shrinking is ignored.
    volume.resize_reserved(4).unwrap();
    assert_eq!(volume.reserved_size().unwrap(), spec_size + 8);

    // Re-requesting the current size changes nothing.
    volume.resize_reserved(spec_size + 8).unwrap();
    assert_eq!(volume.reserved_size().unwrap(), spec_size + 8);
}

#[test]
fn resize_is_unavailable_while_the_spec_is_incomplete() {
    let temp = TempDir::new().unwrap();
    let (chunk, _) = sample_chunk();

    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    volume.write_at(&chunk[..30], 0).unwrap();
    assert_eq!(volume.phase(), VolumePhase::SpecSizeKnown);

    assert!(matches!(
        volume.resize_reserved(100).unwrap_err(),
        VolumeError::ResizeUnavailable
    ));
}

#[test]
fn authored_size_must_agree_with_the_spec_total() {
    let temp = TempDir::new().unwrap();
    let (chunk, spec_size) = sample_chunk();

    // Injected early: validated when the spec completes.
    let mut volume = Volume::open(temp.path().join("m")).unwrap();
    volume.set_authored_size(spec_size + 7).unwrap();
    let err = volume.write_at(&chunk, 0).unwrap_err();
    assert!(matches!(err, VolumeError::AuthoredSizeMismatch { .. }));

    // Injected late: validated immediately.
    let mut volume = Volume::open(temp.path().join("m2")).unwrap();
    volume.write_at(&chunk, 0).unwrap();
    assert!(volume.set_authored_size(spec_size + 7).is_err());
    volume.set_authored_size(spec_size + 8).unwrap();
}

#[test]
fn zero_progress_reads_stop_instead_of_recursing() {
    let temp = TempDir::new().unwrap();
    let manifest =
        Manifest::from_entries(vec![ManifestEntry::new("hollow", 10)]).expect("manifest");
    let root = temp.path().join(SPEC_FILENAME);
    std::fs::write(&root, manifest.encode()).unwrap();

    // `hollow` is declared at 10 bytes but materializes empty on open.
    let volume = Volume::open(&root).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(
        volume.read_at(&mut buf, manifest.entries()[0].size).unwrap(),
        0
    );
}

#[test]
fn manager_routes_operations_by_swarm_id() {
    let temp = TempDir::new().unwrap();
    let manager = VolumeManager::new();

    manager.open("swarm-1", temp.path().join("v")).unwrap();
    assert!(manager.contains("swarm-1"));

    assert_eq!(manager.write("swarm-1", b"ABCDEFGH", 0).unwrap(), 8);
    assert_eq!(manager.read("swarm-1", 2, 4).unwrap().as_ref(), b"CDEF");

    manager.resize_reserved("swarm-1", 64).unwrap();
    assert_eq!(manager.reserved_size("swarm-1").unwrap(), 64);

    assert!(matches!(
        manager.write("unknown", b"x", 0).unwrap_err(),
        VolumeError::VolumeNotFound(_)
    ));

    assert!(manager.unregister("swarm-1"));
    assert!(!manager.contains("swarm-1"));
}
