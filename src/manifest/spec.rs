use std::path::{Component, Path, PathBuf};

use super::error::ManifestError;
use crate::constants::{MAX_SPEC_RECORD_LEN, SPEC_FILENAME, SPEC_PATH_SEPARATOR};

/// One record of a multi-file spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Spec-form relative path, `/`-separated regardless of host OS.
    pub spec_path: String,
    /// Size of the file in bytes.
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(spec_path: impl Into<String>, size: u64) -> Self {
        Self {
            spec_path: spec_path.into(),
            size,
        }
    }
}

/// A parsed multi-file spec.
///
/// The spec is a UTF-8 text stream of newline-terminated records
/// `<relative-path> <decimal-byte-size>`, ordered so that file offsets grow
/// monotonically from zero. The first record always describes the spec file
/// itself, so the spec occupies the head of the logical volume.
///
/// # Examples
///
/// ```
/// use swarmstore::manifest::Manifest;
///
/// let spec = b"META-INF-multifilespec.txt 40\na/b 3\nc 5\n";
/// let manifest = Manifest::parse(spec).unwrap();
///
/// assert_eq!(manifest.entries().len(), 3);
/// assert_eq!(manifest.entries()[1].spec_path, "a/b");
/// assert_eq!(manifest.total_size(), 48);
/// ```
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parses a spec body.
    ///
    /// Each record is split on its LAST space, so paths may contain spaces.
    /// Parsing is atomic: a malformed record rejects the whole body.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The body is not UTF-8 ([`ManifestError::NotUtf8`])
    /// - A record has no size field or a non-decimal size
    /// - A path is absolute or contains `..` ([`ManifestError::UnsafePath`])
    /// - A record exceeds [`MAX_SPEC_RECORD_LEN`] bytes
    /// - The body holds no records ([`ManifestError::Empty`])
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(data).map_err(|_| ManifestError::NotUtf8)?;

        let mut entries = Vec::new();
        for (idx, line) in text.split_inclusive('\n').enumerate() {
            let lineno = idx + 1;
            // The final record may arrive without a trailing newline.
            let record = line.strip_suffix('\n').unwrap_or(line);

            if record.len() > MAX_SPEC_RECORD_LEN {
                return Err(ManifestError::RecordTooLong(lineno));
            }

            let (spec_path, size_field) = record
                .rsplit_once(' ')
                .ok_or(ManifestError::MissingSize(lineno))?;

            let size: u64 = size_field.parse().map_err(|_| ManifestError::InvalidSize {
                line: lineno,
                field: size_field.to_string(),
            })?;

            validate_spec_path(spec_path)?;
            entries.push(ManifestEntry::new(spec_path, size));
        }

        if entries.is_empty() {
            return Err(ManifestError::Empty);
        }

        Ok(Self { entries })
    }

    /// Builds a spec from content entries, prepending the self-describing
    /// first record.
    ///
    /// The self record declares the encoded spec's own byte size, which
    /// depends on the decimal width of that very number; the width is
    /// resolved by fixed-point iteration.
    pub fn from_entries(content: Vec<ManifestEntry>) -> Result<Self, ManifestError> {
        let mut body_len = 0usize;
        for entry in &content {
            validate_spec_path(&entry.spec_path)?;
            if entry.spec_path == SPEC_FILENAME {
                return Err(ManifestError::ReservedPath(entry.spec_path.clone()));
            }
            body_len += entry.spec_path.len() + 1 + decimal_width(entry.size) + 1;
        }

        // sentinel + space + size digits + newline + content records
        let base = SPEC_FILENAME.len() + 2 + body_len;
        let mut spec_size = base + 1;
        loop {
            let candidate = base + decimal_width(spec_size as u64);
            if candidate == spec_size {
                break;
            }
            spec_size = candidate;
        }

        let mut entries = Vec::with_capacity(content.len() + 1);
        entries.push(ManifestEntry::new(SPEC_FILENAME, spec_size as u64));
        entries.extend(content);
        Ok(Self { entries })
    }

    /// Encodes the spec into its on-disk / on-wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.spec_path);
            out.push(' ');
            out.push_str(&entry.size.to_string());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Checks that the first record describes the spec file itself and that
    /// its declared size matches the actual spec size.
    pub fn verify_self_entry(&self, actual: u64) -> Result<(), ManifestError> {
        let own = &self.entries[0];
        if own.spec_path != SPEC_FILENAME {
            return Err(ManifestError::BadSelfEntry(own.spec_path.clone()));
        }
        if own.size != actual {
            return Err(ManifestError::SelfEntrySizeMismatch {
                declared: own.size,
                actual,
            });
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Total logical volume size: the spec itself plus every content file.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Rejects spec paths that could escape the volume directory.
///
/// A path must be relative (no leading `/`) and must not contain `..`
/// anywhere, matching the wire-format policy rather than OS semantics.
pub fn validate_spec_path(spec_path: &str) -> Result<(), ManifestError> {
    if spec_path.is_empty()
        || spec_path.starts_with(SPEC_PATH_SEPARATOR)
        || spec_path.contains("..")
    {
        return Err(ManifestError::UnsafePath(spec_path.to_string()));
    }
    Ok(())
}

/// Scans the inline header of a leecher's first chunk.
///
/// The chunk leads with `META-INF-multifilespec.txt <decimal>`, the decimal
/// separated from the sentinel by exactly one space byte. It declares the
/// spec's byte size before the spec body has fully arrived.
pub fn parse_inline_header(buf: &[u8]) -> Result<u64, ManifestError> {
    let rest = buf
        .strip_prefix(SPEC_FILENAME.as_bytes())
        .ok_or(ManifestError::MissingSentinel)?;

    let Some((&sep, digits)) = rest.split_first() else {
        return Err(ManifestError::TruncatedHeader);
    };
    if sep != b' ' {
        return Err(ManifestError::TruncatedHeader);
    }

    let width = digits.iter().take_while(|b| b.is_ascii_digit()).count();
    if width == 0 {
        return Err(ManifestError::TruncatedHeader);
    }

    let field = std::str::from_utf8(&digits[..width]).map_err(|_| ManifestError::NotUtf8)?;
    field.parse().map_err(|_| ManifestError::InvalidSize {
        line: 1,
        field: field.to_string(),
    })
}

/// Translates a spec-form path to an OS path.
pub fn spec_to_os_path(spec_path: &str) -> PathBuf {
    spec_path.split(SPEC_PATH_SEPARATOR).collect()
}

/// Translates a relative OS path back to spec form.
///
/// # Errors
///
/// Fails on absolute paths, `..` components, and non-UTF-8 segments.
pub fn os_to_spec_path(path: &Path) -> Result<String, ManifestError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or(ManifestError::NotUtf8)?);
            }
            Component::CurDir => {}
            _ => return Err(ManifestError::UnsafePath(path.display().to_string())),
        }
    }
    Ok(parts.join(SPEC_PATH_SEPARATOR))
}

fn decimal_width(value: u64) -> usize {
    value.to_string().len()
}
