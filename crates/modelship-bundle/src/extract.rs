//! Turns an uploaded archive into a [`FileBundle`].
//!
//! ZIP and gzip'd tar are understood. The format is sniffed from the
//! leading magic bytes and only falls back to the declared filename when
//! the bytes are inconclusive.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use modelship_core::FileBundle;
use serde::{Deserialize, Serialize};

use crate::path::{is_platform_junk, normalize, strip_shared_root};
use crate::BundleError;

/// Entries every deployable archive must contain.
pub const REQUIRED_ENTRIES: [&str; 2] = ["load_model.py", "requirements.txt"];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleLimits {
    /// Upper bound on the sum of uncompressed file sizes.
    pub max_total_bytes: u64,
    /// Upper bound on the number of file entries.
    pub max_entries: usize,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 256 * 1024 * 1024,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

fn detect_format(bytes: &[u8], filename: &str) -> Option<ArchiveFormat> {
    if bytes.starts_with(ZIP_MAGIC) {
        return Some(ArchiveFormat::Zip);
    }
    if bytes.starts_with(GZIP_MAGIC) {
        return Some(ArchiveFormat::TarGz);
    }
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else {
        None
    }
}

/// Accumulates extracted files while enforcing [`BundleLimits`].
struct Collector<'a> {
    limits: &'a BundleLimits,
    total_bytes: u64,
    seen: HashSet<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl<'a> Collector<'a> {
    fn new(limits: &'a BundleLimits) -> Self {
        Self {
            limits,
            total_bytes: 0,
            seen: HashSet::new(),
            files: Vec::new(),
        }
    }

    fn accept(&mut self, raw_name: &str, reader: impl Read) -> Result<(), BundleError> {
        let path = normalize(raw_name)?;
        if path.is_empty() || is_platform_junk(&path) {
            return Ok(());
        }
        if self.files.len() >= self.limits.max_entries {
            return Err(BundleError::TooManyEntries {
                max: self.limits.max_entries,
            });
        }
        // `a.py` and `./a.py` normalize to the same path.
        if !self.seen.insert(path.clone()) {
            return Err(BundleError::DuplicateEntry(path));
        }

        let remaining = self.limits.max_total_bytes.saturating_sub(self.total_bytes);
        let mut content = Vec::new();
        reader
            .take(remaining.saturating_add(1))
            .read_to_end(&mut content)?;
        self.total_bytes += content.len() as u64;
        if self.total_bytes > self.limits.max_total_bytes {
            return Err(BundleError::ArchiveTooLarge {
                max: self.limits.max_total_bytes,
            });
        }

        self.files.push((path, content));
        Ok(())
    }
}

fn invalid(filename: &str, reason: impl ToString) -> BundleError {
    BundleError::InvalidArchive {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}

fn read_zip(bytes: &[u8], filename: &str, collector: &mut Collector<'_>) -> Result<(), BundleError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| invalid(filename, e))?;
    for idx in 0..archive.len() {
        let file = archive.by_index(idx).map_err(|e| invalid(filename, e))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        collector.accept(&name, file).map_err(|e| match e {
            BundleError::Io(io) => invalid(filename, io),
            other => other,
        })?;
    }
    Ok(())
}

fn read_tar_gz(bytes: &[u8], filename: &str, collector: &mut Collector<'_>) -> Result<(), BundleError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive.entries().map_err(|e| invalid(filename, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| invalid(filename, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| invalid(filename, e))?
            .to_string_lossy()
            .into_owned();
        collector.accept(&name, entry).map_err(|e| match e {
            BundleError::Io(io) => invalid(filename, io),
            other => other,
        })?;
    }
    Ok(())
}

/// Required entries not found among `paths`, in [`REQUIRED_ENTRIES`] order.
///
/// An entry counts as present when any path contains its name.
pub fn missing_required<'a>(paths: impl Iterator<Item = &'a str> + Clone) -> Vec<String> {
    REQUIRED_ENTRIES
        .iter()
        .filter(|required| !paths.clone().any(|p| p.contains(*required)))
        .map(|required| required.to_string())
        .collect()
}

/// Extract `bytes` (declared as `filename`) into a bundle and check that the
/// required entries are present. No I/O beyond reading the in-memory archive.
pub fn extract_archive(
    bytes: &[u8],
    filename: &str,
    limits: &BundleLimits,
) -> Result<FileBundle, BundleError> {
    let format = detect_format(bytes, filename)
        .ok_or_else(|| invalid(filename, "unrecognized archive format"))?;

    let mut collector = Collector::new(limits);
    match format {
        ArchiveFormat::Zip => read_zip(bytes, filename, &mut collector)?,
        ArchiveFormat::TarGz => read_tar_gz(bytes, filename, &mut collector)?,
    }

    let files = strip_shared_root(collector.files);
    let missing = missing_required(files.iter().map(|(p, _)| p.as_str()));
    if !missing.is_empty() {
        return Err(BundleError::MissingRequiredFiles { missing });
    }

    tracing::debug!(filename, files = files.len(), "archive extracted");
    Ok(files.into_iter().collect())
}
