//! Tar archive encoding and decoding for cache artifacts.
//!
//! Encoding expands each pattern against a working directory, walks every
//! match depth-first and emits one tar entry per visited node. Matches below
//! the working directory get relative names; anything else keeps its absolute
//! path. Decoding writes regular files back (relative names under a
//! destination directory, absolute names in place) and restores their
//! permission bits and timestamps.

use crate::compression::{CompressWriter, decompress_reader};
use stash_core::{CompressionMode, Error, Result};
use std::fs::{self, File, FileTimes};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

/// What to pack: glob patterns resolved against a working directory.
#[derive(Debug, Clone)]
pub struct ArchiveSpec {
    pub patterns: Vec<String>,
    /// Relative patterns are expanded here, and matches below it are
    /// stored relative to it.
    pub base_dir: PathBuf,
}

impl ArchiveSpec {
    pub fn new(patterns: Vec<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            patterns,
            base_dir: base_dir.into(),
        }
    }
}

/// Counters collected while encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Headers written, directories and links included.
    pub entries: u64,
    /// Regular files written.
    pub files: u64,
    /// Content bytes of regular files, before framing.
    pub bytes: u64,
}

/// Encode the tree selected by `spec` into `writer`.
///
/// Returns the writer once the tar trailer and any compression frame have
/// been written. Patterns that match nothing are not an error.
pub fn encode<W: Write>(
    writer: W,
    spec: &ArchiveSpec,
    compression: CompressionMode,
) -> Result<(W, EncodeSummary)> {
    let mut builder = tar::Builder::new(CompressWriter::new(writer, compression)?);
    builder.preserve_absolute(true);
    let mut summary = EncodeSummary::default();

    for pattern in &spec.patterns {
        debug!(pattern = %pattern, "archiving pattern");
        for root in expand_pattern(&spec.base_dir, pattern)? {
            append_tree(&mut builder, &spec.base_dir, &root, &mut summary)?;
        }
    }

    let compressed = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("Failed to finish tar: {}", e)))?;
    let writer = compressed
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finish {} frame: {}", compression, e)))?;

    Ok((writer, summary))
}

/// Encode the whole archive into `destination`, returning only after the file
/// is complete. A failed encode leaves no file behind.
pub fn encode_to_file(
    destination: &Path,
    spec: &ArchiveSpec,
    compression: CompressionMode,
) -> Result<EncodeSummary> {
    let result = write_archive_file(destination, spec, compression);
    if result.is_err() {
        let _ = fs::remove_file(destination);
    }
    result
}

fn write_archive_file(
    destination: &Path,
    spec: &ArchiveSpec,
    compression: CompressionMode,
) -> Result<EncodeSummary> {
    let file = File::create(destination)?;
    let (writer, summary) = encode(BufWriter::new(file), spec, compression)?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::Archive(format!("Failed to flush archive: {}", e)))?;
    file.sync_all()?;
    Ok(summary)
}

/// Decode an archive from `reader` into `dest`, returning the number of
/// regular files written.
///
/// Only regular files are materialised; their parent directories are created
/// on demand. Relative names land under `dest` and absolute names at their
/// own path. Directory and link entries are consumed without touching the
/// filesystem.
pub fn decode<R: Read>(reader: R, dest: &Path, compression: CompressionMode) -> Result<u64> {
    let mut archive = tar::Archive::new(decompress_reader(reader, compression)?);
    let entries = archive
        .entries()
        .map_err(|e| Error::Archive(format!("Failed to read archive: {}", e)))?;

    let mut extracted = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Archive(format!("Malformed archive: {}", e)))?;
        let raw_path = entry
            .path()
            .map_err(|e| Error::Archive(format!("Malformed entry name: {}", e)))?
            .into_owned();

        let header = entry.header();
        if !header.entry_type().is_file() {
            debug!(path = %raw_path.display(), "skipping non-regular entry");
            continue;
        }

        let target = entry_target(dest, &raw_path)?;
        let meta = EntryMeta::from_header(header, &raw_path)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Archive(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        extract_file(&mut entry, &target, &meta)?;
        debug!(path = %target.display(), size = meta.size, "extracted file");
        extracted += 1;
    }

    Ok(extracted)
}

/// Decode the archive stored at `source` into `dest`.
pub fn decode_file(source: &Path, dest: &Path, compression: CompressionMode) -> Result<u64> {
    let file = File::open(source)
        .map_err(|e| Error::Archive(format!("Failed to open {}: {}", source.display(), e)))?;
    decode(io::BufReader::new(file), dest, compression)
}

fn expand_pattern(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        let base = base_dir.to_str().ok_or_else(|| {
            Error::Archive(format!(
                "Working directory is not valid UTF-8: {}",
                base_dir.display()
            ))
        })?;
        format!("{}/{}", glob::Pattern::escape(base), pattern)
    };

    let paths = glob::glob(&full)
        .map_err(|e| Error::Archive(format!("Invalid pattern {:?}: {}", pattern, e)))?;

    paths
        .map(|p| p.map_err(|e| Error::Archive(format!("Failed to expand {:?}: {}", pattern, e))))
        .collect()
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    base_dir: &Path,
    root: &Path,
    summary: &mut EncodeSummary,
) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry
            .map_err(|e| Error::Archive(format!("Failed to walk {}: {}", root.display(), e)))?;
        let meta = entry.metadata().map_err(|e| {
            Error::Archive(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;

        let name = archive_name(base_dir, entry.path())?;
        if name.is_empty() {
            continue;
        }
        append_node(builder, entry.path(), &name, &meta, summary)?;
    }
    Ok(())
}

fn append_node<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    name: &str,
    meta: &fs::Metadata,
    summary: &mut EncodeSummary,
) -> Result<()> {
    let pack_err = |e: io::Error| Error::Archive(format!("Failed to pack {}: {}", path.display(), e));

    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(meta, tar::HeaderMode::Complete);
    if let (Some(gnu), Some(atime)) = (header.as_gnu_mut(), unix_secs(meta.accessed())) {
        gnu.set_atime(atime);
    }

    let file_type = meta.file_type();
    if file_type.is_file() {
        let file = File::open(path).map_err(pack_err)?;
        let mut content = CountingReader::new(file.take(meta.len()));
        builder
            .append_data(&mut header, name, &mut content)
            .map_err(pack_err)?;
        if content.count != meta.len() {
            return Err(Error::Archive(format!(
                "{} changed size while archiving ({} of {} bytes)",
                path.display(),
                content.count,
                meta.len()
            )));
        }
        summary.files += 1;
        summary.bytes += content.count;
    } else if file_type.is_dir() {
        header.set_size(0);
        builder
            .append_data(&mut header, name, io::empty())
            .map_err(pack_err)?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(pack_err)?;
        header.set_size(0);
        builder
            .append_link(&mut header, name, &target)
            .map_err(pack_err)?;
    } else {
        debug!(path = %path.display(), "skipping special file");
        return Ok(());
    }

    summary.entries += 1;
    Ok(())
}

/// Forward-slash archive name for `path`: relative to `base_dir` when below
/// it, absolute otherwise.
fn archive_name(base_dir: &Path, path: &Path) -> Result<String> {
    let path = normalize(path)?;
    let base_dir = normalize(base_dir)?;
    let (relative, absolute) = match path.strip_prefix(&base_dir) {
        Ok(relative) => (relative, false),
        Err(_) => (path.as_path(), true),
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::Prefix(_) => {
                parts.push(component.as_os_str().to_str().ok_or_else(|| {
                    Error::Archive(format!("Path is not valid UTF-8: {}", path.display()))
                })?)
            }
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
        }
    }

    let name = parts.join("/");
    let rooted = absolute && matches!(relative.components().next(), Some(Component::RootDir));
    Ok(if rooted { format!("/{}", name) } else { name })
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| {
        Error::Archive(format!("Failed to resolve {}: {}", path.display(), e))
    })?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Where the entry named `name` is written: under `dest` for relative names,
/// at the name itself for absolute ones. `..` is refused either way.
fn entry_target(dest: &Path, name: &Path) -> Result<PathBuf> {
    let absolute = name.is_absolute();
    let mut target = if absolute {
        PathBuf::new()
    } else {
        dest.to_path_buf()
    };
    let mut named = false;
    for component in name.components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                named = true;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) if absolute => {
                target.push(component.as_os_str())
            }
            _ => {
                return Err(Error::Archive(format!(
                    "Refusing to extract unsafe entry path: {}",
                    name.display()
                )));
            }
        }
    }
    if !named {
        return Err(Error::Archive("Archive entry has an empty name".into()));
    }
    Ok(target)
}

struct EntryMeta {
    size: u64,
    mode: Option<u32>,
    modified: SystemTime,
    accessed: SystemTime,
}

impl EntryMeta {
    fn from_header(header: &tar::Header, path: &Path) -> Result<Self> {
        let malformed =
            |e: io::Error| Error::Archive(format!("Malformed header for {}: {}", path.display(), e));
        let mtime = header.mtime().map_err(malformed)?;
        let atime = header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .filter(|atime| *atime > 0)
            .unwrap_or(mtime);

        Ok(Self {
            size: header.size().map_err(malformed)?,
            mode: header.mode().ok(),
            modified: UNIX_EPOCH + Duration::from_secs(mtime),
            accessed: UNIX_EPOCH + Duration::from_secs(atime),
        })
    }
}

fn extract_file<R: Read>(content: &mut R, target: &Path, meta: &EntryMeta) -> Result<()> {
    // Only a file this decode created is cleaned up on failure.
    let file = File::create(target).map_err(|e| {
        Error::Archive(format!("Failed writing {}: {}", target.display(), e))
    })?;
    let result = write_file(file, content, target, meta);
    if result.is_err() {
        let _ = fs::remove_file(target);
    }
    result
}

fn write_file<R: Read>(
    mut file: File,
    content: &mut R,
    target: &Path,
    meta: &EntryMeta,
) -> Result<()> {
    let write_err =
        |e: io::Error| Error::Archive(format!("Failed writing {}: {}", target.display(), e));

    let written = io::copy(content, &mut file).map_err(write_err)?;
    if written != meta.size {
        return Err(Error::Archive(format!(
            "Unexpected end of archive in {} ({} of {} bytes)",
            target.display(),
            written,
            meta.size
        )));
    }

    #[cfg(unix)]
    if let Some(mode) = meta.mode {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(mode & 0o7777))
            .map_err(write_err)?;
    }

    let times = FileTimes::new()
        .set_accessed(meta.accessed)
        .set_modified(meta.modified);
    file.set_times(times).map_err(|e| {
        Error::Archive(format!(
            "Failed setting timestamps on {}: {}",
            target.display(),
            e
        ))
    })?;

    Ok(())
}

fn unix_secs(time: io::Result<SystemTime>) -> Option<u64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn pack(spec: &ArchiveSpec, mode: CompressionMode) -> (Vec<u8>, EncodeSummary) {
        encode(Vec::new(), spec, mode).unwrap()
    }

    #[test]
    fn test_directory_roundtrip_zstd() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("dirA/a.txt"), b"hi");

        let spec = ArchiveSpec::new(vec!["dirA".into()], src.path());
        let (archive, summary) = pack(&spec, CompressionMode::zstd());
        assert_eq!(summary.files, 1);
        assert_eq!(summary.entries, 2);

        let dest = tempfile::tempdir().unwrap();
        let count = decode(archive.as_slice(), dest.path(), CompressionMode::zstd()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fs::read(dest.path().join("dirA/a.txt")).unwrap(), b"hi");
    }

    #[cfg(unix)]
    #[test]
    fn test_roundtrip_preserves_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let src = tempfile::tempdir().unwrap();
        let script = src.path().join("bin/run.sh");
        let secret = src.path().join("bin/nested/key.pem");
        write(&script, b"#!/bin/sh\necho ok\n");
        write(&secret, &[7u8; 3000]);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o600)).unwrap();
        let stamp = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&script)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        for mode in [CompressionMode::None, CompressionMode::zstd()] {
            let spec = ArchiveSpec::new(vec!["bin".into()], src.path());
            let (archive, _) = pack(&spec, mode);

            let dest = tempfile::tempdir().unwrap();
            assert_eq!(decode(archive.as_slice(), dest.path(), mode).unwrap(), 2);

            let restored_script = dest.path().join("bin/run.sh");
            let restored_secret = dest.path().join("bin/nested/key.pem");
            assert_eq!(fs::read(&restored_script).unwrap(), fs::read(&script).unwrap());
            assert_eq!(fs::read(&restored_secret).unwrap(), vec![7u8; 3000]);

            let script_meta = fs::metadata(&restored_script).unwrap();
            assert_eq!(script_meta.permissions().mode() & 0o7777, 0o755);
            assert_eq!(script_meta.modified().unwrap(), stamp);
            let secret_mode = fs::metadata(&restored_secret).unwrap().permissions().mode();
            assert_eq!(secret_mode & 0o7777, 0o600);
        }
    }

    #[test]
    fn test_empty_pattern_set_is_valid_archive() {
        let src = tempfile::tempdir().unwrap();
        let spec = ArchiveSpec::new(vec![], src.path());

        for mode in [CompressionMode::None, CompressionMode::zstd()] {
            let (archive, summary) = pack(&spec, mode);
            assert_eq!(summary, EncodeSummary::default());

            let dest = tempfile::tempdir().unwrap();
            assert_eq!(decode(archive.as_slice(), dest.path(), mode).unwrap(), 0);
            assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
        }
    }

    #[test]
    fn test_unmatched_pattern_is_not_an_error() {
        let src = tempfile::tempdir().unwrap();
        let spec = ArchiveSpec::new(vec!["missing/**".into()], src.path());
        let (archive, summary) = pack(&spec, CompressionMode::None);
        assert_eq!(summary.entries, 0);
        // Two zero blocks terminate an empty tar stream.
        assert_eq!(archive.len(), 1024);
    }

    #[test]
    fn test_glob_patterns_select_matches() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("target/debug/app"), b"elf");
        write(&src.path().join("target/release/app"), b"elf-release");
        write(&src.path().join("notes.txt"), b"skip me");

        let spec = ArchiveSpec::new(vec!["target/*/app".into()], src.path());
        let (archive, summary) = pack(&spec, CompressionMode::None);
        assert_eq!(summary.files, 2);

        let dest = tempfile::tempdir().unwrap();
        decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap();
        assert_eq!(fs::read(dest.path().join("target/release/app")).unwrap(), b"elf-release");
        assert!(!dest.path().join("notes.txt").exists());
    }

    #[test]
    fn test_invalid_pattern_fails() {
        let src = tempfile::tempdir().unwrap();
        let spec = ArchiveSpec::new(vec!["[".into()], src.path());
        let err = encode(Vec::new(), &spec, CompressionMode::None).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[test]
    fn test_directory_entries_do_not_create_directories() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("empty/inner")).unwrap();

        let spec = ArchiveSpec::new(vec!["empty".into()], src.path());
        let (archive, summary) = pack(&spec, CompressionMode::None);
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.files, 0);

        let dest = tempfile::tempdir().unwrap();
        assert_eq!(decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap(), 0);
        assert!(!dest.path().join("empty").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_carried_but_not_extracted() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("pkg/real.txt"), b"data");
        std::os::unix::fs::symlink("real.txt", src.path().join("pkg/link.txt")).unwrap();

        let spec = ArchiveSpec::new(vec!["pkg".into()], src.path());
        let (archive, summary) = pack(&spec, CompressionMode::None);
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.files, 1);

        let dest = tempfile::tempdir().unwrap();
        assert_eq!(decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap(), 1);
        assert!(fs::symlink_metadata(dest.path().join("pkg/link.txt")).is_err());
    }

    #[test]
    fn test_truncated_archive_leaves_no_partial_file() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("dirA/big.bin"), &[42u8; 4096]);

        let spec = ArchiveSpec::new(vec!["dirA/big.bin".into()], src.path());
        let (archive, _) = pack(&spec, CompressionMode::None);
        let truncated = &archive[..512 + 1000];

        let dest = tempfile::tempdir().unwrap();
        let err = decode(truncated, dest.path(), CompressionMode::None).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
        assert!(!dest.path().join("dirA/big.bin").exists());
    }

    #[test]
    fn test_rejects_parent_dir_entries() {
        let mut header = tar::Header::new_old();
        let name = b"../evil.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let archive = builder.into_inner().unwrap();

        let dest = tempfile::tempdir().unwrap();
        let err = decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap_err();
        assert!(err.to_string().contains("unsafe entry path"));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let dest = tempfile::tempdir().unwrap();
        let garbage = vec![0xABu8; 2048];
        assert!(decode(garbage.as_slice(), dest.path(), CompressionMode::zstd()).is_err());
    }

    #[test]
    fn test_encode_to_file_then_decode_file() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("node_modules/left-pad/index.js"), b"module.exports = 1;");

        let out = tempfile::tempdir().unwrap();
        let archive_path = out.path().join("cache.tar.zst");
        let spec = ArchiveSpec::new(vec!["node_modules".into()], src.path());
        let summary = encode_to_file(&archive_path, &spec, CompressionMode::zstd()).unwrap();
        assert_eq!(summary.files, 1);
        assert!(archive_path.exists());

        let dest = tempfile::tempdir().unwrap();
        let count = decode_file(&archive_path, dest.path(), CompressionMode::zstd()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            fs::read(dest.path().join("node_modules/left-pad/index.js")).unwrap(),
            b"module.exports = 1;"
        );
    }

    #[test]
    fn test_archive_name_normalization() {
        let base = Path::new("/work/repo");
        assert_eq!(
            archive_name(base, Path::new("/work/repo/target/a.o")).unwrap(),
            "target/a.o"
        );
        assert_eq!(
            archive_name(base, Path::new("/work/repo/./target/../Cargo.lock")).unwrap(),
            "Cargo.lock"
        );
        assert_eq!(archive_name(base, Path::new("/work/repo")).unwrap(), "");
        assert_eq!(archive_name(base, Path::new("/opt/cache/x")).unwrap(), "/opt/cache/x");
        assert_eq!(
            archive_name(base, Path::new("/work/repo/../shared/lib.a")).unwrap(),
            "/work/shared/lib.a"
        );
    }

    #[test]
    fn test_entry_target() {
        let dest = Path::new("/restore");
        assert_eq!(
            entry_target(dest, Path::new("target/a.o")).unwrap(),
            PathBuf::from("/restore/target/a.o")
        );
        assert_eq!(
            entry_target(dest, Path::new("/home/runner/.cargo/config.toml")).unwrap(),
            PathBuf::from("/home/runner/.cargo/config.toml")
        );
        assert!(entry_target(dest, Path::new("a/../../etc/passwd")).is_err());
        assert!(entry_target(dest, Path::new("/tmp/../etc/passwd")).is_err());
        assert!(entry_target(dest, Path::new(".")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_pattern_restores_in_place() {
        let outside = tempfile::tempdir().unwrap();
        let registry = outside.path().join("registry/index/config.json");
        write(&registry, b"{\"dl\": \"crates\"}");
        let work = tempfile::tempdir().unwrap();

        let pattern = outside.path().join("registry").to_str().unwrap().to_string();
        let spec = ArchiveSpec::new(vec![pattern], work.path());
        let (archive, summary) = pack(&spec, CompressionMode::zstd());
        assert_eq!(summary.files, 1);

        fs::remove_dir_all(outside.path().join("registry")).unwrap();
        let count = decode(archive.as_slice(), work.path(), CompressionMode::zstd()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fs::read(&registry).unwrap(), b"{\"dl\": \"crates\"}");
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_relative_pattern_is_archived() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("repo");
        fs::create_dir_all(&work).unwrap();
        let shared = root.path().join("shared/lib.a");
        write(&shared, b"archive");

        let spec = ArchiveSpec::new(vec!["../shared".into()], &work);
        let (archive, summary) = pack(&spec, CompressionMode::None);
        assert_eq!(summary.files, 1);

        fs::remove_dir_all(root.path().join("shared")).unwrap();
        let dest = tempfile::tempdir().unwrap();
        decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap();
        assert_eq!(fs::read(&shared).unwrap(), b"archive");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_create_keeps_existing_entry() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("dir/out.txt"), b"fresh");
        let spec = ArchiveSpec::new(vec!["dir".into()], src.path());
        let (archive, _) = pack(&spec, CompressionMode::None);

        // A dangling link into a missing directory makes the create fail.
        let dest = tempfile::tempdir().unwrap();
        let link = dest.path().join("dir/out.txt");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(dest.path().join("missing/target.txt"), &link).unwrap();

        let err = decode(archive.as_slice(), dest.path(), CompressionMode::None).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    }
}
