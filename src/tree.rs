//! Tree traversal behind one capability: a `TreeSource` yields every regular
//! file as a slash-normalized relative path plus a fresh byte stream.
//!
//! Two variants exist, a directory on disk and a tar archive (optionally
//! gzip-compressed). Traversals are not restartable; walking again reopens
//! the underlying streams.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::error::PatchError;

/// Suffix of backup files left behind by the text-patch service; these are
/// never treated as tree content.
pub const BACKUP_SUFFIX: &str = ".orig";

/// A tree of regular files addressable by relative path.
pub trait TreeSource: Send {
    /// Visit every regular file once, in traversal order. The callback gets
    /// the slash-normalized relative path and a reader over the file bytes,
    /// valid only for the duration of the call.
    fn walk(&self, visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()>;
}

/// Resolve the original-tree specification given to generation. A directory
/// wins over an archive when both are present; neither is a fatal error
/// raised before any work happens.
pub fn resolve_source(
    dir: Option<&Path>,
    archive: Option<&Path>,
) -> Result<Box<dyn TreeSource>> {
    match (dir, archive) {
        (Some(dir), archive) => {
            if archive.is_some() {
                tracing::warn!("both a source directory and an archive given; using the directory");
            }
            Ok(Box::new(DirSource::new(dir)?))
        }
        (None, Some(archive)) => Ok(Box::new(ArchiveSource::new(archive))),
        (None, None) => Err(PatchError::MissingRoot.into()),
    }
}

/// Directory-on-disk tree.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize path: {}", root.display()))?;
        Ok(Self { root })
    }
}

impl TreeSource for DirSource {
    fn walk(&self, visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry
                .with_context(|| format!("failed to read directory entry in {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(&self.root, entry.path())?;
            let mut file = File::open(entry.path())
                .with_context(|| format!("failed to open file: {}", entry.path().display()))?;
            visit(&rel, &mut file)?;
        }
        Ok(())
    }
}

/// Tar archive tree; `.gz`/`.tgz` extensions get gzip decompression.
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn is_gzipped(&self) -> bool {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                ext == "gz" || ext == "tgz"
            }
            None => false,
        }
    }
}

impl TreeSource for ArchiveSource {
    fn walk(&self, visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open archive: {}", self.path.display()))?;

        if self.is_gzipped() {
            walk_entries(&mut tar::Archive::new(GzDecoder::new(file)), visit)
        } else {
            walk_entries(&mut tar::Archive::new(file), visit)
        }
        .with_context(|| format!("failed to read archive: {}", self.path.display()))
    }
}

fn walk_entries<R: Read>(
    archive: &mut tar::Archive<R>,
    visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>,
) -> Result<()> {
    for entry in archive.entries().context("failed to iterate archive entries")? {
        let mut entry = entry.context("failed to read archive entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let rel = {
            let path = entry.path().context("failed to decode archive entry path")?;
            let s = path
                .to_str()
                .with_context(|| format!("non-UTF8 archive entry path: {}", path.display()))?;
            normalize_separators(s)
        };
        if rel.is_empty() {
            continue;
        }

        visit(&rel, &mut entry)?;
    }
    Ok(())
}

/// Relative path of `full` under `root`, forward slashes only.
pub fn relative_path(root: &Path, full: &Path) -> Result<String> {
    let relative = full
        .strip_prefix(root)
        .with_context(|| format!("failed to compute relative path for {}", full.display()))?;
    let s = relative
        .to_str()
        .with_context(|| format!("non-UTF8 path: {}", relative.display()))?;
    Ok(normalize_separators(s))
}

fn normalize_separators(s: &str) -> String {
    let s = s.replace('\\', "/");
    s.strip_prefix("./").unwrap_or(&s).to_string()
}

/// Collect the relative paths of all regular files under `root`, excluding
/// text-patch backup files.
pub fn list_files(root: &Path) -> Result<BTreeSet<String>> {
    let mut paths = BTreeSet::new();
    if !root.exists() {
        return Ok(paths);
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry =
            entry.with_context(|| format!("failed to read directory entry in {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_path(root, entry.path())?;
        if rel.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        paths.insert(rel);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let full = root.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn collect(source: &dyn TreeSource) -> Vec<(String, Vec<u8>)> {
        let mut seen = Vec::new();
        source
            .walk(&mut |rel, reader| {
                let mut content = Vec::new();
                reader.read_to_end(&mut content)?;
                seen.push((rel.to_string(), content));
                Ok(())
            })
            .unwrap();
        seen.sort();
        seen
    }

    #[test]
    fn dir_source_yields_normalized_paths() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.txt", b"one");
        write(temp.path(), "sub/deep/b.txt", b"two");

        let source = DirSource::new(temp.path()).unwrap();
        let seen = collect(&source);
        assert_eq!(
            seen,
            vec![
                ("a.txt".to_string(), b"one".to_vec()),
                ("sub/deep/b.txt".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn archive_source_matches_dir_source() {
        let temp = tempfile::tempdir().unwrap();
        let tree = temp.path().join("tree");
        write(&tree, "a.txt", b"one");
        write(&tree, "sub/b.bin", &[0u8, 1, 2]);

        let archive_path = temp.path().join("tree.tar.gz");
        let gz = flate2::write::GzEncoder::new(
            File::create(&archive_path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        builder.append_dir_all(".", &tree).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let from_dir = collect(&DirSource::new(&tree).unwrap());
        let from_archive = collect(&ArchiveSource::new(&archive_path));
        assert_eq!(from_dir, from_archive);
    }

    #[test]
    fn list_files_skips_backups() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "kept.txt", b"x");
        write(temp.path(), "sub/kept.bin", b"y");
        write(temp.path(), "sub/kept.bin.orig", b"stale backup");

        let paths = list_files(temp.path()).unwrap();
        assert_eq!(
            paths.into_iter().collect::<Vec<_>>(),
            vec!["kept.txt".to_string(), "sub/kept.bin".to_string()]
        );
    }

    #[test]
    fn list_files_of_missing_root_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let paths = list_files(&temp.path().join("nope")).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn missing_root_specification_is_fatal() {
        let err = resolve_source(None, None).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::MissingRoot)
        ));
    }
}
