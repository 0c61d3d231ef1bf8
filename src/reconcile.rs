//! Path reconciliation: correlate the original tree with the target tree and
//! decide, per relative path, whether the file is unchanged, changed, added
//! or deleted.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::tree::{self, TreeSource};

/// The transient unit of work handed to the patch generator. Computed fresh
/// on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Unchanged,
    Changed { original: Vec<u8>, modified: Vec<u8> },
    Added { modified: Vec<u8> },
    Deleted { original: Vec<u8> },
}

/// Walk the original tree against the target root, calling `emit` once per
/// visited path with its [`ChangeRecord`].
///
/// The returned set is what's left of the target tree's path listing after
/// the original walk removed every path it visited: exactly the Added set.
/// Removing during the walk is what separates changed/deleted (visited)
/// from added (never visited), so the set is threaded through the traversal
/// as an explicit mutable value.
pub fn reconcile(
    original: &dyn TreeSource,
    target_root: &Path,
    emit: &mut dyn FnMut(&str, ChangeRecord) -> Result<()>,
) -> Result<BTreeSet<String>> {
    let mut remaining = tree::list_files(target_root)?;

    original.walk(&mut |rel, reader| {
        remaining.remove(rel);

        let mut original_bytes = Vec::new();
        reader
            .read_to_end(&mut original_bytes)
            .with_context(|| format!("failed to read original content of {rel}"))?;

        let target_file = target_root.join(rel);
        let record = if !target_file.exists() {
            ChangeRecord::Deleted {
                original: original_bytes,
            }
        } else {
            let modified = fs::read(&target_file)
                .with_context(|| format!("failed to read target file: {}", target_file.display()))?;
            if modified == original_bytes {
                ChangeRecord::Unchanged
            } else {
                ChangeRecord::Changed {
                    original: original_bytes,
                    modified,
                }
            }
        };

        emit(rel, record)
    })?;

    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory tree for exercising the reconciliation walk.
    struct MemSource {
        files: Vec<(String, Vec<u8>)>,
    }

    impl TreeSource for MemSource {
        fn walk(
            &self,
            visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>,
        ) -> Result<()> {
            for (rel, content) in &self.files {
                visit(rel, &mut content.as_slice())?;
            }
            Ok(())
        }
    }

    fn target_with(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let temp = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let full = temp.path().join(rel);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        temp
    }

    fn run(
        original: &[(&str, &[u8])],
        target: &tempfile::TempDir,
    ) -> (HashMap<String, ChangeRecord>, BTreeSet<String>) {
        let source = MemSource {
            files: original
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_vec()))
                .collect(),
        };
        let mut records = HashMap::new();
        let added = reconcile(&source, target.path(), &mut |rel, record| {
            records.insert(rel.to_string(), record);
            Ok(())
        })
        .unwrap();
        (records, added)
    }

    #[test]
    fn splits_paths_four_ways() {
        let target = target_with(&[
            ("same.txt", b"same"),
            ("edited.txt", b"new content"),
            ("brand_new.txt", b"added"),
        ]);
        let (records, added) = run(
            &[
                ("same.txt", b"same"),
                ("edited.txt", b"old content"),
                ("removed.txt", b"going away"),
            ],
            &target,
        );

        assert_eq!(records["same.txt"], ChangeRecord::Unchanged);
        assert_eq!(
            records["edited.txt"],
            ChangeRecord::Changed {
                original: b"old content".to_vec(),
                modified: b"new content".to_vec(),
            }
        );
        assert_eq!(
            records["removed.txt"],
            ChangeRecord::Deleted {
                original: b"going away".to_vec(),
            }
        );
        assert!(!records.contains_key("brand_new.txt"));
        assert_eq!(
            added.into_iter().collect::<Vec<_>>(),
            vec!["brand_new.txt".to_string()]
        );
    }

    #[test]
    fn visited_paths_never_count_as_added() {
        // A changed path must leave the remaining set even though it is
        // present in the target listing.
        let target = target_with(&[("f.txt", b"v2")]);
        let (records, added) = run(&[("f.txt", b"v1")], &target);

        assert!(added.is_empty());
        assert!(matches!(records["f.txt"], ChangeRecord::Changed { .. }));
    }

    #[test]
    fn backup_files_are_invisible() {
        let target = target_with(&[("f.txt", b"v1"), ("f.txt.orig", b"stale")]);
        let (_, added) = run(&[("f.txt", b"v1")], &target);
        assert!(added.is_empty());
    }

    #[test]
    fn empty_original_makes_everything_added() {
        let target = target_with(&[("a.txt", b"a"), ("sub/b.txt", b"b")]);
        let (records, added) = run(&[], &target);
        assert!(records.is_empty());
        assert_eq!(added.len(), 2);
    }
}
