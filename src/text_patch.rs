//! Adapter around the `diffy` text-patch service: parse a unified-diff
//! document, resolve `/dev/null` header sentinels to add/delete semantics,
//! and apply it against a file in the target tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use diffy::Patch;

use crate::error::PatchError;
use crate::header::DEV_NULL;
use crate::tree::BACKUP_SUFFIX;

/// Per-file result of a text patch application.
#[derive(Debug)]
pub struct TextApplyReport {
    /// Backup of the pre-patch file, if one existed to back up. The caller
    /// discards it once it considers the application final.
    pub backup: Option<PathBuf>,
    /// The patch named `/dev/null` as its modified side and the target file
    /// was removed.
    pub deleted: bool,
}

/// Apply a unified-diff document to `<target_root>/<rel>`.
///
/// The base content is the current target file, or empty when the file does
/// not exist yet (the add case). Existing files are copied to a `.orig`
/// backup before being overwritten.
pub fn apply_to_tree(patch_text: &str, target_root: &Path, rel: &str) -> Result<TextApplyReport> {
    let patch = Patch::from_str(patch_text)
        .map_err(|e| PatchError::TextApply(format!("unparseable patch for {rel}: {e}")))?;

    let target = target_root.join(rel);

    if header_names_dev_null(patch.modified()) {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to delete file: {}", target.display())
                })
            }
        }
        return Ok(TextApplyReport {
            backup: None,
            deleted: true,
        });
    }

    let base = if target.exists() {
        fs::read_to_string(&target)
            .with_context(|| format!("failed to read target file: {}", target.display()))?
    } else {
        String::new()
    };

    let patched = diffy::apply(&base, &patch)
        .map_err(|e| PatchError::TextApply(format!("hunks did not apply to {rel}: {e}")))?;

    let backup = if target.exists() {
        let backup = backup_path(&target);
        fs::copy(&target, &backup)
            .with_context(|| format!("failed to back up {}", target.display()))?;
        Some(backup)
    } else {
        None
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    fs::write(&target, patched)
        .with_context(|| format!("failed to write patched file: {}", target.display()))?;

    Ok(TextApplyReport {
        backup,
        deleted: false,
    })
}

fn header_names_dev_null(header: Option<&str>) -> bool {
    header.is_some_and(|h| h.starts_with(DEV_NULL))
}

fn backup_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(BACKUP_SUFFIX);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_diff::render_unified;

    #[test]
    fn change_applies_and_leaves_backup() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "a\nb\nc\n").unwrap();

        let doc = render_unified("a\nb\nc\n", "a\nX\nc\n", "a/f.txt", "b/f.txt", true).unwrap();
        let report = apply_to_tree(&doc, temp.path(), "f.txt").unwrap();

        assert!(!report.deleted);
        assert_eq!(fs::read_to_string(temp.path().join("f.txt")).unwrap(), "a\nX\nc\n");

        let backup = report.backup.unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn add_creates_file_without_backup() {
        let temp = tempfile::tempdir().unwrap();

        let doc = render_unified("", "hi\n", DEV_NULL, "b/sub/hello.txt", true).unwrap();
        let report = apply_to_tree(&doc, temp.path(), "sub/hello.txt").unwrap();

        assert!(report.backup.is_none());
        assert_eq!(
            fs::read_to_string(temp.path().join("sub/hello.txt")).unwrap(),
            "hi\n"
        );
    }

    #[test]
    fn dev_null_modified_side_deletes() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "gone\n").unwrap();

        let doc = render_unified("gone\n", "", "a/f.txt", DEV_NULL, true).unwrap();
        let report = apply_to_tree(&doc, temp.path(), "f.txt").unwrap();

        assert!(report.deleted);
        assert!(!temp.path().join("f.txt").exists());
    }

    #[test]
    fn mismatched_base_is_a_text_apply_failure() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "something else entirely\n").unwrap();

        let doc = render_unified("a\nb\nc\n", "a\nX\nc\n", "a/f.txt", "b/f.txt", true).unwrap();
        let err = apply_to_tree(&doc, temp.path(), "f.txt").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::TextApply(_))
        ));
    }

    #[test]
    fn file_without_trailing_newline_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "a\nend").unwrap();

        let doc = render_unified("a\nend", "a\nother end", "a/f.txt", "b/f.txt", true).unwrap();
        apply_to_tree(&doc, temp.path(), "f.txt").unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "a\nother end"
        );
    }
}
