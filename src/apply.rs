//! Patch application: walk the patch store and replay every artifact onto
//! the target tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::delta;
use crate::header::{
    self, OperationMode, DEFAULT_MODIFIED_PREFIX, DEFAULT_ORIGINAL_PREFIX, DEV_NULL,
};
use crate::text_patch;
use crate::tree;

const TEXT_SUFFIX: &str = ".patch";
const BINARY_SUFFIX: &str = ".diff";

pub struct ApplyOptions {
    /// The tree the patches are replayed onto.
    pub target_root: PathBuf,
    /// Root of the patch store to read.
    pub patch_root: PathBuf,
}

#[derive(Debug, Default)]
pub struct ApplySummary {
    pub text_applied: usize,
    pub binary_applied: usize,
    pub files_deleted: usize,
    pub failures: usize,
}

enum Outcome {
    TextApplied,
    BinaryApplied,
    Deleted,
}

/// One artifact in the patch store.
struct Artifact {
    /// Store-relative path, e.g. `sub/img.bin.diff`.
    rel: String,
    full: PathBuf,
}

/// Replay the patch store onto the target tree.
///
/// Artifacts are independent of each other, so failures are accumulated:
/// every remaining artifact is still processed, and one aggregate error is
/// raised afterwards if anything failed.
pub async fn apply(options: ApplyOptions) -> Result<ApplySummary> {
    tokio::task::spawn_blocking(move || apply_sync(&options))
        .await
        .context("apply task panicked")?
}

fn apply_sync(options: &ApplyOptions) -> Result<ApplySummary> {
    let artifacts = collect_artifacts(&options.patch_root)?;
    let total = artifacts.len();

    let outcomes: Vec<Result<Outcome>> = artifacts
        .par_iter()
        .map(|artifact| {
            let result = apply_one(artifact, &options.target_root);
            if let Err(err) = &result {
                tracing::error!("failed to apply {}: {err:#}", artifact.rel);
            }
            result
        })
        .collect();

    let mut summary = ApplySummary::default();
    for outcome in outcomes {
        match outcome {
            Ok(Outcome::TextApplied) => summary.text_applied += 1,
            Ok(Outcome::BinaryApplied) => summary.binary_applied += 1,
            Ok(Outcome::Deleted) => summary.files_deleted += 1,
            Err(_) => summary.failures += 1,
        }
    }

    remove_dev_null_entry();

    if summary.failures > 0 {
        bail!(
            "one or more patches failed to apply ({} of {total} artifacts)",
            summary.failures
        );
    }

    Ok(summary)
}

fn collect_artifacts(patch_root: &Path) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    if !patch_root.exists() {
        return Ok(artifacts);
    }

    for entry in WalkDir::new(patch_root).min_depth(1) {
        let entry = entry.with_context(|| {
            format!("failed to read patch store entry in {}", patch_root.display())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = tree::relative_path(patch_root, entry.path())?;
        if rel.ends_with(TEXT_SUFFIX) || rel.ends_with(BINARY_SUFFIX) {
            artifacts.push(Artifact {
                rel,
                full: entry.path().to_path_buf(),
            });
        } else {
            tracing::warn!("ignoring foreign file in patch store: {rel}");
        }
    }

    Ok(artifacts)
}

fn apply_one(artifact: &Artifact, target_root: &Path) -> Result<Outcome> {
    if let Some(rel) = artifact.rel.strip_suffix(TEXT_SUFFIX) {
        apply_text(artifact, rel, target_root)
    } else {
        // collect_artifacts only admits the two known suffixes.
        let rel = artifact
            .rel
            .strip_suffix(BINARY_SUFFIX)
            .unwrap_or(&artifact.rel);
        apply_binary(artifact, rel, target_root)
    }
}

fn apply_text(artifact: &Artifact, rel: &str, target_root: &Path) -> Result<Outcome> {
    let patch_text = fs::read_to_string(&artifact.full)
        .with_context(|| format!("failed to read patch artifact: {}", artifact.full.display()))?;

    let report = text_patch::apply_to_tree(&patch_text, target_root, rel)?;

    // The application stands; the service's safety copy has no further use.
    if let Some(backup) = report.backup {
        fs::remove_file(&backup)
            .with_context(|| format!("failed to discard backup: {}", backup.display()))?;
    }

    if report.deleted {
        Ok(Outcome::Deleted)
    } else {
        Ok(Outcome::TextApplied)
    }
}

fn apply_binary(artifact: &Artifact, rel: &str, target_root: &Path) -> Result<Outcome> {
    let raw = map_artifact(&artifact.full)?;
    let (line_one, line_two, payload) = header::split_artifact(&raw)?;
    let info = header::interpret(
        line_one,
        line_two,
        DEFAULT_ORIGINAL_PREFIX,
        DEFAULT_MODIFIED_PREFIX,
    )?;

    let target = target_root.join(rel);

    if info.mode == OperationMode::Delete {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to delete file: {}", target.display()))
            }
        }
        return Ok(Outcome::Deleted);
    }

    let base = if target.exists() {
        fs::read(&target)
            .with_context(|| format!("failed to read target file: {}", target.display()))?
    } else {
        Vec::new()
    };

    let rebuilt = delta::apply(&base, payload)
        .with_context(|| format!("binary delta for {rel} does not fit the target file"))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    fs::write(&target, rebuilt)
        .with_context(|| format!("failed to write rebuilt file: {}", target.display()))?;

    Ok(Outcome::BinaryApplied)
}

/// Memory-map an artifact for read-only access.
fn map_artifact(path: &Path) -> Result<Mmap> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open artifact: {}", path.display()))?;
    // SAFETY: read-only mapping; nothing rewrites the store while we apply.
    unsafe { Mmap::map(&file).with_context(|| format!("failed to memory-map {}", path.display())) }
}

/// Headers carry a literal `/dev/null` sentinel; on hosts where that string
/// resolves to a real regular file, drop the accidental entry. Cosmetic.
fn remove_dev_null_entry() {
    let sentinel = Path::new(DEV_NULL);
    if sentinel.is_file() && fs::remove_file(sentinel).is_ok() {
        tracing::debug!("removed stray {DEV_NULL} entry");
    }
}
