//! Patch generation: reconcile the original tree against the target tree
//! and write one artifact per changed path into the patch store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::classify::{self, ContentKind};
use crate::delta;
use crate::header::{DEFAULT_MODIFIED_PREFIX, DEFAULT_ORIGINAL_PREFIX, DEV_NULL};
use crate::reconcile::{self, ChangeRecord};
use crate::text_diff;
use crate::tree;

pub struct GenerateOptions {
    /// Original tree as a directory on disk.
    pub original_dir: Option<PathBuf>,
    /// Original tree packed as a tar or tar.gz archive.
    pub original_archive: Option<PathBuf>,
    /// The edited tree the patches should reproduce.
    pub target_root: PathBuf,
    /// Root of the patch store to write.
    pub patch_root: PathBuf,
    pub original_prefix: String,
    pub modified_prefix: String,
    /// Treat lines differing only in whitespace as equal.
    pub ignore_whitespace: bool,
}

impl GenerateOptions {
    pub fn new(target_root: PathBuf, patch_root: PathBuf) -> Self {
        Self {
            original_dir: None,
            original_archive: None,
            target_root,
            patch_root,
            original_prefix: DEFAULT_ORIGINAL_PREFIX.to_string(),
            modified_prefix: DEFAULT_MODIFIED_PREFIX.to_string(),
            ignore_whitespace: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct GenerateSummary {
    pub files_unchanged: usize,
    pub files_changed: usize,
    pub files_added: usize,
    pub files_deleted: usize,
    pub text_patches: usize,
    pub binary_patches: usize,
    pub failures: usize,
}

/// What a single reconciled path turned into.
enum Written {
    Nothing,
    Text,
    Binary,
}

/// Diff the target tree against the original and populate the patch store.
///
/// Per-file failures are logged and counted but do not stop the run; if any
/// file failed, a single aggregate error is raised after the full traversal.
pub async fn generate(options: GenerateOptions) -> Result<GenerateSummary> {
    let source = tree::resolve_source(
        options.original_dir.as_deref(),
        options.original_archive.as_deref(),
    )?;

    tokio::task::spawn_blocking(move || generate_sync(source.as_ref(), &options))
        .await
        .context("generation task panicked")?
}

fn generate_sync(
    source: &dyn tree::TreeSource,
    options: &GenerateOptions,
) -> Result<GenerateSummary> {
    let mut summary = GenerateSummary::default();

    // Pass 1: the original walk covers unchanged, changed and deleted paths.
    let added = reconcile::reconcile(source, &options.target_root, &mut |rel, record| {
        match &record {
            ChangeRecord::Unchanged => summary.files_unchanged += 1,
            ChangeRecord::Changed { .. } => summary.files_changed += 1,
            ChangeRecord::Deleted { .. } => summary.files_deleted += 1,
            ChangeRecord::Added { .. } => {}
        }
        record_outcome(&mut summary, rel, emit_artifact(rel, record, options));
        Ok(())
    })?;

    // Pass 2: whatever the walk never visited is new. Each artifact is
    // independent, so the batch runs in parallel.
    let added: Vec<String> = added.into_iter().collect();
    summary.files_added = added.len();

    let outcomes: Vec<(String, Result<Written>)> = added
        .into_par_iter()
        .map(|rel| {
            let result = fs::read(options.target_root.join(&rel))
                .with_context(|| format!("failed to read added file {rel}"))
                .and_then(|modified| {
                    emit_artifact(&rel, ChangeRecord::Added { modified }, options)
                });
            (rel, result)
        })
        .collect();

    for (rel, outcome) in outcomes {
        record_outcome(&mut summary, &rel, outcome);
    }

    if summary.failures > 0 {
        bail!(
            "one or more patches failed to generate ({} of {} files)",
            summary.failures,
            summary.files_changed + summary.files_added + summary.files_deleted,
        );
    }

    Ok(summary)
}

fn record_outcome(summary: &mut GenerateSummary, rel: &str, outcome: Result<Written>) {
    match outcome {
        Ok(Written::Text) => summary.text_patches += 1,
        Ok(Written::Binary) => summary.binary_patches += 1,
        Ok(Written::Nothing) => {}
        Err(err) => {
            tracing::error!("failed to generate patch for {rel}: {err:#}");
            summary.failures += 1;
        }
    }
}

fn emit_artifact(rel: &str, record: ChangeRecord, options: &GenerateOptions) -> Result<Written> {
    let (original, modified) = match record {
        ChangeRecord::Unchanged => return Ok(Written::Nothing),
        ChangeRecord::Changed { original, modified } => (Some(original), Some(modified)),
        ChangeRecord::Added { modified } => (None, Some(modified)),
        ChangeRecord::Deleted { original } => (Some(original), None),
    };

    // Classification looks at the original side when there is one; a freshly
    // added file is judged by its own content.
    let sample = original.as_deref().or(modified.as_deref()).unwrap_or(&[]);
    match classify::classify_bytes(sample) {
        ContentKind::Text => {
            write_text_patch(rel, original.as_deref(), modified.as_deref(), options)
        }
        ContentKind::Binary => {
            write_binary_patch(rel, original.as_deref(), modified.as_deref(), options)
        }
    }
}

fn write_text_patch(
    rel: &str,
    original: Option<&[u8]>,
    modified: Option<&[u8]>,
    options: &GenerateOptions,
) -> Result<Written> {
    let original_text = decode_utf8(original, rel, "original")?;
    let modified_text = decode_utf8(modified, rel, "modified")?;

    let original_header = header_for(original.is_some(), &options.original_prefix, rel);
    let modified_header = header_for(modified.is_some(), &options.modified_prefix, rel);

    let doc = match text_diff::render_unified(
        &original_text,
        &modified_text,
        &original_header,
        &modified_header,
        options.ignore_whitespace,
    ) {
        Some(doc) => doc,
        None => return Ok(Written::Nothing),
    };

    let out = options.patch_root.join(format!("{rel}.patch"));
    write_artifact(&out, doc.as_bytes())?;
    tracing::debug!("wrote text patch {}", out.display());
    Ok(Written::Text)
}

fn write_binary_patch(
    rel: &str,
    original: Option<&[u8]>,
    modified: Option<&[u8]>,
    options: &GenerateOptions,
) -> Result<Written> {
    let base = original.unwrap_or_default();
    let target = modified.unwrap_or_default();
    if base == target {
        return Ok(Written::Nothing);
    }

    let original_header = header_for(original.is_some(), &options.original_prefix, rel);
    let modified_header = header_for(modified.is_some(), &options.modified_prefix, rel);

    let delta = delta::encode(base, target)
        .with_context(|| format!("failed to compute binary delta for {rel}"))?;

    let mut artifact = format!("--- {original_header}\n+++ {modified_header}\n").into_bytes();
    artifact.extend_from_slice(&delta);

    let out = options.patch_root.join(format!("{rel}.diff"));
    write_artifact(&out, &artifact)?;
    tracing::debug!("wrote binary patch {}", out.display());
    Ok(Written::Binary)
}

fn header_for(present: bool, prefix: &str, rel: &str) -> String {
    if present {
        format!("{prefix}{rel}")
    } else {
        DEV_NULL.to_string()
    }
}

fn decode_utf8(content: Option<&[u8]>, rel: &str, side: &str) -> Result<String> {
    match content {
        None => Ok(String::new()),
        Some(bytes) => String::from_utf8(bytes.to_vec())
            .with_context(|| format!("{side} content of {rel} is not valid UTF-8")),
    }
}

fn write_artifact(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("failed to write patch artifact: {}", path.display()))
}
