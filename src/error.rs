//! Error kinds that are part of the engine's contract.
//!
//! Everything else (plain I/O trouble, serialization hiccups) travels as an
//! `anyhow::Error` with context attached at the failure site.

/// Contract-level failures of the patch engine.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Generation was invoked with neither a source directory nor an archive.
    #[error("no original tree given: pass a source directory or an archive")]
    MissingRoot,

    /// A binary artifact's header lines don't match the `--- `/`+++ ` form.
    #[error("malformed patch header: {0}")]
    HeaderFormat(String),

    /// The binary delta service rejected the artifact or the base bytes.
    #[error("binary delta rejected: {0}")]
    DeltaRejected(String),

    /// The text-patch-apply service reported a non-success result.
    #[error("text patch failed to apply: {0}")]
    TextApply(String),
}
