//! Per-file patch engine for vendored source trees: diff an edited tree
//! against the pristine original into a replayable patch store, and replay
//! that store to rebuild the edits on a fresh copy of the original.

pub mod apply;
pub mod classify;
pub mod delta;
pub mod error;
pub mod generate;
pub mod header;
pub mod reconcile;
pub mod rolling;
pub mod text_diff;
pub mod text_patch;
pub mod tree;

pub use apply::{apply, ApplyOptions, ApplySummary};
pub use error::PatchError;
pub use generate::{generate, GenerateOptions, GenerateSummary};
