//! Binary delta service: block-matching encode and the converse apply.
//!
//! The delta travels in a minimal self-delimiting container: an 8-byte magic
//! followed by a zstd frame holding a bincode-encoded op list. The container
//! carries no length prefix; it is expected to own the remainder of whatever
//! byte stream it is embedded in.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::rolling::RollingChecksum;

pub const DELTA_MAGIC: &[u8; 8] = b"TPDELTA1";

const BLOCK_SIZE: usize = 4096;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum DeltaOp {
    /// Take `len` bytes of the base starting at `offset`.
    Copy { offset: u64, len: u64 },
    /// Take the literal bytes.
    Data { bytes: Vec<u8> },
}

/// Encode the difference between `base` and `target` into a delta container.
pub fn encode(base: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    let ops = build_ops(base, target);
    let encoded = bincode::serialize(&ops).context("failed to serialize delta ops")?;
    let compressed =
        zstd::bulk::compress(&encoded, ZSTD_LEVEL).context("failed to compress delta ops")?;

    let mut out = Vec::with_capacity(DELTA_MAGIC.len() + compressed.len());
    out.extend_from_slice(DELTA_MAGIC);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Reconstruct the target bytes from `base` and a delta container.
///
/// Rejects containers with a bad magic and copies that reach outside the
/// base, so applying a delta against the wrong base fails instead of
/// producing garbage.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PatchError> {
    if delta.len() < DELTA_MAGIC.len() || &delta[..DELTA_MAGIC.len()] != DELTA_MAGIC {
        return Err(PatchError::DeltaRejected("missing delta magic".into()));
    }

    let encoded = zstd::decode_all(&delta[DELTA_MAGIC.len()..])
        .map_err(|e| PatchError::DeltaRejected(format!("undecodable container: {e}")))?;
    let ops: Vec<DeltaOp> = bincode::deserialize(&encoded)
        .map_err(|e| PatchError::DeltaRejected(format!("undecodable op list: {e}")))?;

    let total: u64 = ops
        .iter()
        .map(|op| match op {
            DeltaOp::Copy { len, .. } => *len,
            DeltaOp::Data { bytes } => bytes.len() as u64,
        })
        .sum();

    let mut out = Vec::with_capacity(total as usize);
    for op in &ops {
        match op {
            DeltaOp::Copy { offset, len } => {
                let start = *offset as usize;
                let end = start
                    .checked_add(*len as usize)
                    .ok_or_else(|| PatchError::DeltaRejected("copy length overflow".into()))?;
                let slice = base.get(start..end).ok_or_else(|| {
                    PatchError::DeltaRejected(format!(
                        "copy {start}..{end} outside base of {} bytes",
                        base.len()
                    ))
                })?;
                out.extend_from_slice(slice);
            }
            DeltaOp::Data { bytes } => out.extend_from_slice(bytes),
        }
    }

    Ok(out)
}

/// Block-matching op construction (rsync-like): index the base in fixed-size
/// blocks by rolling checksum, then scan the target with a sliding window,
/// emitting Copy ops for matched blocks and Data ops for the gaps.
fn build_ops(base: &[u8], target: &[u8]) -> Vec<DeltaOp> {
    if target.is_empty() {
        return Vec::new();
    }
    if base.is_empty() || target.len() < BLOCK_SIZE {
        return vec![DeltaOp::Data {
            bytes: target.to_vec(),
        }];
    }

    let index = block_index(base);

    let mut ops: Vec<DeltaOp> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut pos = 0usize;
    let mut sum = RollingChecksum::from_block(&target[..BLOCK_SIZE]);

    while pos + BLOCK_SIZE <= target.len() {
        let window = &target[pos..pos + BLOCK_SIZE];

        if let Some((offset, len)) = lookup(&index, sum.value(), window, base) {
            if !pending.is_empty() {
                ops.push(DeltaOp::Data {
                    bytes: std::mem::take(&mut pending),
                });
            }
            ops.push(DeltaOp::Copy { offset, len });

            pos += len as usize;
            if pos + BLOCK_SIZE <= target.len() {
                sum = RollingChecksum::from_block(&target[pos..pos + BLOCK_SIZE]);
            }
        } else {
            pending.push(target[pos]);
            pos += 1;
            if pos + BLOCK_SIZE <= target.len() {
                sum.roll(target[pos - 1], target[pos + BLOCK_SIZE - 1]);
            }
        }
    }

    // Tail shorter than one window.
    if pos < target.len() {
        pending.extend_from_slice(&target[pos..]);
    }
    if !pending.is_empty() {
        ops.push(DeltaOp::Data { bytes: pending });
    }

    ops
}

/// Weak-checksum index over the base blocks; each bucket keeps the block
/// offset plus a strong hash to rule out collisions.
fn block_index(base: &[u8]) -> HashMap<u32, Vec<(u64, blake3::Hash)>> {
    let mut index: HashMap<u32, Vec<(u64, blake3::Hash)>> = HashMap::new();
    let mut offset = 0usize;
    while offset < base.len() {
        let end = (offset + BLOCK_SIZE).min(base.len());
        let block = &base[offset..end];
        index
            .entry(RollingChecksum::from_block(block).value())
            .or_default()
            .push((offset as u64, blake3::hash(block)));
        offset = end;
    }
    index
}

fn lookup(
    index: &HashMap<u32, Vec<(u64, blake3::Hash)>>,
    weak: u32,
    window: &[u8],
    base: &[u8],
) -> Option<(u64, u64)> {
    let candidates = index.get(&weak)?;
    let strong = blake3::hash(window);

    for &(offset, candidate_hash) in candidates {
        if candidate_hash == strong {
            let end = (offset as usize + BLOCK_SIZE).min(base.len());
            return Some((offset, (end - offset as usize) as u64));
        }
    }

    None
}
