use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("delta base mismatch: expected {expected}, got {actual}")]
    BaseMismatch { expected: String, actual: String },
    #[error("copy range {offset}+{len} exceeds base of {base_len} bytes")]
    CopyOutOfRange { offset: u64, len: u32, base_len: u64 },
    #[error("reconstructed content mismatch: expected {expected}, got {actual}")]
    TargetMismatch { expected: String, actual: String },
}

/// One instruction in a delta: either a byte range copied from the base
/// version or literal bytes carried in the delta itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaBlock {
    Copy { offset: u64, len: u32 },
    Data { bytes: Vec<u8> },
}

/// Compact recipe reconstructing a new version from its parent. Stored as
/// `SyncVersion.delta_info`; applying it to the base must reproduce the
/// target exactly, which `apply` verifies by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaInfo {
    pub base_hash: String,
    pub target_hash: String,
    pub target_size: u64,
    pub block_size: u32,
    pub blocks: Vec<DeltaBlock>,
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fixed-size block matching: every aligned block of the base is indexed by
/// its SHA-256; target blocks that hit the index become `Copy` references,
/// the rest accumulate into literal runs. Adjacent literals are merged so a
/// rewritten file degrades to a single `Data` block, never worse.
pub fn compute_delta(base: &[u8], target: &[u8], block_size: u32) -> DeltaInfo {
    let block_len = block_size.max(1) as usize;

    let mut index: HashMap<[u8; 32], (u64, u32)> = HashMap::new();
    for (i, block) in base.chunks(block_len).enumerate() {
        let digest: [u8; 32] = Sha256::digest(block).into();
        // First occurrence wins; duplicate blocks reference the same range.
        index
            .entry(digest)
            .or_insert(((i * block_len) as u64, block.len() as u32));
    }

    let mut blocks: Vec<DeltaBlock> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    for chunk in target.chunks(block_len) {
        let digest: [u8; 32] = Sha256::digest(chunk).into();
        match index.get(&digest) {
            Some(&(offset, len)) if len as usize == chunk.len() => {
                if !literal.is_empty() {
                    blocks.push(DeltaBlock::Data {
                        bytes: std::mem::take(&mut literal),
                    });
                }
                blocks.push(DeltaBlock::Copy { offset, len });
            }
            _ => literal.extend_from_slice(chunk),
        }
    }
    if !literal.is_empty() {
        blocks.push(DeltaBlock::Data { bytes: literal });
    }

    DeltaInfo {
        base_hash: content_hash(base),
        target_hash: content_hash(target),
        target_size: target.len() as u64,
        block_size: block_len as u32,
        blocks,
    }
}

/// Reconstructs the target from `base` and verifies the result byte-exactly
/// via the recorded hash.
pub fn apply_delta(base: &[u8], delta: &DeltaInfo) -> Result<Vec<u8>, DeltaError> {
    let actual_base = content_hash(base);
    if actual_base != delta.base_hash {
        return Err(DeltaError::BaseMismatch {
            expected: delta.base_hash.clone(),
            actual: actual_base,
        });
    }

    let mut out = Vec::with_capacity(delta.target_size as usize);
    for block in &delta.blocks {
        match block {
            DeltaBlock::Copy { offset, len } => {
                let start = *offset as usize;
                let end = start + *len as usize;
                let slice = base
                    .get(start..end)
                    .ok_or(DeltaError::CopyOutOfRange {
                        offset: *offset,
                        len: *len,
                        base_len: base.len() as u64,
                    })?;
                out.extend_from_slice(slice);
            }
            DeltaBlock::Data { bytes } => out.extend_from_slice(bytes),
        }
    }

    let actual = content_hash(&out);
    if actual != delta.target_hash {
        return Err(DeltaError::TargetMismatch {
            expected: delta.target_hash.clone(),
            actual,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(base: &[u8], target: &[u8], block_size: u32) {
        let delta = compute_delta(base, target, block_size);
        let rebuilt = apply_delta(base, &delta).unwrap();
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn identical_content_is_all_copies() {
        let data = b"0123456789abcdef".repeat(32);
        let delta = compute_delta(&data, &data, 16);
        assert!(delta
            .blocks
            .iter()
            .all(|block| matches!(block, DeltaBlock::Copy { .. })));
        round_trip(&data, &data, 16);
    }

    #[test]
    fn single_block_edit_stays_mostly_copies() {
        let base = b"AAAA".repeat(64);
        let mut target = base.clone();
        target[100] = b'B';
        let delta = compute_delta(&base, &target, 16);
        let copies = delta
            .blocks
            .iter()
            .filter(|block| matches!(block, DeltaBlock::Copy { .. }))
            .count();
        assert!(copies > 0);
        round_trip(&base, &target, 16);
    }

    #[test]
    fn disjoint_content_degrades_to_one_literal_run() {
        let base = b"aaaa".repeat(16);
        let target = b"zzzz".repeat(16);
        let delta = compute_delta(&base, &target, 16);
        assert_eq!(delta.blocks.len(), 1);
        assert!(matches!(delta.blocks[0], DeltaBlock::Data { .. }));
        round_trip(&base, &target, 16);
    }

    #[test]
    fn empty_and_sub_block_content_round_trip() {
        round_trip(b"", b"", 16);
        round_trip(b"", b"tiny", 16);
        round_trip(b"tiny", b"", 16);
        round_trip(b"short", b"shor", 16);
        round_trip(b"a", b"b", 16);
    }

    #[test]
    fn arbitrary_binary_content_round_trips() {
        // Deterministic pseudo-random bytes, no RNG needed.
        let base: Vec<u8> = (0u32..4096).map(|i| (i.wrapping_mul(31) % 251) as u8).collect();
        let mut target = base.clone();
        target.splice(1000..1000, [0u8, 255, 7, 7, 7]);
        target.truncate(3500);
        round_trip(&base, &target, 64);
    }

    #[test]
    fn apply_rejects_the_wrong_base() {
        let delta = compute_delta(b"base-1", b"target", 4);
        let err = apply_delta(b"base-2", &delta).unwrap_err();
        assert!(matches!(err, DeltaError::BaseMismatch { .. }));
    }

    #[test]
    fn apply_rejects_out_of_range_copies() {
        let delta = DeltaInfo {
            base_hash: content_hash(b"ab"),
            target_hash: content_hash(b"xy"),
            target_size: 2,
            block_size: 2,
            blocks: vec![DeltaBlock::Copy { offset: 0, len: 9 }],
        };
        let err = apply_delta(b"ab", &delta).unwrap_err();
        assert!(matches!(err, DeltaError::CopyOutOfRange { .. }));
    }

    #[test]
    fn delta_info_round_trips_through_json() {
        let delta = compute_delta(b"hello world", b"hello brave world", 4);
        let json = serde_json::to_string(&delta).unwrap();
        let back: DeltaInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, delta);
    }
}
