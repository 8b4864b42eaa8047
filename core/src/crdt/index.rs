//! Operation index derivation
//!
//! Every operation is keyed by a 64-bit index laid out as
//! `[ depth | kind priority (2 bits) | content offset (32 bits) ]`. Depth
//! dominates, so causally earlier operations replay first; within a depth,
//! removals precede additions precede posts; the content offset spreads
//! operations of the same depth and kind by a hash of their content.
//!
//! Mirrored removals (`A removes B` and `B removes A` at the same depth) hash
//! the participant pair in a canonical order and keep only the low bit free,
//! so the two operations land on consecutive indices. The replay loop relies
//! on that adjacency to detect mutual conflicts.

use crate::types::UserId;
use sha2::{Digest, Sha256};

const CONTENT_BITS: u32 = 32;
const KIND_BITS: u32 = 2;

/// Priority of an operation kind within one depth. Lower replays first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum KindPriority {
    Remove = 0,
    Add = 1,
    Post = 2,
}

fn pack(depth: u32, kind: KindPriority, offset: u32) -> i64 {
    ((depth as i64) << (CONTENT_BITS + KIND_BITS))
        + ((kind as i64) << CONTENT_BITS)
        + offset as i64
}

fn hash_to_u32(parts: &[&[u8]]) -> u32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub(crate) fn post_idx(depth: u32, poster: UserId, message: &str) -> i64 {
    let offset = hash_to_u32(&[poster.as_bytes(), message.as_bytes()]);
    pack(depth, KindPriority::Post, offset)
}

pub(crate) fn add_idx(depth: u32, issuer: UserId, added: UserId, num_points: usize) -> i64 {
    let len_bytes = (num_points as u32).to_le_bytes();
    let offset = hash_to_u32(&[issuer.as_bytes(), added.as_bytes(), &len_bytes]);
    pack(depth, KindPriority::Add, offset)
}

pub(crate) fn remove_idx(depth: u32, issuer: UserId, removed: UserId) -> i64 {
    let (first, last, order) = if issuer < removed {
        (issuer, removed, 0)
    } else {
        (removed, issuer, 1)
    };
    // Truncate to a multiple of 4 so the mirrored removal shares the hash
    // block and differs only in the order bit.
    let offset = (hash_to_u32(&[first.as_bytes(), last.as_bytes()]) / 4) * 4;
    pack(depth, KindPriority::Remove, offset) + order
}

/// Depth encoded in an operation index.
pub(crate) fn depth_of(idx: i64) -> u32 {
    (idx >> (CONTENT_BITS + KIND_BITS)) as u32
}
