/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::path::LogicalPath;

const M: u64 = 0xc6a4a7935bd1e995;
const R: u32 = 47;

/// MurmurHash2 64-A, seeded. Kept algorithm-equivalent to the source's
/// `murmur_hash_64a` (§9): never truncated, same multiplier and shift.
pub fn murmur_hash_64a(key: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (key.len() as u64).wrapping_mul(M);

    let chunks = key.chunks_exact(8);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes"));
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    // Duff's-device-style fallthrough over the trailing 0-7 bytes, preserved
    // from the source so the produced hash matches byte for byte.
    let mut tail_val: u64 = 0;
    for (i, &b) in tail.iter().enumerate().rev() {
        tail_val ^= (b as u64) << (8 * i);
    }
    if !tail.is_empty() {
        h ^= tail_val;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

/// Synthesizes an inode number for a logical path (§3, §4.1). Two distinct
/// logical paths are assumed to never collide (hash-quality assumption,
/// documented as an accepted risk in §9 rather than guarded against).
pub fn name_to_ino(path: &LogicalPath, seed: u64) -> u64 {
    murmur_hash_64a(path.as_str().as_bytes(), seed)
}
