//! Hash routines shared by the dictionary configurations.
//!
//! Three families: an integer mix for numeric keys, a seeded byte-array
//! hash (MurmurHash2-equivalent output), and a seeded case-insensitive
//! byte hash on the djb recurrence. The seed is process-wide and is
//! expected to change only at quiescent points; rehashing never runs
//! with a different seed than insertion.

use core::sync::atomic::{AtomicU32, Ordering};

static HASH_SEED: AtomicU32 = AtomicU32::new(5381);

/// Set the process-wide seed for `bytes_hash` and `case_hash`.
pub fn set_hash_seed(seed: u32) {
    HASH_SEED.store(seed, Ordering::Relaxed);
}

/// Current process-wide hash seed.
pub fn hash_seed() -> u32 {
    HASH_SEED.load(Ordering::Relaxed)
}

/// Thomas Wang's 32 bit mix function.
pub fn int_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Identity hash for keys that are already well-distributed.
pub fn identity_hash(key: u32) -> u32 {
    key
}

/// Seeded byte-array hash (MurmurHash2, by Austin Appleby).
///
/// Four-byte words are read little-endian, so the output matches on
/// every platform. Not incremental.
pub fn bytes_hash(data: &[u8]) -> u32 {
    // 'm' and 'r' are mixing constants generated offline. They're not
    // really magic, they just happen to work well.
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h: u32 = hash_seed() ^ (data.len() as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes(chunk.try_into().expect("chunks_exact yields 4 bytes"));
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Seeded case-insensitive byte hash (djb: `h = h*33 + tolower(b)`).
pub fn case_hash(data: &[u8]) -> u32 {
    let mut h = hash_seed();
    for &b in data {
        h = (h << 5)
            .wrapping_add(h)
            .wrapping_add(b.to_ascii_lowercase() as u32);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: the integer mix is a permutation-ish scramble — equal
    /// inputs agree, near inputs diverge.
    #[test]
    fn int_hash_scrambles() {
        assert_eq!(int_hash(12345), int_hash(12345));
        assert_ne!(int_hash(0), int_hash(1));
        assert_ne!(int_hash(1), int_hash(2));
    }

    /// Invariant: byte hashing is deterministic for a fixed seed and
    /// sensitive to content and length, including tail bytes.
    ///
    /// Reseeding itself is covered by an integration test; flipping the
    /// process-wide seed here would race the dictionary tests hashing
    /// in sibling threads.
    #[test]
    fn bytes_hash_is_content_sensitive() {
        assert_eq!(bytes_hash(b"foobar"), bytes_hash(b"foobar"));
        assert_ne!(bytes_hash(b"foobar"), bytes_hash(b"foobaz"));
        assert_ne!(bytes_hash(b"foo"), bytes_hash(b"foo\0"));
        // Tail lengths 1..3 exercise the remainder mixing.
        assert_ne!(bytes_hash(b"abcde"), bytes_hash(b"abcdf"));
        assert_ne!(bytes_hash(b"abcdef"), bytes_hash(b"abcdeg"));
        assert_ne!(bytes_hash(b"abcdefg"), bytes_hash(b"abcdefh"));
    }

    /// Invariant: the case hash folds ASCII case and nothing else.
    #[test]
    fn case_hash_folds_ascii_case() {
        assert_eq!(case_hash(b"Hello"), case_hash(b"hELLO"));
        assert_ne!(case_hash(b"hello"), case_hash(b"hellp"));
        // Non-ASCII bytes are left alone by the fold.
        assert_eq!(case_hash(b"caf\xc3\xa9"), case_hash(b"CAF\xc3\xa9"));
    }

    #[test]
    fn identity_hash_is_identity() {
        assert_eq!(identity_hash(0xfeed_face), 0xfeed_face);
    }
}
