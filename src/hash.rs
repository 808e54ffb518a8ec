//! Stable bucketing hash
//!
//! 32-bit FNV-1a over the UTF-8 bytes of the key, followed by the
//! `fmix32` finalizer from MurmurHash3. Both steps are published,
//! portable algorithms, so any language can reproduce a bucket:
//!
//! ```text
//! h = 0x811c9dc5
//! for byte in key: h = (h ^ byte) * 0x01000193   (mod 2^32)
//! h ^= h >> 16; h *= 0x85ebca6b
//! h ^= h >> 13; h *= 0xc2b2ae35
//! h ^= h >> 16
//! ```
//!
//! Used for bucketing only, never for security.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Number of buckets used for percentage gates and variant thresholds.
pub const BUCKETS: u32 = 100;

/// Hash a key to a non-negative 32-bit integer.
///
/// # Example
///
/// ```rust
/// use splitbench::hash::hash_key;
///
/// assert_eq!(hash_key("user-42"), hash_key("user-42"));
/// ```
#[must_use]
pub fn hash_key(key: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for byte in key.bytes() {
        h ^= u32::from(byte);
        h = h.wrapping_mul(FNV_PRIME);
    }
    fmix32(h)
}

/// Bucket in `0..BUCKETS` for a key.
#[must_use]
pub fn bucket(key: &str) -> u32 {
    hash_key(key) % BUCKETS
}

/// Bucket for a key salted with another string (no separator).
///
/// Salting with the experiment id makes an actor's eligibility bucket
/// independent across experiments.
#[must_use]
pub fn salted_bucket(key: &str, salt: &str) -> u32 {
    let mut salted = String::with_capacity(key.len() + salt.len());
    salted.push_str(key);
    salted.push_str(salt);
    bucket(&salted)
}

const fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_key("actor-1"), hash_key("actor-1"));
        assert_ne!(hash_key("actor-1"), hash_key("actor-2"));
    }

    #[test]
    fn test_empty_key_is_finalized_offset_basis() {
        assert_eq!(hash_key(""), fmix32(FNV_OFFSET_BASIS));
    }

    #[test]
    fn test_fmix32_known_values() {
        assert_eq!(fmix32(0), 0);
        assert_ne!(fmix32(1), 1);
    }

    #[test]
    fn test_bucket_range() {
        for i in 0..1000 {
            assert!(bucket(&format!("k{i}")) < BUCKETS);
        }
    }

    #[test]
    fn test_salted_bucket_matches_concatenation() {
        assert_eq!(salted_bucket("user-7", "exp-1"), bucket("user-7exp-1"));
    }

    #[test]
    fn test_buckets_roughly_uniform() {
        let mut counts = [0u32; BUCKETS as usize];
        for i in 0..100_000 {
            counts[bucket(&format!("user-{i}")) as usize] += 1;
        }
        // Expected 1000 per bucket
        assert!(counts.iter().all(|&c| (700..1300).contains(&c)));
    }
}
