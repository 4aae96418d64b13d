//! Key hashing for the extendible hash table.
//!
//! The table only needs a deterministic 32-bit hash with
//! well-distributed low bits; the directory masks those low bits to
//! pick a bucket. The hasher is an explicit construction parameter so
//! callers (and tests) control bucket placement.

use std::hash::{Hash, Hasher};

use siphasher::sip::SipHasher13;

/// Hash function contract for index keys.
pub trait KeyHasher<K>: Send + Sync {
    /// Returns the 32-bit hash of `key`.
    fn hash32(&self, key: &K) -> u32;
}

/// Default keyed SipHash-1-3 hasher, truncated to 32 bits.
///
/// The keys are fixed so the same database always hashes the same way
/// across runs.
#[derive(Debug, Clone)]
pub struct SipKeyHasher {
    k0: u64,
    k1: u64,
}

impl SipKeyHasher {
    /// Creates the default hasher.
    pub fn new() -> Self {
        Self::with_keys(0x7374_7261_7461_6462, 0x6861_7368_696e_6467)
    }

    /// Creates a hasher with explicit SipHash keys.
    pub fn with_keys(k0: u64, k1: u64) -> Self {
        Self { k0, k1 }
    }
}

impl Default for SipKeyHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash> KeyHasher<K> for SipKeyHasher {
    fn hash32(&self, key: &K) -> u32 {
        let mut hasher = SipHasher13::new_with_keys(self.k0, self.k1);
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// Hasher that maps an integer key to itself.
///
/// Useful in tests that need to steer keys into specific buckets:
/// the low bits of the key become the directory index directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher<u32> for IdentityHasher {
    fn hash32(&self, key: &u32) -> u32 {
        *key
    }
}

impl KeyHasher<u64> for IdentityHasher {
    fn hash32(&self, key: &u64) -> u32 {
        *key as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sip_hasher_deterministic() {
        let a = SipKeyHasher::new();
        let b = SipKeyHasher::new();
        assert_eq!(a.hash32(&42u64), b.hash32(&42u64));
        assert_eq!(a.hash32(&"key"), a.hash32(&"key"));
    }

    #[test]
    fn test_sip_hasher_keys_matter() {
        let a = SipKeyHasher::new();
        let b = SipKeyHasher::with_keys(1, 2);
        assert_ne!(a.hash32(&42u64), b.hash32(&42u64));
    }

    #[test]
    fn test_sip_hasher_spreads_low_bits() {
        let hasher = SipKeyHasher::new();
        let mut buckets = [0usize; 8];
        for key in 0..8000u64 {
            buckets[(hasher.hash32(&key) & 7) as usize] += 1;
        }
        // Each of the 8 low-bit patterns should see roughly 1000 keys.
        for &count in &buckets {
            assert!(count > 700, "skewed low bits: {buckets:?}");
        }
    }

    #[test]
    fn test_identity_hasher() {
        assert_eq!(IdentityHasher.hash32(&7u32), 7);
        assert_eq!(IdentityHasher.hash32(&(u32::MAX as u64 + 5)), 4);
    }
}
