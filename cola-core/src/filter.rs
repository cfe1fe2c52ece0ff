use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The membership-filter collaborator contract (`SPEC_FULL.md` §6).
///
/// This crate only ever calls `add`; `contains` exists for callers that
/// want to consult the filter before calling `get` to skip a definite
/// negative (`SPEC_FULL.md` §4.6) — the core itself never short-circuits on
/// it, so the filter can be swapped for a no-op without changing behavior,
/// only performance.
///
/// An implementation MUST NOT produce false negatives for a key added with
/// `add`; false positives are acceptable and expected.
pub trait MembershipFilter {
    /// Reconstructs a filter from the header's opaque bitset bytes.
    fn from_bitset(bitset: &[u8]) -> Self;

    /// Records that `key` was inserted with `opt = PUT`.
    fn add(&mut self, key: &[u8]);

    /// Returns `false` only if `key` was definitely never added.
    fn contains(&self, key: &[u8]) -> bool;

    /// The bytes to persist into the header's bitset field.
    fn bitset(&self) -> &[u8];
}

/// A filter that is always positive: zero false negatives by construction,
/// at the cost of never actually filtering anything. Used where a real
/// filter implementation is not wired up, or in tests that don't care about
/// filter behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllFilter;

impl MembershipFilter for AcceptAllFilter {
    fn from_bitset(_bitset: &[u8]) -> Self {
        AcceptAllFilter
    }

    fn add(&mut self, _key: &[u8]) {}

    fn contains(&self, _key: &[u8]) -> bool {
        true
    }

    fn bitset(&self) -> &[u8] {
        &[]
    }
}

/// A small double-hashed bit-array membership filter, in the style of a
/// classic Bloom filter.
///
/// This is an illustrative default, not a tuned production filter — the
/// core only depends on the `MembershipFilter` trait above; an embedder
/// wanting false-positive-rate guarantees should bring their own.
pub struct BitsetFilter {
    bits: Box<[u8]>,
    hash_count: u32,
}

impl BitsetFilter {
    const HASH_COUNT: u32 = 4;

    fn bit_count(&self) -> usize {
        self.bits.len() * 8
    }

    fn hashes(&self, key: &[u8]) -> (u64, u64) {
        let mut h1 = DefaultHasher::new();
        key.hash(&mut h1);
        let a = h1.finish();

        let mut h2 = DefaultHasher::new();
        a.hash(&mut h2);
        key.len().hash(&mut h2);
        let b = h2.finish();

        (a, b)
    }

    fn set_bit(&mut self, idx: usize) {
        self.bits[idx / 8] |= 1 << (idx % 8);
    }

    fn get_bit(&self, idx: usize) -> bool {
        self.bits[idx / 8] & (1 << (idx % 8)) != 0
    }
}

impl MembershipFilter for BitsetFilter {
    fn from_bitset(bitset: &[u8]) -> Self {
        BitsetFilter {
            bits: bitset.to_vec().into_boxed_slice(),
            hash_count: Self::HASH_COUNT,
        }
    }

    fn add(&mut self, key: &[u8]) {
        if self.bit_count() == 0 {
            return;
        }
        let (a, b) = self.hashes(key);
        let m = self.bit_count() as u64;
        for i in 0..self.hash_count as u64 {
            let idx = (a.wrapping_add(i.wrapping_mul(b)) % m) as usize;
            self.set_bit(idx);
        }
    }

    fn contains(&self, key: &[u8]) -> bool {
        if self.bit_count() == 0 {
            return true;
        }
        let (a, b) = self.hashes(key);
        let m = self.bit_count() as u64;
        (0..self.hash_count as u64).all(|i| {
            let idx = (a.wrapping_add(i.wrapping_mul(b)) % m) as usize;
            self.get_bit(idx)
        })
    }

    fn bitset(&self) -> &[u8] {
        &self.bits
    }
}
