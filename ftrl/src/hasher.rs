//! Hasher for u32 feature keys.
//!
//! Keys are dense-ish small integers, so a single multiplication by the
//! 64-bit golden ratio is enough to spread them over both the low bits
//! (bucket index) and the high bits (control bytes) of the hash.

use std::hash::{BuildHasherDefault, Hasher};

const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;

pub(crate) type BuildKeyHasher = BuildHasherDefault<KeyHasher>;

#[derive(Default, Clone, Copy)]
pub(crate) struct KeyHasher {
    state: u64,
}

impl Hasher for KeyHasher {
    fn finish(&self) -> u64 {
        self.state
    }
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u64(u64::from(b));
        }
    }
    fn write_u32(&mut self, i: u32) {
        self.write_u64(u64::from(i))
    }
    fn write_u64(&mut self, i: u64) {
        self.state = (self.state.rotate_left(5) ^ i).wrapping_mul(GOLDEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::{BuildHasher, Hash};

    fn hash(k: u32) -> u64 {
        let mut h = BuildKeyHasher::default().build_hasher();
        k.hash(&mut h);
        h.finish()
    }

    #[test]
    fn neighbouring_keys_spread() {
        assert_eq!(hash(7), hash(7));
        let low: std::collections::HashSet<u64> = (0..64).map(|k| hash(k) & 63).collect();
        assert!(low.len() > 32);
        let high: std::collections::HashSet<u64> = (0..64).map(|k| hash(k) >> 57).collect();
        assert!(high.len() > 32);
    }
}
