//! Seeded random corpora for tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn random_bytes(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(1..=max_len);
    (0..len).map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())]).collect()
}

/// `n` random key-value pairs, unsorted, duplicate keys possible.
pub fn random_kv(n: usize, max_len: usize, seed: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (random_bytes(&mut rng, max_len), random_bytes(&mut rng, max_len))).collect()
}

/// Random pairs sorted by key with duplicate keys removed (first occurrence
/// wins), ready to feed a table builder. May return fewer than `n` pairs.
pub fn sorted_random_kv(n: usize, max_len: usize, seed: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut kv = random_kv(n, max_len, seed);
    kv.sort_by(|x, y| x.0.cmp(&y.0));
    kv.dedup_by(|x, y| x.0 == y.0);
    kv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_random_kv_is_strictly_ascending() {
        let kv = sorted_random_kv(1000, 8, 1);
        for pair in kv.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_seed_determinism() {
        assert_eq!(random_kv(100, 16, 7), random_kv(100, 16, 7));
        assert_ne!(random_kv(100, 16, 7), random_kv(100, 16, 8));
    }
}
