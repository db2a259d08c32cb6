//! Splitmix64 engine and the endpoint-preserving Bernoulli sampler used for
//! every randomized decision in the trainer (sample/variable subsetting,
//! forest diversity, the Ada `cycle` warm start).
//!
//! Ported from `original_source/Source/Cpp/JrBoostLib/BernoulliDistribution.h`:
//! the `FastBernoulliDistribution` inequality `a * n < b * m`, with `b`
//! inflated by `1 + 2*eps` so that `BD(n, n)` is always true despite rounding.

use std::cell::RefCell;

/// A Splitmix64 pseudo-random engine.
///
/// Not cryptographically secure; chosen for speed and a tiny, easily-seeded
/// state, matching the source library's choice of engine.
#[derive(Clone, Debug)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        SplitMix64 { state: seed }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        // 53 significant bits, uniform in [0, 1).
        let bits = self.next_u64() >> 11;
        (bits as f64) * (1.0 / (1u64 << 53) as f64)
    }

    /// Endpoint-preserving Bernoulli(m, n): returns true with probability
    /// approximately `m / n`, always false for `m == 0`, always true for
    /// `m == n`.
    #[inline]
    pub fn bernoulli(&mut self, m: u64, n: u64) -> bool {
        debug_assert!(m <= n);
        let a = self.next_u64() as f64;
        let b = (u64::MAX as f64 + 1.0) * (1.0 + 2.0 * f64::EPSILON);
        a * (n as f64) < b * (m as f64)
    }
}

thread_local! {
    static THREAD_RNG: RefCell<SplitMix64> = RefCell::new(SplitMix64::new(seed_nondeterministic()));
}

fn seed_nondeterministic() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let tid = std::thread::current().id();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    use std::hash::{Hash, Hasher};
    tid.hash(&mut hasher);
    nanos.hash(&mut hasher);
    hasher.finish() ^ nanos.rotate_left(17)
}

/// Run `f` with exclusive access to the calling thread's RNG instance.
pub fn with_thread_rng<R>(f: impl FnOnce(&mut SplitMix64) -> R) -> R {
    THREAD_RNG.with(|rng| f(&mut rng.borrow_mut()))
}

/// Select `count` indices out of `0..total`, preserving ascending order,
/// each index included with probability reflecting a uniform draw without
/// replacement. Endpoint-exact: `count == 0` returns nothing, `count == total`
/// returns everything.
pub fn ordered_random_subset(rng: &mut SplitMix64, total: usize, count: usize) -> Vec<usize> {
    assert!(count <= total);
    let mut out = Vec::with_capacity(count);
    let mut remaining_total = total as u64;
    let mut remaining_count = count as u64;
    for i in 0..total {
        if remaining_count == 0 {
            break;
        }
        if rng.bernoulli(remaining_count, remaining_total) {
            out.push(i);
            remaining_count -= 1;
        }
        remaining_total -= 1;
    }
    out
}
