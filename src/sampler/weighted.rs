//! Sampling proportional to stake, without replacement

use super::{Error, Result};

use rand::Rng;

use std::collections::HashSet;
use std::hash::Hash;

/// Samples up to `k` distinct keys, each drawn with probability proportional to
/// its weight, without replacement.
///
/// Weights are summed in 128-bit arithmetic. When the sum exceeds 64 bits every
/// weight is divided by `(sum >> 64) + 1`, which brings the total back into
/// range while preserving relative proportions up to rounding. Entries whose
/// weight rounds down to zero can never be drawn.
#[derive(Debug, Clone)]
pub struct WeightedSampler<K> {
    /// `(key, cumulative adjusted weight)` - the segment for entry `i` is
    /// `(cumulative[i-1], cumulative[i]]`.
    cumulative: Vec<(K, u64)>,
    total: u64,
}

impl<K: Clone + Eq + Hash> WeightedSampler<K> {
    pub fn new(entries: Vec<(K, u64)>) -> Self {
        let sum: u128 = entries.iter().map(|(_, w)| *w as u128).sum();
        let factor = (sum >> 64) as u64 + 1;

        let mut cumulative = Vec::with_capacity(entries.len());
        let mut total: u64 = 0;
        for (key, weight) in entries {
            let adjusted = if factor == 1 { weight } else { weight / factor };
            if adjusted == 0 {
                continue;
            }
            total += adjusted;
            cumulative.push((key, total));
        }
        WeightedSampler { cumulative, total }
    }

    /// The adjusted weight total.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Draws up to `k` distinct keys. Fewer than `k` keys are returned when two
    /// draws land on the same entry or when the adjusted total is smaller than
    /// `k`. A request covering every entry returns them all.
    pub fn sample(&self, k: usize) -> Result<HashSet<K>> {
        let k = std::cmp::min(k as u128, self.total as u128) as usize;
        let mut keys = HashSet::new();
        if k == 0 {
            return Ok(keys);
        }
        if k >= self.cumulative.len() {
            return Ok(self.cumulative.iter().map(|(key, _)| key.clone()).collect());
        }

        let mut rng = rand::thread_rng();
        let mut drawn: HashSet<u64> = HashSet::new();
        while drawn.len() < k {
            let value = rng.gen_range(0, self.total);
            if !drawn.insert(value) {
                continue;
            }
            let key = self.locate(value)?;
            let _ = keys.insert(key);
        }
        Ok(keys)
    }

    /// Maps a uniform draw in `[0, total)` to the key owning that segment.
    fn locate(&self, value: u64) -> Result<K> {
        // First entry whose cumulative weight is strictly greater than `value`.
        let mut lo = 0usize;
        let mut hi = self.cumulative.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.cumulative[mid].1 <= value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        match self.cumulative.get(lo) {
            Some((key, _)) => Ok(key.clone()),
            None => Err(Error::InconsistentWeights),
        }
    }
}
