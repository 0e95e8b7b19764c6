//! Deterministic random numbers for the synthetic ledger feed.
//!
//! RULE: the feed never calls a platform RNG. Every stream is derived
//! from the single `--seed`, one stream per feed concern, so adding a
//! new stream never changes the others.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

#[derive(Debug, Clone, Copy)]
#[repr(u64)]
pub enum FeedStream {
    Customers = 0,
    Transactions = 1,
    Analysts = 2,
}

pub struct FeedRng {
    inner: Pcg64Mcg,
}

impl FeedRng {
    pub fn new(master_seed: u64, stream: FeedStream) -> Self {
        let derived = master_seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    /// Float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Integer in [lo, hi). Returns `lo` for an empty range.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        lo + self.inner.next_u64() % (hi - lo)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.range(0, items.len() as u64) as usize;
        items.get(i)
    }
}
