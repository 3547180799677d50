//! HyperLogLog cardinality sketch backing `CardinalityGuardian`.
//!
//! Precision is fixed at build time: 2^14 registers gives the standard ~1%
//! error the component design calls for. Memory is `O(2^precision)`
//! regardless of input cardinality — the whole point of using a sketch
//! rather than an exact hash set.

use std::hash::Hasher;
use twox_hash::XxHash64;

/// `2^14` registers.
pub const PRECISION: u32 = 14;
const REGISTER_COUNT: usize = 1 << PRECISION;

fn alpha(m: f64) -> f64 {
    0.7213 / (1.0 + 1.079 / m)
}

#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self {
            registers: vec![0u8; REGISTER_COUNT],
        }
    }

    fn hash(value: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(value.as_bytes());
        hasher.finish()
    }

    /// Adds one observation (typically a serialized attribute set) to the
    /// sketch.
    pub fn add(&mut self, value: &str) {
        let hash = Self::hash(value);
        let index = (hash >> (64 - PRECISION)) as usize;
        let rest = hash << PRECISION | (1 << (PRECISION - 1));
        let leading_zeros = rest.leading_zeros() as u8 + 1;
        if leading_zeros > self.registers[index] {
            self.registers[index] = leading_zeros;
        }
    }

    /// Returns the cardinality estimate, with small-range and large-range
    /// bias corrections applied.
    pub fn estimate(&self) -> f64 {
        let m = REGISTER_COUNT as f64;
        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
        let raw_estimate = alpha(m) * m * m / sum;

        let zero_registers = self.registers.iter().filter(|&&r| r == 0).count();
        if raw_estimate <= 2.5 * m && zero_registers > 0 {
            return m * (m / zero_registers as f64).ln();
        }

        let two_32 = 2f64.powi(32);
        if raw_estimate > two_32 / 30.0 {
            return -two_32 * (1.0 - raw_estimate / two_32).ln();
        }

        raw_estimate
    }

    /// Resets all registers, used when `max_unique` is decreased below the
    /// current estimate.
    pub fn reset(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_of_empty_sketch_is_zero() {
        let hll = HyperLogLog::new();
        assert_eq!(hll.estimate(), 0.0);
    }

    #[test]
    fn estimate_tracks_distinct_cardinality_within_tolerance() {
        let mut hll = HyperLogLog::new();
        for i in 0..5000 {
            hll.add(&format!("item-{i}"));
        }
        let estimate = hll.estimate();
        // 2^14 registers -> ~1% typical error; allow generous slack for a
        // single randomized run.
        assert!(
            (estimate - 5000.0).abs() / 5000.0 < 0.1,
            "estimate {estimate} too far from 5000"
        );
    }

    #[test]
    fn repeated_observations_do_not_inflate_estimate() {
        let mut hll = HyperLogLog::new();
        for _ in 0..10000 {
            hll.add("same-item");
        }
        assert!(hll.estimate() < 5.0);
    }

    #[test]
    fn reset_clears_registers() {
        let mut hll = HyperLogLog::new();
        for i in 0..1000 {
            hll.add(&format!("item-{i}"));
        }
        hll.reset();
        assert_eq!(hll.estimate(), 0.0);
    }
}
