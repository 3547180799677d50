//! Generic bounded tunable value object.
//!
//! Every tunable parameter a processor exposes has a declared `[min, max]`
//! bound (spec invariant: "the applied value is always within bounds").
//! `BoundedParam` is the single place that rule is enforced, the way
//! `WorkerCount`/`ChunkSize` enforce their own bounds at construction time.

use crate::error::PhoenixError;
use serde::{Deserialize, Serialize};

/// A value together with the inclusive bound it must stay within.
///
/// Unlike `WorkerCount`'s clamp-on-construct policy, `BoundedParam::set`
/// rejects out-of-bounds updates rather than silently clamping them — patch
/// validation (spec §4.9 step 4) depends on being able to tell the difference
/// between "applied" and "rejected".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedParam<T> {
    value: T,
    min: T,
    max: T,
}

impl<T> BoundedParam<T>
where
    T: PartialOrd + Copy + std::fmt::Display + Into<f64>,
{
    /// Creates a new bounded parameter, clamping `initial` into `[min, max]`.
    /// Used for construction from trusted defaults (policy documents),
    /// where clamping rather than rejecting keeps startup infallible.
    pub fn new(initial: T, min: T, max: T) -> Self {
        let value = if initial < min {
            min
        } else if initial > max {
            max
        } else {
            initial
        };
        Self { value, min, max }
    }

    pub fn get(&self) -> T {
        self.value
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    /// Attempts to update the value. Rejects (without mutating `self`) if
    /// `candidate` falls outside `[min, max]`.
    pub fn set(&mut self, candidate: T, parameter: &str) -> Result<(), PhoenixError> {
        if candidate < self.min || candidate > self.max {
            return Err(PhoenixError::OutOfBounds {
                parameter: parameter.to_string(),
                value: candidate.into(),
                min: self.min.into(),
                max: self.max.into(),
            });
        }
        self.value = candidate;
        Ok(())
    }

    /// Clamps `candidate` into `[min, max]` and applies it unconditionally.
    /// Used by the governor's `project` step, which computes
    /// `clamp(base + scale_factor * u, min, max)` itself (spec §4.9 step 3)
    /// and so never needs a rejection path here.
    pub fn clamp_set(&mut self, candidate: T) {
        self.value = if candidate < self.min {
            self.min
        } else if candidate > self.max {
            self.max
        } else {
            candidate
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_into_bounds() {
        let p = BoundedParam::new(500i64, 10, 100);
        assert_eq!(p.get(), 100);
        let p = BoundedParam::new(-5i64, 10, 100);
        assert_eq!(p.get(), 10);
    }

    #[test]
    fn set_rejects_out_of_bounds_without_mutating() {
        let mut p = BoundedParam::new(50i64, 10, 100);
        let err = p.set(500, "topk.k_value").unwrap_err();
        assert!(matches!(err, PhoenixError::OutOfBounds { .. }));
        assert_eq!(p.get(), 50);
    }

    #[test]
    fn set_within_bounds_applies() {
        let mut p = BoundedParam::new(50i64, 10, 100);
        p.set(75, "topk.k_value").unwrap();
        assert_eq!(p.get(), 75);
    }
}
