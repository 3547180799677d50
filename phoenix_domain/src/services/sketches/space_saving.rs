//! Space-Saving heavy-hitter sketch, the algorithm behind `AdaptiveTopK`.
//!
//! Deterministic: ties for the minimum counter always break toward the
//! lowest insertion-order id, so repeated runs over the same input are
//! bit-identical (see the Open Question decision in the project's design
//! notes on pinning the tie-break rule).

/// One tracked counter: an observed id, its accumulated count, and the
/// error bound inherited from the counter it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub id: String,
    pub count: f64,
    pub error: f64,
    /// Monotonically increasing insertion sequence, used only to break ties
    /// deterministically.
    seq: u64,
}

/// Space-Saving sketch with a fixed capacity of `k` counters.
#[derive(Debug, Clone)]
pub struct SpaceSaving {
    k: usize,
    counters: Vec<Counter>,
    next_seq: u64,
    total_weight: f64,
}

impl SpaceSaving {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            counters: Vec::with_capacity(k),
            next_seq: 0,
            total_weight: 0.0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn tracked_count(&self) -> usize {
        self.counters.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// `coverage = sum(tracked counts) / total observed weight`.
    pub fn coverage(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 1.0;
        }
        let tracked: f64 = self.counters.iter().map(|c| c.count).sum();
        tracked / self.total_weight
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    /// Records one observation `(id, weight)`.
    pub fn observe(&mut self, id: &str, weight: f64) {
        self.total_weight += weight;

        if let Some(existing) = self.counters.iter_mut().find(|c| c.id == id) {
            existing.count += weight;
            return;
        }

        if self.counters.len() < self.k {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.counters.push(Counter {
                id: id.to_string(),
                count: weight,
                error: 0.0,
                seq,
            });
            return;
        }

        let min_idx = self.min_index();
        let old_min = self.counters[min_idx].count;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.counters[min_idx] = Counter {
            id: id.to_string(),
            count: old_min + weight,
            error: old_min,
            seq,
        };
    }

    /// Index of the minimum counter. Ties break toward the lowest `seq`
    /// (oldest insertion), pinning a deterministic, stable rule.
    fn min_index(&self) -> usize {
        let mut best = 0;
        for (i, c) in self.counters.iter().enumerate().skip(1) {
            let cur = &self.counters[best];
            if c.count < cur.count || (c.count == cur.count && c.seq < cur.seq) {
                best = i;
            }
        }
        best
    }

    /// Resizes capacity to `new_k`. When shrinking, evicts the
    /// smallest-count counters (ties break toward lowest `seq`, same rule as
    /// eviction-on-insert) until capacity is met; when growing, new slots
    /// are simply available for future `observe` calls.
    pub fn resize(&mut self, new_k: usize) {
        self.k = new_k;
        while self.counters.len() > self.k {
            let idx = self.min_index();
            self.counters.remove(idx);
        }
    }

    /// Clears all tracked counters and resets accumulated weight, used when
    /// `enabled` toggles off then on.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.total_weight = 0.0;
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_up_to_k_distinct_ids() {
        let mut ss = SpaceSaving::new(3);
        ss.observe("a", 1.0);
        ss.observe("b", 1.0);
        ss.observe("c", 1.0);
        assert_eq!(ss.tracked_count(), 3);
        assert_eq!(ss.coverage(), 1.0);
    }

    #[test]
    fn true_top_k_is_retained_once_weight_exceeds_total_over_k() {
        let mut ss = SpaceSaving::new(2);
        // "heavy" should always survive once its weight exceeds total/k.
        ss.observe("noise1", 1.0);
        ss.observe("noise2", 1.0);
        ss.observe("heavy", 100.0);
        ss.observe("noise3", 1.0);
        ss.observe("noise4", 1.0);
        assert!(ss.counters().iter().any(|c| c.id == "heavy"));
    }

    #[test]
    fn resize_down_evicts_smallest_counters() {
        let mut ss = SpaceSaving::new(3);
        ss.observe("a", 10.0);
        ss.observe("b", 5.0);
        ss.observe("c", 1.0);
        ss.resize(2);
        assert_eq!(ss.tracked_count(), 2);
        assert!(!ss.counters().iter().any(|c| c.id == "c"));
    }

    #[test]
    fn reset_clears_state() {
        let mut ss = SpaceSaving::new(2);
        ss.observe("a", 10.0);
        ss.reset();
        assert_eq!(ss.tracked_count(), 0);
        assert_eq!(ss.total_weight(), 0.0);
    }

    #[test]
    fn replacing_minimum_inherits_error() {
        let mut ss = SpaceSaving::new(1);
        ss.observe("a", 5.0);
        ss.observe("b", 3.0);
        assert_eq!(ss.counters()[0].id, "b");
        assert_eq!(ss.counters()[0].error, 5.0);
        assert_eq!(ss.counters()[0].count, 8.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Never tracks more than `k` distinct ids, regardless of input.
        #[test]
        fn never_exceeds_capacity(k in 1usize..8, ids in proptest::collection::vec(0u32..12, 1..200)) {
            let mut ss = SpaceSaving::new(k);
            for id in &ids {
                ss.observe(&id.to_string(), 1.0);
            }
            prop_assert!(ss.tracked_count() <= k);
        }

        /// An estimated count never overstates the true count: `count - error`
        /// is the Space-Saving algorithm's guaranteed lower bound.
        #[test]
        fn estimate_lower_bound_never_exceeds_true_count(
            k in 1usize..6,
            ids in proptest::collection::vec(0u32..4, 1..150),
        ) {
            let mut ss = SpaceSaving::new(k);
            let mut truth = std::collections::HashMap::new();
            for id in &ids {
                ss.observe(&id.to_string(), 1.0);
                *truth.entry(*id).or_insert(0.0) += 1.0;
            }
            for c in ss.counters() {
                let id: u32 = c.id.parse().unwrap();
                let true_count = truth[&id];
                prop_assert!(c.count - c.error <= true_count + 1e-9);
                prop_assert!(c.count >= true_count - 1e-9);
            }
        }

        /// `coverage` is always within `[0, 1]`.
        #[test]
        fn coverage_is_bounded(k in 1usize..6, ids in proptest::collection::vec(0u32..10, 0..150)) {
            let mut ss = SpaceSaving::new(k);
            for id in &ids {
                ss.observe(&id.to_string(), 1.0);
            }
            let coverage = ss.coverage();
            prop_assert!((0.0..=1.0001).contains(&coverage));
        }
    }
}
