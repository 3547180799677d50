//! Classical reservoir sampling (Algorithm R), stratified by an external key
//! supplied by the caller (default stratum key: priority).

use rand::Rng;

/// A single stratum's reservoir: up to `capacity` retained items plus the
/// running count of observations seen.
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    items: Vec<T>,
    seen: u64,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
            seen: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Offers one item with weight 1. Guarantees after N observations every
    /// item is retained with probability `min(1, capacity/N)`.
    pub fn offer(&mut self, item: T, rng: &mut impl Rng) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let j = rng.random_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.items[j as usize] = item;
        }
    }

    /// Resizes capacity. Shrinking truncates by uniform removal (a random
    /// subset is kept, not just a prefix, so no positional bias is
    /// introduced); growing leaves the existing items and new slots fill
    /// naturally from subsequent `offer` calls.
    pub fn resize(&mut self, new_capacity: usize, rng: &mut impl Rng) {
        if new_capacity < self.items.len() {
            // Fisher-Yates partial shuffle then truncate: keeps a uniform
            // random subset of size new_capacity.
            let len = self.items.len();
            for i in 0..new_capacity {
                let j = rng.random_range(i..len);
                self.items.swap(i, j);
            }
            self.items.truncate(new_capacity);
        }
        self.capacity = new_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn fills_up_to_capacity_then_stops_growing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut res = Reservoir::new(3);
        for i in 0..10 {
            res.offer(i, &mut rng);
        }
        assert_eq!(res.len(), 3);
        assert_eq!(res.seen(), 10);
    }

    #[test]
    fn resize_down_truncates_to_new_capacity() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut res = Reservoir::new(5);
        for i in 0..5 {
            res.offer(i, &mut rng);
        }
        res.resize(2, &mut rng);
        assert_eq!(res.len(), 2);
        assert_eq!(res.capacity(), 2);
    }

    #[test]
    fn resize_up_allows_further_growth() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut res: Reservoir<i32> = Reservoir::new(2);
        res.offer(1, &mut rng);
        res.offer(2, &mut rng);
        res.resize(5, &mut rng);
        res.offer(3, &mut rng);
        res.offer(4, &mut rng);
        assert_eq!(res.len(), 4);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    proptest! {
        /// `len` never exceeds `capacity`, and `seen` always equals the
        /// number of `offer` calls, regardless of capacity or stream length.
        #[test]
        fn len_never_exceeds_capacity(capacity in 0usize..10, n in 0usize..200, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut res = Reservoir::new(capacity);
            for i in 0..n {
                res.offer(i, &mut rng);
            }
            prop_assert!(res.len() <= capacity);
            prop_assert_eq!(res.seen(), n as u64);
        }

        /// Every retained item came from the observed stream.
        #[test]
        fn retained_items_are_a_subset_of_the_stream(capacity in 1usize..8, n in 0usize..100, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut res = Reservoir::new(capacity);
            for i in 0..n {
                res.offer(i, &mut rng);
            }
            for item in res.items() {
                prop_assert!(*item < n);
            }
        }

        /// Shrinking never leaves more items than the new capacity, and
        /// never fabricates items beyond what was retained.
        #[test]
        fn resize_down_respects_new_capacity(
            capacity in 1usize..10,
            shrink_to in 0usize..10,
            n in 0usize..100,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut res = Reservoir::new(capacity);
            for i in 0..n {
                res.offer(i, &mut rng);
            }
            let before = res.len();
            res.resize(shrink_to, &mut rng);
            prop_assert!(res.len() <= shrink_to.max(0));
            prop_assert!(res.len() <= before);
        }
    }
}
