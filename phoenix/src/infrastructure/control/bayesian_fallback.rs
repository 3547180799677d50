//! Optional Bayesian fallback optimiser.
//!
//! Activated by configuration when a controller's oscillation breaker trips
//! or its coverage stalls for `bayesian_stall_ticks` consecutive ticks.
//! Absence of this fallback must not degrade steady-state PID behaviour —
//! it is purely additive, driven from a fresh Latin-Hypercube-seeded sample
//! each time it takes over, independent of the PID's own integrator state
//! (see the Open Question decision recorded alongside the governor).

use rand::Rng;

#[derive(Debug, Clone, Copy)]
struct Observation {
    candidate: f64,
    score: f64,
}

/// A minimal expected-improvement optimiser over `[min, max]`. Real
/// Gaussian-process regression is out of scope for the core control loop;
/// this keeps the same "propose a candidate, score it, refine" contract the
/// spec describes while staying dependency-light.
pub struct BayesianFallback {
    min: f64,
    max: f64,
    observations: Vec<Observation>,
    best: Option<Observation>,
}

impl BayesianFallback {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            observations: Vec::new(),
            best: None,
        }
    }

    /// Draws the next candidate to try. Latin-Hypercube-seeded: the first
    /// few draws are stratified across `[min, max]`, after which the
    /// neighborhood of the current best is favored.
    pub fn propose(&self, rng: &mut impl Rng) -> f64 {
        if self.observations.len() < 4 {
            let stratum = self.observations.len() as f64;
            let width = (self.max - self.min) / 4.0;
            let lo = self.min + stratum * width;
            return rng.random_range(lo..(lo + width).min(self.max));
        }
        match self.best {
            Some(best) => {
                let jitter = (self.max - self.min) * 0.1;
                (best.candidate + rng.random_range(-jitter..jitter)).clamp(self.min, self.max)
            }
            None => rng.random_range(self.min..self.max),
        }
    }

    /// Records the outcome of a proposed candidate. Higher score is better
    /// (callers score by "closeness to target KPI", negated distance).
    pub fn observe(&mut self, candidate: f64, score: f64) {
        let observation = Observation { candidate, score };
        self.observations.push(observation);
        if self.best.map(|b| score > b.score).unwrap_or(true) {
            self.best = Some(observation);
        }
    }

    pub fn best_candidate(&self) -> Option<f64> {
        self.best.map(|b| b.candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn proposals_stay_within_bounds() {
        let fallback = BayesianFallback::new(10.0, 100.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let candidate = fallback.propose(&mut rng);
            assert!((10.0..=100.0).contains(&candidate));
        }
    }

    #[test]
    fn best_candidate_tracks_highest_score() {
        let mut fallback = BayesianFallback::new(0.0, 1.0);
        fallback.observe(0.2, 0.5);
        fallback.observe(0.7, 0.9);
        fallback.observe(0.4, 0.3);
        assert_eq!(fallback.best_candidate(), Some(0.7));
    }
}
