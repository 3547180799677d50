//! `PIDController`: single-input single-output controller with anti-windup,
//! derivative low-pass filtering, hysteresis, and an oscillation-detection
//! circuit breaker. All state is per-controller; running several
//! concurrently shares nothing.

use std::collections::VecDeque;

/// Tuning and safety parameters for one controller instance. Mirrors the
/// `ControllerSpec` fields relevant to the math itself (KPI name and patch
/// projection live one layer up, in the governor).
#[derive(Debug, Clone, Copy)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Low-pass filter coefficient for the derivative term, in (0, 1).
    pub derivative_filter_alpha: f64,
    pub output_min: f64,
    pub output_max: f64,
    /// `Kaw` in the anti-windup back-calculation; must be > 0 when
    /// anti-windup is enabled.
    pub anti_windup_kaw: f64,
    pub anti_windup: bool,
    /// Below this fraction of `|e| / |r|`, `u` holds its previous value.
    pub hysteresis_percent: f64,
    /// Ring buffer length for the oscillation detector.
    pub oscillation_window: usize,
    /// Error magnitude below which a sample does not count toward a zero
    /// crossing.
    pub oscillation_significance: f64,
    /// Zero-crossing fraction above which the breaker considers the signal
    /// oscillating.
    pub oscillation_fraction_threshold: f64,
    /// The oscillating condition must persist at least this many
    /// evaluations before the breaker trips.
    pub oscillation_min_duration_evals: u32,
    /// Duration (in evaluations) the breaker stays tripped once it trips.
    pub oscillation_reset_duration_evals: u32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            derivative_filter_alpha: 0.2,
            output_min: 0.0,
            output_max: 1.0,
            anti_windup_kaw: 1.0,
            anti_windup: true,
            hysteresis_percent: 0.0,
            oscillation_window: 20,
            oscillation_significance: 1e-6,
            oscillation_fraction_threshold: 0.4,
            oscillation_min_duration_evals: 5,
            oscillation_reset_duration_evals: 10,
        }
    }
}

/// Tracks the last N error samples and decides whether the loop is
/// oscillating, implementing the spec's circuit breaker.
#[derive(Debug, Clone)]
struct OscillationDetector {
    window: VecDeque<f64>,
    capacity: usize,
    significance: f64,
    fraction_threshold: f64,
    min_duration: u32,
    reset_duration: u32,
    consecutive_oscillating_evals: u32,
    tripped: bool,
    evals_since_trip: u32,
}

impl OscillationDetector {
    fn new(config: &PidConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.oscillation_window),
            capacity: config.oscillation_window,
            significance: config.oscillation_significance,
            fraction_threshold: config.oscillation_fraction_threshold,
            min_duration: config.oscillation_min_duration_evals,
            reset_duration: config.oscillation_reset_duration_evals,
            consecutive_oscillating_evals: 0,
            tripped: false,
            evals_since_trip: 0,
        }
    }

    /// Feeds one new error sample and updates trip state. Returns whether
    /// the breaker is tripped after this observation.
    fn observe(&mut self, error: f64) -> bool {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(error);

        if self.tripped {
            self.evals_since_trip += 1;
            if self.evals_since_trip >= self.reset_duration {
                self.tripped = false;
                self.consecutive_oscillating_evals = 0;
                self.evals_since_trip = 0;
            }
            return self.tripped;
        }

        if self.is_oscillating_now() {
            self.consecutive_oscillating_evals += 1;
        } else {
            self.consecutive_oscillating_evals = 0;
        }

        if self.consecutive_oscillating_evals >= self.min_duration {
            self.tripped = true;
            self.evals_since_trip = 0;
        }

        self.tripped
    }

    fn is_oscillating_now(&self) -> bool {
        let significant: Vec<f64> = self
            .window
            .iter()
            .copied()
            .filter(|e| e.abs() >= self.significance)
            .collect();
        if significant.len() < 2 {
            return false;
        }
        let crossings = significant
            .windows(2)
            .filter(|pair| pair[0].signum() != pair[1].signum())
            .count();
        let fraction = crossings as f64 / (significant.len() - 1) as f64;
        fraction > self.fraction_threshold
    }
}

/// A PID controller instance. Call [`PidController::evaluate`] once per
/// governor tick.
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integral: f64,
    prev_error: Option<f64>,
    prev_derivative: f64,
    prev_output: f64,
    oscillation: OscillationDetector,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        let oscillation = OscillationDetector::new(&config);
        Self {
            config,
            integral: 0.0,
            prev_error: None,
            prev_derivative: 0.0,
            prev_output: (config.output_min + config.output_max) / 2.0,
            oscillation,
        }
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn circuit_tripped(&self) -> bool {
        self.oscillation.tripped
    }

    pub fn last_output(&self) -> f64 {
        self.prev_output
    }

    /// Runs one evaluation: `r` setpoint, `y` measurement, `dt` seconds
    /// since the previous evaluation. Returns the clamped output `u`.
    pub fn evaluate(&mut self, r: f64, y: f64, dt: f64) -> f64 {
        let error = r - y;

        let tripped = self.oscillation.observe(error);
        if tripped {
            self.prev_error = Some(error);
            return self.prev_output;
        }

        if r.abs() > 0.0 && (error.abs() / r.abs()) < self.config.hysteresis_percent {
            self.prev_error = Some(error);
            return self.prev_output;
        }

        let p = self.config.kp * error;

        let mut integral = self.integral + self.config.ki * error * dt;

        let derivative = match self.prev_error {
            Some(prev_error) if dt > 0.0 => {
                let raw = self.config.kd * (error - prev_error) / dt;
                self.config.derivative_filter_alpha * self.prev_derivative
                    + (1.0 - self.config.derivative_filter_alpha) * raw
            }
            _ => 0.0,
        };

        let u_unclamped = p + integral + derivative;
        let u = u_unclamped.clamp(self.config.output_min, self.config.output_max);

        if self.config.anti_windup {
            integral += self.config.anti_windup_kaw * (u - u_unclamped) * dt;
        }

        self.integral = integral;
        self.prev_derivative = derivative;
        self.prev_error = Some(error);
        self.prev_output = u;
        u
    }
}
