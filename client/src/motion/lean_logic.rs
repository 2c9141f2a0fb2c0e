use std::time::Duration;

use swayroom_shared::protocol::clamp_unit;
use thiserror::Error;

/// Largest integration step in seconds. Longer frames (background tabs,
/// stalls) are integrated as if only this much time had passed.
pub const MAX_STEP_DT: f64 = 0.05;

#[derive(Debug, Error, PartialEq)]
pub enum LeanConfigError {
    #[error("{0} must be positive and finite")]
    NotPositive(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeanConfig {
    /// Velocity low-pass time constant, seconds
    pub tau: f64,
    /// Degrees of lean per normalized unit/s of horizontal velocity
    pub gain: f64,
    pub max_angle_deg: f64,
    /// Spring natural frequency, rad/s
    pub natural_freq: f64,
    pub damping_ratio: f64,
    pub update_interval: Duration,
    pub min_delta_deg: f64,
    pub rest_speed_deg: f64,
    pub rest_distance_deg: f64,
    pub frame: Duration,
}

impl Default for LeanConfig {
    fn default() -> Self {
        Self {
            tau: 0.08,
            gain: 20.0,
            max_angle_deg: 30.0,
            natural_freq: 12.0,
            damping_ratio: 0.55,
            update_interval: Duration::from_millis(50),
            min_delta_deg: 0.5,
            rest_speed_deg: 1.0,
            rest_distance_deg: 0.25,
            frame: Duration::from_millis(16),
        }
    }
}

impl LeanConfig {
    pub fn validate(&self) -> Result<(), LeanConfigError> {
        let positive = [
            ("tau", self.tau),
            ("max_angle_deg", self.max_angle_deg),
            ("natural_freq", self.natural_freq),
            ("frame", self.frame.as_secs_f64()),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LeanConfigError::NotPositive(name));
            }
        }
        let non_negative = [
            ("gain", self.gain),
            ("damping_ratio", self.damping_ratio),
            ("min_delta_deg", self.min_delta_deg),
            ("rest_speed_deg", self.rest_speed_deg),
            ("rest_distance_deg", self.rest_distance_deg),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(LeanConfigError::Negative(name));
            }
        }
        Ok(())
    }
}

/// Velocity-driven lean: low-pass filtered horizontal velocity sets a target
/// angle, a damped spring chases it.
#[derive(Debug, Clone)]
pub struct LeanModel {
    config: LeanConfig,
    prev_x: Option<f64>,
    vx_filt: f64,
    theta: f64,
    omega: f64,
    target: f64,
    last_emitted: f64,
    since_emit: f64,
    triggered: bool,
}

impl LeanModel {
    pub fn new(config: LeanConfig) -> Self {
        let since_emit = config.update_interval.as_secs_f64();
        Self {
            config,
            prev_x: None,
            vx_filt: 0.0,
            theta: 0.0,
            omega: 0.0,
            target: 0.0,
            last_emitted: 0.0,
            since_emit,
            triggered: false,
        }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Mark that input occurred; the next step emits unconditionally.
    pub fn trigger(&mut self) {
        self.triggered = true;
    }

    /// Advance by `dt` seconds with the current horizontal position `x`.
    /// Returns the angle when it should be published.
    pub fn step(&mut self, x: f64, dt: f64) -> Option<f64> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.since_emit += dt;
        let h = dt.min(MAX_STEP_DT);

        let raw_vx = if x.is_finite() {
            let x = clamp_unit(x);
            let prev = self.prev_x.replace(x).unwrap_or(x);
            if h > 0.0 {
                (x - prev) / h
            } else {
                0.0
            }
        } else {
            self.prev_x = Some(0.5);
            0.0
        };

        if h > 0.0 {
            self.integrate(raw_vx, h);
        }

        let triggered = std::mem::take(&mut self.triggered);
        let due = self.since_emit >= self.config.update_interval.as_secs_f64()
            && (self.theta - self.last_emitted).abs() >= self.config.min_delta_deg;

        if triggered || (!self.is_at_rest() && due) {
            self.last_emitted = self.theta;
            self.since_emit = 0.0;
            Some(self.theta)
        } else {
            None
        }
    }

    pub fn is_at_rest(&self) -> bool {
        self.omega.abs() < self.config.rest_speed_deg
            && (self.target - self.theta).abs() < self.config.rest_distance_deg
    }

    fn integrate(&mut self, raw_vx: f64, h: f64) {
        let c = &self.config;
        let max = c.max_angle_deg;

        self.vx_filt += (raw_vx - self.vx_filt) * h / (c.tau + h);
        self.target = (-c.gain * self.vx_filt).clamp(-max, max);

        let k = c.natural_freq * c.natural_freq;
        let damping = 2.0 * c.damping_ratio * c.natural_freq;
        self.omega += (k * (self.target - self.theta) - damping * self.omega) * h;
        self.theta += self.omega * h;

        if self.theta.abs() > max {
            self.theta = self.theta.clamp(-max, max);
            self.omega = 0.0;
        }
    }
}
