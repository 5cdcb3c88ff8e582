//! First-order DC servo motor model
//!
//! The motor responds to a bounded integer control signal with a first-order
//! velocity lag: a constant signal converges on a proportional steady-state
//! velocity with time constant tau. Position integrates velocity without
//! wrapping; the attached encoder owns the modulo-one-revolution view.

use crate::sim::AtomicF64;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicI32, Ordering};

/// Convert a rotational speed in RPM to rad/s
#[inline]
pub fn rpm_to_rad_s(rpm: f64) -> f64 {
    rpm * (2.0 * PI / 60.0)
}

/// Convert a rotational speed in rad/s to RPM
#[inline]
pub fn rad_s_to_rpm(rad_s: f64) -> f64 {
    rad_s * (60.0 / (2.0 * PI))
}

/// Simulated DC servo motor
///
/// State lives in atomics so the stepper thread can run `step` through a
/// shared reference while board threads write the control signal and the
/// terminal UI reads velocity and position.
pub struct Motor {
    /// Commanded effort, clamped to ±max_control_signal on assignment
    control_signal: AtomicI32,
    /// Angular velocity (rad/s), written only by the stepper thread
    angular_velocity: AtomicF64,
    /// Angular position (rad), monotonic, written only by the stepper thread
    angular_position: AtomicF64,

    max_angular_velocity: f64,
    max_control_signal: i32,
    time_constant: f64,
}

impl Motor {
    /// Create a motor from its three immutable parameters
    ///
    /// # Arguments
    /// * `max_velocity_rpm` - no-load speed at full control signal, in RPM
    /// * `max_control_signal` - control signal range is ±this value
    /// * `time_constant` - seconds to reach ~63% of a velocity target
    pub fn new(max_velocity_rpm: f64, max_control_signal: i32, time_constant: f64) -> Self {
        Self {
            control_signal: AtomicI32::new(0),
            angular_velocity: AtomicF64::new(0.0),
            angular_position: AtomicF64::new(0.0),
            max_angular_velocity: rpm_to_rad_s(max_velocity_rpm),
            max_control_signal,
            time_constant,
        }
    }

    /// Set the control signal, clamped to ±max_control_signal
    ///
    /// The store uses release ordering; `step` observes it with acquire, so
    /// the stepper always sees the most recent published command.
    pub fn set_control_signal(&self, signal: i32) {
        let clamped = signal.clamp(-self.max_control_signal, self.max_control_signal);
        self.control_signal.store(clamped, Ordering::Release);
    }

    /// Advance the motor state by one tick
    ///
    /// Explicit Euler integration of `dω/dt = (target - ω) / τ`, with the
    /// velocity clamped post-step to guard the limit against numerical
    /// excursion at the boundary.
    pub fn step(&self, dt: f64) {
        let signal = self.control_signal.load(Ordering::Acquire);
        let target =
            (signal as f64 / self.max_control_signal as f64) * self.max_angular_velocity;

        let mut velocity = self.angular_velocity.load(Ordering::Relaxed);
        velocity += (target - velocity) * dt / self.time_constant;
        velocity = velocity.clamp(-self.max_angular_velocity, self.max_angular_velocity);
        self.angular_velocity.store(velocity, Ordering::Relaxed);

        let position = self.angular_position.load(Ordering::Relaxed);
        self.angular_position
            .store(position + velocity * dt, Ordering::Relaxed);
    }

    /// Current control signal
    pub fn control_signal(&self) -> i32 {
        self.control_signal.load(Ordering::Relaxed)
    }

    /// Current angular velocity in rad/s
    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity.load(Ordering::Relaxed)
    }

    /// Accumulated angular position in radians (no wrap)
    pub fn angular_position(&self) -> f64 {
        self.angular_position.load(Ordering::Relaxed)
    }

    /// Maximum angular velocity in rad/s
    pub fn max_angular_velocity(&self) -> f64 {
        self.max_angular_velocity
    }

    /// Maximum control signal magnitude
    pub fn max_control_signal(&self) -> i32 {
        self.max_control_signal
    }

    /// Motor time constant in seconds
    pub fn time_constant(&self) -> f64 {
        self.time_constant
    }

    /// Restore the power-on state
    pub fn reset(&self) {
        self.control_signal.store(0, Ordering::Release);
        self.angular_velocity.store(0.0, Ordering::Relaxed);
        self.angular_position.store(0.0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_signal_clamped() {
        let motor = Motor::new(60.0, 100, 0.15);
        motor.set_control_signal(5000);
        assert_eq!(motor.control_signal(), 100);
        motor.set_control_signal(-5000);
        assert_eq!(motor.control_signal(), -100);
        motor.set_control_signal(42);
        assert_eq!(motor.control_signal(), 42);
    }

    #[test]
    fn test_spin_up_reaches_63_percent_at_tau() {
        // Full signal from standstill: after one time constant the velocity
        // should sit at 1 - 1/e of the maximum, within 2%.
        let motor = Motor::new(60.0, 100, 0.1);
        let dt: f64 = 1.0 / 20_000.0;
        motor.set_control_signal(100);

        let ticks = (0.1 / dt).round() as usize;
        for _ in 0..ticks {
            motor.step(dt);
        }

        let expected = (1.0 - (-1.0f64).exp()) * motor.max_angular_velocity();
        let actual = motor.angular_velocity();
        assert!(
            (actual - expected).abs() / expected < 0.02,
            "velocity {} expected ~{}",
            actual,
            expected
        );
    }

    #[test]
    fn test_velocity_never_exceeds_limit() {
        let motor = Motor::new(60.0, 100, 0.05);
        let dt: f64 = 1.0 / 20_000.0;
        motor.set_control_signal(100);
        for _ in 0..100_000 {
            motor.step(dt);
            assert!(motor.angular_velocity().abs() <= motor.max_angular_velocity());
        }
        // Converged to steady state at the limit
        assert!(motor.angular_velocity() > 0.99 * motor.max_angular_velocity());
    }

    #[test]
    fn test_position_integrates_velocity() {
        let motor = Motor::new(60.0, 100, 0.01);
        let dt = 0.001;
        motor.set_control_signal(100);
        // Well past the transient: position grows at ~max velocity
        for _ in 0..1000 {
            motor.step(dt);
        }
        let p1 = motor.angular_position();
        for _ in 0..1000 {
            motor.step(dt);
        }
        let advance = motor.angular_position() - p1;
        let expected = motor.max_angular_velocity() * 1.0;
        assert!((advance - expected).abs() / expected < 0.01);
    }

    #[test]
    fn test_negative_signal_reverses() {
        let motor = Motor::new(60.0, 100, 0.05);
        motor.set_control_signal(-100);
        for _ in 0..10_000 {
            motor.step(1.0 / 20_000.0);
        }
        assert!(motor.angular_velocity() < 0.0);
        assert!(motor.angular_position() < 0.0);
    }

    #[test]
    fn test_reset() {
        let motor = Motor::new(60.0, 100, 0.1);
        motor.set_control_signal(50);
        for _ in 0..1000 {
            motor.step(0.001);
        }
        motor.reset();
        assert_eq!(motor.control_signal(), 0);
        assert_eq!(motor.angular_velocity(), 0.0);
        assert_eq!(motor.angular_position(), 0.0);
    }

    #[test]
    fn test_rpm_conversion_round_trip() {
        let rad_s = rpm_to_rad_s(120.0);
        assert!((rad_s_to_rpm(rad_s) - 120.0).abs() < 1e-9);
    }
}
