//! Absolute rotary encoder model
//!
//! Simulates an absolute encoder with `2^bits` discrete positions per
//! revolution. Sub-step motion accumulates in a fractional remainder so that
//! arbitrarily slow rotation is never lost to per-tick rounding; whole steps
//! carry into the position counter, which wraps modulo one revolution.

use crate::sim::AtomicF64;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};

/// Simulated absolute encoder
///
/// `position_steps` is a single primitive written only by the stepper
/// thread, so board tasks can snapshot it atomically without locking.
pub struct Encoder {
    /// Current position in [0, max_steps)
    position_steps: AtomicU32,
    /// Accumulated fractional steps in (-1, +1), stepper thread only
    fractional_steps: AtomicF64,

    bits: u32,
    max_steps: u32,
    direction_inverted: bool,
    steps_per_radian: f64,
    radians_per_step: f64,
}

impl Encoder {
    /// Create an encoder with `2^bits` positions per revolution
    ///
    /// `bits` must be in 1..=31 so the step counter fits an `i64` update
    /// without overflow; the configuration loader enforces this before
    /// construction.
    pub fn new(bits: u32, direction_inverted: bool) -> Self {
        debug_assert!((1..=31).contains(&bits));
        let max_steps = 1u32 << bits;
        Self {
            position_steps: AtomicU32::new(0),
            fractional_steps: AtomicF64::new(0.0),
            bits,
            max_steps,
            direction_inverted,
            steps_per_radian: max_steps as f64 / (2.0 * PI),
            radians_per_step: (2.0 * PI) / max_steps as f64,
        }
    }

    /// Advance the encoder by one tick of rotation at `angular_velocity`
    ///
    /// Whole steps are truncated toward zero out of the accumulator; the
    /// remainder is carried so slow motion eventually crosses a step
    /// boundary instead of being rounded away every tick.
    pub fn step(&self, angular_velocity: f64, dt: f64) {
        let mut delta_rad = angular_velocity * dt;
        if self.direction_inverted {
            delta_rad = -delta_rad;
        }

        let mut fractional =
            self.fractional_steps.load(Ordering::Relaxed) + delta_rad * self.steps_per_radian;
        let whole = fractional.trunc();
        if whole != 0.0 {
            fractional -= whole;
            let wrapped = (self.position_steps.load(Ordering::Relaxed) as i64 + whole as i64)
                .rem_euclid(self.max_steps as i64) as u32;
            self.position_steps.store(wrapped, Ordering::Relaxed);
        }
        self.fractional_steps.store(fractional, Ordering::Relaxed);
    }

    /// Current position in encoder steps, always in [0, max_steps)
    pub fn position_steps(&self) -> u32 {
        self.position_steps.load(Ordering::Relaxed)
    }

    /// Current position in radians, in [0, 2π)
    pub fn position_radians(&self) -> f64 {
        self.position_steps() as f64 * self.radians_per_step
    }

    /// Encoder bit resolution
    pub fn bit_resolution(&self) -> u32 {
        self.bits
    }

    /// Number of discrete positions per revolution
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Angular width of one step in radians
    pub fn resolution_radians(&self) -> f64 {
        self.radians_per_step
    }

    /// Whether the counting direction is inverted
    pub fn is_direction_inverted(&self) -> bool {
        self.direction_inverted
    }

    /// Restore the power-on state (position 0, empty accumulator)
    pub fn reset(&self) {
        self.position_steps.store(0, Ordering::Relaxed);
        self.fractional_steps.store(0.0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_starts_at_zero() {
        let encoder = Encoder::new(18, false);
        assert_eq!(encoder.position_steps(), 0);
        assert_eq!(encoder.position_radians(), 0.0);
        assert_eq!(encoder.max_steps(), 1 << 18);
    }

    #[test]
    fn test_full_revolution_wraps_to_zero() {
        // One revolution in ten ticks lands back on step 0.
        let encoder = Encoder::new(4, false);
        for _ in 0..10 {
            encoder.step(TAU, 0.1);
        }
        assert_eq!(encoder.position_steps(), 0);
    }

    #[test]
    fn test_position_stays_in_range() {
        let encoder = Encoder::new(4, false);
        for _ in 0..1000 {
            encoder.step(17.3, 0.05);
            assert!(encoder.position_steps() < encoder.max_steps());
        }
    }

    #[test]
    fn test_negative_rotation_wraps_from_below() {
        let encoder = Encoder::new(4, false);
        // A bit more than one step backwards
        encoder.step(-1.1 * encoder.resolution_radians(), 1.0);
        assert_eq!(encoder.position_steps(), 15);
    }

    #[test]
    fn test_fractional_accumulation() {
        // 0.001 rad/s at 1 kHz: after one second no step boundary has been
        // crossed, but the motion is retained in the accumulator and the
        // first step appears once enough residue has built up (~6.28 s
        // of rotation for a 10-bit encoder at this speed).
        let encoder = Encoder::new(10, false);
        for _ in 0..1000 {
            encoder.step(0.001, 0.001);
        }
        assert_eq!(encoder.position_steps(), 0);

        for _ in 0..5284 {
            encoder.step(0.001, 0.001);
        }
        assert_eq!(encoder.position_steps(), 1);
    }

    #[test]
    fn test_direction_inversion_symmetry() {
        // Two encoders with opposite inversion fed the same velocity
        // sequence mirror each other modulo one revolution.
        let normal = Encoder::new(8, false);
        let inverted = Encoder::new(8, true);
        for i in 0..500 {
            let velocity = 3.7 + (i % 7) as f64 * 0.11;
            normal.step(velocity, 0.004);
            inverted.step(velocity, 0.004);
        }
        let sum = (normal.position_steps() + inverted.position_steps()) % normal.max_steps();
        assert_eq!(sum, 0);
    }

    #[test]
    fn test_angle_round_trip() {
        let encoder = Encoder::new(12, false);
        for steps in [0u32, 1, 7, 2047, 4095] {
            let radians = steps as f64 * encoder.resolution_radians();
            let back = (radians * encoder.max_steps() as f64 / TAU).round() as u32;
            assert_eq!(back, steps);
        }
    }

    #[test]
    fn test_reset_clears_accumulator() {
        let encoder = Encoder::new(10, false);
        for _ in 0..100 {
            encoder.step(5.0, 0.001);
        }
        assert_ne!(encoder.position_steps(), 0);
        encoder.reset();
        assert_eq!(encoder.position_steps(), 0);
        // No residue left: a half-step of motion must not carry
        encoder.step(0.4 * encoder.resolution_radians(), 1.0);
        assert_eq!(encoder.position_steps(), 0);
    }
}
