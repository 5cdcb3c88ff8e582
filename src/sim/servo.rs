//! Servo: one motor plus one absolute encoder
//!
//! The servo steps its motor first and feeds the post-step velocity into the
//! encoder, so one tick always observes a coherent motor/encoder pair.

use crate::config::ServoConfig;
use crate::sim::{Encoder, Motor};

/// A simulated servo built from one [`Motor`] and one [`Encoder`]
///
/// Not internally synchronized beyond the atomics of its parts: `step` is
/// called only by the simulation stepper, while boards interact through
/// `set_control_signal` and the encoder/motor read accessors.
pub struct Servo {
    name: String,
    motor: Motor,
    encoder: Encoder,
}

impl Servo {
    /// Build a servo from its fleet configuration entry
    pub fn from_config(config: &ServoConfig) -> Self {
        Self {
            name: config.name.clone(),
            motor: Motor::new(
                config.max_velocity_rpm,
                config.max_control_signal,
                config.time_constant,
            ),
            encoder: Encoder::new(
                config.encoder_bit_resolution,
                config.encoder_direction_inverted,
            ),
        }
    }

    /// Advance motor and encoder by one tick
    pub fn step(&self, dt: f64) {
        self.motor.step(dt);
        self.encoder.step(self.motor.angular_velocity(), dt);
    }

    /// Set the motor control signal (clamped to the motor's range)
    pub fn set_control_signal(&self, signal: i32) {
        self.motor.set_control_signal(signal);
    }

    /// Servo name from the fleet configuration
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct access to the motor
    pub fn motor(&self) -> &Motor {
        &self.motor
    }

    /// Direct access to the encoder
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Reset motor and encoder to their power-on state
    pub fn reset(&self) {
        self.motor.reset();
        self.encoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServoConfig;

    fn test_servo() -> Servo {
        Servo::from_config(&ServoConfig {
            name: "test".to_string(),
            max_velocity_rpm: 60.0,
            time_constant: 0.05,
            encoder_bit_resolution: 12,
            ..Default::default()
        })
    }

    #[test]
    fn test_encoder_follows_motor() {
        let servo = test_servo();
        servo.set_control_signal(100);
        for _ in 0..5000 {
            servo.step(0.001);
        }
        // 5 s at up to 1 rev/s: the encoder must have moved
        assert!(servo.motor().angular_velocity() > 0.0);
        assert_ne!(servo.encoder().position_steps(), 0);
    }

    #[test]
    fn test_encoder_tracks_motor_position_modulo_rev() {
        let servo = test_servo();
        servo.set_control_signal(73);
        for _ in 0..20_000 {
            servo.step(0.0005);
        }
        let motor_angle = servo.motor().angular_position();
        let encoder_angle = servo.encoder().position_radians();
        let wrapped = motor_angle.rem_euclid(std::f64::consts::TAU);
        // Within one encoder step of the true angle
        let diff = (wrapped - encoder_angle).abs();
        let step = servo.encoder().resolution_radians();
        assert!(
            diff < 2.0 * step || (std::f64::consts::TAU - diff) < 2.0 * step,
            "encoder {} motor-wrapped {}",
            encoder_angle,
            wrapped
        );
    }

    #[test]
    fn test_reset_clears_both() {
        let servo = test_servo();
        servo.set_control_signal(100);
        for _ in 0..1000 {
            servo.step(0.001);
        }
        servo.reset();
        assert_eq!(servo.motor().control_signal(), 0);
        assert_eq!(servo.motor().angular_velocity(), 0.0);
        assert_eq!(servo.encoder().position_steps(), 0);
    }
}
