//! Servo physics simulation
//!
//! This module hosts the deterministic simulation core: the first-order
//! motor model, the absolute encoder model, the servo that composes them,
//! and the fixed-rate stepper that advances every servo on one thread.
//!
//! # Thread Model
//!
//! ```text
//! ┌────────────────┐   step(dt) @ 20 kHz   ┌──────────────────┐
//! │ Stepper Thread │ ─────────────────────▶│ Servo (atomics)  │
//! └────────────────┘                        └──────────────────┘
//!        ▲                                      ▲          ▲
//!        │ stop()                     reads     │          │ set_control_signal()
//!   ┌─────────┐                  ┌─────────────────┐  ┌─────────────────┐
//!   │  Fleet  │                  │ Board task loops │  │ Board RX thread │
//!   └─────────┘                  └─────────────────┘  └─────────────────┘
//! ```
//!
//! All cross-thread state in a servo is a single primitive behind an atomic,
//! so no lock is held anywhere on the 20 kHz path. The control signal is the
//! only cross-thread write into a servo; it is published with release
//! semantics and read by the stepper with acquire semantics.
//!
//! # Module Structure
//!
//! - [`motor`]: first-order velocity response with bounded control input
//! - [`encoder`]: absolute encoder with wraparound and fractional accumulator
//! - [`servo`]: one motor + one encoder stepped coherently
//! - [`engine`]: drift-free fixed-rate stepper thread

pub mod encoder;
pub mod engine;
pub mod motor;
pub mod servo;

pub use encoder::Encoder;
pub use engine::SimulationEngine;
pub use motor::Motor;
pub use servo::Servo;

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic f64 wrapper using AtomicU64
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(val: f64) -> Self {
        Self(AtomicU64::new(val.to_bits()))
    }

    pub(crate) fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub(crate) fn store(&self, val: f64, order: Ordering) {
        self.0.store(val.to_bits(), order);
    }
}
