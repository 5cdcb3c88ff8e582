//! ServoSim - Multi-servo CAN board simulator
//!
//! This library emulates a fleet of CAN-attached motor-control boards on a
//! Linux host. Each virtual board owns one simulated DC servo (motor physics
//! plus absolute encoder), runs its own firmware-like periodic tasks, and
//! exchanges frames over SocketCAN exactly as a real microcontroller would.
//!
//! ## Subsystems
//!
//! - [`sim`]: deterministic servo physics and the 20 kHz simulation stepper
//! - [`can`]: raw SocketCAN endpoint with filtered background receive
//! - [`board`]: per-servo firmware emulator (periodic tasks + RX dispatch)
//! - [`fleet`]: builds and tears down the whole fleet from configuration

pub mod board;
pub mod can;
pub mod config;
pub mod error;
pub mod fleet;
pub mod sim;
pub mod ui;

// Re-export commonly used types
pub use config::ServoConfig;
pub use error::{Error, Result};
pub use fleet::Fleet;
