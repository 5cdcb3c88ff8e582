//! Fleet configuration loading from JSON
//!
//! # Configuration File Format
//!
//! The fleet definition is a JSON array with one object per servo:
//!
//! ```json
//! [
//!   {
//!     "name": "shoulder",
//!     "maxVelocityRPM": 120.0,
//!     "maxControlSignal": 100,
//!     "timeConstant": 0.15,
//!     "encoderBitResolution": 18,
//!     "encoderDirectionInverted": false,
//!     "canId": 16,
//!     "canInterface": "vcan0"
//!   }
//! ]
//! ```
//!
//! Every key is optional and falls back to the defaults below. Unknown keys
//! are ignored so fleet files can carry annotations for other tools.
//!
//! | Key | Default | Effect |
//! |-----|---------|--------|
//! | `name` | "servo" | Identifier used in logs |
//! | `maxVelocityRPM` | 60.0 | Motor no-load speed at full signal |
//! | `maxControlSignal` | 100 | Control signal range is ±this value |
//! | `timeConstant` | 0.15 | Motor first-order time constant (s) |
//! | `encoderBitResolution` | 18 | Encoder positions per revolution = 2^bits |
//! | `encoderDirectionInverted` | false | Flips the encoder counting direction |
//! | `canId` | 16 (0x10) | Board's 11-bit CAN identifier |
//! | `canInterface` | "vcan0" | SocketCAN interface the board binds to |

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Configuration for a single servo and its CAN board
#[derive(Debug, Clone, Deserialize)]
pub struct ServoConfig {
    /// Servo name used for logging and the terminal UI
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum angular velocity in RPM (reached at full control signal)
    #[serde(rename = "maxVelocityRPM", default = "default_max_velocity_rpm")]
    pub max_velocity_rpm: f64,

    /// Maximum control signal magnitude (typical values: 100 or 1000)
    #[serde(rename = "maxControlSignal", default = "default_max_control_signal")]
    pub max_control_signal: i32,

    /// Motor time constant in seconds (time to reach ~63% of target velocity)
    #[serde(rename = "timeConstant", default = "default_time_constant")]
    pub time_constant: f64,

    /// Encoder bit resolution; positions per revolution = 2^bits
    #[serde(
        rename = "encoderBitResolution",
        default = "default_encoder_bit_resolution"
    )]
    pub encoder_bit_resolution: u32,

    /// Whether positive motor rotation decreases the encoder reading
    #[serde(rename = "encoderDirectionInverted", default)]
    pub encoder_direction_inverted: bool,

    /// 11-bit CAN identifier for this board
    #[serde(rename = "canId", default = "default_can_id")]
    pub can_id: u16,

    /// SocketCAN interface name (e.g., "can0", "vcan0")
    #[serde(rename = "canInterface", default = "default_can_interface")]
    pub can_interface: String,
}

fn default_name() -> String {
    "servo".to_string()
}
fn default_max_velocity_rpm() -> f64 {
    60.0
}
fn default_max_control_signal() -> i32 {
    100
}
fn default_time_constant() -> f64 {
    0.15
}
fn default_encoder_bit_resolution() -> u32 {
    18
}
fn default_can_id() -> u16 {
    0x10
}
fn default_can_interface() -> String {
    "vcan0".to_string()
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_velocity_rpm: default_max_velocity_rpm(),
            max_control_signal: default_max_control_signal(),
            time_constant: default_time_constant(),
            encoder_bit_resolution: default_encoder_bit_resolution(),
            encoder_direction_inverted: false,
            can_id: default_can_id(),
            can_interface: default_can_interface(),
        }
    }
}

impl ServoConfig {
    /// Validate one servo entry
    ///
    /// Checks the ranges the simulator depends on: the CAN id must fit a
    /// standard 11-bit frame, the encoder width must fit the step counter,
    /// and the motor parameters must be physically meaningful.
    pub fn validate(&self) -> Result<()> {
        if self.can_id > 0x7FF {
            return Err(Error::Config(format!(
                "servo '{}': canId 0x{:X} exceeds the standard 11-bit range",
                self.name, self.can_id
            )));
        }
        if self.encoder_bit_resolution == 0 || self.encoder_bit_resolution > 31 {
            return Err(Error::Config(format!(
                "servo '{}': encoderBitResolution must be in 1..=31 (got {})",
                self.name, self.encoder_bit_resolution
            )));
        }
        if self.max_control_signal <= 0 {
            return Err(Error::Config(format!(
                "servo '{}': maxControlSignal must be positive (got {})",
                self.name, self.max_control_signal
            )));
        }
        if self.max_velocity_rpm <= 0.0 {
            return Err(Error::Config(format!(
                "servo '{}': maxVelocityRPM must be positive (got {})",
                self.name, self.max_velocity_rpm
            )));
        }
        if self.time_constant <= 0.0 {
            return Err(Error::Config(format!(
                "servo '{}': timeConstant must be positive (got {})",
                self.name, self.time_constant
            )));
        }
        if self.can_interface.is_empty() {
            return Err(Error::Config(format!(
                "servo '{}': canInterface must not be empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// Load and validate a fleet definition from a JSON file
///
/// Returns `Error::Config` when the file cannot be read or describes an
/// empty fleet, `Error::Json` when it fails to parse.
pub fn load_fleet<P: AsRef<Path>>(path: P) -> Result<Vec<ServoConfig>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let configs: Vec<ServoConfig> = serde_json::from_str(&content)?;

    if configs.is_empty() {
        return Err(Error::Config(format!(
            "{} defines an empty fleet",
            path.display()
        )));
    }

    for config in &configs {
        config.validate()?;
        log::info!(
            "Loaded servo '{}' with CAN ID 0x{:03X} on {}",
            config.name,
            config.can_id,
            config.can_interface
        );
    }
    log::info!("Loaded {} servo configuration(s)", configs.len());

    Ok(configs)
}
