//! Error types for ServoSim
//!
//! # Error Recovery Strategies
//!
//! ## Fatal Errors (Refuse to Start)
//!
//! - **`Config`**: Configuration file is missing, malformed, or describes an
//!   empty fleet. Fix the configuration and restart.
//!
//! - **`Json`**: The fleet definition failed to deserialize. The offending
//!   file path is logged alongside the parse error.
//!
//! ## Degraded-Mode Errors (Log and Continue)
//!
//! - **`InterfaceNotFound`** / **`SocketCreate`** / **`SocketBind`**: The CAN
//!   endpoint could not be opened during board start. The board logs the
//!   failure and keeps running its local tasks without CAN communication.
//!
//! ## Transient Errors (Log and Drop)
//!
//! - **`SocketClosed`**: A send was attempted while the socket was closed.
//!   The telemetry task checks `is_open()` first, so this surfaces only on
//!   races with shutdown and is safe to drop.
//!
//! - **`WriteShort`**: The kernel accepted fewer bytes than one full frame.
//!   Treated as a hard error for that frame; callers log and do not retry.

use thiserror::Error;

/// Errors that can occur in ServoSim
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("CAN interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Failed to create CAN socket: {0}")]
    SocketCreate(std::io::Error),

    #[error("Failed to bind CAN socket to {interface}: {source}")]
    SocketBind {
        interface: String,
        source: std::io::Error,
    },

    #[error("Failed to set CAN filters: {0}")]
    FilterSetup(std::io::Error),

    #[error("CAN socket is not open")]
    SocketClosed,

    #[error("Short write on CAN socket: {written} of {expected} bytes")]
    WriteShort { written: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
