//! Error types for the drone controller

use crate::domain::models::DroneState;

/// Failures reported by the BLE transport.
///
/// These are surfaced to the caller and never retried: the drone drops
/// stale sequence numbers, so a blind retry can desynchronize it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No matching device was found or the link could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Operation attempted before `connect` succeeded
    #[error("Not connected")]
    NotConnected,

    /// Notification subscription failed
    #[error("Failed to start notifications on {characteristic}: {reason}")]
    Notify {
        characteristic: String,
        reason: String,
    },

    /// GATT write failed
    #[error("Write to {characteristic} failed: {reason}")]
    Write {
        characteristic: String,
        reason: String,
    },
}

/// Malformed notification payloads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Battery level out of range: {0}")]
    BatteryOutOfRange(u8),
}

/// Orientation sensor failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    /// The device delivered readings without alpha/beta/gamma values
    #[error("Device orientation not supported")]
    Unsupported,
}

/// Errors returned by [`DroneSession`](crate::infrastructure::bluetooth::DroneSession)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DroneError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Command rejected without side effects
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: DroneState,
    },
}

pub type Result<T> = std::result::Result<T, DroneError>;
