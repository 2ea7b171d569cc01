//! Parrot MiniDrone controller
//!
//! Connects to a MiniDrone over BLE, keeps a steady stream of piloting frames
//! going while it flies and maps device orientation to movement.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{DroneError, Result};
