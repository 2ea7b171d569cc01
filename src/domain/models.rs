use crate::error::{DecodeError, DroneError, TransportError};
use serde::{Deserialize, Serialize};

/// Device orientation sample in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Heading (rotation around the vertical axis)
    pub alpha: f64,
    /// Front-back tilt
    pub beta: f64,
    /// Left-right tilt
    pub gamma: f64,
}

impl Orientation {
    pub const fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }
}

/// Lower/upper bound of every movement axis
pub const MAX_AXIS: i8 = 100;

/// Movement vector sent with each piloting frame.
///
/// All values are in `-100..=100` where 0 means no movement. Fields are private
/// so a value outside that range can never be built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Movement {
    yaw: i8,
    pitch: i8,
    roll: i8,
    altitude: i8,
}

impl Movement {
    pub const ZERO: Movement = Movement {
        yaw: 0,
        pitch: 0,
        roll: 0,
        altitude: 0,
    };

    /// Build a movement, clamping every axis to `-100..=100`
    pub fn new(yaw: i32, pitch: i32, roll: i32, altitude: i32) -> Self {
        Self {
            yaw: clamp_axis(yaw),
            pitch: clamp_axis(pitch),
            roll: clamp_axis(roll),
            altitude: clamp_axis(altitude),
        }
    }

    /// Movement along a single axis
    pub fn along(axis: Axis, speed: i32) -> Self {
        Self::ZERO.with(axis, speed)
    }

    /// Copy of `self` with one axis replaced
    pub fn with(mut self, axis: Axis, speed: i32) -> Self {
        let speed = clamp_axis(speed);
        match axis {
            Axis::Yaw => self.yaw = speed,
            Axis::Pitch => self.pitch = speed,
            Axis::Roll => self.roll = speed,
            Axis::Altitude => self.altitude = speed,
        }
        self
    }

    /// Rotate left (negative) / right (positive)
    pub fn yaw(&self) -> i8 {
        self.yaw
    }

    /// Backward (negative) / forward (positive)
    pub fn pitch(&self) -> i8 {
        self.pitch
    }

    /// Left (negative) / right (positive)
    pub fn roll(&self) -> i8 {
        self.roll
    }

    /// Down (negative) / up (positive)
    pub fn altitude(&self) -> i8 {
        self.altitude
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

fn clamp_axis(value: i32) -> i8 {
    value.clamp(-(MAX_AXIS as i32), MAX_AXIS as i32) as i8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Yaw,
    Pitch,
    Roll,
    Altitude,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneState {
    /// Not connected
    Idle,
    Connecting,
    Handshaking,
    /// Connected and on the ground
    Ready,
    Airborne,
    Landing,
    Emergency,
    /// Drive loop or landing failed; a new handshake is required
    Error,
}

/// Flight state reported by the drone on the flight-status characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Landed,
    TakingOff,
    Hovering,
    Unknown,
    Landing,
    CutOff,
    /// Index outside the known table
    Unrecognized(u8),
}

impl FlightState {
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Landed,
            1 => Self::TakingOff,
            2 => Self::Hovering,
            3 => Self::Unknown,
            4 => Self::Landing,
            5 => Self::CutOff,
            other => Self::Unrecognized(other),
        }
    }

    /// True for the states in which the rotors are spinning
    pub fn is_flying(&self) -> bool {
        matches!(
            self,
            Self::TakingOff | Self::Hovering | Self::Unknown | Self::Landing
        )
    }
}

/// Why a drive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped by the session (land, stop, drop)
    Cancelled,
    /// The session left the airborne state before the tick
    Grounded,
    /// A piloting write failed
    Failed(TransportError),
    /// Aborted mid-tick (emergency cut-off)
    Aborted,
}

/// Events published by the session to its observer
#[derive(Debug, Clone, PartialEq)]
pub enum DroneEvent {
    StateChanged(DroneState),
    Movement(Movement),
    FlightState(FlightState),
    UnrecognizedFlightState(u8),
    Battery(u8),
    LowBattery(u8),
    DecodeFailed {
        characteristic: &'static str,
        error: DecodeError,
    },
    Error(DroneError),
    DriveLoopStopped(LoopExit),
}
