//! Parrot MiniDrone Protocol
//!
//! This module contains the protocol definitions for communicating with
//! Parrot MiniDrones (Rolling Spider, Mars, Travis, Mambo) over BLE.
//!
//! # Frame Structure
//!
//! ```text
//! [0]     : Data type (2 = no ack, 3 = low latency, 4 = ack requested)
//! [1]     : Sequence number of the target characteristic
//! [2]     : Feature (project) id (0 = common, 2 = MiniDrone)
//! [3]     : Command class
//! [4-5]   : Command id (u16 little-endian)
//! [6..]   : Arguments
//! ```

use crate::domain::models::Movement;
use crate::infrastructure::bluetooth::sequence::SequenceRegistry;

/// Write service, hosts every command characteristic
pub const WRITE_SERVICE_UUID: &str = "9a66fa00-0800-9191-11e4-012d1540cb8e";

/// Read service, hosts the status notification characteristics
pub const READ_SERVICE_UUID: &str = "9a66fb00-0800-9191-11e4-012d1540cb8e";

/// Non-acknowledged commands (PCMD only)
pub const PCMD_CHAR_UUID: &str = "9a66fa0a-0800-9191-11e4-012d1540cb8e";

/// Acknowledged commands (anything but PCMD and emergency)
pub const COMMAND_CHAR_UUID: &str = "9a66fa0b-0800-9191-11e4-012d1540cb8e";

/// High priority commands (emergency only)
pub const HIGH_PRIO_CHAR_UUID: &str = "9a66fa0c-0800-9191-11e4-012d1540cb8e";

/// Flight state notifications
pub const FLIGHT_STATUS_CHAR_UUID: &str = "9a66fb0e-0800-9191-11e4-012d1540cb8e";

/// Battery level notifications
pub const BATTERY_STATUS_CHAR_UUID: &str = "9a66fb0f-0800-9191-11e4-012d1540cb8e";

/// Advertised name prefixes of supported drones
pub const NAME_PREFIXES: &[&str] = &["RS_", "Mars_", "Travis_", "Mambo_"];

/// Feature id of MiniDrone commands
pub const MINIDRONE_FEATURE: u8 = 2;

/// Feature id of commands shared by all Parrot products
pub const COMMON_FEATURE: u8 = 0;

/// Class and id of the common "current date" command
const COMMON_CLASS_COMMON: u8 = 4;
const COMMON_CMD_CURRENT_DATE: u16 = 1;

/// Number of reserved zero bytes closing a PCMD frame
const PCMD_RESERVED_BYTES: usize = 8;

/// Data types used with BLE commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// Normal data, no ack requested
    Normal = 2,
    /// Low latency data
    LowLatency = 3,
    /// Data requesting an ack
    Ack = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdClass {
    Piloting = 0,
    Animations = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PilotingCmd {
    FlatTrim = 0,
    TakeOff = 1,
    /// Progressive command (movement)
    Pcmd = 2,
    Landing = 3,
    Emergency = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AnimationCmd {
    Flip = 0,
    /// Rotate by a number of degrees
    Cap = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FlipDirection {
    #[default]
    Front = 0,
    Back = 1,
    Right = 2,
    Left = 3,
}

/// Service and characteristic a frame is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub service: &'static str,
    pub characteristic: &'static str,
}

const COMMAND_ROUTE: Route = Route {
    service: WRITE_SERVICE_UUID,
    characteristic: COMMAND_CHAR_UUID,
};
const PCMD_ROUTE: Route = Route {
    service: WRITE_SERVICE_UUID,
    characteristic: PCMD_CHAR_UUID,
};
const HIGH_PRIO_ROUTE: Route = Route {
    service: WRITE_SERVICE_UUID,
    characteristic: HIGH_PRIO_CHAR_UUID,
};

/// Drone commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Calibrate the horizontal reference, sent before take off
    FlatTrim,
    TakeOff,
    Landing,
    /// Cut the motors immediately
    Emergency,
    Flip(FlipDirection),
    /// Rotate by the given number of degrees
    Turn(i16),
    /// Periodic piloting frame
    Piloting { movement: Movement, moving: bool },
    /// Handshake: current date as `YYYY-MM-DD`
    CurrentDate(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlatTrim => "flat trim",
            Self::TakeOff => "take off",
            Self::Landing => "landing",
            Self::Emergency => "emergency",
            Self::Flip(_) => "flip",
            Self::Turn(_) => "turn",
            Self::Piloting { .. } => "pcmd",
            Self::CurrentDate(_) => "current date",
        }
    }

    pub fn route(&self) -> Route {
        match self {
            Self::Piloting { .. } => PCMD_ROUTE,
            Self::Emergency => HIGH_PRIO_ROUTE,
            _ => COMMAND_ROUTE,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            // Flat trim and emergency go out without ack, as the drone app does
            Self::FlatTrim | Self::Emergency | Self::Piloting { .. } => DataType::Normal,
            _ => DataType::Ack,
        }
    }

    /// (feature, class, command id)
    fn header(&self) -> (u8, u8, u16) {
        let piloting = |cmd: PilotingCmd| (MINIDRONE_FEATURE, CmdClass::Piloting as u8, cmd as u16);
        let animation =
            |cmd: AnimationCmd| (MINIDRONE_FEATURE, CmdClass::Animations as u8, cmd as u16);

        match self {
            Self::FlatTrim => piloting(PilotingCmd::FlatTrim),
            Self::TakeOff => piloting(PilotingCmd::TakeOff),
            Self::Landing => piloting(PilotingCmd::Landing),
            Self::Emergency => piloting(PilotingCmd::Emergency),
            Self::Piloting { .. } => piloting(PilotingCmd::Pcmd),
            Self::Flip(_) => animation(AnimationCmd::Flip),
            Self::Turn(_) => animation(AnimationCmd::Cap),
            Self::CurrentDate(_) => (COMMON_FEATURE, COMMON_CLASS_COMMON, COMMON_CMD_CURRENT_DATE),
        }
    }

    fn args(&self) -> Vec<u8> {
        match self {
            Self::FlatTrim | Self::TakeOff | Self::Landing | Self::Emergency => Vec::new(),
            Self::Flip(direction) => (*direction as u32).to_le_bytes().to_vec(),
            Self::Turn(degrees) => {
                let mut args = degrees.to_le_bytes().to_vec();
                args.extend_from_slice(&[0, 0]);
                args
            }
            Self::Piloting { movement, moving } => {
                let mut args = vec![
                    *moving as u8,
                    movement.roll() as u8,
                    movement.pitch() as u8,
                    movement.yaw() as u8,
                    movement.altitude() as u8,
                ];
                args.resize(args.len() + PCMD_RESERVED_BYTES, 0);
                args
            }
            Self::CurrentDate(date) => {
                let mut args = date.as_bytes().to_vec();
                args.push(0);
                args
            }
        }
    }
}

/// A fully encoded frame and where to write it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub route: Route,
    pub bytes: Vec<u8>,
}

/// Build a raw frame
pub fn encode_frame(
    data_type: DataType,
    sequence: u8,
    feature: u8,
    class: u8,
    command_id: u16,
    args: &[u8],
) -> Vec<u8> {
    let [id_lo, id_hi] = command_id.to_le_bytes();
    let mut bytes = Vec::with_capacity(6 + args.len());
    bytes.extend_from_slice(&[data_type as u8, sequence, feature, class, id_lo, id_hi]);
    bytes.extend_from_slice(args);
    bytes
}

/// Encodes commands, drawing one sequence number per new frame
#[derive(Debug, Default)]
pub struct CommandCodec {
    sequences: SequenceRegistry,
}

impl CommandCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, command: &Command) -> OutgoingFrame {
        let (feature, class, command_id) = command.header();
        self.encode_raw(
            command.route(),
            command.data_type(),
            feature,
            class,
            command_id,
            &command.args(),
        )
    }

    /// Encode an arbitrary frame for `route`
    pub fn encode_raw(
        &mut self,
        route: Route,
        data_type: DataType,
        feature: u8,
        class: u8,
        command_id: u16,
        args: &[u8],
    ) -> OutgoingFrame {
        let sequence = self.sequences.next(route.characteristic);
        OutgoingFrame {
            route,
            bytes: encode_frame(data_type, sequence, feature, class, command_id, args),
        }
    }

    pub fn sequences(&self) -> &SequenceRegistry {
        &self.sequences
    }

    pub fn reset_sequences(&mut self) {
        self.sequences.reset();
    }
}

/// Which devices and services to look for when connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub name_prefixes: Vec<String>,
    pub services: Vec<String>,
}

impl DiscoveryFilter {
    /// Filter matching every supported MiniDrone
    pub fn minidrone() -> Self {
        Self {
            name_prefixes: NAME_PREFIXES.iter().map(|p| p.to_string()).collect(),
            services: vec![
                WRITE_SERVICE_UUID.to_string(),
                READ_SERVICE_UUID.to_string(),
            ],
        }
    }

    pub fn matches(&self, device_name: &str) -> bool {
        self.name_prefixes
            .iter()
            .any(|prefix| device_name.starts_with(prefix.as_str()))
    }
}
