//! Rig command encoder
//!
//! Commands are concatenations of fixed byte sequences from the rig firmware's
//! command table, optionally prefixed by the 5-byte main header and followed by
//! parameter bytes:
//!
//! ```text
//! start streaming        01 E0, then 01 E2 01 00
//! stop streaming         01 E1
//! reboot / calibration   00 EF AC EF AC 16 01 00
//! zero all IMUs          00 EF AC EF AC 16 02 01
//! single-pose calibrate  00 EF AC EF AC 16 00 01
//! vibration              00 EF AC EF AC 80 <node> <intensity> <duration>
//! LED                    00 EF AC EF AC 81 <node> <R> <B> <G> <brightness>
//! ```
//!
//! These tables are a binary contract with the firmware and must stay byte-exact.

use serde::{Deserialize, Serialize};

/// Longest vibration the duration byte can express, in seconds
pub const MAX_VIBRATION_SECS: f32 = 25.5;

/// Hardware brightness ceiling divisor
pub const LED_BRIGHTNESS_DIVISOR: f32 = 3.0;

/// Entries of the firmware command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    MainHeader,
    ImuZero,
    Buzz,
    LedColor,
    /// Listed in the firmware table; no command issued here uses it
    SetMode,
    Calibration,
    StartStreaming,
    StopStreaming,
    SetStreamingMode,
    SinglePoseCalibration,
}

impl CommandType {
    /// Raw bytes of this table entry
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            CommandType::MainHeader => &[0x00, 0xEF, 0xAC, 0xEF, 0xAC],
            CommandType::ImuZero => &[0x16, 0x02, 0x01],
            CommandType::Buzz => &[0x80],
            CommandType::LedColor => &[0x81],
            CommandType::SetMode => &[0x21],
            CommandType::Calibration => &[0x16, 0x01, 0x00],
            CommandType::StartStreaming => &[0x01, 0xE0],
            CommandType::StopStreaming => &[0x01, 0xE1],
            CommandType::SetStreamingMode => &[0x01, 0xE2, 0x01, 0x00],
            CommandType::SinglePoseCalibration => &[0x16, 0x00, 0x01],
        }
    }
}

/// LED color as sent to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A single command datagram
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisCommand {
    StartStreaming,
    SetStreamingMode,
    StopStreaming,
    /// Reboot and recalibrate all paired nodes
    Reboot,
    ZeroAll,
    SinglePoseCalibration,
    SetNodeVibration {
        node: u8,
        /// Normalized intensity in [0, 1]
        intensity: f32,
        duration_secs: f32,
    },
    SetNodeLed {
        node: u8,
        color: Rgb,
        /// Normalized brightness in [0, 1]
        brightness: f32,
    },
}

/// Map a normalized float onto a byte: `round(clamp(x, 0, 1) * 255)`
pub fn normalized_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl AxisCommand {
    /// Encode this command into its datagram bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            AxisCommand::StartStreaming => CommandType::StartStreaming.bytes().to_vec(),
            AxisCommand::SetStreamingMode => CommandType::SetStreamingMode.bytes().to_vec(),
            AxisCommand::StopStreaming => CommandType::StopStreaming.bytes().to_vec(),
            AxisCommand::Reboot => with_header(CommandType::Calibration, &[]),
            AxisCommand::ZeroAll => with_header(CommandType::ImuZero, &[]),
            AxisCommand::SinglePoseCalibration => {
                with_header(CommandType::SinglePoseCalibration, &[])
            }
            AxisCommand::SetNodeVibration {
                node,
                intensity,
                duration_secs,
            } => with_header(
                CommandType::Buzz,
                &[
                    node,
                    normalized_to_byte(intensity),
                    normalized_to_byte(duration_secs / MAX_VIBRATION_SECS),
                ],
            ),
            AxisCommand::SetNodeLed {
                node,
                color,
                brightness,
            } => with_header(
                CommandType::LedColor,
                // Firmware expects R, B, G
                &[
                    node,
                    color.r,
                    color.b,
                    color.g,
                    normalized_to_byte(brightness.min(1.0) / LED_BRIGHTNESS_DIVISOR),
                ],
            ),
        }
    }
}

fn with_header(command: CommandType, params: &[u8]) -> Vec<u8> {
    let header = CommandType::MainHeader.bytes();
    let body = command.bytes();

    let mut out = Vec::with_capacity(header.len() + body.len() + params.len());
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    out.extend_from_slice(params);
    out
}
