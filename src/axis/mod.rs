//! Axis Rig Interface
//!
//! This module talks to the Axis motion-capture hub:
//!
//! - **types**: Decoded rig state (hub + nodes, change-gated rotations)
//! - **decoder**: Telemetry datagram decoder
//! - **commands**: Command table and encoder
//! - **session**: Multicast receive loops and the command channel
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Telemetry:
//!   multicast 239.255.239.172:45071 → decode_into → watch<AxisOutputData> → subscribers
//!
//! Commands:
//!   AxisCommander → AxisCommand::encode → unicast 127.0.0.1:45068
//! ```

pub mod commands;
pub mod decoder;
pub mod error;
pub mod session;
pub mod types;

pub use commands::{normalized_to_byte, AxisCommand, CommandType, Rgb};
pub use decoder::{decode_into, telemetry_packet_size, TELEMETRY_PACKET_SIZE, WIRE_NODE_SLOTS};
pub use error::{AxisError, AxisResult};
pub use session::{AxisCommander, AxisSession};
pub use types::{
    AxisOutputData, ChangeGated, HubData, NodeBinding, NodeData, Tracker, TrackerSlot,
    NODE_COUNT, TRACKER_COUNT,
};
