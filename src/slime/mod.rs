//! SlimeVR Server Interface
//!
//! Presents each rig tracker to a SlimeVR server as an independent UDP device.
//!
//! - **packet**: Wire codec for outbound and inbound frames
//! - **session**: Per-tracker socket, sequence counter and keep-alive loop
//! - **error**: Error types

pub mod error;
pub mod packet;
pub mod session;

pub use error::{SlimeError, SlimeResult};
pub use packet::{
    decode_rx, BoardType, FrameHeader, Handshake, ImuType, MacAddress, McuType, RxPacket,
    SensorStatus, TxPacket, TxPacketType,
};
pub use session::SlimeSession;
