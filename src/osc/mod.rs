//! OSC Control Messages
//!
//! Receives avatar parameters over OSC 1.0 and feeds them to the haptics router.
//!
//! - **packet**: Message and bundle codec (nom)
//! - **server**: UDP receive loop with delayed bundle delivery
//! - **error**: Error types

pub mod error;
pub mod packet;
pub mod server;

pub use error::{OscError, OscResult};
pub use packet::{parse_packet, OscArg, OscBundle, OscMessage, OscPacket, OscTime};
pub use server::OscServer;
