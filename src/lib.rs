//! # AxSlime
//!
//! Bridges the Axis motion-capture rig to a SlimeVR server and drives the
//! rig's vibration motors from OSC avatar parameters.
//!
//! ## Features
//!
//! - **Rig telemetry**: Multicast receive and decoding of hub and node poses
//! - **Rig control**: Streaming, calibration, vibration and LED commands
//! - **SlimeVR relay**: One emulated tracker device per active rig slot
//! - **Activity tracking**: Sessions open and close as trackers move or go idle
//! - **Haptics**: Direct per-node and bHaptics-suit parameters over OSC
//!
//! ## Modules
//!
//! - [`axis`]: Rig decoder, command encoder and session
//! - [`slime`]: SlimeVR wire codec and per-tracker session
//! - [`bridge`]: Rig to SlimeVR relay
//! - [`haptics`]: Avatar parameter to vibration routing
//! - [`osc`]: OSC packet codec and receive server
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axslime::{AxisSession, Bridge, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!
//!     let mut rig = AxisSession::new(config.axis.clone());
//!     rig.start().await?;
//!
//!     let cancel = CancellationToken::new();
//!     let mut bridge = Bridge::new(&config.slime);
//!     let relay = tokio::spawn({
//!         let cancel = cancel.clone();
//!         let rx = rig.subscribe();
//!         async move { bridge.run(rx, cancel).await }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     cancel.cancel();
//!     relay.await?;
//!     rig.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod axis;
pub mod bridge;
pub mod config;
pub mod haptics;
pub mod osc;
pub mod slime;

// Re-export top-level types for convenience
pub use axis::{
    AxisCommand, AxisCommander, AxisError, AxisOutputData, AxisResult, AxisSession, NodeBinding,
    Rgb, TrackerSlot, NODE_COUNT, TRACKER_COUNT,
};

pub use slime::{Handshake, MacAddress, SlimeError, SlimeResult, SlimeSession, TxPacket};

pub use bridge::{to_sink_rotation, Bridge};

pub use haptics::{HapticEvent, HapticsRouter, HapticsSource};

pub use osc::{OscError, OscMessage, OscPacket, OscResult, OscServer};

pub use config::{
    AxisConfig, Config, ConfigError, HapticsConfig, LoggingConfig, OscConfig, SlimeConfig,
};
