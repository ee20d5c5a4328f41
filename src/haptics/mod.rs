//! Haptic Feedback
//!
//! Turns avatar parameters received over OSC into rig vibration commands.
//!
//! - **event**: `HapticEvent` and the `HapticsSource` trait
//! - **ax_haptics**: Direct per-node `Touched` / `Proximity` parameters
//! - **bhaptics**: bHaptics suit regions fanned out to nearby nodes
//! - **router**: Prefix stripping, source selection, defaults and dispatch
//!
//! # Architecture
//!
//! ```text
//! OscMessage ──► HapticsRouter ──► [AxHaptics, BHaptics] (first match)
//!                     │
//!                     └─ resolve defaults ──► AxisCommander::set_node_vibration
//! ```

pub mod ax_haptics;
pub mod bhaptics;
pub mod event;
pub mod router;

pub use ax_haptics::AxHaptics;
pub use bhaptics::BHaptics;
pub use event::{HapticEvent, HapticsSource};
pub use router::{HapticsRouter, Vibration, AVATAR_PARAM_PREFIX};
