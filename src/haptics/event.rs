//! Haptic events and the source trait

use crate::axis::NodeBinding;
use crate::osc::OscArg;

/// Request to vibrate one node
///
/// Missing intensity or duration fall back to the configured touch defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticEvent {
    pub node: NodeBinding,
    pub intensity: Option<f32>,
    pub duration: Option<f32>,
}

impl HapticEvent {
    /// Event using the configured defaults
    pub fn new(node: NodeBinding) -> Self {
        Self {
            node,
            intensity: None,
            duration: None,
        }
    }

    pub fn with_overrides(node: NodeBinding, intensity: f32, duration: f32) -> Self {
        Self {
            node,
            intensity: Some(intensity),
            duration: Some(duration),
        }
    }
}

/// A naming scheme that turns avatar parameters into haptic events
pub trait HapticsSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether `param` (avatar prefix already stripped) belongs to this scheme
    fn is_source(&self, param: &str) -> bool;

    /// Events produced by `param` taking the value `arg`
    fn compute_haptics(&self, param: &str, arg: &OscArg) -> Vec<HapticEvent>;
}
