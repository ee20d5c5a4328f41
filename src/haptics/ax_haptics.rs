//! Direct per-node haptics parameters
//!
//! ```text
//! VRCOSC/AXHaptics/Touched<Node>    bool   → vibrate <Node> with touch defaults
//! VRCOSC/AXHaptics/Proximity<Node>  float  → vibrate <Node>, intensity from distance
//! ```

use super::event::{HapticEvent, HapticsSource};
use crate::axis::NodeBinding;
use crate::config::HapticsConfig;
use crate::osc::OscArg;

pub const AX_HAPTICS_PREFIX: &str = "VRCOSC/AXHaptics/";
pub const TOUCH_PREFIX: &str = "Touched";
pub const PROXIMITY_PREFIX: &str = "Proximity";

pub struct AxHaptics {
    config: HapticsConfig,
}

impl AxHaptics {
    pub fn new(config: HapticsConfig) -> Self {
        Self { config }
    }

    /// Map a proximity reading to a vibration intensity
    ///
    /// Returns `None` at or below the threshold.
    pub fn proximity_intensity(&self, proximity: f32) -> Option<f32> {
        let cfg = &self.config;
        if proximity.is_nan() || proximity <= cfg.proximity_threshold {
            return None;
        }

        let proximity = proximity.clamp(0.0, 1.0);
        let scaled = if cfg.nonlinear_proximity {
            proximity * proximity
        } else {
            proximity
        };

        // Tolerates min > max in config
        let intensity = (cfg.proximity_min_intensity + scaled * cfg.prox_intensity_range())
            .max(cfg.proximity_min_intensity)
            .min(cfg.proximity_max_intensity);
        (intensity > 0.0).then_some(intensity)
    }
}

impl HapticsSource for AxHaptics {
    fn name(&self) -> &'static str {
        "axhaptics"
    }

    fn is_source(&self, param: &str) -> bool {
        self.config.enable_axhaptics_support && param.starts_with(AX_HAPTICS_PREFIX)
    }

    fn compute_haptics(&self, param: &str, arg: &OscArg) -> Vec<HapticEvent> {
        let Some(name) = param.strip_prefix(AX_HAPTICS_PREFIX) else {
            return Vec::new();
        };

        if self.config.enable_touch {
            if let Some(node) = name.strip_prefix(TOUCH_PREFIX) {
                if arg.as_bool() != Some(true) {
                    return Vec::new();
                }
                return NodeBinding::from_name(node)
                    .map(HapticEvent::new)
                    .into_iter()
                    .collect();
            }
        }

        if self.config.enable_proximity {
            if let Some(node) = name.strip_prefix(PROXIMITY_PREFIX) {
                let proximity = arg.as_float().unwrap_or(-1.0);
                let Some(intensity) = self.proximity_intensity(proximity) else {
                    return Vec::new();
                };
                return NodeBinding::from_name(node)
                    .map(|n| {
                        HapticEvent::with_overrides(n, intensity, self.config.proximity_duration_s)
                    })
                    .into_iter()
                    .collect();
            }
        }

        Vec::new()
    }
}
