//! bHaptics suit parameters mapped onto rig nodes
//!
//! Each suit region fans out to the nodes worn nearest to it. Parameters look
//! like `bHapticsOSC_Vest_Front_12`; only the region prefix is matched.

use super::event::{HapticEvent, HapticsSource};
use crate::axis::NodeBinding;
use crate::config::HapticsConfig;
use crate::osc::OscArg;

pub const BHAPTICS_PREFIX: &str = "bHapticsOSC_";

/// Suit region to node fan-out
const REGIONS: &[(&str, &[NodeBinding])] = &[
    ("Vest_Front", &[NodeBinding::Chest, NodeBinding::Hips]),
    ("Vest_Back", &[NodeBinding::Chest, NodeBinding::Hips]),
    (
        "Arm_Left",
        &[NodeBinding::LeftUpperArm, NodeBinding::LeftForeArm],
    ),
    (
        "Arm_Right",
        &[NodeBinding::RightUpperArm, NodeBinding::RightForeArm],
    ),
    (
        "Foot_Left",
        &[
            NodeBinding::LeftFoot,
            NodeBinding::LeftCalf,
            NodeBinding::LeftThigh,
        ],
    ),
    (
        "Foot_Right",
        &[
            NodeBinding::RightFoot,
            NodeBinding::RightCalf,
            NodeBinding::RightThigh,
        ],
    ),
    ("Hand_Left", &[NodeBinding::LeftHand]),
    ("Hand_Right", &[NodeBinding::RightHand]),
    ("Head", &[NodeBinding::Head]),
];

pub struct BHaptics {
    config: HapticsConfig,
}

impl BHaptics {
    pub fn new(config: HapticsConfig) -> Self {
        Self { config }
    }

    /// Nodes covered by the region named at the start of `region`
    pub fn region_nodes(region: &str) -> &'static [NodeBinding] {
        REGIONS
            .iter()
            .find(|(name, _)| region.starts_with(*name))
            .map(|(_, nodes)| *nodes)
            .unwrap_or(&[])
    }
}

impl HapticsSource for BHaptics {
    fn name(&self) -> &'static str {
        "bhaptics"
    }

    fn is_source(&self, param: &str) -> bool {
        self.config.enable_bhaptics_support && param.starts_with(BHAPTICS_PREFIX)
    }

    fn compute_haptics(&self, param: &str, arg: &OscArg) -> Vec<HapticEvent> {
        if !self.config.enable_touch || arg.as_bool() != Some(true) {
            return Vec::new();
        }

        let Some(region) = param.strip_prefix(BHAPTICS_PREFIX) else {
            return Vec::new();
        };

        Self::region_nodes(region)
            .iter()
            .copied()
            .map(HapticEvent::new)
            .collect()
    }
}
