//! Decoded rig state
//!
//! This module defines the data decoded from the Axis telemetry stream:
//! - `TrackerSlot`: The hub or one numbered node, with its stable tracker id
//! - `ChangeGated`: A value that remembers when it last actually changed
//! - `NodeData` / `HubData`: Per-tracker pose samples
//! - `AxisOutputData`: The complete rig state, hub plus every node
//! - `NodeBinding`: Body placement of each node index

use glam::{Quat, Vec3, Vec4};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Number of body-worn nodes reported by the rig firmware
#[cfg(not(feature = "extended-rig"))]
pub const NODE_COUNT: usize = 16;

/// Number of body-worn nodes reported by the rig firmware
#[cfg(feature = "extended-rig")]
pub const NODE_COUNT: usize = 17;

/// Number of tracker slots (hub + nodes)
pub const TRACKER_COUNT: usize = NODE_COUNT + 1;

/// Default window in which a value must change to count as active
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// A logical addressable tracker on the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerSlot {
    Hub,
    Node(u8),
}

impl TrackerSlot {
    /// Stable identifier used as the sink's per-sensor id
    pub fn tracker_id(&self) -> u8 {
        match self {
            TrackerSlot::Hub => 0,
            TrackerSlot::Node(index) => index + 1,
        }
    }

    /// Inverse of [`TrackerSlot::tracker_id`]
    pub fn from_tracker_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(TrackerSlot::Hub),
            n if (n as usize) <= NODE_COUNT => Some(TrackerSlot::Node(n - 1)),
            _ => None,
        }
    }

    /// Nodes report linear acceleration, the hub never does
    pub fn has_acceleration(&self) -> bool {
        matches!(self, TrackerSlot::Node(_))
    }

    /// The hub reports an absolute position, nodes never do
    pub fn has_position(&self) -> bool {
        matches!(self, TrackerSlot::Hub)
    }
}

impl std::fmt::Display for TrackerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerSlot::Hub => write!(f, "hub"),
            TrackerSlot::Node(index) => write!(f, "node {}", index),
        }
    }
}

/// A value that tracks the time of its last observed change
///
/// Writing the same value again does not refresh the change timestamp, so a
/// tracker that keeps repeating a frozen pose eventually goes inactive. The
/// first write only initializes the value.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChangeGated<T> {
    value: T,
    #[serde(skip)]
    initialized: bool,
    #[serde(skip)]
    last_changed: Option<Instant>,
    #[serde(skip)]
    timeout: Duration,
}

impl<T: Copy + PartialEq> ChangeGated<T> {
    /// Create a gate holding `value` with the default timeout
    pub fn new(value: T) -> Self {
        Self::with_timeout(value, DEFAULT_ACTIVITY_TIMEOUT)
    }

    /// Create a gate with a custom activity timeout
    pub fn with_timeout(value: T, timeout: Duration) -> Self {
        Self {
            value,
            initialized: false,
            last_changed: None,
            timeout,
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.value
    }

    /// Write a value observed now
    pub fn set(&mut self, value: T) {
        self.set_at(value, Instant::now());
    }

    /// Write a value observed at `now`
    pub fn set_at(&mut self, value: T, now: Instant) {
        if self.initialized && value != self.value {
            self.last_changed = Some(now);
        }
        self.value = value;
        self.initialized = true;
    }

    /// When the value last changed, if ever
    pub fn last_changed(&self) -> Option<Instant> {
        self.last_changed
    }

    /// Activity timeout window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the value changed within the timeout window before `now`
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.last_changed
            .map(|changed| now.saturating_duration_since(changed) < self.timeout)
            .unwrap_or(false)
    }

    /// Whether the value changed within the timeout window
    pub fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }
}

/// Normalize a rotation, falling back to identity for degenerate input
pub fn normalize_rotation(rotation: Quat) -> Quat {
    Vec4::from(rotation)
        .try_normalize()
        .map(Quat::from_vec4)
        .unwrap_or(Quat::IDENTITY)
}

/// Pose sample of one body-worn node
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeData {
    index: u8,
    /// Connection bit from the node's status byte
    pub connected: bool,
    rotation: ChangeGated<Quat>,
    /// Linear acceleration
    pub acceleration: Vec3,
}

impl NodeData {
    /// Create an empty node record
    pub fn new(index: u8) -> Self {
        Self::with_activity_timeout(index, DEFAULT_ACTIVITY_TIMEOUT)
    }

    /// Create an empty node record with a custom rotation staleness window
    pub fn with_activity_timeout(index: u8, timeout: Duration) -> Self {
        Self {
            index,
            connected: false,
            rotation: ChangeGated::with_timeout(Quat::IDENTITY, timeout),
            acceleration: Vec3::ZERO,
        }
    }

    /// Node index on the rig
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Tracker slot of this node
    pub fn slot(&self) -> TrackerSlot {
        TrackerSlot::Node(self.index)
    }

    /// Unit rotation
    pub fn rotation(&self) -> Quat {
        self.rotation.get()
    }

    /// Change-gated rotation field
    pub fn rotation_gate(&self) -> &ChangeGated<Quat> {
        &self.rotation
    }

    /// Store a rotation observed at `now` (normalized on write)
    pub fn set_rotation_at(&mut self, rotation: Quat, now: Instant) {
        self.rotation.set_at(normalize_rotation(rotation), now);
    }

    /// A node is active when its connection bit is set or its rotation keeps changing
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.connected || self.rotation.is_active_at(now)
    }
}

/// Pose sample of the hub
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HubData {
    rotation: ChangeGated<Quat>,
    /// Absolute position, X already mirrored into the sink's handedness
    pub position: Vec3,
}

impl HubData {
    pub fn new() -> Self {
        Self::with_activity_timeout(DEFAULT_ACTIVITY_TIMEOUT)
    }

    /// Create an empty hub record with a custom rotation staleness window
    pub fn with_activity_timeout(timeout: Duration) -> Self {
        Self {
            rotation: ChangeGated::with_timeout(Quat::IDENTITY, timeout),
            position: Vec3::ZERO,
        }
    }

    /// Unit rotation
    pub fn rotation(&self) -> Quat {
        self.rotation.get()
    }

    /// Change-gated rotation field
    pub fn rotation_gate(&self) -> &ChangeGated<Quat> {
        &self.rotation
    }

    /// Store a rotation observed at `now` (normalized on write)
    pub fn set_rotation_at(&mut self, rotation: Quat, now: Instant) {
        self.rotation.set_at(normalize_rotation(rotation), now);
    }

    /// The rig does not report hub connection state, so only rotation staleness counts
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.rotation.is_active_at(now)
    }
}

impl Default for HubData {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete decoded state of the rig
#[derive(Debug, Clone, Serialize)]
pub struct AxisOutputData {
    pub hub: HubData,
    pub nodes: [NodeData; NODE_COUNT],
}

impl AxisOutputData {
    pub fn new() -> Self {
        Self::with_activity_timeout(DEFAULT_ACTIVITY_TIMEOUT)
    }

    /// Create an empty rig state whose trackers go stale after `timeout`
    pub fn with_activity_timeout(timeout: Duration) -> Self {
        Self {
            hub: HubData::with_activity_timeout(timeout),
            nodes: std::array::from_fn(|i| NodeData::with_activity_timeout(i as u8, timeout)),
        }
    }

    /// All trackers in bridge order: hub first, then nodes by index
    pub fn trackers(&self) -> impl Iterator<Item = Tracker<'_>> {
        std::iter::once(Tracker::Hub(&self.hub)).chain(self.nodes.iter().map(Tracker::Node))
    }

    /// Look up a tracker by slot
    pub fn tracker(&self, slot: TrackerSlot) -> Option<Tracker<'_>> {
        match slot {
            TrackerSlot::Hub => Some(Tracker::Hub(&self.hub)),
            TrackerSlot::Node(index) => self.nodes.get(index as usize).map(Tracker::Node),
        }
    }
}

impl Default for AxisOutputData {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of one tracker, tagged by its capability set
#[derive(Debug, Clone, Copy)]
pub enum Tracker<'a> {
    Hub(&'a HubData),
    Node(&'a NodeData),
}

impl Tracker<'_> {
    pub fn slot(&self) -> TrackerSlot {
        match self {
            Tracker::Hub(_) => TrackerSlot::Hub,
            Tracker::Node(node) => node.slot(),
        }
    }

    pub fn rotation(&self) -> Quat {
        match self {
            Tracker::Hub(hub) => hub.rotation(),
            Tracker::Node(node) => node.rotation(),
        }
    }

    /// Acceleration, only for trackers that report it
    pub fn acceleration(&self) -> Option<Vec3> {
        match self {
            Tracker::Hub(_) => None,
            Tracker::Node(node) => Some(node.acceleration),
        }
    }

    /// Position, only for trackers that report it
    pub fn position(&self) -> Option<Vec3> {
        match self {
            Tracker::Hub(hub) => Some(hub.position),
            Tracker::Node(_) => None,
        }
    }

    pub fn is_active_at(&self, now: Instant) -> bool {
        match self {
            Tracker::Hub(hub) => hub.is_active_at(now),
            Tracker::Node(node) => node.is_active_at(now),
        }
    }
}

/// Body placement of each node index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum NodeBinding {
    RightThigh = 0,
    RightCalf = 1,
    LeftThigh = 2,
    LeftCalf = 3,
    RightFoot = 4,
    LeftFoot = 5,
    RightUpperArm = 6,
    RightForeArm = 7,
    LeftUpperArm = 8,
    LeftForeArm = 9,
    RightHand = 10,
    LeftHand = 11,
    RightShoulder = 12,
    LeftShoulder = 13,
    Head = 14,
    Chest = 15,
    Hips = 16,
}

impl NodeBinding {
    /// Get all bindings in node index order
    pub fn all() -> &'static [NodeBinding] {
        use NodeBinding::*;
        &[
            RightThigh,
            RightCalf,
            LeftThigh,
            LeftCalf,
            RightFoot,
            LeftFoot,
            RightUpperArm,
            RightForeArm,
            LeftUpperArm,
            LeftForeArm,
            RightHand,
            LeftHand,
            RightShoulder,
            LeftShoulder,
            Head,
            Chest,
            Hips,
        ]
    }

    /// Node index addressed by rig commands
    pub fn node_index(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeBinding::RightThigh => "RightThigh",
            NodeBinding::RightCalf => "RightCalf",
            NodeBinding::LeftThigh => "LeftThigh",
            NodeBinding::LeftCalf => "LeftCalf",
            NodeBinding::RightFoot => "RightFoot",
            NodeBinding::LeftFoot => "LeftFoot",
            NodeBinding::RightUpperArm => "RightUpperArm",
            NodeBinding::RightForeArm => "RightForeArm",
            NodeBinding::LeftUpperArm => "LeftUpperArm",
            NodeBinding::LeftForeArm => "LeftForeArm",
            NodeBinding::RightHand => "RightHand",
            NodeBinding::LeftHand => "LeftHand",
            NodeBinding::RightShoulder => "RightShoulder",
            NodeBinding::LeftShoulder => "LeftShoulder",
            NodeBinding::Head => "Head",
            NodeBinding::Chest => "Chest",
            NodeBinding::Hips => "Hips",
        }
    }

    /// Parse an exact binding name (case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|b| b.name() == name)
    }
}

impl std::fmt::Display for NodeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_ids() {
        assert_eq!(TrackerSlot::Hub.tracker_id(), 0);
        assert_eq!(TrackerSlot::Node(0).tracker_id(), 1);
        assert_eq!(TrackerSlot::Node(15).tracker_id(), 16);
        assert_eq!(TrackerSlot::from_tracker_id(0), Some(TrackerSlot::Hub));
        assert_eq!(TrackerSlot::from_tracker_id(3), Some(TrackerSlot::Node(2)));
        assert_eq!(TrackerSlot::from_tracker_id(TRACKER_COUNT as u8), None);
    }

    #[test]
    fn test_capabilities() {
        assert!(TrackerSlot::Hub.has_position());
        assert!(!TrackerSlot::Hub.has_acceleration());
        assert!(TrackerSlot::Node(4).has_acceleration());
        assert!(!TrackerSlot::Node(4).has_position());
    }

    #[test]
    fn test_first_write_is_not_a_change() {
        let mut gate = ChangeGated::new(0.0f32);
        let now = Instant::now();
        gate.set_at(1.0, now);
        assert!(gate.last_changed().is_none());
        assert!(!gate.is_active_at(now));
    }

    #[test]
    fn test_identical_write_does_not_advance() {
        let mut gate = ChangeGated::new(0.0f32);
        let t0 = Instant::now();
        gate.set_at(1.0, t0);
        gate.set_at(2.0, t0 + Duration::from_secs(1));
        assert_eq!(gate.last_changed(), Some(t0 + Duration::from_secs(1)));

        gate.set_at(2.0, t0 + Duration::from_secs(5));
        assert_eq!(gate.last_changed(), Some(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_activity_window() {
        let mut gate = ChangeGated::with_timeout(0u32, Duration::from_secs(10));
        let t0 = Instant::now();
        gate.set_at(1, t0);
        gate.set_at(2, t0);

        assert!(gate.is_active_at(t0 + Duration::from_secs(9)));
        assert!(!gate.is_active_at(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_rotation_normalized_on_write() {
        let mut node = NodeData::new(0);
        node.set_rotation_at(Quat::from_xyzw(0.0, 0.0, 0.0, 2.0), Instant::now());
        assert!((node.rotation().length() - 1.0).abs() < 1e-6);

        node.set_rotation_at(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), Instant::now());
        assert_eq!(node.rotation(), Quat::IDENTITY);
    }

    #[test]
    fn test_node_active_by_connection_flag() {
        let mut node = NodeData::new(2);
        let now = Instant::now();
        assert!(!node.is_active_at(now));
        node.connected = true;
        assert!(node.is_active_at(now));
    }

    #[test]
    fn test_tracker_order() {
        let data = AxisOutputData::new();
        let slots: Vec<_> = data.trackers().map(|t| t.slot()).collect();
        assert_eq!(slots.len(), TRACKER_COUNT);
        assert_eq!(slots[0], TrackerSlot::Hub);
        assert_eq!(slots[1], TrackerSlot::Node(0));
        assert_eq!(slots[TRACKER_COUNT - 1], TrackerSlot::Node(NODE_COUNT as u8 - 1));
    }

    #[test]
    fn test_tracker_capability_views() {
        let data = AxisOutputData::new();
        let hub = data.tracker(TrackerSlot::Hub).unwrap();
        assert!(hub.acceleration().is_none());
        assert!(hub.position().is_some());

        let node = data.tracker(TrackerSlot::Node(1)).unwrap();
        assert!(node.acceleration().is_some());
        assert!(node.position().is_none());
    }

    #[test]
    fn test_node_binding_names() {
        assert_eq!(NodeBinding::from_name("Chest"), Some(NodeBinding::Chest));
        assert_eq!(NodeBinding::from_name("chest"), None);
        assert_eq!(NodeBinding::Hips.node_index(), 16);
        for binding in NodeBinding::all() {
            assert_eq!(NodeBinding::from_name(binding.name()), Some(*binding));
        }
    }
}
