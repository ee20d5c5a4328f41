//! Avatar parameter routing
//!
//! Strips the avatar parameter namespace, hands the remainder to the first
//! source that claims it, fills in defaults and forwards the resulting events
//! to the rig as vibration commands.

use super::ax_haptics::AxHaptics;
use super::bhaptics::BHaptics;
use super::event::{HapticEvent, HapticsSource};
use crate::axis::AxisCommander;
use crate::config::HapticsConfig;
use crate::osc::OscMessage;

/// Namespace of avatar parameters
pub const AVATAR_PARAM_PREFIX: &str = "/avatar/parameters/";

/// Event with defaults applied, ready to send to the rig
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vibration {
    pub node: u8,
    pub intensity: f32,
    pub duration_secs: f32,
}

pub struct HapticsRouter {
    config: HapticsConfig,
    /// Checked in order, first match wins
    sources: Vec<Box<dyn HapticsSource>>,
}

impl HapticsRouter {
    /// Router with the direct and suit schemes
    pub fn new(config: HapticsConfig) -> Self {
        let sources: Vec<Box<dyn HapticsSource>> = vec![
            Box::new(AxHaptics::new(config.clone())),
            Box::new(BHaptics::new(config.clone())),
        ];
        Self::with_sources(config, sources)
    }

    pub fn with_sources(config: HapticsConfig, sources: Vec<Box<dyn HapticsSource>>) -> Self {
        Self { config, sources }
    }

    /// Events produced by one message, judged on its first argument
    pub fn compute_events(&self, message: &OscMessage) -> Vec<HapticEvent> {
        let Some(arg) = message.first_arg() else {
            return Vec::new();
        };
        let Some(param) = message
            .address
            .strip_prefix(AVATAR_PARAM_PREFIX)
            .filter(|p| !p.is_empty())
        else {
            return Vec::new();
        };

        match self.sources.iter().find(|s| s.is_source(param)) {
            Some(source) => {
                let events = source.compute_haptics(param, arg);
                if !events.is_empty() {
                    tracing::debug!(
                        source = source.name(),
                        param,
                        count = events.len(),
                        "Haptic events"
                    );
                }
                events
            }
            None => Vec::new(),
        }
    }

    /// Apply configured defaults to missing overrides
    pub fn resolve(&self, event: &HapticEvent) -> Vibration {
        Vibration {
            node: event.node.node_index(),
            intensity: event.intensity.unwrap_or(self.config.touch_intensity),
            duration_secs: event.duration.unwrap_or(self.config.touch_duration_s),
        }
    }

    /// Send one vibration command per event
    pub fn dispatch(&self, events: &[HapticEvent], commander: &AxisCommander) {
        for event in events {
            let v = self.resolve(event);
            commander.set_node_vibration(v.node, v.intensity, v.duration_secs);
        }
    }

    /// Compute and dispatch the events of one message, returning how many were sent
    pub fn handle_message(&self, message: &OscMessage, commander: &AxisCommander) -> usize {
        let events = self.compute_events(message);
        self.dispatch(&events, commander);
        events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::NodeBinding;
    use crate::osc::OscArg;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    fn message(address: &str, arg: OscArg) -> OscMessage {
        OscMessage::new(address, vec![arg])
    }

    #[test]
    fn test_strips_prefix_and_routes() {
        let router = HapticsRouter::new(HapticsConfig::default());

        let events = router.compute_events(&message(
            "/avatar/parameters/VRCOSC/AXHaptics/TouchedHead",
            OscArg::Bool(true),
        ));
        assert_eq!(events, vec![HapticEvent::new(NodeBinding::Head)]);

        let events = router.compute_events(&message(
            "/avatar/parameters/bHapticsOSC_Arm_Left_0",
            OscArg::Bool(true),
        ));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_ignores_foreign_and_empty() {
        let router = HapticsRouter::new(HapticsConfig::default());

        assert!(router
            .compute_events(&message("/avatar/parameters/", OscArg::Bool(true)))
            .is_empty());
        assert!(router
            .compute_events(&message("/other/VRCOSC/AXHaptics/TouchedHead", OscArg::Bool(true)))
            .is_empty());
        assert!(router
            .compute_events(&message("/avatar/parameters/GestureLeft", OscArg::Int(3)))
            .is_empty());
        assert!(router
            .compute_events(&OscMessage::new(
                "/avatar/parameters/VRCOSC/AXHaptics/TouchedHead",
                Vec::new()
            ))
            .is_empty());
    }

    #[test]
    fn test_resolve_defaults() {
        let router = HapticsRouter::new(HapticsConfig {
            touch_intensity: 0.5,
            touch_duration_s: 2.0,
            ..HapticsConfig::default()
        });

        let v = router.resolve(&HapticEvent::new(NodeBinding::Chest));
        assert_eq!(
            v,
            Vibration {
                node: 15,
                intensity: 0.5,
                duration_secs: 2.0
            }
        );

        let v = router.resolve(&HapticEvent::with_overrides(NodeBinding::Chest, 0.3, 0.1));
        assert_eq!(v.intensity, 0.3);
        assert_eq!(v.duration_secs, 0.1);
    }

    #[tokio::test]
    async fn test_handle_message_sends_vibration() {
        let rig = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let commander = AxisCommander::standalone(rig.local_addr().unwrap()).unwrap();
        let router = HapticsRouter::new(HapticsConfig::default());

        let sent = router.handle_message(
            &message(
                "/avatar/parameters/VRCOSC/AXHaptics/TouchedRightCalf",
                OscArg::Bool(true),
            ),
            &commander,
        );
        assert_eq!(sent, 1);

        let mut buf = [0u8; 16];
        let len = tokio::time::timeout(Duration::from_secs(2), rig.recv(&mut buf))
            .await
            .expect("timed out waiting for command")
            .unwrap();
        // Full intensity, 1 s → round(255 / 25.5) = 10
        assert_eq!(
            &buf[..len],
            &[0x00, 0xEF, 0xAC, 0xEF, 0xAC, 0x80, 0x01, 0xFF, 0x0A]
        );
    }
}
