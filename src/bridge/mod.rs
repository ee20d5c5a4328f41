//! Rig to SlimeVR Bridge
//!
//! Relays each decoded rig sample to the SlimeVR server, one sink session per
//! tracker slot.
//!
//! # Architecture
//!
//! ```text
//! watch<AxisOutputData> ──changed()──► Bridge::update
//!                                         │ for hub, node 0..N:
//!                                         │   inactive → stop session
//!                                         │   active   → start + register (if needed)
//!                                         │              RotationData, Accel (nodes)
//!                                         ▼
//!                        sessions[tracker_id] ──UDP──► SlimeVR server
//! ```
//!
//! Hub position is decoded but not relayed; only rotation and node
//! acceleration reach the sink.

use glam::Quat;
use std::f32::consts::FRAC_PI_2;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::axis::{AxisOutputData, Tracker, TrackerSlot, TRACKER_COUNT};
use crate::config::SlimeConfig;
use crate::slime::{Handshake, SlimeError, SlimeSession, TxPacket};

/// Sensor id of the single IMU each sink device reports
const SENSOR_ID: u8 = 0;

/// Convert a rig rotation into the sink's reference frame
///
/// Mirrors X for handedness, then rotates 90° about X.
pub fn to_sink_rotation(rotation: Quat) -> Quat {
    let mirrored = Quat::from_xyzw(-rotation.x, rotation.y, rotation.z, rotation.w);
    Quat::from_rotation_x(FRAC_PI_2) * mirrored
}

/// Build the handshake announced by every sink session
pub fn handshake_from_config(config: &SlimeConfig) -> Handshake {
    Handshake {
        firmware_build: config.firmware_build,
        firmware_version: config.firmware_version.clone(),
        mac_address: config.mac_address,
        ..Handshake::default()
    }
}

/// Relays rig samples to per-tracker sink sessions
pub struct Bridge {
    endpoint: SocketAddr,
    handshake: Handshake,
    /// Indexed by tracker id, created on first activity
    sessions: [Option<SlimeSession>; TRACKER_COUNT],
}

impl Bridge {
    pub fn new(config: &SlimeConfig) -> Self {
        Self {
            endpoint: config.endpoint,
            handshake: handshake_from_config(config),
            sessions: std::array::from_fn(|_| None),
        }
    }

    /// Whether the sink session of `slot` is running
    pub fn is_session_running(&self, slot: TrackerSlot) -> bool {
        self.sessions
            .get(slot.tracker_id() as usize)
            .and_then(Option::as_ref)
            .is_some_and(SlimeSession::is_running)
    }

    /// Number of running sink sessions
    pub fn running_sessions(&self) -> usize {
        self.sessions
            .iter()
            .flatten()
            .filter(|s| s.is_running())
            .count()
    }

    /// Apply one rig sample
    pub async fn update(&mut self, data: &AxisOutputData) {
        self.update_at(data, Instant::now()).await;
    }

    /// Apply one rig sample, judging activity at `now`
    pub async fn update_at(&mut self, data: &AxisOutputData, now: Instant) {
        for tracker in data.trackers() {
            self.update_tracker(&tracker, now).await;
        }
    }

    async fn update_tracker(&mut self, tracker: &Tracker<'_>, now: Instant) {
        let slot = tracker.slot();
        let Some(entry) = self.sessions.get_mut(slot.tracker_id() as usize) else {
            return;
        };

        if !tracker.is_active_at(now) {
            if let Some(session) = entry.as_mut().filter(|s| s.is_running()) {
                session.stop().await;
                tracing::info!(tracker_id = slot.tracker_id(), %slot, "Tracker inactive");
            }
            return;
        }

        let session = entry.get_or_insert_with(|| SlimeSession::new(self.endpoint));
        if !session.is_running() {
            if let Err(e) = session.start().await {
                tracing::warn!(
                    tracker_id = slot.tracker_id(),
                    error = %e,
                    "Failed to start sink session"
                );
                return;
            }
            tracing::info!(tracker_id = slot.tracker_id(), %slot, "Tracker active");

            if let Err(e) = session.register(slot, &self.handshake).await {
                log_send_error(slot, &e);
            }
        }

        let rotation = TxPacket::rotation(SENSOR_ID, to_sink_rotation(tracker.rotation()));
        if let Err(e) = session.send(&rotation).await {
            log_send_error(slot, &e);
        }

        if let Some(acceleration) = tracker.acceleration() {
            let accel = TxPacket::Accel {
                sensor_id: SENSOR_ID,
                acceleration,
            };
            if let Err(e) = session.send(&accel).await {
                log_send_error(slot, &e);
            }
        }
    }

    /// Relay samples until cancelled, then stop every session
    pub async fn run(
        &mut self,
        mut rx: watch::Receiver<AxisOutputData>,
        cancel: CancellationToken,
    ) {
        tracing::info!(endpoint = %self.endpoint, "Bridge running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Rig state channel closed");
                        break;
                    }
                    let data = rx.borrow_and_update().clone();
                    self.update(&data).await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop all running sink sessions
    pub async fn shutdown(&mut self) {
        for session in self.sessions.iter_mut().flatten() {
            session.stop().await;
        }
        tracing::info!("Bridge stopped");
    }
}

fn log_send_error(slot: TrackerSlot, e: &SlimeError) {
    match e {
        SlimeError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::trace!(tracker_id = slot.tracker_id(), "Sink not listening");
        }
        _ => tracing::warn!(tracker_id = slot.tracker_id(), error = %e, "Failed to send to sink"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slime::{FrameHeader, TxPacketType};
    use glam::Vec3;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn recv_frame(sink: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let len = tokio::time::timeout(Duration::from_secs(2), sink.recv(&mut buf))
            .await
            .expect("timed out waiting for frame")
            .unwrap();
        buf[..len].to_vec()
    }

    async fn expect_silence(sink: &UdpSocket) {
        let mut buf = [0u8; 256];
        let result =
            tokio::time::timeout(Duration::from_millis(200), sink.recv(&mut buf)).await;
        assert!(result.is_err(), "unexpected frame");
    }

    fn frame_type(frame: &[u8]) -> u32 {
        FrameHeader::parse(frame).unwrap().packet_type
    }

    fn sequence(frame: &[u8]) -> u64 {
        FrameHeader::parse(frame).unwrap().sequence
    }

    async fn bridge_with_sink() -> (Bridge, UdpSocket) {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = SlimeConfig {
            endpoint: sink.local_addr().unwrap(),
            ..SlimeConfig::default()
        };
        (Bridge::new(&config), sink)
    }

    #[test]
    fn test_to_sink_rotation() {
        let q = to_sink_rotation(Quat::IDENTITY);
        assert!(q.abs_diff_eq(Quat::from_rotation_x(FRAC_PI_2), 1e-6));

        // Yaw has no X component, so only the frame alignment applies
        let yaw = Quat::from_rotation_y(0.5);
        let expected = Quat::from_rotation_x(FRAC_PI_2) * Quat::from_xyzw(0.0, yaw.y, 0.0, yaw.w);
        assert!(to_sink_rotation(yaw).abs_diff_eq(expected, 1e-6));

        let roll = Quat::from_rotation_x(0.5);
        let expected = Quat::from_rotation_x(FRAC_PI_2) * Quat::from_rotation_x(-0.5);
        assert!(to_sink_rotation(roll).abs_diff_eq(expected, 1e-6));
    }

    #[tokio::test]
    async fn test_inactive_rig_sends_nothing() {
        let (mut bridge, sink) = bridge_with_sink().await;
        bridge.update_at(&AxisOutputData::new(), Instant::now()).await;

        assert_eq!(bridge.running_sessions(), 0);
        expect_silence(&sink).await;
    }

    #[tokio::test]
    async fn test_connected_node_is_registered_before_data() {
        let (mut bridge, sink) = bridge_with_sink().await;
        let mut data = AxisOutputData::new();
        data.nodes[0].connected = true;
        data.nodes[0].acceleration = Vec3::new(0.0, 0.0, 1.0);

        bridge.update_at(&data, Instant::now()).await;
        assert!(bridge.is_session_running(TrackerSlot::Node(0)));
        assert!(!bridge.is_session_running(TrackerSlot::Hub));

        let frames = [
            recv_frame(&sink).await,
            recv_frame(&sink).await,
            recv_frame(&sink).await,
            recv_frame(&sink).await,
        ];
        let types: Vec<u32> = frames.iter().map(|f| frame_type(f)).collect();
        assert_eq!(
            types,
            vec![
                TxPacketType::Handshake as u32,
                TxPacketType::SensorInfo as u32,
                TxPacketType::RotationData as u32,
                TxPacketType::Accel as u32,
            ]
        );
        let seqs: Vec<u64> = frames.iter().map(|f| sequence(f)).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);

        // Node 0 is tracker id 1
        let handshake = &frames[0];
        assert_eq!(handshake[handshake.len() - 1], 0x01);

        // Next sample: data only, no second handshake
        bridge.update_at(&data, Instant::now()).await;
        let rotation = recv_frame(&sink).await;
        assert_eq!(frame_type(&rotation), TxPacketType::RotationData as u32);
        assert_eq!(sequence(&rotation), 4);

        bridge.shutdown().await;
        assert_eq!(bridge.running_sessions(), 0);
    }

    #[tokio::test]
    async fn test_inactive_node_stops_and_reregisters() {
        let (mut bridge, sink) = bridge_with_sink().await;
        let mut data = AxisOutputData::new();
        data.nodes[3].connected = true;

        bridge.update_at(&data, Instant::now()).await;
        for _ in 0..4 {
            recv_frame(&sink).await;
        }

        data.nodes[3].connected = false;
        bridge.update_at(&data, Instant::now()).await;
        assert!(!bridge.is_session_running(TrackerSlot::Node(3)));
        expect_silence(&sink).await;

        data.nodes[3].connected = true;
        bridge.update_at(&data, Instant::now()).await;
        let handshake = recv_frame(&sink).await;
        assert_eq!(frame_type(&handshake), TxPacketType::Handshake as u32);
        assert_eq!(sequence(&handshake), 0);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_hub_goes_stale_and_never_sends_accel() {
        let (mut bridge, sink) = bridge_with_sink().await;
        let mut data = AxisOutputData::new();
        let t0 = Instant::now();
        data.hub.set_rotation_at(Quat::from_rotation_z(0.1), t0);
        data.hub.set_rotation_at(Quat::from_rotation_z(0.2), t0);
        data.hub.position = Vec3::new(1.0, 2.0, 3.0);

        bridge.update_at(&data, t0).await;
        let types = [
            frame_type(&recv_frame(&sink).await),
            frame_type(&recv_frame(&sink).await),
            frame_type(&recv_frame(&sink).await),
        ];
        assert_eq!(
            types,
            [
                TxPacketType::Handshake as u32,
                TxPacketType::SensorInfo as u32,
                TxPacketType::RotationData as u32,
            ]
        );
        expect_silence(&sink).await;

        // Same rotation two minutes later: stale
        bridge.update_at(&data, t0 + Duration::from_secs(120)).await;
        assert!(!bridge.is_session_running(TrackerSlot::Hub));
        expect_silence(&sink).await;
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (mut bridge, sink) = bridge_with_sink().await;
        let (tx, rx) = watch::channel(AxisOutputData::new());
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                bridge.run(rx, cancel).await;
                bridge
            })
        };

        tx.send_modify(|data| data.nodes[1].connected = true);
        let handshake = recv_frame(&sink).await;
        assert_eq!(frame_type(&handshake), TxPacketType::Handshake as u32);

        cancel.cancel();
        let bridge = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("bridge did not stop")
            .unwrap();
        assert_eq!(bridge.running_sessions(), 0);
    }
}
