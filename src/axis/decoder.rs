//! Telemetry datagram decoder
//!
//! # Packet Layout
//!
//! ```text
//! ┌──────────┬────────────────────────────┬──────────┬────────────────────┐
//! │ 6 bytes  │ 17 × 15-byte node slots    │ 1 byte   │ 28-byte hub record │
//! │ reserved │                            │ reserved │                    │
//! └──────────┴────────────────────────────┴──────────┴────────────────────┘
//!
//! Node record:
//!   [0]      status (bit 7 = connected)
//!   [1..9]   i16 LE × 4, quaternion in source order x, z, y, w (× 6.103e-5)
//!   [9..15]  i16 LE × 3, acceleration x, y, z (× 3.90625e-3)
//!
//! Hub record:
//!   f32 LE × 7: rotation x, y, z, w then position x, y, z
//! ```
//!
//! The runtime always sends 17 node slots (290 bytes). A 16-node build
//! decodes the first 16 and ignores the last slot.
//!
//! Datagrams of any other length are dropped without touching the state.

use glam::{Quat, Vec3};
use std::time::Instant;

use super::types::{AxisOutputData, HubData, NodeData, NODE_COUNT};

/// Reserved bytes before the first node record
pub const DATA_START_OFFSET: usize = 6;

/// Size of one node record
pub const NODE_RECORD_SIZE: usize = 1 + 7 * std::mem::size_of::<i16>();

/// Size of the hub record at the end of the datagram
pub const HUB_RECORD_SIZE: usize = 7 * std::mem::size_of::<f32>();

/// Scale applied to raw quaternion components
pub const QUAT_SCALE: f32 = 6.103e-5;

/// Scale applied to raw acceleration components
pub const ACCEL_SCALE: f32 = 3.90625e-3;

/// Status bit marking a node as connected
pub const CONNECTED_BIT: u8 = 0b1000_0000;

/// Node record slots present in every telemetry datagram
pub const WIRE_NODE_SLOTS: usize = 17;

/// Exact telemetry datagram size
pub const TELEMETRY_PACKET_SIZE: usize = telemetry_packet_size(WIRE_NODE_SLOTS);

const _: () = assert!(NODE_COUNT <= WIRE_NODE_SLOTS);

/// Telemetry datagram size for a rig with `nodes` nodes
pub const fn telemetry_packet_size(nodes: usize) -> usize {
    DATA_START_OFFSET + NODE_RECORD_SIZE * nodes + 1 + HUB_RECORD_SIZE
}

/// Decode one telemetry datagram into `state`
///
/// Returns `false` (leaving `state` untouched) when the datagram does not
/// have the exact expected size.
pub fn decode_into(buf: &[u8], state: &mut AxisOutputData, now: Instant) -> bool {
    if buf.len() != TELEMETRY_PACKET_SIZE {
        return false;
    }

    let nodes = &buf[DATA_START_OFFSET..DATA_START_OFFSET + NODE_RECORD_SIZE * NODE_COUNT];
    for (node, record) in state
        .nodes
        .iter_mut()
        .zip(nodes.chunks_exact(NODE_RECORD_SIZE))
    {
        decode_node(record, node, now);
    }

    decode_hub(&buf[buf.len() - HUB_RECORD_SIZE..], &mut state.hub, now);
    true
}

fn read_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn decode_node(record: &[u8], node: &mut NodeData, now: Instant) {
    node.connected = record[0] & CONNECTED_BIT != 0;

    let quat = |i: usize| read_i16(record, 1 + i * 2) as f32 * QUAT_SCALE;
    // The rig sends z before y
    let (x, z, y, w) = (quat(0), quat(1), quat(2), quat(3));
    node.set_rotation_at(Quat::from_xyzw(x, y, z, w), now);

    let accel = |i: usize| read_i16(record, 9 + i * 2) as f32 * ACCEL_SCALE;
    node.acceleration = Vec3::new(accel(0), accel(1), accel(2));
}

fn decode_hub(record: &[u8], hub: &mut HubData, now: Instant) {
    let f = |i: usize| read_f32(record, i * 4);

    hub.set_rotation_at(Quat::from_xyzw(f(0), f(1), f(2), f(3)), now);
    hub.position = Vec3::new(-f(4), f(5), f(6));
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Build a telemetry datagram from raw per-node values and a hub record
    pub fn telemetry_packet(
        nodes: &[(u8, [i16; 4], [i16; 3])],
        hub_rotation: [f32; 4],
        hub_position: [f32; 3],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; TELEMETRY_PACKET_SIZE];

        for (i, (status, quat, accel)) in nodes.iter().enumerate().take(WIRE_NODE_SLOTS) {
            let base = DATA_START_OFFSET + i * NODE_RECORD_SIZE;
            buf[base] = *status;
            for (j, v) in quat.iter().chain(accel.iter()).enumerate() {
                buf[base + 1 + j * 2..base + 3 + j * 2].copy_from_slice(&v.to_le_bytes());
            }
        }

        let hub_base = TELEMETRY_PACKET_SIZE - HUB_RECORD_SIZE;
        for (j, v) in hub_rotation.iter().chain(hub_position.iter()).enumerate() {
            buf[hub_base + j * 4..hub_base + 4 + j * 4].copy_from_slice(&v.to_le_bytes());
        }

        buf
    }
}
