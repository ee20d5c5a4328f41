//! SlimeVR UDP wire codec
//!
//! # Frame Format
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬────────────────────┐
//! │ Type (4 bytes)   │ Sequence (8 bytes)   │ Payload (variable) │
//! │ Big-endian u32   │ Big-endian u64       │                    │
//! └──────────────────┴──────────────────────┴────────────────────┘
//! ```
//!
//! ## Outbound payloads
//!
//! - **Heartbeat (0)**: empty
//! - **Handshake (3)**: board u32, IMU u32, MCU u32, 12 zero bytes, firmware build u32,
//!   length-prefixed ASCII firmware version, 6-byte MAC
//! - **Accel (4)**: sensor id u8, f32 × 3
//! - **PingPong (10)**: echoed ping id i32
//! - **SensorInfo (15)**: sensor id u8, status u8, IMU type u8
//! - **RotationData (17)**: sensor id u8, data type u8, f32 × 4 (x, y, z, w), accuracy u8
//!
//! All multi-byte values are big-endian.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::{SlimeError, SlimeResult};

/// Length of the type id + sequence number header
pub const PACKET_HEADER_LEN: usize = 4 + 8;

/// Zero padding inside the handshake payload
const HANDSHAKE_PADDING: [u8; 12] = [0; 12];

/// Outbound packet type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TxPacketType {
    Heartbeat = 0,
    Handshake = 3,
    Accel = 4,
    PingPong = 10,
    SensorInfo = 15,
    RotationData = 17,
}

/// Inbound packet type ids
pub mod rx_type {
    pub const HEARTBEAT: u32 = 1;
    pub const VIBRATE: u32 = 2;
    pub const HANDSHAKE: u32 = 3;
    /// The command slot carries pings in this protocol
    pub const PING: u32 = 4;
    /// Servers that answer with the outbound ping id
    pub const PING_PONG: u32 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum BoardType {
    Unknown = 0,
    Custom = 4,
    Wrangler = 14,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ImuType {
    Bno085 = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum McuType {
    Unknown = 0,
    Wrangler = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorStatus {
    Disconnected = 0,
    Ok = 1,
    Error = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RotationDataType {
    Normal = 1,
    Correction = 2,
}

/// 6-byte device identifier announced in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Locally administered default identifier
    pub const DEFAULT: MacAddress = MacAddress([0x02, 0x41, 0x58, 0x53, 0x4C, 0x00]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Add `offset` to the address as a 48-bit big-endian integer (wrapping)
    ///
    /// Each tracker gets the base address offset by its tracker id so the sink
    /// sees a distinct device per tracker.
    pub fn offset(&self, offset: u8) -> MacAddress {
        let mut wide = [0u8; 8];
        wide[2..].copy_from_slice(&self.0);
        let value = u64::from_be_bytes(wide).wrapping_add(offset as u64) & 0xFFFF_FFFF_FFFF;

        let mut out = [0u8; 6];
        out.copy_from_slice(&value.to_be_bytes()[2..]);
        MacAddress(out)
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for MacAddress {
    type Err = SlimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(SlimeError::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(SlimeError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| SlimeError::InvalidMac(s.to_string()))?;
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = SlimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Device description sent once per session
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub board_type: BoardType,
    pub imu_type: ImuType,
    pub mcu_type: McuType,
    pub firmware_build: u32,
    pub firmware_version: String,
    pub mac_address: MacAddress,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            board_type: BoardType::Wrangler,
            imu_type: ImuType::Bno085,
            mcu_type: McuType::Wrangler,
            firmware_build: 17,
            firmware_version: "0.4.0".to_string(),
            mac_address: MacAddress::DEFAULT,
        }
    }
}

/// Frames sent to the sink
#[derive(Debug, Clone, PartialEq)]
pub enum TxPacket {
    Heartbeat,
    Handshake(Handshake),
    Accel {
        sensor_id: u8,
        acceleration: Vec3,
    },
    PingPong {
        ping_id: i32,
    },
    SensorInfo {
        sensor_id: u8,
        status: SensorStatus,
        imu_type: ImuType,
    },
    RotationData {
        sensor_id: u8,
        data_type: RotationDataType,
        rotation: Quat,
        accuracy: u8,
    },
}

impl TxPacket {
    /// Rotation frame with default data type and accuracy
    pub fn rotation(sensor_id: u8, rotation: Quat) -> Self {
        TxPacket::RotationData {
            sensor_id,
            data_type: RotationDataType::Normal,
            rotation,
            accuracy: 0,
        }
    }

    /// Sensor info announcing a working IMU
    pub fn sensor_ok(sensor_id: u8) -> Self {
        TxPacket::SensorInfo {
            sensor_id,
            status: SensorStatus::Ok,
            imu_type: ImuType::Bno085,
        }
    }

    pub fn packet_type(&self) -> TxPacketType {
        match self {
            TxPacket::Heartbeat => TxPacketType::Heartbeat,
            TxPacket::Handshake(_) => TxPacketType::Handshake,
            TxPacket::Accel { .. } => TxPacketType::Accel,
            TxPacket::PingPong { .. } => TxPacketType::PingPong,
            TxPacket::SensorInfo { .. } => TxPacketType::SensorInfo,
            TxPacket::RotationData { .. } => TxPacketType::RotationData,
        }
    }

    /// Serialize header and payload into `out`, replacing its contents
    pub fn encode(&self, sequence: u64, out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(&(self.packet_type() as u32).to_be_bytes());
        out.extend_from_slice(&sequence.to_be_bytes());

        match self {
            TxPacket::Heartbeat => {}
            TxPacket::Handshake(handshake) => encode_handshake(handshake, out),
            TxPacket::Accel {
                sensor_id,
                acceleration,
            } => {
                out.push(*sensor_id);
                put_f32s(out, &acceleration.to_array());
            }
            TxPacket::PingPong { ping_id } => {
                out.extend_from_slice(&ping_id.to_be_bytes());
            }
            TxPacket::SensorInfo {
                sensor_id,
                status,
                imu_type,
            } => {
                out.extend_from_slice(&[*sensor_id, *status as u8, *imu_type as u8]);
            }
            TxPacket::RotationData {
                sensor_id,
                data_type,
                rotation,
                accuracy,
            } => {
                out.extend_from_slice(&[*sensor_id, *data_type as u8]);
                put_f32s(out, &rotation.to_array());
                out.push(*accuracy);
            }
        }
    }
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn encode_handshake(handshake: &Handshake, out: &mut Vec<u8>) {
    out.extend_from_slice(&(handshake.board_type as u32).to_be_bytes());
    out.extend_from_slice(&(handshake.imu_type as u32).to_be_bytes());
    out.extend_from_slice(&(handshake.mcu_type as u32).to_be_bytes());
    out.extend_from_slice(&HANDSHAKE_PADDING);
    out.extend_from_slice(&handshake.firmware_build.to_be_bytes());
    put_short_string(out, &handshake.firmware_version);
    out.extend_from_slice(&handshake.mac_address.octets());
}

/// Write a u8-length-prefixed ASCII string, replacing non-ASCII characters with `?`
fn put_short_string(out: &mut Vec<u8>, s: &str) {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(u8::MAX as usize)
        .collect();
    out.push(bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

/// Type id and sequence number of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub packet_type: u32,
    pub sequence: u64,
}

impl FrameHeader {
    /// Parse the 12-byte header at the start of `data`
    pub fn parse(data: &[u8]) -> SlimeResult<Self> {
        if data.len() < PACKET_HEADER_LEN {
            return Err(SlimeError::Truncated {
                expected: PACKET_HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut type_bytes = [0u8; 4];
        type_bytes.copy_from_slice(&data[0..4]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&data[4..12]);

        Ok(Self {
            packet_type: u32::from_be_bytes(type_bytes),
            sequence: u64::from_be_bytes(seq_bytes),
        })
    }
}

/// Frames received from the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxPacket {
    Heartbeat,
    Vibrate,
    Handshake,
    Ping { ping_id: i32 },
    Unknown(u32),
}

/// Decode an inbound frame
pub fn decode_rx(data: &[u8]) -> SlimeResult<(FrameHeader, RxPacket)> {
    let header = FrameHeader::parse(data)?;
    let payload = &data[PACKET_HEADER_LEN..];

    let packet = match header.packet_type {
        rx_type::HEARTBEAT => RxPacket::Heartbeat,
        rx_type::VIBRATE => RxPacket::Vibrate,
        rx_type::HANDSHAKE => RxPacket::Handshake,
        rx_type::PING | rx_type::PING_PONG => {
            if payload.len() < 4 {
                return Err(SlimeError::Truncated {
                    expected: PACKET_HEADER_LEN + 4,
                    actual: data.len(),
                });
            }
            let ping_id = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            RxPacket::Ping { ping_id }
        }
        other => RxPacket::Unknown(other),
    };

    Ok((header, packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(packet: &TxPacket, sequence: u64) -> Vec<u8> {
        let mut out = Vec::new();
        packet.encode(sequence, &mut out);
        out
    }

    #[test]
    fn test_heartbeat_header() {
        let bytes = encode(&TxPacket::Heartbeat, 0x0102);
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn test_handshake_layout() {
        let handshake = Handshake {
            mac_address: MacAddress([1, 2, 3, 4, 5, 6]),
            ..Handshake::default()
        };
        let bytes = encode(&TxPacket::Handshake(handshake), 7);

        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.packet_type, 3);
        assert_eq!(header.sequence, 7);

        let p = &bytes[PACKET_HEADER_LEN..];
        assert_eq!(&p[0..4], &14u32.to_be_bytes());
        assert_eq!(&p[4..8], &4u32.to_be_bytes());
        assert_eq!(&p[8..12], &4u32.to_be_bytes());
        assert_eq!(&p[12..24], &[0u8; 12]);
        assert_eq!(&p[24..28], &17u32.to_be_bytes());
        assert_eq!(p[28], 5);
        assert_eq!(&p[29..34], b"0.4.0");
        assert_eq!(&p[34..40], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(p.len(), 40);
    }

    #[test]
    fn test_rotation_layout() {
        let bytes = encode(&TxPacket::rotation(3, Quat::from_xyzw(0.5, -0.5, 0.5, 0.5)), 1);
        let p = &bytes[PACKET_HEADER_LEN..];
        assert_eq!(&bytes[0..4], &17u32.to_be_bytes());
        assert_eq!(p[0], 3);
        assert_eq!(p[1], RotationDataType::Normal as u8);
        assert_eq!(&p[2..6], &0.5f32.to_be_bytes());
        assert_eq!(&p[6..10], &(-0.5f32).to_be_bytes());
        assert_eq!(&p[10..14], &0.5f32.to_be_bytes());
        assert_eq!(&p[14..18], &0.5f32.to_be_bytes());
        assert_eq!(p[18], 0);
        assert_eq!(p.len(), 19);
    }

    #[test]
    fn test_accel_and_sensor_info_layout() {
        let bytes = encode(
            &TxPacket::Accel {
                sensor_id: 2,
                acceleration: Vec3::new(1.0, 2.0, 3.0),
            },
            0,
        );
        let p = &bytes[PACKET_HEADER_LEN..];
        assert_eq!(&bytes[0..4], &4u32.to_be_bytes());
        assert_eq!(p[0], 2);
        assert_eq!(&p[1..5], &1.0f32.to_be_bytes());
        assert_eq!(&p[9..13], &3.0f32.to_be_bytes());

        let bytes = encode(&TxPacket::sensor_ok(9), 0);
        assert_eq!(&bytes[0..4], &15u32.to_be_bytes());
        assert_eq!(&bytes[PACKET_HEADER_LEN..], &[9, 1, 4]);
    }

    #[test]
    fn test_encode_reuses_buffer() {
        let mut out = Vec::new();
        TxPacket::rotation(0, Quat::IDENTITY).encode(0, &mut out);
        TxPacket::Heartbeat.encode(1, &mut out);
        assert_eq!(out.len(), PACKET_HEADER_LEN);
    }

    #[test]
    fn test_decode_rx() {
        let mut frame = 1u32.to_be_bytes().to_vec();
        frame.extend_from_slice(&5u64.to_be_bytes());
        let (header, packet) = decode_rx(&frame).unwrap();
        assert_eq!(header.sequence, 5);
        assert_eq!(packet, RxPacket::Heartbeat);

        let mut ping = 4u32.to_be_bytes().to_vec();
        ping.extend_from_slice(&0u64.to_be_bytes());
        ping.extend_from_slice(&(-42i32).to_be_bytes());
        assert_eq!(decode_rx(&ping).unwrap().1, RxPacket::Ping { ping_id: -42 });

        let mut unknown = 99u32.to_be_bytes().to_vec();
        unknown.extend_from_slice(&0u64.to_be_bytes());
        assert_eq!(decode_rx(&unknown).unwrap().1, RxPacket::Unknown(99));
    }

    #[test]
    fn test_decode_rx_truncated() {
        assert!(matches!(
            decode_rx(&[0, 0, 0, 1]),
            Err(SlimeError::Truncated { expected: 12, actual: 4 })
        ));

        let mut ping = 4u32.to_be_bytes().to_vec();
        ping.extend_from_slice(&0u64.to_be_bytes());
        ping.push(1);
        assert!(decode_rx(&ping).is_err());
    }

    #[test]
    fn test_mac_address() {
        let mac: MacAddress = "02:41:58:53:4c:ff".parse().unwrap();
        assert_eq!(mac.to_string(), "02:41:58:53:4C:FF");
        assert_eq!(mac.offset(1), MacAddress([0x02, 0x41, 0x58, 0x53, 0x4D, 0x00]));
        assert_eq!(
            MacAddress([0xFF; 6]).offset(2),
            MacAddress([0, 0, 0, 0, 0, 1])
        );
        assert!("02:41:58".parse::<MacAddress>().is_err());
        assert!("zz:41:58:53:4c:ff".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_short_string_replaces_non_ascii() {
        let mut out = Vec::new();
        put_short_string(&mut out, "v1é");
        assert_eq!(out, vec![3, b'v', b'1', b'?']);
    }
}
