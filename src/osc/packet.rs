//! OSC 1.0 packet codec
//!
//! # Packet Layout
//!
//! ```text
//! Message:
//! ┌──────────────────┬─────────────────────┬──────────────────────┐
//! │ Address (string) │ Type tags (",ifs…") │ Arguments            │
//! └──────────────────┴─────────────────────┴──────────────────────┘
//!
//! Bundle:
//! ┌──────────────┬──────────────────┬────────────────────────────────┐
//! │ "#bundle\0"  │ Time tag (8 B)   │ (u32 size, packet) × elements  │
//! └──────────────┴──────────────────┴────────────────────────────────┘
//! ```
//!
//! Strings are NUL-terminated and padded to a multiple of 4 bytes. Blobs
//! carry a u32 length prefix and the same padding. All numbers are
//! big-endian.

use chrono::{DateTime, Utc};
use nom::{
    bytes::complete::{tag, take, take_until},
    combinator::{map, map_opt, map_res},
    multi::length_data,
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u32},
    sequence::{preceded, tuple},
    IResult,
};
use std::time::Duration;

use super::error::{OscError, OscResult};

/// Leading bytes of every bundle
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Seconds between the NTP epoch (1900) and the Unix epoch
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Deepest bundle nesting accepted
const MAX_BUNDLE_DEPTH: usize = 8;

/// NTP-format time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OscTime {
    pub seconds: u32,
    pub fractional: u32,
}

impl OscTime {
    /// The special "execute immediately" tag
    pub const IMMEDIATELY: OscTime = OscTime {
        seconds: 0,
        fractional: 1,
    };

    pub fn is_immediate(&self) -> bool {
        *self == Self::IMMEDIATELY
    }

    /// Wall-clock time of this tag, `None` for the immediate tag
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_immediate() {
            return None;
        }
        let secs = self.seconds as i64 - NTP_UNIX_OFFSET;
        let nanos = ((self.fractional as u64 * 1_000_000_000) >> 32) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// How long after `now` this tag falls, `None` if it is immediate or past
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.to_datetime()?;
        (at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

impl From<DateTime<Utc>> for OscTime {
    fn from(time: DateTime<Utc>) -> Self {
        let seconds = (time.timestamp() + NTP_UNIX_OFFSET).clamp(0, u32::MAX as i64) as u32;
        let fractional = (((time.timestamp_subsec_nanos() as u64) << 32) / 1_000_000_000) as u32;
        Self {
            seconds,
            fractional,
        }
    }
}

/// Typed message argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
    Blob(Vec<u8>),
    Bool(bool),
    Nil,
    Inf,
    Long(i64),
    Double(f64),
    Time(OscTime),
    Char(char),
}

impl OscArg {
    /// The value if this is a boolean argument
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OscArg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value if this is a 32-bit float argument
    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscArg::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn type_tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::String(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
            OscArg::Nil => 'N',
            OscArg::Inf => 'I',
            OscArg::Long(_) => 'h',
            OscArg::Double(_) => 'd',
            OscArg::Time(_) => 't',
            OscArg::Char(_) => 'c',
        }
    }
}

/// Address plus arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn first_arg(&self) -> Option<&OscArg> {
        self.args.first()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, &self.address);

        let tags: String = std::iter::once(',')
            .chain(self.args.iter().map(OscArg::type_tag))
            .collect();
        put_string(&mut out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::String(s) => put_string(&mut out, s),
                OscArg::Blob(b) => {
                    out.extend_from_slice(&(b.len() as u32).to_be_bytes());
                    out.extend_from_slice(b);
                    out.resize(padded_len(out.len()), 0);
                }
                OscArg::Bool(_) | OscArg::Nil | OscArg::Inf => {}
                OscArg::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Time(t) => put_time(&mut out, *t),
                OscArg::Char(c) => out.extend_from_slice(&(*c as u32).to_be_bytes()),
            }
        }
        out
    }
}

/// Time-tagged group of packets
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    pub time: OscTime,
    pub content: Vec<OscPacket>,
}

impl OscBundle {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BUNDLE_TAG.to_vec();
        put_time(&mut out, self.time);
        for element in &self.content {
            let bytes = element.encode();
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            OscPacket::Message(m) => m.encode(),
            OscPacket::Bundle(b) => b.encode(),
        }
    }
}

/// Parse a datagram into a message or bundle
pub fn parse_packet(data: &[u8]) -> OscResult<OscPacket> {
    parse_packet_at_depth(data, 0)
}

fn parse_packet_at_depth(data: &[u8], depth: usize) -> OscResult<OscPacket> {
    if data.starts_with(BUNDLE_TAG) {
        parse_bundle(data, depth).map(OscPacket::Bundle)
    } else {
        parse_message(data).map(OscPacket::Message)
    }
}

/// Parse a single message
pub fn parse_message(data: &[u8]) -> OscResult<OscMessage> {
    let (rest, address) = osc_string(data).map_err(|e| malformed("address", e))?;
    if !address.starts_with('/') {
        return Err(OscError::Malformed(format!(
            "address must start with '/': {:?}",
            address
        )));
    }

    // Type tag string is optional in old senders
    if rest.is_empty() {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let (mut rest, tags) = osc_string(rest).map_err(|e| malformed("type tags", e))?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(OscError::Malformed(format!(
            "type tags must start with ',': {:?}",
            tags
        )));
    };

    // Arguments after an unknown tag cannot be located, so decoding stops there
    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let (next, arg) = match osc_arg(tag, rest) {
            Ok(parsed) => parsed,
            Err(OscError::UnsupportedTag(tag)) => {
                tracing::trace!(%address, %tag, "Stopped at unsupported OSC type tag");
                break;
            }
            Err(e) => return Err(e),
        };
        args.push(arg);
        rest = next;
    }

    Ok(OscMessage::new(address, args))
}

fn parse_bundle(data: &[u8], depth: usize) -> OscResult<OscBundle> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(OscError::Malformed("bundles nested too deeply".to_string()));
    }

    let (mut rest, time) = preceded(tag(&BUNDLE_TAG[..]), time_tag)(data)
        .map_err(|e| malformed("bundle header", e))?;

    let mut content = Vec::new();
    while !rest.is_empty() {
        let (next, element) =
            length_data(be_u32)(rest).map_err(|e| malformed("bundle element", e))?;
        content.push(parse_packet_at_depth(element, depth + 1)?);
        rest = next;
    }

    Ok(OscBundle { time, content })
}

fn osc_arg(tag: char, input: &[u8]) -> OscResult<(&[u8], OscArg)> {
    let parsed: IResult<&[u8], OscArg> = match tag {
        'i' => map(be_i32, OscArg::Int)(input),
        'f' => map(be_f32, OscArg::Float)(input),
        's' | 'S' => map(osc_string, |s: &str| OscArg::String(s.to_string()))(input),
        'b' => map(osc_blob, |b: &[u8]| OscArg::Blob(b.to_vec()))(input),
        'T' => Ok((input, OscArg::Bool(true))),
        'F' => Ok((input, OscArg::Bool(false))),
        'N' => Ok((input, OscArg::Nil)),
        'I' => Ok((input, OscArg::Inf)),
        'h' => map(be_i64, OscArg::Long)(input),
        'd' => map(be_f64, OscArg::Double)(input),
        't' => map(time_tag, OscArg::Time)(input),
        'c' => map_opt(be_u32, |c| char::from_u32(c).map(OscArg::Char))(input),
        other => return Err(OscError::UnsupportedTag(other)),
    };

    parsed.map_err(|e| malformed(&format!("argument '{}'", tag), e))
}

/// NUL-terminated, 4-byte padded string
fn osc_string(input: &[u8]) -> IResult<&[u8], &str> {
    let (rest, s) = map_res(take_until(&b"\0"[..]), std::str::from_utf8)(input)?;
    let (rest, _) = take(padded_len(s.len() + 1) - s.len())(rest)?;
    Ok((rest, s))
}

/// Length-prefixed, 4-byte padded blob
fn osc_blob(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (rest, data) = length_data(be_u32)(input)?;
    let (rest, _) = take(padded_len(data.len()) - data.len())(rest)?;
    Ok((rest, data))
}

fn time_tag(input: &[u8]) -> IResult<&[u8], OscTime> {
    map(tuple((be_u32, be_u32)), |(seconds, fractional)| OscTime {
        seconds,
        fractional,
    })(input)
}

fn malformed(what: &str, e: nom::Err<nom::error::Error<&[u8]>>) -> OscError {
    let detail = match e {
        nom::Err::Incomplete(_) => "incomplete".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => format!("{:?}", e.code),
    };
    OscError::Malformed(format!("{}: {}", what, detail))
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out.resize(padded_len(out.len()), 0);
}

fn put_time(out: &mut Vec<u8>, time: OscTime) {
    out.extend_from_slice(&time.seconds.to_be_bytes());
    out.extend_from_slice(&time.fractional.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_literal_message() {
        // "/avatar/parameters/x" ",T"
        let mut data = b"/avatar/parameters/x\0\0\0\0".to_vec();
        data.extend_from_slice(b",T\0\0");

        let message = parse_message(&data).unwrap();
        assert_eq!(message.address, "/avatar/parameters/x");
        assert_eq!(message.args, vec![OscArg::Bool(true)]);
    }

    #[test]
    fn test_parse_float_and_string_args() {
        let mut data = b"/a\0\0".to_vec();
        data.extend_from_slice(b",fs\0");
        data.extend_from_slice(&0.5f32.to_be_bytes());
        data.extend_from_slice(b"hey\0");

        let message = parse_message(&data).unwrap();
        assert_eq!(
            message.args,
            vec![OscArg::Float(0.5), OscArg::String("hey".to_string())]
        );
        assert_eq!(message.first_arg().and_then(OscArg::as_float), Some(0.5));
        assert_eq!(message.first_arg().and_then(OscArg::as_bool), None);
    }

    #[test]
    fn test_message_encode_matches_layout() {
        let message = OscMessage::new(
            "/test",
            vec![
                OscArg::Int(-2),
                OscArg::Blob(vec![1, 2, 3, 4, 5]),
                OscArg::Nil,
                OscArg::Long(1 << 40),
                OscArg::Double(2.5),
                OscArg::Char('x'),
            ],
        );
        let bytes = message.encode();
        assert_eq!(&bytes[0..8], b"/test\0\0\0");
        assert_eq!(&bytes[8..16], b",ibNhdc\0");
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(parse_message(&bytes).unwrap(), message);
    }

    #[test]
    fn test_message_without_type_tags() {
        let message = parse_message(b"/ping\0\0\0").unwrap();
        assert_eq!(message.address, "/ping");
        assert!(message.args.is_empty());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            parse_message(b"nope\0\0\0\0"),
            Err(OscError::Malformed(_))
        ));
        // Missing NUL terminator
        assert!(parse_message(b"/abc").is_err());
        // Declared int with no data
        assert!(parse_message(b"/a\0\0,i\0\0").is_err());

    }

    #[test]
    fn test_unsupported_tag_keeps_leading_args() {
        let mut data = b"/a\0\0".to_vec();
        data.extend_from_slice(b",x\0\0");
        assert!(parse_message(&data).unwrap().args.is_empty());

        let mut data = b"/a\0\0".to_vec();
        data.extend_from_slice(b",Tr[\0\0\0\0");
        data.extend_from_slice(&[0xFF; 4]);
        let message = parse_message(&data).unwrap();
        assert_eq!(message.args, vec![OscArg::Bool(true)]);
        assert_eq!(message.first_arg(), Some(&OscArg::Bool(true)));
    }

    #[test]
    fn test_parse_nested_bundle() {
        let inner = OscBundle {
            time: OscTime::IMMEDIATELY,
            content: vec![OscPacket::Message(OscMessage::new(
                "/b",
                vec![OscArg::Float(1.0)],
            ))],
        };
        let outer = OscBundle {
            time: OscTime {
                seconds: 100,
                fractional: 0,
            },
            content: vec![
                OscPacket::Message(OscMessage::new("/a", vec![OscArg::Bool(false)])),
                OscPacket::Bundle(inner),
            ],
        };

        let bytes = outer.encode();
        assert!(bytes.starts_with(BUNDLE_TAG));
        assert_eq!(parse_packet(&bytes).unwrap(), OscPacket::Bundle(outer));
    }

    #[test]
    fn test_bundle_element_overrun() {
        let mut bytes = BUNDLE_TAG.to_vec();
        put_time(&mut bytes, OscTime::IMMEDIATELY);
        bytes.extend_from_slice(&64u32.to_be_bytes());
        bytes.extend_from_slice(b"/a\0\0");
        assert!(parse_packet(&bytes).is_err());
    }

    #[test]
    fn test_time_conversion() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let tag = OscTime::from(time);
        assert_eq!(tag.seconds as i64, time.timestamp() + NTP_UNIX_OFFSET);
        assert_eq!(tag.fractional, 0);
        assert_eq!(tag.to_datetime(), Some(time));

        let half = time + chrono::Duration::milliseconds(500);
        let tag = OscTime::from(half);
        assert_eq!(tag.fractional, 1 << 31);

        assert_eq!(OscTime::IMMEDIATELY.to_datetime(), None);
    }

    #[test]
    fn test_delay_from() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = OscTime::from(now + chrono::Duration::seconds(2));
        assert_eq!(later.delay_from(now), Some(Duration::from_secs(2)));

        let earlier = OscTime::from(now - chrono::Duration::seconds(2));
        assert_eq!(earlier.delay_from(now), None);
        assert_eq!(OscTime::IMMEDIATELY.delay_from(now), None);
    }
}
