//! On-air frame layout and the `JoinProbe` payload it carries during the
//! join/heartbeat handshake.
//!
//! Wire layout (see the crate's `SPEC_FULL.md` §6 for the authoritative
//! byte table):
//!
//! ```text
//! offset  size  field
//! 0       1     msg_type
//! 1       2     net_addr (little-endian)
//! 3       N     payload
//! ```

use crate::error::GatewayError;

/// Header size in bytes: one byte message type, two bytes address.
pub const HEADER_SIZE: usize = 3;

/// Byte length of an encoded `JoinProbe`.
pub const JOIN_PROBE_SIZE: usize = 8;

/// Pipe number reserved for broadcast JOIN traffic.
pub const BROADCAST_PIPE: u8 = 0;

/// Every message type exchanged over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    JoinLocal,
    JoinGateway,
    JoinResult,
    UnjoinLocal,
    Heartbeat,
    App,
    AppFirst,
    AppFrag,
}

impl MsgType {
    fn to_byte(self) -> u8 {
        match self {
            MsgType::JoinLocal => 0,
            MsgType::JoinGateway => 1,
            MsgType::JoinResult => 2,
            MsgType::UnjoinLocal => 3,
            MsgType::Heartbeat => 4,
            MsgType::App => 5,
            MsgType::AppFirst => 6,
            MsgType::AppFrag => 7,
        }
    }

    fn from_byte(b: u8) -> Option<MsgType> {
        Some(match b {
            0 => MsgType::JoinLocal,
            1 => MsgType::JoinGateway,
            2 => MsgType::JoinResult,
            3 => MsgType::UnjoinLocal,
            4 => MsgType::Heartbeat,
            5 => MsgType::App,
            6 => MsgType::AppFirst,
            7 => MsgType::AppFrag,
            _ => return None,
        })
    }

    /// `true` for the three application-payload message types.
    pub fn is_app(self) -> bool {
        matches!(self, MsgType::App | MsgType::AppFirst | MsgType::AppFrag)
    }
}

/// A decoded on-air frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    pub msg_type: MsgType,
    pub net_addr: u16,
    pub payload: Vec<u8>,
}

/// Join/heartbeat admission outcome carried on a `JOIN_RESULT` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Success,
    ConnRefused,
}

/// The fixed-size payload of JOIN_LOCAL, JOIN_GATEWAY, JOIN_RESULT and
/// HEARTBEAT frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinProbe {
    pub maj_version: u8,
    pub min_version: u8,
    pub hashid: u32,
    /// Assigned pipe on a `JOIN_RESULT` reply; remaining retry budget while probing.
    pub data: u8,
    pub result: JoinOutcome,
}

impl JoinProbe {
    pub fn encode(&self) -> [u8; JOIN_PROBE_SIZE] {
        let mut out = [0u8; JOIN_PROBE_SIZE];
        out[0] = self.maj_version;
        out[1] = self.min_version;
        out[2..6].copy_from_slice(&self.hashid.to_le_bytes());
        out[6] = self.data;
        out[7] = match self.result {
            JoinOutcome::Success => 0,
            JoinOutcome::ConnRefused => 1,
        };
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<JoinProbe, GatewayError> {
        if bytes.len() != JOIN_PROBE_SIZE {
            return Err(GatewayError::Einval);
        }
        let hashid = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let result = if bytes[7] == 0 { JoinOutcome::Success } else { JoinOutcome::ConnRefused };
        Ok(JoinProbe { maj_version: bytes[0], min_version: bytes[1], hashid, data: bytes[6], result })
    }
}

/// Encodes and decodes `LinkFrame`s to and from the on-air byte layout.
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// `max_payload` is the hardware's maximum payload width (`MAX_PW`).
    pub fn new(max_payload: usize) -> Self {
        FrameCodec { max_frame_len: HEADER_SIZE + max_payload }
    }

    pub fn encode(&self, frame: &LinkFrame) -> Result<Vec<u8>, GatewayError> {
        let total = HEADER_SIZE + frame.payload.len();
        if total > self.max_frame_len {
            return Err(GatewayError::Einval);
        }
        let mut out = Vec::with_capacity(total);
        out.push(frame.msg_type.to_byte());
        out.extend_from_slice(&frame.net_addr.to_le_bytes());
        out.extend_from_slice(&frame.payload);
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<LinkFrame, GatewayError> {
        if bytes.len() < HEADER_SIZE || bytes.len() > self.max_frame_len {
            return Err(GatewayError::Einval);
        }
        let msg_type = MsgType::from_byte(bytes[0]).ok_or(GatewayError::Einval)?;
        let net_addr = u16::from_le_bytes([bytes[1], bytes[2]]);
        let payload = bytes[HEADER_SIZE..].to_vec();
        Ok(LinkFrame { msg_type, net_addr, payload })
    }
}
