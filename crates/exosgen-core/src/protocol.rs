//! Wire protocol shared by the generated C channel and the Rust channel model.
//!
//! Every frame is one kind byte followed by a kind-specific payload. Integers
//! are little-endian.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Publisher,
    Subscriber,
}

impl ChannelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::Publisher => "PUB",
            ChannelRole::Subscriber => "SUB",
        }
    }

    pub fn peer(self) -> ChannelRole {
        match self {
            ChannelRole::Publisher => ChannelRole::Subscriber,
            ChannelRole::Subscriber => ChannelRole::Publisher,
        }
    }

    /// Value passed as `role` to `exosgen_transport_open`.
    pub fn wire_value(self) -> u8 {
        match self {
            ChannelRole::Publisher => 1,
            ChannelRole::Subscriber => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Operational,
    Disconnecting,
    Aborted,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 5] = [
        ConnectionState::Uninitialized,
        ConnectionState::Connecting,
        ConnectionState::Operational,
        ConnectionState::Disconnecting,
        ConnectionState::Aborted,
    ];

    /// Suffix of the generated C enum constant (`<TYPE>_STATE_<suffix>`).
    pub fn c_suffix(self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "UNINITIALIZED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Operational => "OPERATIONAL",
            ConnectionState::Disconnecting => "DISCONNECTING",
            ConnectionState::Aborted => "ABORTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Announce = 1,
    Ack = 2,
    Reject = 3,
    Data = 4,
    Bye = 5,
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::Announce,
        FrameKind::Ack,
        FrameKind::Reject,
        FrameKind::Data,
        FrameKind::Bye,
    ];

    pub fn from_u8(b: u8) -> Option<Self> {
        FrameKind::ALL.into_iter().find(|k| *k as u8 == b)
    }

    pub fn c_suffix(self) -> &'static str {
        match self {
            FrameKind::Announce => "ANNOUNCE",
            FrameKind::Ack => "ACK",
            FrameKind::Reject => "REJECT",
            FrameKind::Data => "DATA",
            FrameKind::Bye => "BYE",
        }
    }
}

/// Payload length of ANNOUNCE: fingerprint (8) + record size (4).
pub const ANNOUNCE_PAYLOAD_LEN: usize = 12;
/// Payload length of ACK and REJECT: fingerprint (8).
pub const FINGERPRINT_PAYLOAD_LEN: usize = 8;

/// Status codes returned by the generated entry points (`<TYPE>_<suffix>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    ErrConnection = -1,
    ErrRejected = -2,
    ErrTransport = -3,
    ErrState = -4,
}

impl StatusCode {
    pub const ALL: [StatusCode; 5] = [
        StatusCode::Ok,
        StatusCode::ErrConnection,
        StatusCode::ErrRejected,
        StatusCode::ErrTransport,
        StatusCode::ErrState,
    ];

    pub fn c_suffix(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::ErrConnection => "ERR_CONNECTION",
            StatusCode::ErrRejected => "ERR_REJECTED",
            StatusCode::ErrTransport => "ERR_TRANSPORT",
            StatusCode::ErrState => "ERR_STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Announce { fingerprint: u64, size: u32 },
    Ack { fingerprint: u64 },
    Reject { fingerprint: u64 },
    Data(Vec<u8>),
    Bye,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Announce { .. } => FrameKind::Announce,
            Frame::Ack { .. } => FrameKind::Ack,
            Frame::Reject { .. } => FrameKind::Reject,
            Frame::Data(_) => FrameKind::Data,
            Frame::Bye => FrameKind::Bye,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind() as u8];
        match self {
            Frame::Announce { fingerprint, size } => {
                out.extend_from_slice(&fingerprint.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            Frame::Ack { fingerprint } | Frame::Reject { fingerprint } => {
                out.extend_from_slice(&fingerprint.to_le_bytes());
            }
            Frame::Data(bytes) => out.extend_from_slice(bytes),
            Frame::Bye => {}
        }
        out
    }

    /// Returns `None` for unknown kinds and truncated control payloads.
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        let (&kind, payload) = bytes.split_first()?;
        match FrameKind::from_u8(kind)? {
            FrameKind::Announce => {
                if payload.len() != ANNOUNCE_PAYLOAD_LEN {
                    return None;
                }
                Some(Frame::Announce {
                    fingerprint: read_u64_le(&payload[..8]),
                    size: u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
                })
            }
            FrameKind::Ack => Some(Frame::Ack {
                fingerprint: decode_fingerprint(payload)?,
            }),
            FrameKind::Reject => Some(Frame::Reject {
                fingerprint: decode_fingerprint(payload)?,
            }),
            FrameKind::Data => Some(Frame::Data(payload.to_vec())),
            FrameKind::Bye => payload.is_empty().then_some(Frame::Bye),
        }
    }
}

fn decode_fingerprint(payload: &[u8]) -> Option<u64> {
    (payload.len() == FINGERPRINT_PAYLOAD_LEN).then(|| read_u64_le(payload))
}

fn read_u64_le(b: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[..8]);
    u64::from_le_bytes(buf)
}
