//! Wire-level constants and tagged types shared by `mthreads-net` (§6, §4.4-4.6).

/// Unbound miniports are caller-chosen, 0..32767.
pub const UNBOUND_PORT_MIN: u16 = 0;
pub const UNBOUND_PORT_MAX: u16 = 32_767;

/// Bound miniports are assigned by the runtime, 32768..65535.
pub const BOUND_PORT_MIN: u16 = 32_768;
pub const BOUND_PORT_MAX: u16 = 65_535;

/// Server minisockets, 0..32767; client minisockets, 32768..65535 (§6).
pub const SERVER_SOCKET_MIN: u16 = 0;
pub const SERVER_SOCKET_MAX: u16 = 32_767;
pub const CLIENT_SOCKET_MIN: u16 = 32_768;
pub const CLIENT_SOCKET_MAX: u16 = 65_535;

/// Maximum source-routed hop count (§3, §4.5).
pub const MAX_ROUTE_LENGTH: usize = 10;

/// Shared MTU: the largest payload a single miniport datagram or minisocket
/// DATA chunk may carry (§4.4: "Max payload = MINIMSG_MAX_MSG_SIZE").
pub const MINIMSG_MAX_MSG_SIZE: usize = 4096;

/// Protocol discriminant carried by the inner (post-miniroute) header,
/// dispatched by `Dest-of-DATA` (§4.5) to either miniport or minisocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InnerProtocol {
    MiniDatagram = 1,
    MiniStream = 2,
}

impl InnerProtocol {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::MiniDatagram),
            2 => Some(Self::MiniStream),
            _ => None,
        }
    }
}

/// Miniroute packet type (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MinirouteType {
    Data = 0,
    Discovery = 1,
    Reply = 2,
}

impl MinirouteType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Data),
            1 => Some(Self::Discovery),
            2 => Some(Self::Reply),
            _ => None,
        }
    }
}

/// Minisocket message type (§4.6, §6). `Data` carries protocol value 0 per
/// the wire format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MinisocketMessageType {
    Data = 0,
    Syn = 1,
    SynAck = 2,
    Ack = 3,
    Fin = 4,
}

impl MinisocketMessageType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Data),
            1 => Some(Self::Syn),
            2 => Some(Self::SynAck),
            3 => Some(Self::Ack),
            4 => Some(Self::Fin),
            _ => None,
        }
    }
}

/// Retransmission schedule for SYN / SYNACK / DATA chunks (§4.6).
pub const RETRANSMIT_MAX_ATTEMPTS: u32 = 7;
pub const RETRANSMIT_BASE_MS: u64 = 100;

#[inline]
pub fn retransmit_delay_ms(attempt: u32) -> u64 {
    RETRANSMIT_BASE_MS.saturating_mul(1u64 << attempt.min(31))
}

/// Route discovery: retry count and per-attempt timeout (§4.5).
pub const DISCOVERY_MAX_ATTEMPTS: u32 = 3;
pub const DISCOVERY_TIMEOUT_MS: u64 = 12_000;
