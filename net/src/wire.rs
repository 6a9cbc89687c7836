//! Wire encode/decode for the three header layers (§6):
//! miniroute (source-routed, carried on every frame), then either a
//! miniport datagram header or a minisocket reliable-stream header.
//!
//! Hand-rolled big-endian packing, matching the teacher's `packetbuf.rs`
//! style rather than reaching for a derive-based codec — these headers are
//! small, fixed-shape, and read directly off/onto `Link` frames.

use mthreads_abi::net::{InnerProtocol, MinirouteType, MinisocketMessageType, MAX_ROUTE_LENGTH};
use mthreads_abi::NetworkAddress;

use crate::error::NetError;

/// Source-routed miniroute header, prepended to every frame (§4.5, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinirouteHeader {
    pub packet_type: MinirouteType,
    pub ttl: u8,
    /// Correlates a Discovery with its Reply; ignored for Data packets.
    pub discovery_id: u32,
    pub destination: NetworkAddress,
    pub source: NetworkAddress,
    /// Accumulated hop path, source to current point, at most
    /// `MAX_ROUTE_LENGTH` entries.
    pub path: Vec<NetworkAddress>,
}

impl MinirouteHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.packet_type as u8);
        out.push(self.ttl);
        out.extend_from_slice(&self.discovery_id.to_be_bytes());
        out.extend_from_slice(&self.destination.to_be_bytes());
        out.extend_from_slice(&self.source.to_be_bytes());
        out.push(self.path.len() as u8);
        for hop in &self.path {
            out.extend_from_slice(&hop.to_be_bytes());
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), NetError> {
        if buf.len() < 1 + 1 + 4 + 8 + 8 + 1 {
            return Err(NetError::MalformedPacket);
        }
        let packet_type = MinirouteType::from_u8(buf[0]).ok_or(NetError::MalformedPacket)?;
        let ttl = buf[1];
        let discovery_id = u32::from_be_bytes(buf[2..6].try_into().unwrap());
        let destination = NetworkAddress::from_be_bytes(buf[6..14].try_into().unwrap());
        let source = NetworkAddress::from_be_bytes(buf[14..22].try_into().unwrap());
        let path_len = buf[22] as usize;
        if path_len > MAX_ROUTE_LENGTH {
            return Err(NetError::RouteTooLong);
        }
        let path_start = 23;
        let path_bytes = path_len * NetworkAddress::WIRE_LEN;
        if buf.len() < path_start + path_bytes {
            return Err(NetError::MalformedPacket);
        }
        let mut path = Vec::with_capacity(path_len);
        for i in 0..path_len {
            let start = path_start + i * NetworkAddress::WIRE_LEN;
            let chunk = &buf[start..start + NetworkAddress::WIRE_LEN];
            path.push(NetworkAddress::from_be_bytes(chunk.try_into().unwrap()));
        }
        let rest = &buf[path_start + path_bytes..];
        Ok((
            Self {
                packet_type,
                ttl,
                discovery_id,
                destination,
                source,
                path,
            },
            rest,
        ))
    }
}

/// Miniport unreliable-datagram header (§4.4, §6: protocol = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub source_port: u16,
    pub dest_port: u16,
}

impl DatagramHeader {
    pub const WIRE_LEN: usize = 1 + 2 + 2;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(InnerProtocol::MiniDatagram as u8);
        out.extend_from_slice(&self.source_port.to_be_bytes());
        out.extend_from_slice(&self.dest_port.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), NetError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(NetError::MalformedPacket);
        }
        if InnerProtocol::from_u8(buf[0]) != Some(InnerProtocol::MiniDatagram) {
            return Err(NetError::MalformedPacket);
        }
        let source_port = u16::from_be_bytes(buf[1..3].try_into().unwrap());
        let dest_port = u16::from_be_bytes(buf[3..5].try_into().unwrap());
        Ok((
            Self {
                source_port,
                dest_port,
            },
            &buf[Self::WIRE_LEN..],
        ))
    }
}

/// Minisocket reliable-stream header (§4.6, §6: protocol = 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliableHeader {
    pub message_type: MinisocketMessageType,
    pub source_port: u16,
    pub dest_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
}

impl ReliableHeader {
    pub const WIRE_LEN: usize = 1 + 1 + 2 + 2 + 4 + 4;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(InnerProtocol::MiniStream as u8);
        out.push(self.message_type as u8);
        out.extend_from_slice(&self.source_port.to_be_bytes());
        out.extend_from_slice(&self.dest_port.to_be_bytes());
        out.extend_from_slice(&self.seq_number.to_be_bytes());
        out.extend_from_slice(&self.ack_number.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), NetError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(NetError::MalformedPacket);
        }
        if InnerProtocol::from_u8(buf[0]) != Some(InnerProtocol::MiniStream) {
            return Err(NetError::MalformedPacket);
        }
        let message_type =
            MinisocketMessageType::from_u8(buf[1]).ok_or(NetError::MalformedPacket)?;
        let source_port = u16::from_be_bytes(buf[2..4].try_into().unwrap());
        let dest_port = u16::from_be_bytes(buf[4..6].try_into().unwrap());
        let seq_number = u32::from_be_bytes(buf[6..10].try_into().unwrap());
        let ack_number = u32::from_be_bytes(buf[10..14].try_into().unwrap());
        Ok((
            Self {
                message_type,
                source_port,
                dest_port,
                seq_number,
                ack_number,
            },
            &buf[Self::WIRE_LEN..],
        ))
    }
}
