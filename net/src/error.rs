//! Network-subsystem error type (§7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("port already in use")]
    PortInUse,

    #[error("no unbound ports remain")]
    NoMorePorts,

    #[error("unknown port {0}")]
    UnknownPort(u16),

    #[error("payload exceeds max message size ({0} > {1})")]
    PayloadTooLarge(usize, usize),

    #[error("link send failed")]
    LinkError,

    #[error("route discovery to {0} timed out")]
    DiscoveryTimedOut(mthreads_abi::NetworkAddress),

    #[error("route length exceeded maximum hop count")]
    RouteTooLong,

    #[error("connection reset")]
    ConnectionReset,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("malformed packet")]
    MalformedPacket,
}
