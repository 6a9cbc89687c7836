//! Network node addressing.
//!
//! The spec treats addresses as opaque 8-byte values (§6, miniroute header:
//! "8 bytes final destination"). We give that 8-byte value a newtype so the
//! rest of the stack never juggles raw `u64`s or `[u8; 8]`s directly.

use core::fmt;

/// An 8-byte node address, unique per participant in the miniroute mesh.
///
/// Network byte order (big-endian) is used on the wire; in memory this is
/// just a `u64` for cheap hashing/equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkAddress(pub u64);

impl NetworkAddress {
    pub const BROADCAST: NetworkAddress = NetworkAddress(u64::MAX);
    pub const UNSPECIFIED: NetworkAddress = NetworkAddress(0);

    pub const WIRE_LEN: usize = 8;

    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{:#x}", self.0)
    }
}

impl From<u64> for NetworkAddress {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
