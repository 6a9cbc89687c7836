//! Block-device constants shared by the cache-lock shim (§4.7).

/// Fixed block size for the externalized `BlockDevice` (§4.7, §6).
pub const BLOCK_SIZE: usize = 4096;

/// A block number on the underlying device.
pub type BlockNum = u32;

/// Reserved: "no block" / invalid handle, mirroring `task::INVALID_THREAD_ID`.
pub const INVALID_BLOCK_NUM: BlockNum = BlockNum::MAX;
