//! Block-I/O cache lock shim over an externalized block device (§4.7).
//!
//! The on-disk file system itself (directory walk, inode allocation,
//! `mkfs`) is out of scope — only the synchronization pattern survives,
//! the way `mthreads-net` keeps miniroute/miniport/minisocket but drops
//! real NIC delivery.

pub mod cache;
pub mod device;
pub mod error;

pub use cache::BlockCacheLock;
pub use device::BlockDevice;
pub use error::FsError;
