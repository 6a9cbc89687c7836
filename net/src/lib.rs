//! Networking stack: source-routed discovery/forwarding (miniroute),
//! unreliable datagrams (miniport), and a reliable byte-stream (minisocket),
//! all layered over an externalized [`link::Link`] (§4.4-§4.6, §6).

pub mod error;
pub mod link;
pub mod port;
pub mod route;
pub mod socket;
pub mod wire;

pub use error::NetError;
pub use link::Link;
pub use port::{MiniportSocket, MiniportSystem};
pub use route::Miniroute;
pub use socket::{MinisocketSystem, Socket};
