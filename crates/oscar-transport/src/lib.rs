//! oscar transports
//!
//! Network plumbing between sockets and an [`oscar_router::Dispatcher`]:
//! - UDP (one packet per datagram): [`OscServer`], [`OscClient`]
//! - TCP (length-prefixed stream): [`TcpOscListener`], [`TcpOscStream`]

pub mod backoff;
pub mod error;
pub mod tcp;
pub mod traits;
pub mod udp;

pub use backoff::{Backoff, BackoffConfig};
pub use error::{Result, TransportError};
pub use tcp::{TcpConfig, TcpOscListener, TcpOscStream, TcpPacketReceiver, TcpPacketSender};
pub use traits::{PacketReceiver, PacketSender, TransportEvent};
pub use udp::{OscClient, OscServer, ServerConfig};
