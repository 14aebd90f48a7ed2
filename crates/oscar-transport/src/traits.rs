//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use oscar_core::{codec, Packet};
use std::net::SocketAddr;

use crate::error::Result;

/// Events produced by a stream receiver
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded packet
    Packet(Packet),
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// A frame arrived but could not be decoded; the stream stays usable
    Error(String),
}

/// Anything that can put encoded OSC packets on the wire
#[async_trait]
pub trait PacketSender: Send + Sync {
    /// Send an already encoded packet
    async fn send_bytes(&self, data: Bytes) -> Result<()>;

    /// Encode and send a packet
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let data = codec::encode(packet)?;
        self.send_bytes(data).await
    }

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Remote address, if the transport has one
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Trait for receiving from a stream transport
#[async_trait]
pub trait PacketReceiver: Send {
    /// Receive the next event, `None` once the connection is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}
