//! UDP server and client
//!
//! One datagram carries exactly one OSC packet; datagram boundaries are the
//! framing.

use async_trait::async_trait;
use bytes::Bytes;
use oscar_core::{codec, Encoder, Message, Packet, DEFAULT_PORT, MAX_PACKET_SIZE};
use oscar_router::Dispatcher;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::backoff::{is_transient, Backoff, BackoffConfig};
use crate::error::{Result, TransportError};
use crate::traits::PacketSender;

/// UDP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:9000"
    pub bind: String,
    /// Per-read deadline in milliseconds (None = wait forever)
    pub read_timeout_ms: Option<u64>,
    /// Size of the datagram receive buffer
    pub recv_buffer_size: usize,
    /// Kernel receive buffer (SO_RCVBUF), if set
    pub socket_recv_buffer: Option<usize>,
    /// Allow rebinding an address in TIME_WAIT / shared multicast setups
    pub reuse_address: bool,
    /// Retry policy for transient read errors
    pub backoff: BackoffConfig,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_PORT),
            read_timeout_ms: None,
            recv_buffer_size: MAX_PACKET_SIZE + 1,
            socket_recv_buffer: None,
            reuse_address: false,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Receives OSC packets on a UDP socket and feeds them to a dispatcher
pub struct OscServer {
    socket: UdpSocket,
    config: ServerConfig,
    encoder: Encoder,
}

impl OscServer {
    /// Bind according to the configuration
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr = resolve(&config.bind).await?;
        let socket = bind_socket(addr, &config).map_err(|source| TransportError::BindFailed {
            addr: config.bind.clone(),
            source,
        })?;

        info!("OSC server bound to {}", socket.local_addr()?);
        Ok(Self::from_socket(socket, config))
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: UdpSocket, config: ServerConfig) -> Self {
        Self {
            socket,
            config,
            encoder: Encoder::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Read and decode a single packet
    pub async fn recv_packet(&self) -> Result<Packet> {
        self.recv_from().await.map(|(packet, _)| packet)
    }

    /// Read and decode a single packet, with its sender
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr)> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let (len, from) = self.read_datagram(&mut buf).await?;
        let packet = codec::decode(&buf[..len])?;
        Ok((packet, from))
    }

    /// Send a packet to a peer, e.g. a reply to whoever sent a request
    pub async fn send_to(&self, packet: &Packet, target: SocketAddr) -> Result<()> {
        let data = self.encoder.encode(packet)?;
        self.socket.send_to(&data, target).await?;
        Ok(())
    }

    /// Serve forever. Returns only on a non-transient socket error.
    pub async fn serve(&self, dispatcher: Dispatcher) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            match self.read_datagram(&mut buf).await {
                Ok((len, from)) => {
                    backoff.reset();
                    self.handle_datagram(&dispatcher, &buf[..len], from);
                }
                Err(TransportError::Timeout) => {
                    debug!("No datagram within the read timeout");
                }
                Err(TransportError::Io(e)) if is_transient(&e) => {
                    let delay = backoff.next_delay();
                    warn!("Transient receive error: {}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("OSC server stopped: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_until<F>(&self, dispatcher: Dispatcher, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.serve(dispatcher) => result,
            _ = shutdown => {
                info!("OSC server shutting down");
                Ok(())
            }
        }
    }

    fn handle_datagram(&self, dispatcher: &Dispatcher, data: &[u8], from: SocketAddr) {
        if data.len() > MAX_PACKET_SIZE {
            warn!("Dropping oversized datagram of {} bytes from {}", data.len(), from);
            return;
        }

        match codec::decode(data) {
            Ok(packet) => {
                debug!("Received {} from {}", packet, from);
                let dispatcher = dispatcher.clone();
                // Methods are synchronous user code
                tokio::task::spawn_blocking(move || dispatcher.dispatch(packet));
            }
            Err(e) => {
                warn!("Dropping undecodable datagram from {}: {}", from, e);
            }
        }
    }

    async fn read_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let read = self.socket.recv_from(buf);
        match self.config.read_timeout() {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(TransportError::Io),
            None => read.await.map_err(TransportError::Io),
        }
    }
}

/// Sends OSC packets to a single UDP peer
pub struct OscClient {
    socket: UdpSocket,
    target: SocketAddr,
    encoder: Encoder,
}

impl OscClient {
    /// Bind an ephemeral local port and connect it to `target`
    pub async fn connect(target: &str) -> Result<Self> {
        let target = resolve(target).await?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: local.to_string(),
                source,
            })?;
        socket
            .connect(target)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("OSC client {} -> {}", socket.local_addr()?, target);
        Ok(Self {
            socket,
            target,
            encoder: Encoder::new(),
        })
    }

    /// Encode and send a packet
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let data = self.encoder.encode(packet)?;
        self.send_datagram(&data).await
    }

    pub async fn send_message(&self, message: &Message) -> Result<()> {
        let data = self.encoder.encode_message(message)?;
        self.send_datagram(&data).await
    }

    /// Wait for a packet from the peer
    pub async fn recv_packet(&self, max_wait: Duration) -> Result<Packet> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
        let len = tokio::time::timeout(max_wait, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(codec::decode(&buf[..len])?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    async fn send_datagram(&self, data: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if sent != data.len() {
            return Err(TransportError::SendFailed(format!(
                "short write: {} of {} bytes",
                sent,
                data.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PacketSender for OscClient {
    async fn send_bytes(&self, data: Bytes) -> Result<()> {
        self.send_datagram(&data).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(packet).await
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.target)
    }
}

/// Resolve "host:port" to the first matching socket address
pub(crate) async fn resolve(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))
}

fn bind_socket(addr: SocketAddr, config: &ServerConfig) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if config.reuse_address {
        socket.set_reuse_address(true)?;
    }
    if let Some(size) = config.socket_recv_buffer {
        socket.set_recv_buffer_size(size)?;
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}
