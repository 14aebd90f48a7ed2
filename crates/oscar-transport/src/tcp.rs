//! OSC over TCP
//!
//! A stream carries a sequence of packets, each preceded by its length as a
//! 4-byte big-endian integer.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use oscar_core::{codec, MAX_PACKET_SIZE};
use oscar_router::Dispatcher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{PacketReceiver, PacketSender, TransportEvent};

/// Length prefix size
pub const FRAME_HEADER_LEN: usize = 4;

/// TCP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Largest accepted frame body
    pub max_frame_size: usize,
    /// Initial read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive idle time in seconds (0 = disabled)
    pub keepalive_secs: u64,
    /// Capacity of the per-connection event and outgoing queues
    pub channel_capacity: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_PACKET_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
            channel_capacity: 1000,
        }
    }
}

/// Prefix an encoded packet with its length
pub fn encode_frame(data: &[u8], max_frame_size: usize) -> Result<Bytes> {
    if data.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            len: data.len(),
            max: max_frame_size,
        });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + data.len());
    frame.put_u32(data.len() as u32);
    frame.extend_from_slice(data);
    Ok(frame.freeze())
}

/// Incremental splitter for length-prefixed frames
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self::with_capacity(max_frame_size, 8192)
    }

    pub fn with_capacity(max_frame_size: usize, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            max_frame_size,
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Buffer for reading directly from the socket
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes held that do not yet form a whole frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame body, if any
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = (&self.buf[..FRAME_HEADER_LEN]).get_u32() as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        if self.buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(FRAME_HEADER_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

/// Client side of a TCP connection
pub struct TcpOscStream;

impl TcpOscStream {
    /// Connect with the default configuration
    pub async fn connect(addr: &str) -> Result<(TcpPacketSender, TcpPacketReceiver)> {
        Self::connect_with_config(addr, TcpConfig::default()).await
    }

    pub async fn connect_with_config(
        addr: &str,
        config: TcpConfig,
    ) -> Result<(TcpPacketSender, TcpPacketReceiver)> {
        info!("Connecting to OSC/TCP {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let halves = spawn_connection(stream, &config)?;
        info!("OSC/TCP connected to {}", addr);
        Ok(halves)
    }
}

/// Accepts OSC/TCP connections
pub struct TcpOscListener {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpOscListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, TcpConfig::default()).await
    }

    pub async fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|source| TransportError::BindFailed {
                    addr: addr.to_string(),
                    source,
                })?;

        info!("OSC/TCP listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }

    /// Wait for the next connection
    pub async fn accept(&self) -> Result<(TcpPacketSender, TcpPacketReceiver)> {
        let (stream, peer) = self.listener.accept().await?;
        info!("OSC/TCP connection from {}", peer);
        spawn_connection(stream, &self.config)
    }

    /// Accept connections forever, dispatching every packet that arrives
    pub async fn serve(&self, dispatcher: Dispatcher) -> Result<()> {
        loop {
            let (_sender, mut receiver) = match self.accept().await {
                Ok(halves) => halves,
                Err(TransportError::Io(e)) if crate::backoff::is_transient(&e) => {
                    warn!("Transient accept error: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    match event {
                        TransportEvent::Packet(packet) => {
                            let dispatcher = dispatcher.clone();
                            tokio::task::spawn_blocking(move || dispatcher.dispatch(packet));
                        }
                        TransportEvent::Error(e) => warn!("Dropping frame: {}", e),
                        TransportEvent::Disconnected { reason } => {
                            debug!("OSC/TCP peer disconnected: {:?}", reason);
                            break;
                        }
                    }
                }
            });
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    config: &TcpConfig,
) -> Result<(TcpPacketSender, TcpPacketReceiver)> {
    if config.keepalive_secs > 0 {
        let socket = socket2::SockRef::from(&stream);
        let keepalive =
            socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.keepalive_secs));
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to enable TCP keepalive: {}", e);
        }
    }

    let peer = stream.peer_addr().ok();
    let connected = Arc::new(Mutex::new(true));
    let capacity = config.channel_capacity.max(1);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(capacity);
    let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(capacity);

    let sender = TcpPacketSender {
        tx: outgoing_tx,
        connected: connected.clone(),
        peer,
        max_frame_size: config.max_frame_size,
    };
    let receiver = TcpPacketReceiver { rx: incoming_rx };

    let decoder = FrameDecoder::with_capacity(config.max_frame_size, config.read_buffer_size);
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        run_io_loop(reader, writer, outgoing_rx, incoming_tx, decoder, connected).await;
    });

    Ok((sender, receiver))
}

async fn run_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    mut decoder: FrameDecoder,
    connected: Arc<Mutex<bool>>,
) {
    'io: loop {
        tokio::select! {
            Some(frame) = outgoing_rx.recv() => {
                if let Err(e) = writer.write_all(&frame).await {
                    error!("OSC/TCP write error: {}", e);
                    let _ = incoming_tx.send(TransportEvent::Disconnected {
                        reason: Some(e.to_string()),
                    }).await;
                    break;
                }
            }

            result = reader.read_buf(decoder.buffer_mut()) => {
                match result {
                    Ok(0) => {
                        debug!("OSC/TCP connection closed");
                        let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(_) => loop {
                        match decoder.next_frame() {
                            Ok(Some(frame)) => {
                                let event = match codec::decode(&frame) {
                                    Ok(packet) => TransportEvent::Packet(packet),
                                    Err(e) => TransportEvent::Error(e.to_string()),
                                };
                                if incoming_tx.send(event).await.is_err() {
                                    break 'io;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                // Stream position is lost past a bad length prefix
                                error!("OSC/TCP framing error: {}", e);
                                let _ = incoming_tx.send(TransportEvent::Disconnected {
                                    reason: Some(e.to_string()),
                                }).await;
                                break 'io;
                            }
                        }
                    },
                    Err(e) => {
                        error!("OSC/TCP read error: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        }).await;
                        break;
                    }
                }
            }
        }
    }

    *connected.lock() = false;
}

/// Writing half of an OSC/TCP connection
#[derive(Clone)]
pub struct TcpPacketSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
    peer: Option<SocketAddr>,
    max_frame_size: usize,
}

impl TcpPacketSender {
    /// Stop accepting new sends; the connection closes once both halves drop
    pub fn close(&self) {
        *self.connected.lock() = false;
    }
}

#[async_trait]
impl PacketSender for TcpPacketSender {
    async fn send_bytes(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        let frame = encode_frame(&data, self.max_frame_size)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// Reading half of an OSC/TCP connection
pub struct TcpPacketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl PacketReceiver for TcpPacketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscar_core::{Message, Packet};

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.max_frame_size, MAX_PACKET_SIZE);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.keepalive_secs, 30);
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(b"/a\0\0,\0\0\0", 1024).unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 8]);
        assert_eq!(&frame[4..], b"/a\0\0,\0\0\0");

        assert!(matches!(
            encode_frame(&[0u8; 16], 8),
            Err(TransportError::FrameTooLarge { len: 16, max: 8 })
        ));
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let first = encode_frame(b"abcd", 64).unwrap();
        let second = encode_frame(b"efghijkl", 64).unwrap();

        let mut decoder = FrameDecoder::new(64);
        decoder.extend(&first[..3]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(&first[3..]);
        decoder.extend(&second[..6]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), &b"abcd"[..]);
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 6);

        decoder.extend(&second[6..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), &b"efghijkl"[..]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_rejects_oversized_prefix() {
        let mut decoder = FrameDecoder::new(16);
        decoder.extend(&[0, 0, 1, 0]);
        assert!(matches!(
            decoder.next_frame(),
            Err(TransportError::FrameTooLarge { len: 256, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let listener = TcpOscListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_handle = tokio::spawn(async move {
            let (sender, mut receiver) = listener.accept().await.unwrap();
            // Echo one packet back
            if let Some(TransportEvent::Packet(packet)) = receiver.recv().await {
                sender.send_packet(&packet).await.unwrap();
            }
            (sender, receiver)
        });

        let (client_sender, mut client_receiver) =
            TcpOscStream::connect(&addr.to_string()).await.unwrap();

        let packet = Packet::Message(Message::new("/echo").arg(42i32).arg("hi"));
        client_sender.send_packet(&packet).await.unwrap();

        match client_receiver.recv().await {
            Some(TransportEvent::Packet(received)) => assert_eq!(received, packet),
            other => panic!("Expected packet, got {:?}", other),
        }

        client_sender.close();
        assert!(client_sender.send_packet(&packet).await.is_err());
        let _ = accept_handle.await;
    }
}
