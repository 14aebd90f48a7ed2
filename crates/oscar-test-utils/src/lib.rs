//! Common test helpers and utilities for oscar tests
//!
//! This crate provides:
//! - Port allocation
//! - Condition-based waiting (no hardcoded sleeps)
//! - A message collector usable as a dispatcher method
//! - A UDP test server with RAII cleanup

use oscar_core::Message;
use oscar_router::Dispatcher;
use oscar_transport::{OscServer, ServerConfig};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available UDP port for testing
pub fn find_available_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Poll `check` every `interval` until it holds or `max_wait` elapses
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Message Collector
// ============================================================================

/// Records every message handed to its handler, with arrival time
#[derive(Clone)]
pub struct MessageCollector {
    received: Arc<Mutex<Vec<(Message, Instant)>>>,
    count: Arc<AtomicU32>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A handler that can be registered on a dispatcher
    pub fn handler(&self) -> impl Fn(&Message) + Send + Sync + 'static {
        let received = self.received.clone();
        let count = self.count.clone();

        move |msg| {
            received.lock().push((msg.clone(), Instant::now()));
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Number of messages received
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n messages to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    /// All messages in arrival order
    pub fn messages(&self) -> Vec<Message> {
        self.received.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// All messages with their arrival instants
    pub fn received(&self) -> Vec<(Message, Instant)> {
        self.received.lock().clone()
    }

    /// Check if a message with this exact address arrived
    pub fn has_address(&self, address: &str) -> bool {
        self.received.lock().iter().any(|(m, _)| m.address == address)
    }

    pub fn last(&self) -> Option<Message> {
        self.received.lock().last().map(|(m, _)| m.clone())
    }

    pub fn clear(&self) {
        self.received.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Test Server - RAII wrapper with proper cleanup
// ============================================================================

/// A UDP server on an ephemeral port, stopped on drop
pub struct TestServer {
    addr: SocketAddr,
    dispatcher: Dispatcher,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Bind 127.0.0.1:0 and serve the given dispatcher
    pub async fn start(dispatcher: Dispatcher) -> Self {
        let config = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = OscServer::bind(config)
            .await
            .expect("test server should bind");
        let addr = server.local_addr().expect("bound socket has an address");

        let serve_dispatcher = dispatcher.clone();
        let handle = tokio::spawn(async move {
            let _ = server.serve(serve_dispatcher).await;
        });

        Self {
            addr,
            dispatcher,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop the server explicitly (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}
