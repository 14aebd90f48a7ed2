//! Message dispatch and deferred bundle execution
//!
//! The address of an incoming message is compiled as a pattern and tested
//! against every registered (literal) method address. Bundles are never run
//! inline: their elements are re-dispatched once the bundle's time tag has
//! expired, on the ambient tokio runtime or on a short-lived OS thread when
//! there is none.

use oscar_core::{codec, Bundle, Message, Packet, Pattern, PatternError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::{RegistrationError, Result, RouterError};
use crate::registry::{Method, MethodRegistry, RegisteredMethod};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Log messages that select no method at debug level
    pub log_unmatched: bool,
    /// Name given to fallback scheduler threads
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            log_unmatched: true,
            thread_name: "oscar-bundle".to_string(),
        }
    }
}

/// Point-in-time copy of the dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub messages_dispatched: u64,
    pub handler_invocations: u64,
    pub handler_panics: u64,
    pub bundles_scheduled: u64,
    pub bundles_fired: u64,
    pub invalid_patterns: u64,
}

#[derive(Default)]
struct Counters {
    messages_dispatched: AtomicU64,
    handler_invocations: AtomicU64,
    handler_panics: AtomicU64,
    bundles_scheduled: AtomicU64,
    bundles_fired: AtomicU64,
    invalid_patterns: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            bundles_scheduled: self.bundles_scheduled.load(Ordering::Relaxed),
            bundles_fired: self.bundles_fired.load(Ordering::Relaxed),
            invalid_patterns: self.invalid_patterns.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    registry: MethodRegistry,
    counters: Counters,
}

/// Routes packets to registered methods
///
/// Cheap to clone; clones share the registry and counters.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: MethodRegistry::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a method at a literal address
    pub fn register<M: Method>(
        &self,
        address: &str,
        method: M,
    ) -> std::result::Result<(), RegistrationError> {
        self.register_arc(address, Arc::new(method))
    }

    /// Same as [`Dispatcher::register`]
    pub fn add_method<M: Method>(
        &self,
        address: &str,
        method: M,
    ) -> std::result::Result<(), RegistrationError> {
        self.register(address, method)
    }

    /// Register a shared method, e.g. one handler behind several addresses
    pub fn register_arc(
        &self,
        address: &str,
        method: Arc<dyn Method>,
    ) -> std::result::Result<(), RegistrationError> {
        self.inner.registry.register(address, method)?;
        debug!("Registered method {}", address);
        Ok(())
    }

    pub fn unregister(&self, address: &str) -> bool {
        self.inner.registry.unregister(address).is_some()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.registry.contains(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.inner.registry.addresses()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Fire-and-forget dispatch of a decoded packet
    ///
    /// Messages run their matching methods before this returns; bundles are
    /// scheduled and this returns immediately.
    pub fn dispatch(&self, packet: Packet) {
        match packet {
            Packet::Message(msg) => {
                // Already logged and counted
                let _ = self.dispatch_message(&msg);
            }
            Packet::Bundle(bundle) => {
                self.schedule(bundle);
            }
        }
    }

    /// Decode one datagram and dispatch it
    pub fn dispatch_bytes(&self, bytes: &[u8]) -> Result<()> {
        let packet = codec::decode(bytes)?;
        self.dispatch(packet);
        Ok(())
    }

    /// Run every method selected by the message's address pattern, one after
    /// the other. Returns how many methods were invoked.
    pub fn dispatch_message(&self, msg: &Message) -> std::result::Result<usize, PatternError> {
        let counters = &self.inner.counters;
        Counters::bump(&counters.messages_dispatched);

        let pattern = Pattern::compile(&msg.address).map_err(|e| {
            Counters::bump(&counters.invalid_patterns);
            warn!("Dropping message with invalid address pattern: {}", e);
            e
        })?;

        // Snapshot first: methods may re-enter the registry
        let methods = self.inner.registry.find_methods(&pattern);

        if methods.is_empty() && self.inner.config.log_unmatched {
            debug!("No method matches {}", msg.address);
        }

        for method in &methods {
            self.invoke(method, msg);
        }

        Ok(methods.len())
    }

    fn invoke(&self, method: &RegisteredMethod, msg: &Message) {
        let counters = &self.inner.counters;
        Counters::bump(&counters.handler_invocations);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| method.handler.handle(msg)));
        if let Err(payload) = outcome {
            Counters::bump(&counters.handler_panics);
            error!(
                "Method {} panicked while handling {}: {}",
                method.address,
                msg.address,
                panic_message(payload.as_ref())
            );
        }
    }

    /// Schedule a bundle's elements for dispatch once its time tag expires
    ///
    /// The returned handle can be awaited to observe completion; dropping it
    /// does not cancel anything.
    pub fn schedule(&self, bundle: Bundle) -> ScheduledBundle {
        Counters::bump(&self.inner.counters.bundles_scheduled);

        let delay = bundle.timetag.expires_in();
        let (done_tx, done_rx) = oneshot::channel();
        let dispatcher = self.clone();

        debug!(
            "Scheduling bundle of {} elements in {:?}",
            bundle.len(),
            delay
        );

        let fire = move || {
            for element in bundle.elements {
                dispatcher.dispatch(element);
            }
            Counters::bump(&dispatcher.inner.counters.bundles_fired);
            let _ = done_tx.send(());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let blocking = handle.clone();
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    // Methods are synchronous user code; keep them off the workers
                    blocking.spawn_blocking(fire);
                });
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name(self.inner.config.thread_name.clone())
                    .spawn(move || {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                        fire();
                    });
                if let Err(e) = spawned {
                    error!("Failed to spawn bundle scheduler thread: {}", e);
                }
            }
        }

        ScheduledBundle {
            delay,
            done: done_rx,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.counters.snapshot()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Completion handle for a scheduled bundle
#[derive(Debug)]
pub struct ScheduledBundle {
    delay: Duration,
    done: oneshot::Receiver<()>,
}

impl ScheduledBundle {
    /// Delay computed from the time tag when the bundle was scheduled
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until every element has been dispatched
    pub async fn wait(self) -> Result<()> {
        self.done.await.map_err(|_| RouterError::SchedulerDropped)
    }

    /// Blocking variant of [`ScheduledBundle::wait`] for synchronous callers.
    /// Must not be called from inside an async context.
    pub fn wait_blocking(self) -> Result<()> {
        self.done
            .blocking_recv()
            .map_err(|_| RouterError::SchedulerDropped)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
