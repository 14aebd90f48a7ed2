//! Retry delays for transient socket errors

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay after an error, in milliseconds
    pub initial_ms: u64,
    /// Upper bound on the delay, in milliseconds
    pub max_ms: u64,
    /// Growth factor between consecutive failures
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 5,
            max_ms: 1000,
            multiplier: 2,
        }
    }
}

/// Tracks the current delay across consecutive failures
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Delay to wait before the next attempt; grows on every call
    pub fn next_delay(&mut self) -> Duration {
        let max = Duration::from_millis(self.config.max_ms);
        let next = match self.current {
            None => Duration::from_millis(self.config.initial_ms),
            Some(prev) => prev.saturating_mul(self.config.multiplier.max(1)),
        }
        .min(max);

        self.current = Some(next);
        next
    }

    /// Forget past failures after a successful read
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<Duration> {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

/// Errors worth retrying on a datagram socket
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::OutOfMemory
    )
}
