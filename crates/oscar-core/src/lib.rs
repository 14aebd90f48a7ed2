//! oscar core
//!
//! Packet model, binary codec and address patterns for Open Sound Control 1.0.
//!
//! This crate provides:
//! - The packet data model ([`Message`], [`Bundle`], [`Packet`], [`Argument`])
//! - Binary encoding/decoding ([`codec`], [`Encoder`])
//! - Address validation and pattern matching ([`Address`], [`Pattern`])
//! - NTP time tags ([`Timetag`])

pub mod address;
pub mod codec;
pub mod encoding;
pub mod error;
pub mod pool;
pub mod time;
pub mod types;

pub use address::{Address, Pattern};
pub use codec::{decode, encode, Encoder, MAX_BUNDLE_DEPTH, MAX_PACKET_SIZE};
pub use error::{AddressError, DecodeError, EncodeError, Error, PatternError, Result};
pub use pool::BufferPool;
pub use time::Timetag;
pub use types::*;

/// Default UDP port used by the server and CLI
pub const DEFAULT_PORT: u16 = 9000;
