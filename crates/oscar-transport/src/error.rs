//! Transport error types

use oscar_core::{DecodeError, EncodeError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("timeout")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
