//! OSC 1.0 binary codec
//!
//! Message layout:
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Address pattern    padded string ("/a/b\0..") │
//! │ Type tag string    padded string (",ifs\0..") │
//! │ Arguments          big-endian, 4-byte aligned │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Bundle layout:
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ "#bundle\0"        8 bytes                    │
//! │ Time tag           u64 NTP                    │
//! │ [u32 size | element]*                         │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Sizes are validated before anything is written, so a failed encode never
//! leaves partial output in the caller's buffer.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

use crate::encoding::{padded_blob_len, padded_len, write_blob, write_padded_string, Reader};
use crate::error::{DecodeError, EncodeError};
use crate::pool::BufferPool;
use crate::time::Timetag;
use crate::types::{Argument, Bundle, Message, Packet, TypeTag};

/// Largest datagram an encoded packet may occupy (65535 - 8 UDP - 20 IP)
pub const MAX_PACKET_SIZE: usize = 65507;

/// Deepest bundle nesting accepted by both directions
pub const MAX_BUNDLE_DEPTH: usize = 64;

/// Start tag of every bundle (written with its terminating NUL)
pub const BUNDLE_TAG: &str = "#bundle";

/// "#bundle\0" plus the time tag
pub const MIN_BUNDLE_SIZE: usize = 16;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a packet into a freshly allocated buffer
#[inline]
pub fn encode(packet: &Packet) -> Result<Bytes, EncodeError> {
    let size = encoded_len(packet)?;
    let mut buf = BytesMut::with_capacity(size);
    write_packet(&mut buf, packet);
    Ok(buf.freeze())
}

/// Encode a single message
#[inline]
pub fn encode_message(message: &Message) -> Result<Bytes, EncodeError> {
    let size = message_size(message)?;
    let mut buf = BytesMut::with_capacity(size);
    write_message(&mut buf, message);
    Ok(buf.freeze())
}

/// Encode a bundle
#[inline]
pub fn encode_bundle(bundle: &Bundle) -> Result<Bytes, EncodeError> {
    let size = bundle_size(bundle, 0)?;
    let mut buf = BytesMut::with_capacity(size);
    write_bundle(&mut buf, bundle);
    Ok(buf.freeze())
}

/// Append an encoded packet to `buf`. On error `buf` is untouched.
pub fn encode_to_buf(buf: &mut BytesMut, packet: &Packet) -> Result<usize, EncodeError> {
    let size = encoded_len(packet)?;
    buf.reserve(size);
    write_packet(buf, packet);
    Ok(size)
}

/// Exact encoded size of a packet, validating it on the way
pub fn encoded_len(packet: &Packet) -> Result<usize, EncodeError> {
    packet_size(packet, 0)
}

/// Decode a packet. The first byte selects message ('/') or bundle ('#').
#[inline]
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    decode_packet(bytes, 0)
}

/// Decode a buffer that must hold a single message
pub fn decode_message(bytes: &[u8]) -> Result<Message, DecodeError> {
    match bytes.first() {
        Some(b'/') => decode_message_body(bytes),
        Some(other) => Err(DecodeError::InvalidPacket(format!(
            "expected a message, first byte is 0x{:02x}",
            other
        ))),
        None => Err(DecodeError::InvalidPacket("empty packet".to_string())),
    }
}

/// Decode a buffer that must hold a bundle
pub fn decode_bundle(bytes: &[u8]) -> Result<Bundle, DecodeError> {
    decode_bundle_body(bytes, 0)
}

impl TryFrom<&[u8]> for Packet {
    type Error = DecodeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        decode(bytes)
    }
}

/// Encoder that serializes through pooled scratch buffers
///
/// Each call returns an independent `Bytes`; the scratch storage goes back to
/// the pool and is never exposed.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    pool: Arc<BufferPool>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a pool between several encoders
    pub fn with_pool(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    pub fn encode(&self, packet: &Packet) -> Result<Bytes, EncodeError> {
        let size = encoded_len(packet)?;
        let mut scratch = self.pool.checkout();
        scratch.reserve(size);
        write_packet(&mut scratch, packet);
        Ok(Bytes::copy_from_slice(&scratch))
    }

    pub fn encode_message(&self, message: &Message) -> Result<Bytes, EncodeError> {
        let size = message_size(message)?;
        let mut scratch = self.pool.checkout();
        scratch.reserve(size);
        write_message(&mut scratch, message);
        Ok(Bytes::copy_from_slice(&scratch))
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

// ============================================================================
// SIZE AND VALIDATION
// ============================================================================

fn packet_size(packet: &Packet, depth: usize) -> Result<usize, EncodeError> {
    match packet {
        Packet::Message(m) => message_size(m),
        Packet::Bundle(b) => bundle_size(b, depth),
    }
}

fn message_size(msg: &Message) -> Result<usize, EncodeError> {
    if !msg.address.starts_with('/') {
        return Err(EncodeError::InvalidAddress(msg.address.clone()));
    }
    if msg.address.contains('\0') {
        return Err(EncodeError::InteriorNul(msg.address.clone()));
    }

    let mut payload = 0usize;
    for arg in &msg.arguments {
        payload += match arg {
            Argument::String(s) => {
                if s.contains('\0') {
                    return Err(EncodeError::InteriorNul(s.clone()));
                }
                padded_len(s.len())
            }
            Argument::Blob(data) => {
                if data.is_empty() {
                    return Err(EncodeError::EmptyBlob);
                }
                let remaining = MAX_PACKET_SIZE.saturating_sub(payload);
                if data.len() + 4 > remaining {
                    return Err(EncodeError::BlobTooLarge {
                        len: data.len(),
                        remaining,
                    });
                }
                padded_blob_len(data.len())
            }
            other => other.type_tag().fixed_width().unwrap_or(0),
        };
    }

    if payload > MAX_PACKET_SIZE {
        return Err(EncodeError::PayloadTooLarge(payload));
    }

    let total = padded_len(msg.address.len())
        + padded_len(msg.arguments.len() + 1)
        + payload;
    if total > MAX_PACKET_SIZE {
        return Err(EncodeError::PacketTooLarge(total));
    }

    Ok(total)
}

fn bundle_size(bundle: &Bundle, depth: usize) -> Result<usize, EncodeError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(EncodeError::NestingTooDeep(MAX_BUNDLE_DEPTH));
    }

    let mut total = MIN_BUNDLE_SIZE;
    for element in &bundle.elements {
        total += 4 + packet_size(element, depth + 1)?;
        if total > MAX_PACKET_SIZE {
            return Err(EncodeError::PacketTooLarge(total));
        }
    }

    Ok(total)
}

// ============================================================================
// WRITERS
// ============================================================================

fn write_packet(buf: &mut BytesMut, packet: &Packet) {
    match packet {
        Packet::Message(m) => write_message(buf, m),
        Packet::Bundle(b) => write_bundle(buf, b),
    }
}

fn write_message(buf: &mut BytesMut, msg: &Message) {
    write_padded_string(buf, &msg.address);

    // Type tags: ',' + one byte per argument, then NUL padding
    let tag_count = msg.arguments.len() + 1;
    buf.put_u8(b',');
    for arg in &msg.arguments {
        buf.put_u8(arg.type_tag().as_u8());
    }
    buf.put_bytes(0, padded_len(tag_count) - tag_count);

    for arg in &msg.arguments {
        write_argument(buf, arg);
    }
}

#[inline]
fn write_argument(buf: &mut BytesMut, arg: &Argument) {
    match arg {
        Argument::Int32(v) => buf.put_i32(*v),
        Argument::Int64(v) => buf.put_i64(*v),
        Argument::Float32(v) => buf.put_f32(*v),
        Argument::Float64(v) => buf.put_f64(*v),
        Argument::String(s) => write_padded_string(buf, s),
        Argument::Blob(data) => write_blob(buf, data),
        Argument::TimeTag(t) => buf.put_u64(t.as_u64()),
        Argument::Nil | Argument::True | Argument::False => {}
    }
}

fn write_bundle(buf: &mut BytesMut, bundle: &Bundle) {
    write_padded_string(buf, BUNDLE_TAG);
    buf.put_u64(bundle.timetag.as_u64());

    for element in &bundle.elements {
        let size_at = buf.len();
        buf.put_u32(0);
        write_packet(buf, element);
        let size = (buf.len() - size_at - 4) as u32;
        buf[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
    }
}

// ============================================================================
// READERS
// ============================================================================

fn decode_packet(bytes: &[u8], depth: usize) -> Result<Packet, DecodeError> {
    match bytes.first() {
        None => Err(DecodeError::InvalidPacket("empty packet".to_string())),
        Some(b'/') => decode_message_body(bytes).map(Packet::Message),
        Some(b'#') => decode_bundle_body(bytes, depth).map(Packet::Bundle),
        Some(other) => Err(DecodeError::InvalidPacket(format!(
            "first byte must be '/' or '#', got 0x{:02x}",
            other
        ))),
    }
}

fn decode_message_body(bytes: &[u8]) -> Result<Message, DecodeError> {
    let mut reader = Reader::new(bytes);
    let address = reader.read_padded_string()?;

    if bytes.len() % 4 != 0 {
        return Err(DecodeError::MisalignedData(bytes.len()));
    }

    if reader.is_empty() {
        return Err(DecodeError::UnexpectedEof(reader.position()));
    }

    let tags = reader.read_padded_string()?;
    let tags = tags
        .strip_prefix(',')
        .ok_or_else(|| DecodeError::InvalidTypeTagString(tags.to_string()))?;

    let mut arguments = Vec::with_capacity(tags.len());
    for tag in tags.bytes() {
        let tag = TypeTag::try_from(tag)?;
        arguments.push(read_argument(&mut reader, tag)?);
    }

    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(Message {
        address: address.to_string(),
        arguments,
    })
}

#[inline]
fn read_argument(reader: &mut Reader<'_>, tag: TypeTag) -> Result<Argument, DecodeError> {
    let c = tag.as_char();
    Ok(match tag {
        TypeTag::Int32 => Argument::Int32(reader.read_u32(c)? as i32),
        TypeTag::Int64 => Argument::Int64(reader.read_u64(c)? as i64),
        TypeTag::Float32 => Argument::Float32(f32::from_bits(reader.read_u32(c)?)),
        TypeTag::Float64 => Argument::Float64(f64::from_bits(reader.read_u64(c)?)),
        TypeTag::String => Argument::String(reader.read_padded_string()?.to_string()),
        TypeTag::Blob => Argument::Blob(reader.read_blob()?.to_vec()),
        TypeTag::TimeTag => Argument::TimeTag(Timetag::new(reader.read_u64(c)?)),
        TypeTag::Nil => Argument::Nil,
        TypeTag::True => Argument::True,
        TypeTag::False => Argument::False,
    })
}

fn decode_bundle_body(bytes: &[u8], depth: usize) -> Result<Bundle, DecodeError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(DecodeError::NestingTooDeep(MAX_BUNDLE_DEPTH));
    }
    if bytes.len() < MIN_BUNDLE_SIZE {
        return Err(DecodeError::TruncatedBundle(bytes.len()));
    }
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::MisalignedData(bytes.len()));
    }

    let mut reader = Reader::new(bytes);
    let tag = reader
        .read_padded_string()
        .map_err(|_| DecodeError::InvalidBundleTag(lossy_prefix(bytes)))?;
    if tag != BUNDLE_TAG {
        return Err(DecodeError::InvalidBundleTag(tag.to_string()));
    }

    let timetag = Timetag::new(
        reader
            .read_u64('t')
            .map_err(|_| DecodeError::TruncatedBundle(bytes.len()))?,
    );

    let mut elements = Vec::new();
    while !reader.is_empty() {
        let len = reader
            .read_u32('#')
            .map_err(|_| DecodeError::TruncatedBundle(bytes.len()))? as usize;
        let remaining = reader.remaining();
        if len > remaining {
            return Err(DecodeError::InvalidElementLength { len, remaining });
        }
        let element = reader.take(len, '#')?;
        elements.push(decode_packet(element, depth + 1)?);
    }

    Ok(Bundle { timetag, elements })
}

fn lossy_prefix(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(8)]).into_owned()
}
