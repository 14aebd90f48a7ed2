//! 32-bit alignment primitives shared by the message and bundle codecs
//!
//! Every OSC atom occupies a multiple of four bytes:
//! ```text
//! string:  b y t e s \0 [\0 ...]          NUL terminated, padded to 4
//! blob:    u32 size | data | [\0 ...]     padding covers the data only
//! int32:   4 bytes big-endian
//! int64:   8 bytes big-endian
//! ```

use crate::error::DecodeError;
use bytes::{BufMut, BytesMut};

/// Alignment unit of every OSC atom
pub const ALIGNMENT: usize = 4;

/// Number of NUL bytes needed to bring `len` up to the next multiple of 4
#[inline]
pub const fn pad_len(len: usize) -> usize {
    (ALIGNMENT - len % ALIGNMENT) % ALIGNMENT
}

/// Encoded size of a string of `len` bytes (terminator and padding included)
#[inline]
pub const fn padded_len(len: usize) -> usize {
    let with_nul = len + 1;
    with_nul + pad_len(with_nul)
}

/// Encoded size of a blob carrying `len` data bytes (size prefix included)
#[inline]
pub const fn padded_blob_len(len: usize) -> usize {
    4 + len + pad_len(len)
}

/// Write a NUL terminated, 4-byte aligned string
///
/// The caller guarantees `s` has no interior NUL.
pub fn write_padded_string(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, padded_len(s.len()) - s.len());
}

/// Write a size-prefixed, 4-byte aligned blob
pub fn write_blob(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
    buf.put_bytes(0, pad_len(data.len()));
}

/// Bounds-checked cursor over an encoded packet
///
/// Offsets reported in errors are relative to the start of the slice the
/// reader was created with.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a padded string. Fails on a missing terminator, a short buffer,
    /// non-zero padding or invalid UTF-8.
    pub fn read_padded_string(&mut self) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let rest = &self.data[start..];

        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(DecodeError::UnexpectedEof(self.data.len()))?;

        let total = padded_len(nul);
        if total > rest.len() {
            return Err(DecodeError::UnexpectedEof(self.data.len()));
        }

        if let Some(i) = rest[nul..total].iter().position(|b| *b != 0) {
            return Err(DecodeError::InvalidPadding(start + nul + i));
        }

        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| DecodeError::InvalidUtf8(start + e.valid_up_to()))?;

        self.pos += total;
        Ok(s)
    }

    /// Read a size-prefixed blob and skip its padding
    pub fn read_blob(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32('b')? as usize;
        let remaining = self.remaining();

        if len < 1 || len > remaining {
            return Err(DecodeError::InvalidBlobLength { len, remaining });
        }

        let total = len + pad_len(len);
        let body = self.take(total, 'b')?;

        if let Some(i) = body[len..].iter().position(|b| *b != 0) {
            return Err(DecodeError::InvalidPadding(self.pos - total + len + i));
        }

        Ok(&body[..len])
    }

    /// Take `n` raw bytes; `tag` names the atom being read for error reports
    pub fn take(&mut self, n: usize, tag: char) -> Result<&'a [u8], DecodeError> {
        let have = self.remaining();
        if n > have {
            return Err(DecodeError::TruncatedArgument {
                tag,
                needed: n,
                have,
            });
        }

        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self, tag: char) -> Result<u32, DecodeError> {
        let bytes = self.take(4, tag)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self, tag: char) -> Result<u64, DecodeError> {
        let bytes = self.take(8, tag)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    /// Remaining unread bytes
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
