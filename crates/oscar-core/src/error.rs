//! Error types for oscar

use thiserror::Error;

/// Result type alias for oscar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Umbrella error for callers that mix encoding, decoding and pattern work
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Errors raised while serializing a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Argument kind has no type tag. The closed `Argument` enum makes this
    /// unreachable from safe construction; kept so callers can match on the
    /// full taxonomy.
    #[error("unsupported argument type: {0}")]
    UnsupportedType(String),

    /// Serialized arguments exceed the packet budget
    #[error("payload too large: {0} bytes (max 65507)")]
    PayloadTooLarge(usize),

    /// Address + type tags + arguments exceed the packet budget
    #[error("packet too large: {0} bytes (max 65507)")]
    PacketTooLarge(usize),

    /// Blob data plus its size prefix does not fit the remaining budget
    #[error("blob of {len} bytes does not fit in the remaining {remaining} bytes")]
    BlobTooLarge { len: usize, remaining: usize },

    /// Zero-length blobs are not representable on the wire
    #[error("blob must contain at least one byte")]
    EmptyBlob,

    /// Address does not start with '/'
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// OSC strings are NUL terminated and cannot carry NUL bytes
    #[error("string contains a NUL byte: {0:?}")]
    InteriorNul(String),

    /// Bundle nesting deeper than the codec accepts
    #[error("bundle nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Errors raised while parsing a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Empty input or a first byte that is neither '/' nor '#'
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Length is not a multiple of 4
    #[error("data is not 32-bit aligned: {0} bytes")]
    MisalignedData(usize),

    /// Buffer ended before a string terminator or padding
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),

    /// Bundle shorter than "#bundle" + time tag
    #[error("truncated bundle: {0} bytes (min 16)")]
    TruncatedBundle(usize),

    /// Bundle start tag is not "#bundle"
    #[error("invalid bundle tag: {0:?}")]
    InvalidBundleTag(String),

    /// Declared element size is larger than what is left
    #[error("bundle element length {len} exceeds remaining {remaining} bytes")]
    InvalidElementLength { len: usize, remaining: usize },

    /// Type tag string does not start with ','
    #[error("invalid type tag string: {0:?}")]
    InvalidTypeTagString(String),

    /// Type tag outside the supported set
    #[error("unsupported type tag: {0:?}")]
    UnsupportedTypeTag(char),

    /// Not enough bytes left for a fixed-width or blob argument
    #[error("truncated argument '{tag}': need {needed} bytes, have {have}")]
    TruncatedArgument { tag: char, needed: usize, have: usize },

    /// Blob length is zero or larger than the remaining buffer
    #[error("invalid blob length {len} (remaining {remaining})")]
    InvalidBlobLength { len: usize, remaining: usize },

    /// Padding after a string or blob contains non-NUL bytes
    #[error("non-zero padding at offset {0}")]
    InvalidPadding(usize),

    /// String bytes are not UTF-8
    #[error("invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),

    /// Message buffer has bytes left after the last argument
    #[error("{0} trailing bytes after message arguments")]
    TrailingBytes(usize),

    /// Bundle nesting deeper than the codec accepts
    #[error("bundle nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Errors raised while compiling an address pattern
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("unbalanced '{delimiter}' in pattern {pattern:?}")]
    Unbalanced { pattern: String, delimiter: char },

    #[error("nested '{delimiter}' in pattern {pattern:?}")]
    Nested { pattern: String, delimiter: char },

    #[error("pattern {pattern:?} did not compile: {reason}")]
    Regex { pattern: String, reason: String },
}

/// Errors raised while validating a literal method address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("address must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("address {address:?} contains reserved character {character:?}")]
    ReservedCharacter { address: String, character: char },
}
