//! Packet data model and type tags

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Pattern;
use crate::error::DecodeError;
use crate::time::Timetag;

/// Type tag characters, one per argument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Int32 = b'i',
    Int64 = b'h',
    Float32 = b'f',
    Float64 = b'd',
    String = b's',
    Blob = b'b',
    TimeTag = b't',
    Nil = b'N',
    True = b'T',
    False = b'F',
}

impl TypeTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_char(self) -> char {
        self as u8 as char
    }

    pub fn from_char(c: char) -> Result<Self, DecodeError> {
        u8::try_from(c)
            .map_err(|_| DecodeError::UnsupportedTypeTag(c))
            .and_then(TypeTag::try_from)
    }

    /// Payload size for fixed-width kinds, `None` for strings and blobs
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeTag::Int32 | TypeTag::Float32 => Some(4),
            TypeTag::Int64 | TypeTag::Float64 | TypeTag::TimeTag => Some(8),
            TypeTag::Nil | TypeTag::True | TypeTag::False => Some(0),
            TypeTag::String | TypeTag::Blob => None,
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            b'i' => Ok(TypeTag::Int32),
            b'h' => Ok(TypeTag::Int64),
            b'f' => Ok(TypeTag::Float32),
            b'd' => Ok(TypeTag::Float64),
            b's' => Ok(TypeTag::String),
            b'b' => Ok(TypeTag::Blob),
            b't' => Ok(TypeTag::TimeTag),
            b'N' => Ok(TypeTag::Nil),
            b'T' => Ok(TypeTag::True),
            b'F' => Ok(TypeTag::False),
            other => Err(DecodeError::UnsupportedTypeTag(other as char)),
        }
    }
}

/// A single typed message argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Argument {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Blob(Vec<u8>),
    TimeTag(Timetag),
    Nil,
    True,
    False,
}

impl Argument {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Argument::Int32(_) => TypeTag::Int32,
            Argument::Int64(_) => TypeTag::Int64,
            Argument::Float32(_) => TypeTag::Float32,
            Argument::Float64(_) => TypeTag::Float64,
            Argument::String(_) => TypeTag::String,
            Argument::Blob(_) => TypeTag::Blob,
            Argument::TimeTag(_) => TypeTag::TimeTag,
            Argument::Nil => TypeTag::Nil,
            Argument::True => TypeTag::True,
            Argument::False => TypeTag::False,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Argument::Int32(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Argument::Int32(i) => Some(*i as i64),
            Argument::Int64(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Argument::Float32(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Argument::Float32(f) => Some(*f as f64),
            Argument::Float64(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Argument::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Argument::True => Some(true),
            Argument::False => Some(false),
            _ => None,
        }
    }

    pub fn as_timetag(&self) -> Option<Timetag> {
        match self {
            Argument::TimeTag(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Argument::Nil)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Int32(i) => write!(f, "{}", i),
            Argument::Int64(h) => write!(f, "{}", h),
            Argument::Float32(v) => write!(f, "{}", v),
            Argument::Float64(d) => write!(f, "{}", d),
            Argument::String(s) => write!(f, "{}", s),
            Argument::Blob(_) => write!(f, "blob"),
            Argument::TimeTag(t) => write!(f, "{}", t),
            Argument::Nil => write!(f, "Nil"),
            Argument::True => write!(f, "true"),
            Argument::False => write!(f, "false"),
        }
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Argument::Int32(v)
    }
}

impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Argument::Int64(v)
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Argument::Float32(v)
    }
}

impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Argument::Float64(v)
    }
}

impl From<bool> for Argument {
    fn from(v: bool) -> Self {
        if v {
            Argument::True
        } else {
            Argument::False
        }
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::String(v)
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::String(v.to_string())
    }
}

impl From<Vec<u8>> for Argument {
    fn from(v: Vec<u8>) -> Self {
        Argument::Blob(v)
    }
}

impl From<&[u8]> for Argument {
    fn from(v: &[u8]) -> Self {
        Argument::Blob(v.to_vec())
    }
}

impl From<Timetag> for Argument {
    fn from(v: Timetag) -> Self {
        Argument::TimeTag(v)
    }
}

impl<T: Into<Argument>> From<Option<T>> for Argument {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Argument::Nil)
    }
}

/// An address plus an ordered list of arguments
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    pub address: String,
    pub arguments: Vec<Argument>,
}

impl Message {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_args(address: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            address: address.into(),
            arguments,
        }
    }

    /// Builder-style append
    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn push(&mut self, arg: impl Into<Argument>) {
        self.arguments.push(arg.into());
    }

    /// Append several arguments at once
    pub fn append<I, A>(&mut self, args: I)
    where
        I: IntoIterator<Item = A>,
        A: Into<Argument>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Remove all arguments, keeping the address
    pub fn clear_arguments(&mut self) {
        self.arguments.clear();
    }

    /// Type tag string including the leading ','
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.arguments.len() + 1);
        tags.push(',');
        tags.extend(self.arguments.iter().map(|a| a.type_tag().as_char()));
        tags
    }

    /// Treat this message's address as a pattern and test a literal address
    /// against it. An uncompilable pattern matches nothing.
    pub fn matches(&self, address: &str) -> bool {
        Pattern::compile(&self.address)
            .map(|p| p.matches(address))
            .unwrap_or(false)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tags())?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A time tag plus nested packets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub timetag: Timetag,
    pub elements: Vec<Packet>,
}

impl Bundle {
    pub fn new(timetag: Timetag) -> Self {
        Self {
            timetag,
            elements: Vec::new(),
        }
    }

    /// Bundle whose contents are due immediately
    pub fn immediate() -> Self {
        Self::new(Timetag::IMMEDIATE)
    }

    pub fn with_elements(timetag: Timetag, elements: Vec<Packet>) -> Self {
        Self { timetag, elements }
    }

    /// Builder-style append
    pub fn element(mut self, packet: impl Into<Packet>) -> Self {
        self.elements.push(packet.into());
        self
    }

    pub fn push(&mut self, packet: impl Into<Packet>) {
        self.elements.push(packet.into());
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#bundle {} [", self.timetag)?;
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", element)?;
        }
        write!(f, "]")
    }
}

/// The unit of OSC transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl Packet {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Packet::Message(m) => Some(m),
            Packet::Bundle(_) => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Packet::Bundle(b) => Some(b),
            Packet::Message(_) => None,
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Packet::Bundle(_))
    }
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Packet::Bundle(b)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Message(m) => m.fmt(f),
            Packet::Bundle(b) => b.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_table() {
        for tag in b"ihfdsbtNTF" {
            let parsed = TypeTag::try_from(*tag).unwrap();
            assert_eq!(parsed.as_u8(), *tag);
        }
        assert_eq!(
            TypeTag::try_from(b'x'),
            Err(DecodeError::UnsupportedTypeTag('x'))
        );
        assert_eq!(TypeTag::from_char('T'), Ok(TypeTag::True));
        assert_eq!(
            TypeTag::from_char('é'),
            Err(DecodeError::UnsupportedTypeTag('é'))
        );
    }

    #[test]
    fn test_append() {
        let mut msg = Message::new("/list");
        msg.append([1i32, 2, 3]);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.type_tags(), ",iii");
    }

    #[test]
    fn test_type_tags_string() {
        let msg = Message::new("/foo")
            .arg(1000)
            .arg(-1)
            .arg("hello")
            .arg(1.234f32)
            .arg(5.678f32);
        assert_eq!(msg.type_tags(), ",iisff");
        assert_eq!(Message::new("/empty").type_tags(), ",");
    }

    #[test]
    fn test_argument_conversions() {
        assert_eq!(Argument::from(true), Argument::True);
        assert_eq!(Argument::from(false), Argument::False);
        assert_eq!(Argument::from(None::<i32>), Argument::Nil);
        assert_eq!(Argument::from(Some(3i64)), Argument::Int64(3));
        assert_eq!(Argument::from(&b"ab"[..]), Argument::Blob(vec![b'a', b'b']));
    }

    #[test]
    fn test_message_display() {
        let msg = Message::new("/a")
            .arg(1)
            .arg(2.5f32)
            .arg("hi")
            .arg(Argument::Nil)
            .arg(vec![1u8]);
        assert_eq!(msg.to_string(), "/a ,ifsNb 1 2.5 hi Nil blob");
    }

    #[test]
    fn test_message_matches_as_pattern() {
        let msg = Message::new("/synth/*/gain");
        assert!(msg.matches("/synth/1/gain"));
        assert!(!msg.matches("/synth/1/2/gain"));

        let broken = Message::new("/synth/[1");
        assert!(!broken.matches("/synth/1"));
    }

    #[test]
    fn test_bundle_builder_keeps_order() {
        let bundle = Bundle::immediate()
            .element(Message::new("/a"))
            .element(Bundle::immediate())
            .element(Message::new("/b"));
        assert_eq!(bundle.len(), 3);
        assert!(bundle.elements[1].is_bundle());
        assert_eq!(bundle.elements[2].as_message().unwrap().address, "/b");
    }
}
