//! The owned, tagged representation of a RESP3 value.
//!
//! Where [`super::raw::RawNode`] is a non-owning view into the parser's buffer, `Message` owns
//! its payload so it can outlive the parser's next `reclaim`. This is what [`super::builder`]
//! materializes a [`super::raw::RawTree`] into, and what [`crate::adapter::FromResp3`] consumes.

use super::kind::Kind;

/// Attribute pairs decorating a value, in wire order. Small in practice, so a `Vec` of pairs
/// (rather than a `HashMap`) avoids hashing keys nobody looks up by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap(pub Vec<(Message, Message)>);

impl AttributeMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Message> {
        self.0.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
    }
}

/// An owned RESP3 value, with any attribute map that decorated it on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SimpleString(String),
    SimpleError(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    /// Arbitrary-precision integer, kept as its wire-format digit string.
    BigNumber(String),
    Null,
    BulkString(Vec<u8>),
    BulkError(Vec<u8>),
    VerbatimString { format: [u8; 3], text: String },
    Array(Vec<Attributed>),
    Map(Vec<(Attributed, Attributed)>),
    Set(Vec<Attributed>),
    Push(Vec<Attributed>),
}

/// A value paired with the attribute map that decorated it, if any. Every nested value in an
/// aggregate carries its own (possibly empty) attributes, since `|` can prefix any value at any
/// depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed {
    pub attributes: AttributeMap,
    pub value: Message,
}

impl From<Message> for Attributed {
    fn from(value: Message) -> Self {
        Attributed { attributes: AttributeMap::default(), value }
    }
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::SimpleString(_) => Kind::SimpleString,
            Message::SimpleError(_) => Kind::SimpleError,
            Message::Integer(_) => Kind::Integer,
            Message::Double(_) => Kind::Double,
            Message::Boolean(_) => Kind::Boolean,
            Message::BigNumber(_) => Kind::BigNumber,
            Message::Null => Kind::Null,
            Message::BulkString(_) => Kind::BulkString,
            Message::BulkError(_) => Kind::BulkError,
            Message::VerbatimString { .. } => Kind::VerbatimString,
            Message::Array(_) => Kind::Array,
            Message::Map(_) => Kind::Map,
            Message::Set(_) => Kind::Set,
            Message::Push(_) => Kind::Push,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Message::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Message::SimpleError(_) | Message::BulkError(_))
    }

    /// The server's error text, for `simple_error`/`bulk_error` values.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            Message::SimpleError(s) => Some(s),
            Message::BulkError(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Borrow this value as text if it is one of the string-shaped kinds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Message::SimpleString(s) | Message::SimpleError(s) | Message::BigNumber(s) => Some(s),
            Message::VerbatimString { text, .. } => Some(text),
            Message::BulkString(b) | Message::BulkError(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}
