//! Queue items
//!
//! An [`Item`] is the only thing that travels over a streamplex queue. The
//! first item of a queue decides how the whole collection is framed: a keyed
//! item makes it a JSON object, a plain value makes it an array, and the two
//! sentinels describe an empty collection of a known shape.

use crate::ProduceError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

/// Syntactic kind of an encoded collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// `[v1,v2,...]`
    Array,
    /// `{"k1":v1,"k2":v2,...}`
    Object,
}

impl CollectionKind {
    /// Opening delimiter
    pub fn open(self) -> &'static [u8] {
        match self {
            CollectionKind::Array => b"[",
            CollectionKind::Object => b"{",
        }
    }

    /// Closing delimiter
    pub fn close(self) -> &'static [u8] {
        match self {
            CollectionKind::Array => b"]",
            CollectionKind::Object => b"}",
        }
    }

    /// Encoding of the empty collection of this kind
    pub fn empty(self) -> &'static [u8] {
        match self {
            CollectionKind::Array => b"[]",
            CollectionKind::Object => b"{}",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Array => write!(f, "array"),
            CollectionKind::Object => write!(f, "object"),
        }
    }
}

/// One unit flowing through a queue
///
/// Items are created by producers and consumed exactly once by the encoder
/// or the document assembler. They are never mutated in between.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A plain value; the enclosing collection renders as an array
    Value(JsonValue),

    /// A key/value pair; the enclosing collection renders as an object
    Keyed {
        /// Object key, encoded as a JSON string
        key: String,
        /// Value stored under `key`
        value: JsonValue,
    },

    /// Marks an empty array; only meaningful as the first item of a queue
    EmptyList,

    /// Marks an empty object; only meaningful as the first item of a queue
    EmptyDictionary,

    /// Terminal producer failure
    Error(ProduceError),
}

impl Item {
    /// Plain value item
    pub fn value(value: impl Into<JsonValue>) -> Self {
        Item::Value(value.into())
    }

    /// Keyed item
    pub fn keyed(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Item::Keyed {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Serialize any value into a plain item
    pub fn from_serialize<T>(value: &T) -> Result<Self, ProduceError>
    where
        T: Serialize + ?Sized,
    {
        Ok(Item::Value(serde_json::to_value(value)?))
    }

    /// Serialize any value into a keyed item
    pub fn keyed_from_serialize<T>(key: impl Into<String>, value: &T) -> Result<Self, ProduceError>
    where
        T: Serialize + ?Sized,
    {
        Ok(Item::Keyed {
            key: key.into(),
            value: serde_json::to_value(value)?,
        })
    }

    /// Sentinel for an empty collection of the given kind
    pub fn empty(kind: CollectionKind) -> Self {
        match kind {
            CollectionKind::Array => Item::EmptyList,
            CollectionKind::Object => Item::EmptyDictionary,
        }
    }

    /// Collection kind this item implies when it comes first
    ///
    /// Returns `None` for [`Item::Error`], which frames nothing.
    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match self {
            Item::Value(_) | Item::EmptyList => Some(CollectionKind::Array),
            Item::Keyed { .. } | Item::EmptyDictionary => Some(CollectionKind::Object),
            Item::Error(_) => None,
        }
    }

    /// True for the empty-collection sentinels
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Item::EmptyList | Item::EmptyDictionary)
    }

    /// True for [`Item::Error`]
    pub fn is_error(&self) -> bool {
        matches!(self, Item::Error(_))
    }
}

impl From<ProduceError> for Item {
    fn from(error: ProduceError) -> Self {
        Item::Error(error)
    }
}
