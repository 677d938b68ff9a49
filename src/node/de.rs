//! Typed decoding of nodes
//!
//! `Node` is its own `serde::Deserializer`, so any subtree can be decoded
//! into the type that produced it.

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer as _, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

use serde_path_to_error::Segment;

use super::{Node, NodeError, Scalar};
use crate::error::ConfigError;
use crate::topic;

type Result<T> = std::result::Result<T, NodeError>;

impl de::Error for NodeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        NodeError(msg.to_string())
    }
}

/// Decode a node into a typed value
pub fn from_node<T: DeserializeOwned>(node: Node) -> Result<T> {
    T::deserialize(node)
}

/// Decode a node found at `base`, reporting failures at the offending leaf
///
/// The field path serde was decoding when it failed is joined onto `base`,
/// so a range error in `server.port` is reported at `server.port` rather
/// than at `server`.
pub fn from_node_at<T: DeserializeOwned>(node: Node, base: &str) -> crate::error::Result<T> {
    serde_path_to_error::deserialize(node).map_err(|e| {
        let mut at = base.to_string();
        for segment in e.path().iter() {
            let segment = match segment {
                Segment::Seq { index } => index.to_string(),
                Segment::Map { key } => key.clone(),
                Segment::Enum { variant } => variant.clone(),
                _ => continue,
            };
            at = topic::join(&at, &segment);
        }
        ConfigError::mismatch(at, e.into_inner().to_string())
    })
}

/// Mappings created on demand whose keys are `0..n` are read as sequences
fn as_sequence(entries: &std::collections::BTreeMap<String, Node>) -> bool {
    entries
        .keys()
        .all(|key| key.parse::<usize>().map_or(false, |i| i < entries.len()))
}

fn visit_sequence<'de, V: Visitor<'de>>(items: Vec<Node>, visitor: V) -> Result<V::Value> {
    let mut seq = SeqDeserializer::<_, NodeError>::new(items.into_iter());
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

impl<'de> IntoDeserializer<'de, NodeError> for Node {
    type Deserializer = Node;

    fn into_deserializer(self) -> Node {
        self
    }
}

impl<'de> de::Deserializer<'de> for Node {
    type Error = NodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Node::Scalar(Scalar::Null) => visitor.visit_unit(),
            Node::Scalar(Scalar::Bool(b)) => visitor.visit_bool(b),
            Node::Scalar(Scalar::Int(i)) => visitor.visit_i64(i),
            Node::Scalar(Scalar::Float(f)) => visitor.visit_f64(f),
            Node::Scalar(Scalar::Str(s)) => visitor.visit_string(s),
            Node::Record(fields) => {
                let mut map = MapDeserializer::<_, NodeError>::new(fields.into_iter().map(|(k, v)| (Key(k), v)));
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            Node::Mapping(entries) => {
                let mut map = MapDeserializer::<_, NodeError>::new(entries.into_iter().map(|(k, v)| (Key(k), v)));
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            Node::Sequence(items) => visit_sequence(items, visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Node::Scalar(Scalar::Null) => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            // Empty containers are persisted as a null marker
            Node::Scalar(Scalar::Null) => visit_sequence(Vec::new(), visitor),
            Node::Mapping(entries) if as_sequence(&entries) => {
                // BTreeMap order is lexical; restore index order
                let mut indexed: Vec<(usize, Node)> = entries
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                    .collect();
                indexed.sort_by_key(|(i, _)| *i);
                visit_sequence(indexed.into_iter().map(|(_, v)| v).collect(), visitor)
            }
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Node::Scalar(Scalar::Null) => Node::empty_mapping().deserialize_any(visitor),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_map(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self {
            Node::Scalar(Scalar::Str(variant)) => visitor.visit_enum(variant.into_deserializer()),
            other => Err(NodeError(format!(
                "expected a unit variant of {}, found {:?}",
                name,
                other.kind()
            ))),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Node::Scalar(Scalar::Null) => visitor.visit_unit(),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit_struct identifier
    }
}

// =============================================================================
// Map Keys
// =============================================================================

/// A path segment read back as a map key; parses itself for integer keys
struct Key(String);

impl<'de> IntoDeserializer<'de, NodeError> for Key {
    type Deserializer = Key;

    fn into_deserializer(self) -> Key {
        self
    }
}

macro_rules! parse_key {
    ($($method:ident => $ty:ty, $visit:ident;)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let parsed: $ty = self
                    .0
                    .parse()
                    .map_err(|_| NodeError(format!("invalid map key '{}'", self.0)))?;
                visitor.$visit(parsed)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Key {
    type Error = NodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.0)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self.0.into_deserializer())
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    parse_key! {
        deserialize_bool => bool, visit_bool;
        deserialize_i8 => i8, visit_i8;
        deserialize_i16 => i16, visit_i16;
        deserialize_i32 => i32, visit_i32;
        deserialize_i64 => i64, visit_i64;
        deserialize_u8 => u8, visit_u8;
        deserialize_u16 => u16, visit_u16;
        deserialize_u32 => u32, visit_u32;
        deserialize_u64 => u64, visit_u64;
        deserialize_char => char, visit_char;
    }

    forward_to_deserialize_any! {
        i128 u128 f32 f64 str string bytes byte_buf option unit unit_struct
        seq tuple tuple_struct map struct identifier ignored_any
    }
}
