//! Reflection serializer
//!
//! A `serde::Serializer` whose output is a `Node`. Unlike a generic data
//! format it keeps structs (`Record`) apart from maps (`Mapping`), which is
//! what decides whether a new path segment may be created on update.

use std::collections::BTreeMap;

use serde::ser::{self, Impossible, Serialize, Serializer as _};

use super::{Node, NodeError, Scalar};

type Result<T> = std::result::Result<T, NodeError>;

impl ser::Error for NodeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        NodeError(msg.to_string())
    }
}

/// Reflect a typed value into its node tree
pub fn reflect<T: Serialize + ?Sized>(value: &T) -> Result<Node> {
    value.serialize(NodeSerializer)
}

fn unsupported(what: &str) -> NodeError {
    NodeError(format!("unsupported node kind: {}", what))
}

fn int_from<T: TryInto<i64> + std::fmt::Display + Copy>(value: T) -> Result<Node> {
    value
        .try_into()
        .map(|i| Node::Scalar(Scalar::Int(i)))
        .map_err(|_| NodeError(format!("integer {} does not fit in i64", value)))
}

struct NodeSerializer;

impl ser::Serializer for NodeSerializer {
    type Ok = Node;
    type Error = NodeError;

    type SerializeSeq = SequenceBuilder;
    type SerializeTuple = SequenceBuilder;
    type SerializeTupleStruct = SequenceBuilder;
    type SerializeTupleVariant = Impossible<Node, NodeError>;
    type SerializeMap = MappingBuilder;
    type SerializeStruct = RecordBuilder;
    type SerializeStructVariant = Impossible<Node, NodeError>;

    fn serialize_bool(self, v: bool) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Int(v)))
    }

    fn serialize_i128(self, v: i128) -> Result<Node> {
        int_from(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Node> {
        self.serialize_i64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Node> {
        int_from(v)
    }

    fn serialize_u128(self, v: u128) -> Result<Node> {
        int_from(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Node> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Float(v)))
    }

    fn serialize_char(self, v: char) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(v.to_string())))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Node> {
        Err(unsupported("byte array"))
    }

    fn serialize_none(self) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Null))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Null))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Null))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(variant.to_string())))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Node> {
        Err(unsupported(&format!("enum variant {}::{}", name, variant)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SequenceBuilder> {
        Ok(SequenceBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SequenceBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SequenceBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(unsupported(&format!("enum variant {}::{}", name, variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MappingBuilder> {
        Ok(MappingBuilder {
            entries: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<RecordBuilder> {
        Ok(RecordBuilder {
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(unsupported(&format!("enum variant {}::{}", name, variant)))
    }
}

// =============================================================================
// Compound Builders
// =============================================================================

pub(super) struct SequenceBuilder {
    items: Vec<Node>,
}

impl ser::SerializeSeq for SequenceBuilder {
    type Ok = Node;
    type Error = NodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTuple for SequenceBuilder {
    type Ok = Node;
    type Error = NodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SequenceBuilder {
    type Ok = Node;
    type Error = NodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node> {
        ser::SerializeSeq::end(self)
    }
}

pub(super) struct MappingBuilder {
    entries: BTreeMap<String, Node>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MappingBuilder {
    type Ok = Node;
    type Error = NodeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| NodeError("map value serialized before its key".to_string()))?;
        let node = value.serialize(NodeSerializer)?;
        if self.entries.insert(key.clone(), node).is_some() {
            return Err(NodeError(format!("duplicate map key '{}'", key)));
        }
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Mapping(self.entries))
    }
}

pub(super) struct RecordBuilder {
    fields: Vec<(String, Node)>,
}

impl ser::SerializeStruct for RecordBuilder {
    type Ok = Node;
    type Error = NodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.fields.push((key.to_string(), value.serialize(NodeSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Record(self.fields))
    }
}

// =============================================================================
// Map Keys
// =============================================================================

/// Map keys become path segments, so only string-like keys are allowed
struct KeySerializer;

fn key_error() -> NodeError {
    NodeError("map keys must be strings, integers, chars or bools".to_string())
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = NodeError;

    type SerializeSeq = Impossible<String, NodeError>;
    type SerializeTuple = Impossible<String, NodeError>;
    type SerializeTupleStruct = Impossible<String, NodeError>;
    type SerializeTupleVariant = Impossible<String, NodeError>;
    type SerializeMap = Impossible<String, NodeError>;
    type SerializeStruct = Impossible<String, NodeError>;
    type SerializeStructVariant = Impossible<String, NodeError>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(key_error())
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(key_error())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(key_error())
    }

    fn serialize_none(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(key_error())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_error())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_error())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(key_error())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(key_error())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_error())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_error())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(key_error())
    }
}
