//! Purpose: Typed in-memory result of decoding one message.
//! Exports: `MessageTree`, `Slot`, `Value`, `EnumValue`, `MapKey`, `OneofCase`, `UnknownField`.
//! Role: Produced by `core::decode`, consumed by `core::transcode`; owned by a single decode call.
//! Invariants: Slots are indexed by the field's position in its `MessageDescriptor`.
//! Invariants: Oneof members live only in their group's `OneofCase`, so at most one is ever set.
//! Invariants: Repeated slots stay sequences; merging appends, never collapses to a scalar.
use std::collections::BTreeMap;
use std::fmt;

use crate::core::wire::WireType;
use crate::schema::MessageDescriptor;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Message(MessageTree),
}

impl Value {
    /// True when the value equals its type's zero value (proto3 "unpopulated").
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Signed(v) => *v == 0,
            Value::Unsigned(v) => *v == 0,
            Value::Float(v) => v.to_bits() == 0,
            Value::Double(v) => v.to_bits() == 0,
            Value::Bool(v) => !*v,
            Value::Text(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Enum(v) => v.number == 0,
            Value::Message(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub number: i32,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl MapKey {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(MapKey::Bool(v)),
            Value::Signed(v) => Some(MapKey::Signed(v)),
            Value::Unsigned(v) => Some(MapKey::Unsigned(v)),
            Value::Text(v) => Some(MapKey::Text(v)),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(v) => write!(f, "{v}"),
            MapKey::Signed(v) => write!(f, "{v}"),
            MapKey::Unsigned(v) => write!(f, "{v}"),
            MapKey::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
    #[default]
    Absent,
    Single(Value),
    Repeated(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

static ABSENT: Slot = Slot::Absent;

#[derive(Clone, Debug, PartialEq)]
pub struct OneofCase {
    /// Index of the populated member in the message's field list.
    pub field: usize,
    pub value: Value,
}

/// A field the descriptor does not know, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownField {
    pub number: u32,
    pub wire_type: WireType,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageTree {
    slots: Vec<Slot>,
    oneofs: Vec<Option<OneofCase>>,
    unknown: Vec<UnknownField>,
}

impl MessageTree {
    pub fn for_message(descriptor: &MessageDescriptor) -> Self {
        Self {
            slots: vec![Slot::Absent; descriptor.fields().len()],
            oneofs: vec![None; descriptor.oneofs().len()],
            unknown: Vec::new(),
        }
    }

    pub fn slot(&self, index: usize) -> &Slot {
        self.slots.get(index).unwrap_or(&ABSENT)
    }

    pub fn oneof(&self, group: usize) -> Option<&OneofCase> {
        self.oneofs.get(group).and_then(Option::as_ref)
    }

    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// True when no known field, oneof member, or unknown field is present.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| matches!(slot, Slot::Absent))
            && self.oneofs.iter().all(Option::is_none)
            && self.unknown.is_empty()
    }

    /// Stores a singular value; a message landing on a message merges into it.
    pub fn set(&mut self, index: usize, value: Value) {
        let slot = self.slot_mut(index);
        match (slot, value) {
            (Slot::Single(Value::Message(existing)), Value::Message(incoming)) => {
                existing.merge(incoming);
            }
            (slot, value) => *slot = Slot::Single(value),
        }
    }

    pub fn push(&mut self, index: usize, value: Value) {
        let slot = self.slot_mut(index);
        match slot {
            Slot::Repeated(values) => values.push(value),
            _ => *slot = Slot::Repeated(vec![value]),
        }
    }

    pub fn insert_entry(&mut self, index: usize, key: MapKey, value: Value) {
        let slot = self.slot_mut(index);
        match slot {
            Slot::Map(entries) => {
                entries.insert(key, value);
            }
            _ => {
                let mut entries = BTreeMap::new();
                entries.insert(key, value);
                *slot = Slot::Map(entries);
            }
        }
    }

    /// Sets `field` as the active member of `group`, clearing any sibling.
    pub fn set_oneof(&mut self, group: usize, field: usize, value: Value) {
        if self.oneofs.len() <= group {
            self.oneofs.resize(group + 1, None);
        }
        let case = &mut self.oneofs[group];
        if let Some(OneofCase {
            field: current,
            value: Value::Message(existing),
        }) = case
            && *current == field
            && let Value::Message(incoming) = value
        {
            existing.merge(incoming);
            return;
        }
        *case = Some(OneofCase { field, value });
    }

    pub fn push_unknown(&mut self, field: UnknownField) {
        self.unknown.push(field);
    }

    /// Field-wise merge of `other` into `self` (protobuf merge semantics).
    ///
    /// Singular scalars from `other` overwrite, singular messages merge
    /// recursively, repeated fields append, map entries overwrite by key, and
    /// unknown fields accumulate.
    pub fn merge(&mut self, other: MessageTree) {
        let MessageTree {
            slots,
            oneofs,
            unknown,
        } = other;

        for (index, incoming) in slots.into_iter().enumerate() {
            match incoming {
                Slot::Absent => {}
                Slot::Single(value) => self.set(index, value),
                Slot::Repeated(values) => {
                    let slot = self.slot_mut(index);
                    match slot {
                        Slot::Repeated(existing) => existing.extend(values),
                        _ => *slot = Slot::Repeated(values),
                    }
                }
                Slot::Map(entries) => {
                    let slot = self.slot_mut(index);
                    match slot {
                        Slot::Map(existing) => existing.extend(entries),
                        _ => *slot = Slot::Map(entries),
                    }
                }
            }
        }

        for (group, case) in oneofs.into_iter().enumerate() {
            if let Some(OneofCase { field, value }) = case {
                self.set_oneof(group, field, value);
            }
        }

        self.unknown.extend(unknown);
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, Slot::Absent);
        }
        &mut self.slots[index]
    }
}
