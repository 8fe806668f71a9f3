//! Purpose: Compiled, immutable message/enum descriptors that drive decoding and transcoding.
//! Exports: `Schema`, `MessageRef`, `MessageDescriptor`, `FieldDescriptor`, `FieldType`, `Label`,
//!          `OneofDescriptor`, `EnumDescriptor`, `MessageId`, `EnumId`, plus the `spec` input types.
//! Role: Built once per process from a `SchemaSpec`, then shared read-only (usually via `Arc`).
//! Invariants: Field numbers and names are unique within a message; types resolve by index.
//! Invariants: A compiled `Schema` is never mutated, so concurrent readers need no locking.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};
use crate::core::tree::{EnumValue, MessageTree, Value};
use crate::core::wire::{MAX_FIELD_NUMBER, WireType};

mod spec;

pub use spec::{EnumSpec, EnumValueSpec, FieldSpec, Kind, LabelSpec, MessageSpec, SchemaSpec};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MessageId(usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EnumId(usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum(EnumId),
    Message(MessageId),
}

impl FieldType {
    /// Wire type this logical type is encoded with when not packed.
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::Fixed64,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// Scalars that may appear in a packed run.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message(_)
        )
    }

    /// 64-bit integers render as JSON strings.
    pub fn is_64bit_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::Uint64
                | FieldType::Sint64
                | FieldType::Fixed64
                | FieldType::Sfixed64
        )
    }

    fn is_map_key(self) -> bool {
        !matches!(
            self,
            FieldType::Double
                | FieldType::Float
                | FieldType::Bytes
                | FieldType::Enum(_)
                | FieldType::Message(_)
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Label {
    /// Implicit presence: a zero value is indistinguishable from absence.
    Singular,
    Optional,
    Required,
    Repeated,
    Map { key: FieldType },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub json_name: String,
    pub number: u32,
    pub ty: FieldType,
    pub label: Label,
    /// Index into the owning message's `oneofs()`.
    pub oneof: Option<usize>,
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        matches!(self.label, Label::Repeated)
    }

    pub fn is_map(&self) -> bool {
        matches!(self.label, Label::Map { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneofDescriptor {
    pub name: String,
    pub fields: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct MessageDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<OneofDescriptor>,
    by_number: HashMap<u32, usize>,
}

impl MessageDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn oneofs(&self) -> &[OneofDescriptor] {
        &self.oneofs
    }

    pub fn field_index(&self, number: u32) -> Option<usize> {
        self.by_number.get(&number).copied()
    }

    pub fn field_named(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct EnumDescriptor {
    name: String,
    values: Vec<EnumValueSpec>,
    by_number: HashMap<i32, usize>,
}

impl EnumDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[EnumValueSpec] {
        &self.values
    }

    /// Symbolic name for `number`; with aliases the first declared name wins.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number
            .get(&number)
            .map(|&index| self.values[index].name.as_str())
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|value| value.name == name)
            .map(|value| value.number)
    }

    pub fn value(&self, number: i32) -> EnumValue {
        EnumValue {
            number,
            name: self.name_of(number).map(str::to_string),
        }
    }

    /// The implicit default: first declared enumerator.
    pub fn first(&self) -> EnumValue {
        let first = &self.values[0];
        EnumValue {
            number: first.number,
            name: Some(first.name.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Schema {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    message_ids: HashMap<String, MessageId>,
    enum_ids: HashMap<String, EnumId>,
}

impl Schema {
    pub fn compile(spec: &SchemaSpec) -> Result<Self, Error> {
        let mut message_ids = HashMap::new();
        for (index, message) in spec.messages.iter().enumerate() {
            if message.name.is_empty() {
                return Err(schema_error("message name must not be empty"));
            }
            if message_ids
                .insert(message.name.clone(), MessageId(index))
                .is_some()
            {
                return Err(schema_error(format!(
                    "duplicate message name {}",
                    message.name
                )));
            }
        }

        let mut enum_ids = HashMap::new();
        let mut enums = Vec::with_capacity(spec.enums.len());
        for (index, enum_spec) in spec.enums.iter().enumerate() {
            if enum_ids.insert(enum_spec.name.clone(), EnumId(index)).is_some() {
                return Err(schema_error(format!("duplicate enum name {}", enum_spec.name)));
            }
            enums.push(compile_enum(enum_spec)?);
        }

        let mut schema = Schema {
            messages: Vec::with_capacity(spec.messages.len()),
            enums,
            message_ids,
            enum_ids,
        };
        for message in &spec.messages {
            let compiled = schema.compile_message(message)?;
            schema.messages.push(compiled);
        }
        Ok(schema)
    }

    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let spec: SchemaSpec = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Schema)
                .with_message("schema file is not valid")
                .with_source(err)
        })?;
        Self::compile(&spec)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read schema {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json_str(&text)
    }

    pub fn message(&self, name: &str) -> Option<MessageRef<'_>> {
        self.message_ids.get(name).map(|&id| self.message_by_id(id))
    }

    pub fn message_by_id(&self, id: MessageId) -> MessageRef<'_> {
        MessageRef { schema: self, id }
    }

    pub fn enum_named(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enum_ids.get(name).map(|&id| self.enum_by_id(id))
    }

    pub fn enum_by_id(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.0]
    }

    /// Zero value of `ty`: 0, false, empty text or bytes, the first enumerator, an empty message.
    pub fn zero_value(&self, ty: FieldType) -> Value {
        match ty {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Sfixed32
            | FieldType::Sfixed64 => Value::Signed(0),
            FieldType::Uint32 | FieldType::Uint64 | FieldType::Fixed32 | FieldType::Fixed64 => {
                Value::Unsigned(0)
            }
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::String => Value::Text(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Enum(id) => Value::Enum(self.enum_by_id(id).first()),
            FieldType::Message(id) => Value::Message(MessageTree::for_message(&self.messages[id.0])),
        }
    }

    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|message| message.name.as_str())
    }

    fn compile_message(&self, spec: &MessageSpec) -> Result<MessageDescriptor, Error> {
        let mut fields = Vec::with_capacity(spec.fields.len());
        let mut oneofs: Vec<OneofDescriptor> = Vec::new();
        let mut by_number = HashMap::new();
        let mut names = HashMap::new();
        let mut json_names = HashMap::new();

        for (index, field) in spec.fields.iter().enumerate() {
            let context = || format!("{}.{}", spec.name, field.name);
            if field.name.is_empty() {
                return Err(schema_error(format!(
                    "field {} of {} has no name",
                    field.number, spec.name
                )));
            }
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(schema_error(format!(
                    "field number {} is out of range",
                    field.number
                ))
                .with_field(context()));
            }
            if let Some(previous) = by_number.insert(field.number, index) {
                return Err(schema_error(format!(
                    "field number {} already used by {}",
                    field.number, spec.fields[previous].name
                ))
                .with_field(context()));
            }
            if names.insert(field.name.clone(), index).is_some() {
                return Err(schema_error("duplicate field name").with_field(context()));
            }

            let ty = self
                .resolve_type(field.kind, field.type_name.as_deref())
                .map_err(|err| err.with_field(context()))?;
            let label = match field.label {
                LabelSpec::Singular => Label::Singular,
                LabelSpec::Optional => Label::Optional,
                LabelSpec::Required => Label::Required,
                LabelSpec::Repeated => Label::Repeated,
                LabelSpec::Map => {
                    let Some(key_kind) = field.key_type else {
                        return Err(schema_error("map field needs key_type").with_field(context()));
                    };
                    let key = self
                        .resolve_type(key_kind, None)
                        .ok()
                        .filter(|key| key.is_map_key())
                        .ok_or_else(|| {
                            schema_error(format!("{key_kind:?} cannot be a map key"))
                                .with_field(context())
                        })?;
                    Label::Map { key }
                }
            };
            if field.key_type.is_some() && !matches!(label, Label::Map { .. }) {
                return Err(schema_error("key_type is only valid on map fields").with_field(context()));
            }

            let oneof = match &field.oneof {
                None => None,
                Some(group) => {
                    if !matches!(label, Label::Singular | Label::Optional) {
                        return Err(schema_error(
                            "oneof members cannot be required, repeated, or maps",
                        )
                        .with_field(context()));
                    }
                    let position = match oneofs.iter().position(|oneof| &oneof.name == group) {
                        Some(position) => position,
                        None => {
                            oneofs.push(OneofDescriptor {
                                name: group.clone(),
                                fields: Vec::new(),
                            });
                            oneofs.len() - 1
                        }
                    };
                    oneofs[position].fields.push(index);
                    Some(position)
                }
            };

            let default = match &field.default {
                None => None,
                Some(raw) => {
                    if !matches!(label, Label::Singular | Label::Optional | Label::Required)
                        || matches!(ty, FieldType::Message(_))
                    {
                        return Err(schema_error(
                            "defaults are only allowed on singular scalar fields",
                        )
                        .with_field(context()));
                    }
                    Some(
                        self.default_value(ty, raw)
                            .map_err(|err| err.with_field(context()))?,
                    )
                }
            };

            let json_name = field
                .json_name
                .clone()
                .unwrap_or_else(|| lower_camel(&field.name));
            match json_names.entry(json_name.clone()) {
                Entry::Occupied(_) => {
                    return Err(schema_error(format!("json name {json_name} is not unique"))
                        .with_field(context()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }

            fields.push(FieldDescriptor {
                name: field.name.clone(),
                json_name,
                number: field.number,
                ty,
                label,
                oneof,
                default,
            });
        }

        Ok(MessageDescriptor {
            name: spec.name.clone(),
            fields,
            oneofs,
            by_number,
        })
    }

    fn resolve_type(&self, kind: Kind, type_name: Option<&str>) -> Result<FieldType, Error> {
        let ty = match kind {
            Kind::Double => FieldType::Double,
            Kind::Float => FieldType::Float,
            Kind::Int32 => FieldType::Int32,
            Kind::Int64 => FieldType::Int64,
            Kind::Uint32 => FieldType::Uint32,
            Kind::Uint64 => FieldType::Uint64,
            Kind::Sint32 => FieldType::Sint32,
            Kind::Sint64 => FieldType::Sint64,
            Kind::Fixed32 => FieldType::Fixed32,
            Kind::Fixed64 => FieldType::Fixed64,
            Kind::Sfixed32 => FieldType::Sfixed32,
            Kind::Sfixed64 => FieldType::Sfixed64,
            Kind::Bool => FieldType::Bool,
            Kind::String => FieldType::String,
            Kind::Bytes => FieldType::Bytes,
            Kind::Enum => {
                let name = type_name.ok_or_else(|| schema_error("enum field needs type_name"))?;
                let id = self
                    .enum_ids
                    .get(name)
                    .ok_or_else(|| schema_error(format!("unknown enum {name}")))?;
                return Ok(FieldType::Enum(*id));
            }
            Kind::Message => {
                let name =
                    type_name.ok_or_else(|| schema_error("message field needs type_name"))?;
                let id = self
                    .message_ids
                    .get(name)
                    .ok_or_else(|| schema_error(format!("unknown message {name}")))?;
                return Ok(FieldType::Message(*id));
            }
        };
        if type_name.is_some() {
            return Err(schema_error(format!("{kind:?} fields take no type_name")));
        }
        Ok(ty)
    }

    fn default_value(&self, ty: FieldType, raw: &serde_json::Value) -> Result<Value, Error> {
        let mismatch = || schema_error(format!("default {raw} does not fit {ty:?}"));
        let value = match ty {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
                let v = json_i64(raw).ok_or_else(mismatch)?;
                i32::try_from(v).map_err(|_| mismatch())?;
                Value::Signed(v)
            }
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
                Value::Signed(json_i64(raw).ok_or_else(mismatch)?)
            }
            FieldType::Uint32 | FieldType::Fixed32 => {
                let v = json_u64(raw).ok_or_else(mismatch)?;
                u32::try_from(v).map_err(|_| mismatch())?;
                Value::Unsigned(v)
            }
            FieldType::Uint64 | FieldType::Fixed64 => {
                Value::Unsigned(json_u64(raw).ok_or_else(mismatch)?)
            }
            FieldType::Float => Value::Float(json_f64(raw).ok_or_else(mismatch)? as f32),
            FieldType::Double => Value::Double(json_f64(raw).ok_or_else(mismatch)?),
            FieldType::Bool => Value::Bool(raw.as_bool().ok_or_else(mismatch)?),
            FieldType::String => Value::Text(raw.as_str().ok_or_else(mismatch)?.to_string()),
            FieldType::Bytes => Value::Bytes(raw.as_str().ok_or_else(mismatch)?.as_bytes().to_vec()),
            FieldType::Enum(id) => {
                let descriptor = self.enum_by_id(id);
                let number = match raw {
                    serde_json::Value::String(name) => {
                        descriptor.number_of(name).ok_or_else(mismatch)?
                    }
                    other => json_i64(other)
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(mismatch)?,
                };
                Value::Enum(descriptor.value(number))
            }
            FieldType::Message(_) => return Err(mismatch()),
        };
        Ok(value)
    }
}

/// A message descriptor paired with the schema that resolves its references.
#[derive(Clone, Copy, Debug)]
pub struct MessageRef<'s> {
    schema: &'s Schema,
    id: MessageId,
}

impl<'s> MessageRef<'s> {
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn descriptor(&self) -> &'s MessageDescriptor {
        &self.schema.messages[self.id.0]
    }

    pub fn name(&self) -> &'s str {
        self.descriptor().name()
    }

    pub fn field_by_number(&self, number: u32) -> Option<(usize, &'s FieldDescriptor)> {
        let descriptor = self.descriptor();
        descriptor
            .field_index(number)
            .map(|index| (index, &descriptor.fields[index]))
    }

    pub fn nested(&self, id: MessageId) -> MessageRef<'s> {
        self.schema.message_by_id(id)
    }
}

fn compile_enum(spec: &EnumSpec) -> Result<EnumDescriptor, Error> {
    if spec.values.is_empty() {
        return Err(schema_error(format!("enum {} has no values", spec.name)));
    }
    let mut by_number = HashMap::new();
    for (index, value) in spec.values.iter().enumerate() {
        if spec.values[..index].iter().any(|seen| seen.name == value.name) {
            return Err(schema_error(format!(
                "enum {} repeats value name {}",
                spec.name, value.name
            )));
        }
        by_number.entry(value.number).or_insert(index);
    }
    Ok(EnumDescriptor {
        name: spec.name.clone(),
        values: spec.values.clone(),
        by_number,
    })
}

/// protoc's default JSON name: drop underscores, upper-case the letter after each.
pub(crate) fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn json_i64(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_u64(raw: &serde_json::Value) -> Option<u64> {
    match raw {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_f64(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn schema_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Schema).with_message(message)
}
