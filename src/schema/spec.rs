//! Purpose: Declarative, serde-loadable description of message types and enums.
//! Exports: `SchemaSpec`, `MessageSpec`, `FieldSpec`, `EnumSpec`, `EnumValueSpec`, `Kind`, `LabelSpec`.
//! Role: Input to `Schema::compile`; doubles as the on-disk schema file format and a builder API.
//! Invariants: Nothing here is validated; `Schema::compile` owns every consistency check.
//! Invariants: Serialized field names are the published schema-file keys; keep them stable.
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSpec {
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
    #[serde(default)]
    pub enums: Vec<EnumSpec>,
}

impl SchemaSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: MessageSpec) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enumeration(mut self, spec: EnumSpec) -> Self {
        self.enums.push(spec);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl MessageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// Logical field type as written in schema files.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
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
    Enum,
    Message,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSpec {
    #[default]
    Singular,
    Optional,
    Required,
    Repeated,
    Map,
}

impl LabelSpec {
    fn is_singular(&self) -> bool {
        matches!(self, LabelSpec::Singular)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "LabelSpec::is_singular")]
    pub label: LabelSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<Kind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oneof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, number: u32, kind: Kind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            type_name: None,
            label: LabelSpec::Singular,
            key_type: None,
            oneof: None,
            json_name: None,
            default: None,
        }
    }

    pub fn message(name: impl Into<String>, number: u32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, Kind::Message).type_name(type_name)
    }

    pub fn enumeration(name: impl Into<String>, number: u32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, Kind::Enum).type_name(type_name)
    }

    /// A map field; `kind`/`type_name` describe the value, `key` the key.
    pub fn map(name: impl Into<String>, number: u32, key: Kind, value: Kind) -> Self {
        let mut spec = Self::new(name, number, value);
        spec.label = LabelSpec::Map;
        spec.key_type = Some(key);
        spec
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.label = LabelSpec::Optional;
        self
    }

    pub fn required(mut self) -> Self {
        self.label = LabelSpec::Required;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.label = LabelSpec::Repeated;
        self
    }

    pub fn in_oneof(mut self, group: impl Into<String>) -> Self {
        self.oneof = Some(group.into());
        self
    }

    pub fn json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = Some(json_name.into());
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumSpec {
    pub name: String,
    pub values: Vec<EnumValueSpec>,
}

impl EnumSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValueSpec {
            name: name.into(),
            number,
        });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumValueSpec {
    pub name: String,
    pub number: i32,
}
