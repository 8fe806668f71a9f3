//! Purpose: Schema-driven protobuf field decoding into a `MessageTree`.
//! Exports: `decode_message`, `DEFAULT_MAX_DEPTH`.
//! Role: Sits between `core::wire` (bytes) and `core::transcode` (JSON).
//! Invariants: Any error aborts the whole decode; callers never see a partial tree.
//! Invariants: Unknown field numbers are kept verbatim and never fail the decode.
//! Invariants: A wire type that cannot be read as the declared type demotes the field to unknown.
//! Invariants: The root message is depth 0; every embedded message, map entry, and group adds one.
use crate::core::error::{Error, ErrorKind};
use crate::core::tree::{MapKey, MessageTree, Slot, UnknownField, Value};
use crate::core::wire::{Tag, WireReader, WireType, zigzag_decode32, zigzag_decode64};
use crate::schema::{FieldDescriptor, FieldType, Label, MessageRef};

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Decodes `bytes` as one complete `message`.
///
/// Repeated occurrences of a singular message field are merged field-wise,
/// repeated fields accept packed and unpacked runs, and proto2 `required`
/// fields are checked once the whole buffer has been consumed.
pub fn decode_message(
    bytes: &[u8],
    message: MessageRef<'_>,
    max_depth: usize,
) -> Result<MessageTree, Error> {
    let decoder = FieldDecoder { max_depth };
    let tree = decoder.decode_at(WireReader::new(bytes), message, 0)?;
    check_required(&tree, message, message.name())?;
    Ok(tree)
}

struct FieldDecoder {
    max_depth: usize,
}

impl FieldDecoder {
    fn decode_at(
        &self,
        mut reader: WireReader<'_>,
        message: MessageRef<'_>,
        depth: usize,
    ) -> Result<MessageTree, Error> {
        let mut tree = MessageTree::for_message(message.descriptor());
        while !reader.is_empty() {
            let tag = reader.read_tag()?;
            let known = match message.field_by_number(tag.field_number) {
                Some((index, field)) => {
                    self.decode_field(&mut tree, &mut reader, tag, index, field, message, depth)?
                }
                None => false,
            };
            if !known {
                let data = reader.skip(tag, self.max_depth.saturating_sub(depth))?;
                tree.push_unknown(UnknownField {
                    number: tag.field_number,
                    wire_type: tag.wire_type,
                    data: data.to_vec(),
                });
            }
        }
        Ok(tree)
    }

    /// Returns `Ok(false)` without consuming the value when the wire type does
    /// not fit the field, so the caller can keep it as an unknown field.
    #[allow(clippy::too_many_arguments)]
    fn decode_field(
        &self,
        tree: &mut MessageTree,
        reader: &mut WireReader<'_>,
        tag: Tag,
        index: usize,
        field: &FieldDescriptor,
        message: MessageRef<'_>,
        depth: usize,
    ) -> Result<bool, Error> {
        match field.label {
            Label::Map { key } => {
                if tag.wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let entry = reader.read_length_delimited()?;
                let base = reader.offset() - entry.len();
                let (key, value) = self.decode_map_entry(
                    WireReader::with_base(entry, base),
                    key,
                    field,
                    message,
                    depth + 1,
                )?;
                tree.insert_entry(index, key, value);
            }
            Label::Repeated => {
                if tag.wire_type == WireType::LengthDelimited && field.ty.is_packable() {
                    let run = reader.read_length_delimited()?;
                    let base = reader.offset() - run.len();
                    let mut packed = WireReader::with_base(run, base);
                    while !packed.is_empty() {
                        let value = self.read_value(&mut packed, field.ty, field, message, depth)?;
                        tree.push(index, value);
                    }
                } else if tag.wire_type == field.ty.wire_type() {
                    let value = self.read_value(reader, field.ty, field, message, depth)?;
                    tree.push(index, value);
                } else {
                    return Ok(false);
                }
            }
            Label::Singular | Label::Optional | Label::Required => {
                if tag.wire_type != field.ty.wire_type() {
                    return Ok(false);
                }
                let value = self.read_value(reader, field.ty, field, message, depth)?;
                match field.oneof {
                    Some(group) => tree.set_oneof(group, index, value),
                    None => tree.set(index, value),
                }
            }
        }
        Ok(true)
    }

    fn read_value(
        &self,
        reader: &mut WireReader<'_>,
        ty: FieldType,
        field: &FieldDescriptor,
        message: MessageRef<'_>,
        depth: usize,
    ) -> Result<Value, Error> {
        let value = match ty {
            FieldType::Int32 => Value::Signed(i64::from(reader.read_varint()? as i32)),
            FieldType::Int64 => Value::Signed(reader.read_varint()? as i64),
            FieldType::Uint32 => Value::Unsigned(u64::from(reader.read_varint()? as u32)),
            FieldType::Uint64 => Value::Unsigned(reader.read_varint()?),
            FieldType::Sint32 => {
                Value::Signed(i64::from(zigzag_decode32(reader.read_varint()? as u32)))
            }
            FieldType::Sint64 => Value::Signed(zigzag_decode64(reader.read_varint()?)),
            FieldType::Bool => Value::Bool(reader.read_varint()? != 0),
            FieldType::Enum(id) => {
                let number = reader.read_varint()? as i32;
                Value::Enum(message.schema().enum_by_id(id).value(number))
            }
            FieldType::Fixed32 => Value::Unsigned(u64::from(reader.read_fixed32()?)),
            FieldType::Sfixed32 => Value::Signed(i64::from(reader.read_fixed32()? as i32)),
            FieldType::Float => Value::Float(f32::from_bits(reader.read_fixed32()?)),
            FieldType::Fixed64 => Value::Unsigned(reader.read_fixed64()?),
            FieldType::Sfixed64 => Value::Signed(reader.read_fixed64()? as i64),
            FieldType::Double => Value::Double(f64::from_bits(reader.read_fixed64()?)),
            FieldType::String => {
                let start = reader.offset();
                let raw = reader.read_length_delimited()?;
                let text = std::str::from_utf8(raw).map_err(|err| {
                    Error::new(ErrorKind::InvalidUtf8)
                        .with_message("string field is not valid utf-8")
                        .with_field(field_path(message, field))
                        .with_offset(start as u64)
                        .with_source(err)
                })?;
                Value::Text(text.to_string())
            }
            FieldType::Bytes => Value::Bytes(reader.read_length_delimited()?.to_vec()),
            FieldType::Message(id) => {
                let payload = reader.read_length_delimited()?;
                let base = reader.offset() - payload.len();
                let nested_depth = self.enter(depth, base, field, message)?;
                let tree = self.decode_at(
                    WireReader::with_base(payload, base),
                    message.nested(id),
                    nested_depth,
                )?;
                Value::Message(tree)
            }
        };
        Ok(value)
    }

    fn decode_map_entry(
        &self,
        mut reader: WireReader<'_>,
        key_ty: FieldType,
        field: &FieldDescriptor,
        message: MessageRef<'_>,
        depth: usize,
    ) -> Result<(MapKey, Value), Error> {
        if depth > self.max_depth {
            return Err(depth_error(reader.offset(), field, message));
        }
        let mut key = None;
        let mut value: Option<Value> = None;
        while !reader.is_empty() {
            let tag = reader.read_tag()?;
            match tag.field_number {
                1 if tag.wire_type == key_ty.wire_type() => {
                    key = Some(self.read_value(&mut reader, key_ty, field, message, depth)?);
                }
                2 if tag.wire_type == field.ty.wire_type() => {
                    let incoming = self.read_value(&mut reader, field.ty, field, message, depth)?;
                    value = Some(match (value.take(), incoming) {
                        (Some(Value::Message(mut existing)), Value::Message(other)) => {
                            existing.merge(other);
                            Value::Message(existing)
                        }
                        (_, incoming) => incoming,
                    });
                }
                _ => {
                    reader.skip(tag, self.max_depth.saturating_sub(depth))?;
                }
            }
        }

        let schema = message.schema();
        let key = key.unwrap_or_else(|| schema.zero_value(key_ty));
        let key = MapKey::from_value(key).ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("map key type is not hashable")
                .with_field(field_path(message, field))
        })?;
        let value = value.unwrap_or_else(|| schema.zero_value(field.ty));
        Ok((key, value))
    }

    fn enter(
        &self,
        depth: usize,
        offset: usize,
        field: &FieldDescriptor,
        message: MessageRef<'_>,
    ) -> Result<usize, Error> {
        let nested = depth + 1;
        if nested > self.max_depth {
            return Err(depth_error(offset, field, message));
        }
        Ok(nested)
    }
}

fn depth_error(offset: usize, field: &FieldDescriptor, message: MessageRef<'_>) -> Error {
    Error::new(ErrorKind::DepthExceeded)
        .with_message("message nesting exceeds the configured limit")
        .with_field(field_path(message, field))
        .with_offset(offset as u64)
}

fn field_path(message: MessageRef<'_>, field: &FieldDescriptor) -> String {
    format!("{}.{}", message.name(), field.name)
}

fn check_required(tree: &MessageTree, message: MessageRef<'_>, path: &str) -> Result<(), Error> {
    let descriptor = message.descriptor();
    for (index, field) in descriptor.fields().iter().enumerate() {
        let slot = tree.slot(index);
        if field.label == Label::Required && matches!(slot, Slot::Absent) {
            return Err(Error::new(ErrorKind::MissingRequired)
                .with_message(format!("required field {} is missing", field.name))
                .with_field(format!("{path}.{}", field.name)));
        }
        let FieldType::Message(id) = field.ty else {
            continue;
        };
        let nested = message.nested(id);
        match slot {
            Slot::Single(Value::Message(child)) => {
                check_required(child, nested, &format!("{path}.{}", field.name))?;
            }
            Slot::Repeated(values) => {
                for (position, value) in values.iter().enumerate() {
                    if let Value::Message(child) = value {
                        check_required(child, nested, &format!("{path}.{}[{position}]", field.name))?;
                    }
                }
            }
            Slot::Map(entries) => {
                for (key, value) in entries {
                    if let Value::Message(child) = value {
                        check_required(child, nested, &format!("{path}.{}[{key}]", field.name))?;
                    }
                }
            }
            _ => {}
        }
    }

    for group in 0..descriptor.oneofs().len() {
        let Some(case) = tree.oneof(group) else {
            continue;
        };
        let field = &descriptor.fields()[case.field];
        if let (FieldType::Message(id), Value::Message(child)) = (field.ty, &case.value) {
            check_required(child, message.nested(id), &format!("{path}.{}", field.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_MAX_DEPTH, decode_message};
    use crate::core::error::ErrorKind;
    use crate::core::tree::{MapKey, MessageTree, OneofCase, Slot, Value};
    use crate::core::wire::WireType;
    use crate::schema::{EnumSpec, FieldSpec, Kind, MessageSpec, Schema, SchemaSpec};

    fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn tag(number: u32, wire: u8) -> Vec<u8> {
        varint(u64::from(number) << 3 | u64::from(wire))
    }

    fn ld(number: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = tag(number, 2);
        out.extend(varint(payload.len() as u64));
        out.extend_from_slice(payload);
        out
    }

    fn vi(number: u32, value: u64) -> Vec<u8> {
        let mut out = tag(number, 0);
        out.extend(varint(value));
        out
    }

    fn schema() -> Schema {
        let spec = SchemaSpec::new()
            .message(
                MessageSpec::new("Sample")
                    .field(FieldSpec::new("count", 1, Kind::Int32))
                    .field(FieldSpec::new("name", 2, Kind::String))
                    .field(FieldSpec::new("values", 3, Kind::Sint32).repeated())
                    .field(FieldSpec::message("child", 4, "Sample"))
                    .field(FieldSpec::new("text", 5, Kind::String).in_oneof("choice"))
                    .field(FieldSpec::new("number", 6, Kind::Uint64).in_oneof("choice"))
                    .field(FieldSpec::map("scores", 7, Kind::String, Kind::Int64))
                    .field(FieldSpec::enumeration("color", 8, "Color"))
                    .field(FieldSpec::new("ratio", 9, Kind::Double))
                    .field(FieldSpec::new("fixed", 10, Kind::Fixed32)),
            )
            .message(
                MessageSpec::new("Strict")
                    .field(FieldSpec::new("id", 1, Kind::String).required())
                    .field(FieldSpec::message("items", 2, "Strict").repeated()),
            )
            .enumeration(EnumSpec::new("Color").value("RED", 0).value("BLUE", 2));
        Schema::compile(&spec).expect("compile")
    }

    fn decode(schema: &Schema, bytes: &[u8]) -> MessageTree {
        let sample = schema.message("Sample").expect("sample");
        decode_message(bytes, sample, DEFAULT_MAX_DEPTH).expect("decode")
    }

    #[test]
    fn scalars_decode_per_logical_type() {
        let schema = schema();
        let mut bytes = vi(1, u64::MAX); // int32 -1 sign-extended
        bytes.extend(ld(2, b"hello"));
        bytes.extend(vi(8, 2));
        bytes.extend(tag(9, 1));
        bytes.extend(1.5f64.to_le_bytes());
        bytes.extend(tag(10, 5));
        bytes.extend(7u32.to_le_bytes());
        let tree = decode(&schema, &bytes);

        assert_eq!(tree.slot(0), &Slot::Single(Value::Signed(-1)));
        assert_eq!(tree.slot(1), &Slot::Single(Value::Text("hello".into())));
        let Slot::Single(Value::Enum(color)) = tree.slot(7) else {
            panic!("enum");
        };
        assert_eq!(color.name.as_deref(), Some("BLUE"));
        assert_eq!(tree.slot(8), &Slot::Single(Value::Double(1.5)));
        assert_eq!(tree.slot(9), &Slot::Single(Value::Unsigned(7)));
    }

    #[test]
    fn packed_and_unpacked_repeated_agree() {
        let schema = schema();
        // zig-zag: -1 -> 1, 2 -> 4, -3 -> 5
        let packed = ld(3, &[0x01, 0x04, 0x05]);
        let mut unpacked = vi(3, 1);
        unpacked.extend(vi(3, 4));
        unpacked.extend(vi(3, 5));

        let expected = Slot::Repeated(vec![
            Value::Signed(-1),
            Value::Signed(2),
            Value::Signed(-3),
        ]);
        assert_eq!(decode(&schema, &packed).slot(2), &expected);
        assert_eq!(decode(&schema, &unpacked).slot(2), &expected);
    }

    #[test]
    fn repeated_singular_message_merges() {
        let schema = schema();
        let mut bytes = ld(4, &vi(1, 5));
        bytes.extend(ld(4, &ld(2, b"x")));
        let tree = decode(&schema, &bytes);
        let Slot::Single(Value::Message(child)) = tree.slot(3) else {
            panic!("child");
        };
        assert_eq!(child.slot(0), &Slot::Single(Value::Signed(5)));
        assert_eq!(child.slot(1), &Slot::Single(Value::Text("x".into())));
    }

    #[test]
    fn later_oneof_member_replaces_earlier() {
        let schema = schema();
        let mut bytes = ld(5, b"first");
        bytes.extend(vi(6, 42));
        let tree = decode(&schema, &bytes);
        assert_eq!(
            tree.oneof(0),
            Some(&OneofCase {
                field: 5,
                value: Value::Unsigned(42)
            })
        );
    }

    #[test]
    fn map_entries_fill_defaults_and_last_wins() {
        let schema = schema();
        let mut entry_a = ld(1, b"a");
        entry_a.extend(vi(2, 1));
        let mut entry_a_again = ld(1, b"a");
        entry_a_again.extend(vi(2, 9));
        let key_only = ld(1, b"b");

        let mut bytes = ld(7, &entry_a);
        bytes.extend(ld(7, &key_only));
        bytes.extend(ld(7, &entry_a_again));
        let tree = decode(&schema, &bytes);
        let Slot::Map(entries) = tree.slot(6) else {
            panic!("map");
        };
        assert_eq!(entries[&MapKey::Text("a".into())], Value::Signed(9));
        assert_eq!(entries[&MapKey::Text("b".into())], Value::Signed(0));
    }

    #[test]
    fn unknown_fields_are_retained() {
        let schema = schema();
        let mut bytes = vi(1, 3);
        bytes.extend(ld(99, b"opaque"));
        let tree = decode(&schema, &bytes);
        assert_eq!(tree.slot(0), &Slot::Single(Value::Signed(3)));
        let unknown = &tree.unknown_fields()[0];
        assert_eq!(unknown.number, 99);
        assert_eq!(unknown.wire_type, WireType::LengthDelimited);
        assert_eq!(unknown.data, [&[6u8][..], &b"opaque"[..]].concat());
    }

    #[test]
    fn wire_type_mismatch_demotes_to_unknown() {
        let schema = schema();
        // field 1 is int32 but arrives as a fixed32
        let mut bytes = tag(1, 5);
        bytes.extend(1u32.to_le_bytes());
        bytes.extend(ld(2, b"ok"));
        let tree = decode(&schema, &bytes);
        assert_eq!(tree.slot(0), &Slot::Absent);
        assert_eq!(tree.slot(1), &Slot::Single(Value::Text("ok".into())));
        assert_eq!(tree.unknown_fields()[0].wire_type, WireType::Fixed32);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let schema = schema();
        let bytes = ld(2, &[0xC3, 0x28]);
        let sample = schema.message("Sample").expect("sample");
        let err = decode_message(&bytes, sample, DEFAULT_MAX_DEPTH).expect_err("utf8");
        assert_eq!(err.kind(), ErrorKind::InvalidUtf8);
        assert_eq!(err.field(), Some("Sample.name"));
    }

    #[test]
    fn nesting_beyond_limit_fails() {
        let schema = schema();
        let sample = schema.message("Sample").expect("sample");
        let mut bytes = vi(1, 1);
        for _ in 0..4 {
            bytes = ld(4, &bytes);
        }
        assert!(decode_message(&bytes, sample, 4).is_ok());
        let err = decode_message(&bytes, sample, 3).expect_err("too deep");
        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
    }

    #[test]
    fn truncated_nested_payload_fails_whole_decode() {
        let schema = schema();
        let sample = schema.message("Sample").expect("sample");
        let mut bytes = vi(1, 1);
        bytes.extend(tag(4, 2));
        bytes.extend(varint(10));
        bytes.extend(vi(1, 2));
        let err = decode_message(&bytes, sample, DEFAULT_MAX_DEPTH).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Truncated);
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn required_fields_are_checked_recursively() {
        let schema = schema();
        let strict = schema.message("Strict").expect("strict");
        let mut ok = ld(1, b"root");
        ok.extend(ld(2, &ld(1, b"child")));
        assert!(decode_message(&ok, strict, DEFAULT_MAX_DEPTH).is_ok());

        let mut missing = ld(1, b"root");
        missing.extend(ld(2, &ld(1, b"child")));
        missing.extend(ld(2, &[]));
        let err = decode_message(&missing, strict, DEFAULT_MAX_DEPTH).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::MissingRequired);
        assert_eq!(err.field(), Some("Strict.items[1].id"));
    }

    #[test]
    fn unknown_groups_are_skipped() {
        let schema = schema();
        let mut bytes = tag(20, 3);
        bytes.extend(vi(1, 7));
        bytes.extend(tag(20, 4));
        bytes.extend(vi(1, 8));
        let tree = decode(&schema, &bytes);
        assert_eq!(tree.slot(0), &Slot::Single(Value::Signed(8)));
        assert_eq!(tree.unknown_fields()[0].wire_type, WireType::StartGroup);
    }
}
