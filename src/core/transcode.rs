//! Purpose: Render a decoded `MessageTree` as canonical protobuf JSON.
//! Exports: `TranscodeOptions`, `transcode`.
//! Role: Last pure step before the pipeline wraps the result; never fails.
//! Invariants: Object keys follow descriptor declaration order (`serde_json` `preserve_order`).
//! Invariants: 64-bit integers are decimal strings; bytes are padded standard base64.
//! Invariants: Unknown fields never reach the output.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value as Json};

use crate::core::tree::{MessageTree, Slot, Value};
use crate::schema::{FieldDescriptor, FieldType, Label, MessageRef};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TranscodeOptions {
    /// Emit unpopulated fields with their default values.
    pub emit_defaults: bool,
    /// Key objects by the schema field name instead of its lowerCamelCase JSON name.
    pub use_canonical_field_names: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            emit_defaults: true,
            use_canonical_field_names: true,
        }
    }
}

pub fn transcode(tree: &MessageTree, message: MessageRef<'_>, options: &TranscodeOptions) -> Json {
    let descriptor = message.descriptor();
    let mut out = Map::new();
    for (index, field) in descriptor.fields().iter().enumerate() {
        let key = if options.use_canonical_field_names {
            &field.name
        } else {
            &field.json_name
        };

        if let Some(group) = field.oneof {
            if let Some(case) = tree.oneof(group).filter(|case| case.field == index) {
                out.insert(key.clone(), value_json(&case.value, field.ty, message, options));
            }
            continue;
        }

        if let Some(rendered) = field_json(tree.slot(index), field, message, options) {
            out.insert(key.clone(), rendered);
        }
    }
    Json::Object(out)
}

fn field_json(
    slot: &Slot,
    field: &FieldDescriptor,
    message: MessageRef<'_>,
    options: &TranscodeOptions,
) -> Option<Json> {
    match slot {
        Slot::Single(value) => {
            if field.label == Label::Singular && value.is_zero() && !options.emit_defaults {
                return None;
            }
            Some(value_json(value, field.ty, message, options))
        }
        Slot::Repeated(values) => Some(Json::Array(
            values
                .iter()
                .map(|value| value_json(value, field.ty, message, options))
                .collect(),
        )),
        Slot::Map(entries) => {
            let mut object = Map::new();
            for (key, value) in entries {
                object.insert(key.to_string(), value_json(value, field.ty, message, options));
            }
            Some(Json::Object(object))
        }
        Slot::Absent => {
            if !options.emit_defaults {
                return None;
            }
            match field.label {
                Label::Repeated => Some(Json::Array(Vec::new())),
                Label::Map { .. } => Some(Json::Object(Map::new())),
                _ if matches!(field.ty, FieldType::Message(_)) => None,
                _ => {
                    let default = match &field.default {
                        Some(value) => value.clone(),
                        None => message.schema().zero_value(field.ty),
                    };
                    Some(value_json(&default, field.ty, message, options))
                }
            }
        }
    }
}

fn value_json(
    value: &Value,
    ty: FieldType,
    message: MessageRef<'_>,
    options: &TranscodeOptions,
) -> Json {
    match value {
        Value::Signed(v) if ty.is_64bit_integer() => Json::String(v.to_string()),
        Value::Signed(v) => Json::from(*v),
        Value::Unsigned(v) if ty.is_64bit_integer() => Json::String(v.to_string()),
        Value::Unsigned(v) => Json::from(*v),
        Value::Float(v) => {
            if !v.is_finite() {
                return non_finite(f64::from(*v));
            }
            // f32 Display is the shortest string that round-trips through f32.
            match v.to_string().parse::<f64>() {
                Ok(widened) => number_json(widened),
                Err(_) => number_json(f64::from(*v)),
            }
        }
        Value::Double(v) => number_json(*v),
        Value::Bool(v) => Json::Bool(*v),
        Value::Text(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::String(STANDARD.encode(v)),
        Value::Enum(v) => match &v.name {
            Some(name) => Json::String(name.clone()),
            None => Json::from(v.number),
        },
        Value::Message(tree) => match ty {
            FieldType::Message(id) => transcode(tree, message.nested(id), options),
            _ => Json::Object(Map::new()),
        },
    }
}

/// Integral values print without a fraction, as the Go and C++ runtimes do.
fn number_json(v: f64) -> Json {
    if !v.is_finite() {
        return non_finite(v);
    }
    if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 && !(v == 0.0 && v.is_sign_negative())
    {
        return Json::from(v as i64);
    }
    Number::from_f64(v).map_or(Json::Null, Json::Number)
}

fn non_finite(v: f64) -> Json {
    let text = if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    };
    Json::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::{TranscodeOptions, transcode};
    use crate::core::tree::{EnumValue, MapKey, MessageTree, Value};
    use crate::schema::{EnumSpec, FieldSpec, Kind, MessageSpec, Schema, SchemaSpec};
    use serde_json::json;

    fn schema() -> Schema {
        let spec = SchemaSpec::new()
            .message(
                MessageSpec::new("Vehicle")
                    .field(FieldSpec::new("vehicle_id", 1, Kind::String))
                    .field(FieldSpec::new("odometer", 2, Kind::Uint64))
                    .field(FieldSpec::new("speed", 3, Kind::Float))
                    .field(FieldSpec::new("stops", 4, Kind::Int32).repeated())
                    .field(FieldSpec::map("tags", 5, Kind::Int32, Kind::String))
                    .field(FieldSpec::message("position", 6, "Position"))
                    .field(FieldSpec::new("plate", 7, Kind::String).in_oneof("ident"))
                    .field(FieldSpec::new("fleet_no", 8, Kind::Int32).in_oneof("ident"))
                    .field(FieldSpec::enumeration("status", 9, "Status"))
                    .field(FieldSpec::new("photo", 10, Kind::Bytes))
                    .field(
                        FieldSpec::new("capacity", 11, Kind::Uint32)
                            .optional()
                            .with_default(json!(40)),
                    ),
            )
            .message(MessageSpec::new("Position").field(FieldSpec::new("bearing", 1, Kind::Double)))
            .enumeration(
                EnumSpec::new("Status")
                    .value("STOPPED", 0)
                    .value("MOVING", 1),
            );
        Schema::compile(&spec).expect("compile")
    }

    fn options(emit_defaults: bool, canonical: bool) -> TranscodeOptions {
        TranscodeOptions {
            emit_defaults,
            use_canonical_field_names: canonical,
        }
    }

    #[test]
    fn populated_fields_use_canonical_mapping() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let mut position = MessageTree::for_message(schema.message("Position").expect("p").descriptor());
        position.set(0, Value::Double(90.0));

        let mut tree = MessageTree::for_message(vehicle.descriptor());
        tree.set(0, Value::Text("bus-7".into()));
        tree.set(1, Value::Unsigned(u64::MAX));
        tree.set(2, Value::Float(0.1));
        tree.push(3, Value::Signed(4));
        tree.push(3, Value::Signed(5));
        tree.insert_entry(4, MapKey::Signed(10), Value::Text("b".into()));
        tree.insert_entry(4, MapKey::Signed(-2), Value::Text("a".into()));
        tree.set(5, Value::Message(position));
        tree.set_oneof(0, 7, Value::Signed(12));
        tree.set(8, Value::Enum(EnumValue { number: 1, name: Some("MOVING".into()) }));
        tree.set(9, Value::Bytes(vec![0xDE, 0xAD]));

        let json = transcode(&tree, vehicle, &options(false, true));
        assert_eq!(
            json,
            json!({
                "vehicle_id": "bus-7",
                "odometer": "18446744073709551615",
                "speed": 0.1,
                "stops": [4, 5],
                "tags": {"-2": "a", "10": "b"},
                "position": {"bearing": 90},
                "fleet_no": 12,
                "status": "MOVING",
                "photo": "3q0="
            })
        );
        let keys: Vec<&String> = json.as_object().expect("object").keys().collect();
        assert_eq!(keys[0], "vehicle_id");
        assert_eq!(keys[8], "photo");
    }

    #[test]
    fn empty_tree_with_defaults() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let tree = MessageTree::for_message(vehicle.descriptor());
        let json = transcode(&tree, vehicle, &options(true, false));
        assert_eq!(
            json,
            json!({
                "vehicleId": "",
                "odometer": "0",
                "speed": 0,
                "stops": [],
                "tags": {},
                "status": "STOPPED",
                "photo": "",
                "capacity": 40
            })
        );
    }

    #[test]
    fn empty_tree_without_defaults_is_empty_object() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let tree = MessageTree::for_message(vehicle.descriptor());
        assert_eq!(transcode(&tree, vehicle, &options(false, true)), json!({}));
    }

    #[test]
    fn implicit_zero_is_unpopulated_but_optional_zero_is_kept() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let mut tree = MessageTree::for_message(vehicle.descriptor());
        tree.set(1, Value::Unsigned(0));
        tree.set(10, Value::Unsigned(0));
        assert_eq!(
            transcode(&tree, vehicle, &options(false, true)),
            json!({"capacity": 0})
        );
    }

    #[test]
    fn unknown_enum_numbers_and_non_finite_floats() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let mut tree = MessageTree::for_message(vehicle.descriptor());
        tree.set(2, Value::Float(f32::NEG_INFINITY));
        tree.set(8, Value::Enum(EnumValue { number: 7, name: None }));
        assert_eq!(
            transcode(&tree, vehicle, &options(false, true)),
            json!({"speed": "-Infinity", "status": 7})
        );
    }

    #[test]
    fn oneof_emits_only_active_member() {
        let schema = schema();
        let vehicle = schema.message("Vehicle").expect("vehicle");
        let mut tree = MessageTree::for_message(vehicle.descriptor());
        tree.set_oneof(0, 6, Value::Text("XYZ".into()));
        let json = transcode(&tree, vehicle, &options(true, true));
        assert_eq!(json["plate"], json!("XYZ"));
        assert!(json.get("fleet_no").is_none());
    }
}
