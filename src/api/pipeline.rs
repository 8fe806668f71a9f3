//! Purpose: Boundary adapter from raw response bytes to a success or error JSON body.
//! Exports: `Decoder`, `DecodeConfig`, `DecodeOutcome`, `error_body`.
//! Role: The only place an internal `Error` becomes a user-visible JSON error body.
//! Invariants: `decode` never panics and never returns `Err`; every input yields a JSON object.
//! Invariants: An empty payload is a successful `{}`, not an error.
//! Invariants: `Decoder` holds only immutable state and is safe to share across threads.
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, warn};

use crate::core::decode::{DEFAULT_MAX_DEPTH, decode_message};
use crate::core::error::{Error, ErrorKind};
use crate::core::transcode::{TranscodeOptions, transcode};
use crate::schema::{MessageId, MessageRef, Schema};

const DEBUG_PREFIX_LEN: usize = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DecodeConfig {
    pub emit_defaults: bool,
    pub use_canonical_field_names: bool,
    pub max_nesting_depth: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            emit_defaults: true,
            use_canonical_field_names: true,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeConfig {
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid decode config")
                .with_hint("Known keys: emitDefaults, useCanonicalFieldNames, maxNestingDepth.")
                .with_source(err)
        })
    }

    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            emit_defaults: self.emit_defaults,
            use_canonical_field_names: self.use_canonical_field_names,
        }
    }
}

/// Result of one pipeline call; the body shape alone also tells the cases apart.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeOutcome {
    Success(Value),
    Failure(Value),
}

impl DecodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DecodeOutcome::Success(_))
    }

    /// Kind named by a failure body's `error_kind`.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            DecodeOutcome::Success(_) => None,
            DecodeOutcome::Failure(body) => body
                .get("error_kind")
                .and_then(Value::as_str)
                .and_then(ErrorKind::from_name),
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            DecodeOutcome::Success(body) | DecodeOutcome::Failure(body) => body,
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            DecodeOutcome::Success(body) | DecodeOutcome::Failure(body) => body,
        }
    }

    pub fn to_json_string(&self, pretty: bool) -> String {
        let encoded = if pretty {
            serde_json::to_string_pretty(self.body())
        } else {
            serde_json::to_string(self.body())
        };
        encoded.unwrap_or_else(|_| {
            "{\"error\":\"json encode failed\",\"error_kind\":\"Internal\"}".to_string()
        })
    }
}

/// Decodes payloads of one root message type under a fixed configuration.
#[derive(Clone, Debug)]
pub struct Decoder {
    schema: Arc<Schema>,
    root: MessageId,
    config: DecodeConfig,
}

impl Decoder {
    pub fn new(schema: Arc<Schema>, root_message: &str) -> Result<Self, Error> {
        let root = schema.message(root_message).map(|message| message.id());
        let Some(root) = root else {
            return Err(Error::new(ErrorKind::Schema)
                .with_message(format!("unknown root message {root_message}"))
                .with_hint("Use a fully qualified message name declared in the schema."));
        };
        Ok(Self {
            schema,
            root,
            config: DecodeConfig::default(),
        })
    }

    pub fn with_config(mut self, config: DecodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn root(&self) -> MessageRef<'_> {
        self.schema.message_by_id(self.root)
    }

    /// Decodes and transcodes `raw`, keeping the typed error.
    pub fn try_decode(&self, raw: &[u8]) -> Result<Value, Error> {
        debug!(bytes = raw.len(), message = self.root().name(), "received protobuf payload");
        if raw.is_empty() {
            warn!("empty protobuf payload");
            return Ok(Value::Object(Map::new()));
        }
        let root = self.root();
        let tree = decode_message(raw, root, self.config.max_nesting_depth)?;
        if !tree.unknown_fields().is_empty() {
            debug!(count = tree.unknown_fields().len(), "skipped unknown top-level fields");
        }
        Ok(transcode(&tree, root, &self.config.transcode_options()))
    }

    pub fn decode(&self, raw: &[u8]) -> DecodeOutcome {
        match self.try_decode(raw) {
            Ok(body) => {
                debug!("decoded protobuf payload to json");
                DecodeOutcome::Success(body)
            }
            Err(err) => {
                error!(kind = err.kind().as_str(), "failed to unmarshal protobuf: {err}");
                debug!(first_bytes = %hex_prefix(raw), "failing payload prefix");
                DecodeOutcome::Failure(error_body(&err))
            }
        }
    }

    /// Reads the whole payload from `reader`, then behaves like `decode`.
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> DecodeOutcome {
        let mut raw = Vec::new();
        if let Err(err) = reader.read_to_end(&mut raw) {
            let err = Error::new(ErrorKind::Io)
                .with_message("failed to read protobuf payload")
                .with_source(err);
            error!(kind = err.kind().as_str(), "{}", describe(&err));
            return DecodeOutcome::Failure(error_body(&err));
        }
        self.decode(&raw)
    }
}

/// `{"error": <message>, "error_kind": <kind>}`.
pub fn error_body(err: &Error) -> Value {
    let message = if err.kind().is_decode_failure() {
        format!("failed to unmarshal protobuf: {}", describe(err))
    } else {
        describe(err)
    };
    json!({
        "error": message,
        "error_kind": err.kind().as_str(),
    })
}

fn describe(err: &Error) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

fn hex_prefix(raw: &[u8]) -> String {
    raw.iter()
        .take(DEBUG_PREFIX_LEN)
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{DecodeConfig, DecodeOutcome, Decoder, error_body, hex_prefix};
    use crate::core::error::{Error, ErrorKind};
    use crate::schema::{FieldSpec, Kind, MessageSpec, Schema, SchemaSpec};
    use serde_json::json;
    use std::io::{self, Read};
    use std::sync::Arc;

    fn decoder() -> Decoder {
        let spec = SchemaSpec::new().message(
            MessageSpec::new("Counter")
                .field(FieldSpec::new("count", 1, Kind::Int32))
                .field(FieldSpec::new("label", 2, Kind::String)),
        );
        let schema = Arc::new(Schema::compile(&spec).expect("compile"));
        Decoder::new(schema, "Counter").expect("decoder")
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    #[test]
    fn config_defaults_and_camel_case_keys() {
        assert_eq!(
            DecodeConfig::from_json_str("{}").expect("empty"),
            DecodeConfig::default()
        );
        let config =
            DecodeConfig::from_json_str(r#"{"emitDefaults":false,"maxNestingDepth":8}"#).expect("parse");
        assert!(!config.emit_defaults);
        assert!(config.use_canonical_field_names);
        assert_eq!(config.max_nesting_depth, 8);

        let err = DecodeConfig::from_json_str(r#"{"emit_defaults":false}"#).expect_err("unknown key");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn empty_payload_is_empty_object() {
        let outcome = decoder().decode(&[]);
        assert_eq!(outcome, DecodeOutcome::Success(json!({})));
    }

    #[test]
    fn success_and_failure_bodies() {
        let decoder = decoder();
        let outcome = decoder.decode(&[0x08, 0x2A]);
        assert!(outcome.is_success());
        assert_eq!(outcome.body(), &json!({"count": 42, "label": ""}));

        let outcome = decoder.decode(&[0x08]);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Truncated));
        let body = outcome.into_body();
        assert_eq!(body["error_kind"], json!("Truncated"));
        assert!(
            body["error"]
                .as_str()
                .expect("message")
                .starts_with("failed to unmarshal protobuf")
        );
    }

    #[test]
    fn reader_failures_become_io_bodies() {
        let outcome = decoder().decode_reader(BrokenReader);
        assert_eq!(outcome.body()["error_kind"], json!("Io"));
        assert!(outcome.to_json_string(false).contains("connection reset"));
        let outcome = decoder().decode_reader(&[0x10, 0x00][..]);
        assert!(outcome.is_success());
    }

    #[test]
    fn unknown_root_message_is_schema_error() {
        let schema = Arc::new(Schema::compile(&SchemaSpec::new()).expect("compile"));
        let err = Decoder::new(schema, "Missing").expect_err("missing root");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn error_body_shape() {
        let err = Error::new(ErrorKind::DepthExceeded).with_message("too deep");
        let body = error_body(&err);
        assert_eq!(body["error_kind"], json!("DepthExceeded"));
        assert_eq!(body.as_object().expect("object").len(), 2);
    }

    #[test]
    fn prefix_is_capped_at_twenty_bytes() {
        let raw = [0xABu8; 32];
        assert_eq!(hex_prefix(&raw).split(' ').count(), 20);
        assert_eq!(hex_prefix(&[0x0a, 0x01]), "0a 01");
    }
}
