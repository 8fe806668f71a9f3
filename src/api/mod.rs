//! Purpose: Define the stable public Rust API boundary for pb2json.
//! Exports: Decode pipeline, configuration, schema types, and errors needed by hosts and the CLI.
//! Role: Public, additive-only surface; wire and tree internals stay in `core`.
//! Invariants: Hosts embed the decoder through `Decoder`; nothing here holds mutable state.

mod pipeline;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::transcode::TranscodeOptions;
pub use crate::schema::{
    EnumSpec, FieldSpec, Kind, LabelSpec, MessageSpec, Schema, SchemaSpec,
};
pub use pipeline::{DecodeConfig, DecodeOutcome, Decoder, error_body};
