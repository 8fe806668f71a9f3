//! Purpose: Library crate behind the `pb2json` CLI: protobuf wire decoding to canonical JSON.
//! Exports: `api` (pipeline boundary), `core` (wire, tree, transcode, errors), `schema`, `feeds`.
//! Role: Embedded by gateway hosts through `api::Decoder`; the CLI is a thin wrapper.
//! Invariants: Decoding is synchronous and pure; compiled schemas are immutable and shareable.
pub mod api;
pub mod core;
pub mod feeds;
pub mod schema;
