//! Purpose: Schemas for feeds the decoder ships with, selectable by name.
//! Exports: `BuiltinFeed`, `gtfs_realtime`.
//! Role: Lets hosts and the CLI decode well-known payloads without a schema file.
//! Invariants: Each feed's embedded schema compiles; tests assert it.
pub mod gtfs_realtime;

use crate::core::error::{Error, ErrorKind};
use crate::schema::Schema;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuiltinFeed {
    GtfsRealtime,
}

impl BuiltinFeed {
    pub const ALL: [BuiltinFeed; 1] = [BuiltinFeed::GtfsRealtime];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFeed::GtfsRealtime => "gtfs-realtime",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|feed| feed.name() == name)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown feed {name}"))
                    .with_hint("Available feeds: gtfs-realtime.")
            })
    }

    /// Embedded schema file text.
    pub fn schema_json(self) -> &'static str {
        match self {
            BuiltinFeed::GtfsRealtime => gtfs_realtime::SCHEMA_JSON,
        }
    }

    pub fn root_message(self) -> &'static str {
        match self {
            BuiltinFeed::GtfsRealtime => gtfs_realtime::ROOT_MESSAGE,
        }
    }

    pub fn schema(self) -> Result<Schema, Error> {
        Schema::from_json_str(self.schema_json())
    }
}
