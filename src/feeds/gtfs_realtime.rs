// GTFS-realtime (`transit_realtime` package) schema, proto2 labels and declared defaults included.
use std::sync::Arc;

use crate::api::Decoder;
use crate::core::error::Error;
use crate::schema::Schema;

pub const SCHEMA_JSON: &str = include_str!("gtfs_realtime.json");
pub const ROOT_MESSAGE: &str = "transit_realtime.FeedMessage";

pub fn schema() -> Result<Schema, Error> {
    Schema::from_json_str(SCHEMA_JSON)
}

/// FeedMessage decoder with proto field names and unpopulated fields emitted.
pub fn decoder() -> Result<Decoder, Error> {
    let schema = Arc::new(schema()?);
    Decoder::new(schema, ROOT_MESSAGE)
}
