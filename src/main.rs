//! Purpose: `pb2json` CLI entry point: decode protobuf payloads to JSON from files or stdin.
//! Role: Binary crate root; parses args, runs the decode pipeline, emits JSON on stdout.
//! Invariants: The pipeline's success or error body is always printed on stdout.
//! Invariants: Setup errors (bad flags, unreadable files, invalid schemas) are JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pb2json::api::{DecodeConfig, Decoder, Error, ErrorKind, Schema, to_exit_code};
use pb2json::feeds::BuiltinFeed;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run(std::env::args_os()) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run<I>(args: I) -> Result<RunOutcome, Error>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `pb2json --help`."));
            }
        },
    };

    let result = match cli.command {
        Command::Decode(args) => decode(args),
        Command::Schema(args) => schema(args),
    };
    result.map_err(add_io_hint)
}

#[derive(Parser)]
#[command(
    name = "pb2json",
    version,
    about = "Decode Protocol Buffers payloads into canonical JSON",
    after_help = r#"EXAMPLES
  $ pb2json decode --feed gtfs-realtime vehicle_positions.pb
  $ curl -s https://example.org/gtfs-rt/trip-updates | pb2json decode --feed gtfs-realtime --pretty
  $ pb2json decode --schema reading.json --message sensors.Reading payload.bin
  $ pb2json schema --feed gtfs-realtime > gtfs_realtime.json

LOGGING
  Diagnostics go to stderr; set RUST_LOG=debug to see byte counts and failing payload prefixes."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Decode one serialized message and print it as JSON",
        long_about = r#"Decode one serialized message (no length prefix) and print it as JSON.

On success stdout receives the message object. On failure stdout receives
{"error": ..., "error_kind": ...} and the exit code reflects the kind."#
    )]
    Decode(DecodeArgs),
    #[command(
        about = "Print a built-in schema, or validate a schema file",
        long_about = r#"Without --file, print the embedded schema for --feed.
With --file, compile the schema file and list the messages it declares."#
    )]
    Schema(SchemaArgs),
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FeedArg {
    GtfsRealtime,
}

impl From<FeedArg> for BuiltinFeed {
    fn from(value: FeedArg) -> Self {
        match value {
            FeedArg::GtfsRealtime => BuiltinFeed::GtfsRealtime,
        }
    }
}

#[derive(Args)]
struct DecodeArgs {
    #[arg(
        help = "Payload file, or - for stdin (default: stdin)",
        value_hint = ValueHint::FilePath
    )]
    input: Option<PathBuf>,
    #[arg(
        long,
        value_enum,
        conflicts_with = "schema",
        help = "Use a built-in schema"
    )]
    feed: Option<FeedArg>,
    #[arg(
        long,
        requires = "message",
        help = "Schema file (JSON)",
        value_hint = ValueHint::FilePath
    )]
    schema: Option<PathBuf>,
    #[arg(long, help = "Root message name (defaults to the feed's root message)")]
    message: Option<String>,
    #[arg(
        long,
        help = "Decode config file (JSON: emitDefaults, useCanonicalFieldNames, maxNestingDepth)",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(long, help = "Omit unpopulated fields")]
    no_defaults: bool,
    #[arg(long, help = "Key objects by lowerCamelCase JSON names instead of proto names")]
    json_names: bool,
    #[arg(long, help = "Maximum message nesting depth")]
    max_depth: Option<usize>,
    #[arg(long, help = "Pretty-print the JSON output")]
    pretty: bool,
}

#[derive(Args)]
struct SchemaArgs {
    #[arg(long, value_enum, default_value = "gtfs-realtime", help = "Built-in feed to print")]
    feed: FeedArg,
    #[arg(
        long,
        help = "Schema file to validate instead",
        value_hint = ValueHint::FilePath
    )]
    file: Option<PathBuf>,
}

fn decode(args: DecodeArgs) -> Result<RunOutcome, Error> {
    let config = load_config(&args)?;
    let (schema, root) = match (&args.schema, args.feed) {
        (Some(path), _) => {
            let root = args.message.clone().ok_or_else(|| {
                Error::new(ErrorKind::Usage).with_message("--schema needs --message")
            })?;
            (Schema::from_json_file(path)?, root)
        }
        (None, feed) => {
            let feed = BuiltinFeed::from(feed.unwrap_or(FeedArg::GtfsRealtime));
            let root = args
                .message
                .clone()
                .unwrap_or_else(|| feed.root_message().to_string());
            (feed.schema()?, root)
        }
    };
    let decoder = Decoder::new(Arc::new(schema), &root)?.with_config(config);

    let outcome = match args.input.as_deref() {
        None => decoder.decode_reader(io::stdin().lock()),
        Some(path) if path.as_os_str() == "-" => decoder.decode_reader(io::stdin().lock()),
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to open {}", path.display()))
                    .with_source(err)
            })?;
            decoder.decode_reader(file)
        }
    };

    println!("{}", outcome.to_json_string(args.pretty));
    match outcome.error_kind() {
        None if outcome.is_success() => Ok(RunOutcome::ok()),
        Some(kind) => Ok(RunOutcome::with_code(to_exit_code(kind))),
        None => Ok(RunOutcome::with_code(to_exit_code(ErrorKind::Internal))),
    }
}

fn load_config(args: &DecodeArgs) -> Result<DecodeConfig, Error> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to read config {}", path.display()))
                    .with_source(err)
            })?;
            DecodeConfig::from_json_str(&text)?
        }
        None => DecodeConfig::default(),
    };
    if args.no_defaults {
        config.emit_defaults = false;
    }
    if args.json_names {
        config.use_canonical_field_names = false;
    }
    if let Some(depth) = args.max_depth {
        config.max_nesting_depth = depth;
    }
    Ok(config)
}

fn schema(args: SchemaArgs) -> Result<RunOutcome, Error> {
    let Some(path) = args.file else {
        print!("{}", BuiltinFeed::from(args.feed).schema_json());
        return Ok(RunOutcome::ok());
    };
    let schema = Schema::from_json_file(&path)?;
    let messages: Vec<&str> = schema.message_names().collect();
    info!(count = messages.len(), path = %path.display(), "schema compiled");
    println!("{}", json!({ "messages": messages }));
    Ok(RunOutcome::ok())
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io => err.with_hint("I/O error. Check the path and its permissions."),
        ErrorKind::Schema => err.with_hint("Check the schema file against `pb2json schema` output."),
        _ => err,
    }
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(field) = err.field() {
        lines.push(format!("  field: {field}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("  caused by: {cause}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    lines.join("\n")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Schema => "invalid schema".to_string(),
        other => format!("decode failed ({})", other.as_str()),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, clap_error_summary, error_json, run};
    use clap::Parser;
    use std::error::Error as StdError;
use std::ffi::OsString;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn unknown_flags_are_usage_errors() {
        let err = run(args(&["pb2json", "decode", "--bogus"])).expect_err("bad flag");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.message().expect("message").contains("--bogus"));
    }

    #[test]
    fn schema_requires_message() {
        let err = super::Cli::try_parse_from(args(&["pb2json", "decode", "--schema", "s.json"]))
            .err()
            .expect("missing --message");
        assert!(!clap_error_summary(&err).is_empty());
    }

    #[test]
    fn error_json_carries_context() {
        let err = Error::new(ErrorKind::Io)
            .with_message("failed to open payload.bin")
            .with_hint("Check the path.")
            .with_source(std::io::Error::other("no such file"));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Io");
        assert_eq!(value["error"]["causes"][0], "no such file");
        assert_eq!(value["error"]["hint"], "Check the path.");
    }
}
