//! Purpose: Single error type shared by wire decoding, schema compilation, and the CLI.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Internal components return `Result<_, Error>`; the decode pipeline turns it into JSON.
//! Invariants: `ErrorKind` names are stable; they are published as `error_kind` strings.
//! Invariants: Exit codes per kind never change once assigned.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Internal,
    Usage,
    Io,
    Schema,
    Truncated,
    MalformedVarint,
    InvalidUtf8,
    DepthExceeded,
    InvalidTag,
    MissingRequired,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Internal,
        ErrorKind::Usage,
        ErrorKind::Io,
        ErrorKind::Schema,
        ErrorKind::Truncated,
        ErrorKind::MalformedVarint,
        ErrorKind::InvalidUtf8,
        ErrorKind::DepthExceeded,
        ErrorKind::InvalidTag,
        ErrorKind::MissingRequired,
    ];

    /// Inverse of `as_str`, for reading `error_kind` back out of an error body.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::Io => "Io",
            ErrorKind::Schema => "Schema",
            ErrorKind::Truncated => "Truncated",
            ErrorKind::MalformedVarint => "MalformedVarint",
            ErrorKind::InvalidUtf8 => "InvalidUtf8",
            ErrorKind::DepthExceeded => "DepthExceeded",
            ErrorKind::InvalidTag => "InvalidTag",
            ErrorKind::MissingRequired => "MissingRequired",
        }
    }

    /// True for kinds produced while reading wire bytes (as opposed to setup failures).
    pub fn is_decode_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::Truncated
                | ErrorKind::MalformedVarint
                | ErrorKind::InvalidUtf8
                | ErrorKind::DepthExceeded
                | ErrorKind::InvalidTag
                | ErrorKind::MissingRequired
        )
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    field: Option<String>,
    offset: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            field: None,
            offset: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Records the byte offset only if none was recorded closer to the failure.
    pub fn with_offset(mut self, offset: u64) -> Self {
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(field) = &self.field {
            write!(f, " (field: {field})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Io => 3,
        ErrorKind::Schema => 4,
        ErrorKind::Truncated
        | ErrorKind::MalformedVarint
        | ErrorKind::InvalidUtf8
        | ErrorKind::DepthExceeded
        | ErrorKind::InvalidTag
        | ErrorKind::MissingRequired => 5,
    }
}
