//! Error kinds shared by every fallible entry point in the crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A `(file, line, column)` location, used to pin syntax errors and
/// diagnostics to a spot in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}:{}", path.display(), self.line, self.column),
            None => write!(f, "<input>:{}:{}", self.line, self.column),
        }
    }
}

/// The coarse-grained failure categories described in spec §7.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied malformed arguments or a disallowed combination,
    /// such as a variant with no layout.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// Failed to open an include path or rules file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parser rejected the input tokens.
    #[error("syntax error at {location}: {message}")]
    Syntax { location: Location, message: String },

    /// Names/references failed to resolve, or a structural rule was
    /// violated (entry level out of range, contradictory merge, …).
    #[error("semantic error: {0}")]
    Semantic(String),

    /// A count exceeded an implementation limit (32 layouts, 32
    /// modifiers, a keycode past the cap).
    #[error("limit exceeded: {0}")]
    Limit(String),

    /// An invariant the implementation itself is responsible for
    /// upholding was violated; seeing this means there is a bug in this
    /// crate, not in caller input.
    #[error("internal error: {0}")]
    Internal(String),

    /// An atom, key, or modifier lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn invalid_usage(msg: impl Into<String>) -> Self {
        Error::InvalidUsage(msg.into())
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        Error::Semantic(msg.into())
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        Error::Limit(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn syntax(location: Location, msg: impl Into<String>) -> Self {
        Error::Syntax {
            location,
            message: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_without_file_formats_with_placeholder() {
        let loc = Location {
            file: None,
            line: 3,
            column: 7,
        };
        assert_eq!(loc.to_string(), "<input>:3:7");
    }

    #[test]
    fn error_display_includes_message() {
        let err = Error::invalid_usage("variant without layout");
        assert_eq!(err.to_string(), "invalid usage: variant without layout");
    }
}
