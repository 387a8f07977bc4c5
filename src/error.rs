//! Typed engine errors with a source position and a situational context.
//!
//! Every error carries the same four pieces: a kind, a location, a short
//! context phrase describing what the engine was doing, and the specific
//! message. Errors propagate by early return; each layer may fill in a
//! missing location or context on the way up, but never replaces what the
//! originating layer recorded. The rendered form is the single diagnostic
//! line printed by the CLI: `LINE:COLUMN: KIND: CONTEXT: MESSAGE`.

use std::borrow::Cow;

use libyaml_safer::ErrorKind as YamlErrorKind;

use crate::location::Location;

/// Failure classification, covering both the YAML transport and the
/// expression runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Allocation failure (ours or the expression runtime's).
    Memory,
    /// Input decoding failure.
    Reader,
    /// Tokenization failure in the YAML source.
    Scanner,
    /// Event-level failure in the YAML source.
    Parser,
    /// Document composition failure.
    Composer,
    /// Output write failure.
    Writer,
    /// Event emission failure.
    Emitter,
    /// The evaluator met an event it cannot handle where it was.
    Execution,
    /// The expression failed to compile.
    Syntax,
    /// The expression failed while running.
    Runtime,
    /// The expression runtime's error handler itself failed.
    ErrorHandler,
    /// A value had the wrong type for the operation.
    Type,
    /// A value could not be rendered back to YAML.
    Render,
    /// A test-mode comparison failed.
    Assertion,
}

impl ErrorKind {
    /// Stable uppercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Memory => "MEMORY_ERROR",
            ErrorKind::Reader => "READER_ERROR",
            ErrorKind::Scanner => "SCANNER_ERROR",
            ErrorKind::Parser => "PARSER_ERROR",
            ErrorKind::Composer => "COMPOSER_ERROR",
            ErrorKind::Writer => "WRITER_ERROR",
            ErrorKind::Emitter => "EMITTER_ERROR",
            ErrorKind::Execution => "EXECUTION_ERROR",
            ErrorKind::Syntax => "SYNTAX_ERROR",
            ErrorKind::Runtime => "RUNTIME_ERROR",
            ErrorKind::ErrorHandler => "ERROR_HANDLER_ERROR",
            ErrorKind::Type => "TYPE_ERROR",
            ErrorKind::Render => "RENDER_ERROR",
            ErrorKind::Assertion => "ASSERTION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine error: kind, position, context phrase, specific message.
#[derive(Debug, thiserror::Error)]
#[error("{}:{}: {}: {}: {}", location.line, location.column, kind, context, message)]
pub struct Error {
    /// What class of failure this is.
    pub kind: ErrorKind,
    /// Position of the source event that triggered the failure.
    pub location: Location,
    /// Short phrase naming the operation in progress.
    pub context: Cow<'static, str>,
    /// Specific detail from the originating layer.
    pub message: String,
}

impl Error {
    /// New error with unknown position and empty context; callers attach
    /// both with [`with_location`](Self::with_location) and
    /// [`with_context`](Self::with_context).
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: Location::UNKNOWN,
            context: Cow::Borrowed(""),
            message: message.into(),
        }
    }

    /// Attach a position, unless the originating layer already set one.
    pub fn with_location(mut self, location: Location) -> Self {
        if !self.location.is_known() {
            self.location = location;
        }
        self
    }

    /// Attach a context phrase, unless one is already present.
    pub fn with_context(mut self, context: impl Into<Cow<'static, str>>) -> Self {
        if self.context.is_empty() {
            self.context = context.into();
        }
        self
    }
}

impl From<libyaml_safer::Error> for Error {
    fn from(err: libyaml_safer::Error) -> Self {
        let kind = match err.kind() {
            YamlErrorKind::Reader => ErrorKind::Reader,
            YamlErrorKind::Scanner => ErrorKind::Scanner,
            YamlErrorKind::Parser => ErrorKind::Parser,
            YamlErrorKind::Composer => ErrorKind::Composer,
            YamlErrorKind::Emitter => ErrorKind::Emitter,
            YamlErrorKind::Io => ErrorKind::Writer,
        };
        let message = match err.kind() {
            YamlErrorKind::Io => std::error::Error::source(&err)
                .map(ToString::to_string)
                .unwrap_or_else(|| err.to_string()),
            _ => err.problem().to_string(),
        };
        let mut result = Error::new(kind, message);
        if let Some(mark) = err.problem_mark() {
            result = result.with_location(mark.into());
        }
        if let Some(context) = err.context() {
            result = result.with_context(context);
        }
        result
    }
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => Error::new(ErrorKind::Syntax, message),
            mlua::Error::RuntimeError(message) => Error::new(ErrorKind::Runtime, message),
            mlua::Error::MemoryError(message) => Error::new(ErrorKind::Memory, message),
            mlua::Error::CallbackError { traceback, cause } => Error::new(
                ErrorKind::ErrorHandler,
                format!("{cause}\n{traceback}"),
            ),
            other => Error::new(ErrorKind::Execution, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_one_diagnostic_line() {
        let err = Error::new(ErrorKind::Runtime, "attempt to call a nil value")
            .with_location(Location::new(3, 7))
            .with_context("While executing a scalar, encountered an error");
        assert_eq!(
            err.to_string(),
            "3:7: RUNTIME_ERROR: While executing a scalar, encountered an error: \
             attempt to call a nil value"
        );
    }

    #[test]
    fn augmentation_never_replaces() {
        let err = Error::new(ErrorKind::Type, "boom")
            .with_location(Location::new(1, 1))
            .with_context("inner")
            .with_location(Location::new(9, 9))
            .with_context("outer");
        assert_eq!(err.location, Location::new(1, 1));
        assert_eq!(err.context, "inner");
    }
}
