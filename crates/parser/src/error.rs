use std::{fmt, io};

use annotate_snippets::{Level, Renderer, Snippet};
use smol_str::SmolStr;

use crate::{syntax::Rule, Span};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    Syntax { message: String, span: Span },

    #[error("unknown type `{0}`")]
    UnknownType(SmolStr, Span),

    #[error("unknown opcode `{0}`")]
    UnknownOpcode(SmolStr, Span),

    #[error("`{literal}` is not a valid `{ty}` literal")]
    InvalidLiteral {
        literal: SmolStr,
        ty: SmolStr,
        span: Span,
    },

    #[error("number out of bounds")]
    NumberOutOfBounds(Span),

    #[error("invalid hex bytes")]
    InvalidHex(Span),

    #[error("{0}")]
    Undefined(UndefinedKind, Span),

    #[error("`{0}` is not a valid name")]
    InvalidName(SmolStr, Span),

    #[error("value name `{0}` is already defined")]
    DuplicateValueName(SmolStr, Span),

    #[error("block label `{0}` is already defined")]
    DuplicateBlockLabel(SmolStr, Span),

    #[error("`{0}` is already declared")]
    DuplicatedDeclaration(SmolStr, Span),

    #[error("`{opcode}` produces a value, but no result is declared")]
    MissingResult { opcode: SmolStr, span: Span },

    #[error("`{opcode}` produces no value")]
    UnexpectedResult { opcode: SmolStr, span: Span },

    #[error("invalid json at {line}:{column}: {message}")]
    Json {
        message: String,
        line: usize,
        column: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndefinedKind {
    Value(SmolStr),
    Block(SmolStr),
    Func(SmolStr),
    Global(SmolStr),
}

impl fmt::Display for UndefinedKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Value(name) => write!(f, "undefined value: `{name}`"),
            Self::Block(name) => write!(f, "undefined block: `{name}`"),
            Self::Func(name) => write!(f, "undefined function: `%{name}`"),
            Self::Global(name) => write!(f, "undefined global: `@{name}`"),
        }
    }
}

impl Error {
    /// Source range the error points at. Errors of the JSON reader have no
    /// position in a text module.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Syntax { span, .. }
            | Error::InvalidLiteral { span, .. }
            | Error::MissingResult { span, .. }
            | Error::UnexpectedResult { span, .. } => Some(*span),

            Error::UnknownType(_, span)
            | Error::UnknownOpcode(_, span)
            | Error::Undefined(_, span)
            | Error::InvalidName(_, span)
            | Error::DuplicateValueName(_, span)
            | Error::DuplicateBlockLabel(_, span)
            | Error::DuplicatedDeclaration(_, span) => Some(*span),

            Error::NumberOutOfBounds(span) | Error::InvalidHex(span) => Some(*span),

            Error::Json { .. } => None,
        }
    }

    pub fn print(
        &self,
        mut w: impl io::Write,
        path: &str,
        content: &str,
        colors: bool,
    ) -> io::Result<()> {
        let label = self.to_string();
        let Some(span) = self.span() else {
            return writeln!(w, "error: {label}");
        };

        // Spans of documents that didn't come from `content` may be out of
        // range.
        let range = span.as_range();
        let range = if range.end <= content.len() { range } else { 0..0 };

        let message = Level::Error.title("parse error").snippet(
            Snippet::source(content)
                .line_start(1)
                .origin(path)
                .fold(true)
                .annotation(Level::Error.span(range).label(&label)),
        );
        let renderer = if colors {
            Renderer::styled()
        } else {
            Renderer::plain()
        };
        let rendered = renderer.render(message);
        writeln!(w, "{rendered}")
    }

    pub fn print_to_string(&self, path: &str, content: &str, colors: bool) -> String {
        let mut v = vec![];
        match self.print(&mut v, path, content, colors) {
            Ok(()) => String::from_utf8_lossy(&v).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.location {
            pest::error::InputLocation::Pos(p) => Span(p as u32, p as u32),
            pest::error::InputLocation::Span((s, e)) => Span(s as u32, e as u32),
        };
        Error::Syntax {
            message: err.variant.message().into_owned(),
            span,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}
