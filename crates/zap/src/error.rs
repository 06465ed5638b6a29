use std::fmt;
use zap_escape::EscapeError;
use zap_syntax::{CompileError, ParseError, Span};

/// Any failure of a [`Set`](crate::Set) operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
    Escape(EscapeError),
}

impl Error {
    /// Source position, when the failing phase knows one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Parse(e) => e.span(),
            Error::Compile(_) | Error::Escape(_) => None,
        }
    }

    /// Line number reported by the failing phase.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Parse(e) => e.span().map(|span| span.line),
            Error::Compile(_) => None,
            Error::Escape(e) => e.line,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{}", e),
            Error::Compile(e) => write!(f, "{}", e),
            Error::Escape(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Compile(e) => Some(e),
            Error::Escape(e) => Some(e),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        Error::Compile(e)
    }
}

impl From<EscapeError> for Error {
    fn from(e: EscapeError) -> Self {
        Error::Escape(e)
    }
}
