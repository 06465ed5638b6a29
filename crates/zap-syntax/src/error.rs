use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(line: usize, col: usize, start: usize, end: usize) -> Self {
        Self { line, col, start, end }
    }

    pub fn single(line: usize, col: usize, offset: usize) -> Self {
        Self { line, col, start: offset, end: offset + 1 }
    }

    pub fn merge(&self, other: &Span) -> Self {
        Self {
            line: self.line.min(other.line),
            col: if self.line == other.line { self.col.min(other.col) } else { self.col },
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedChar { ch: char, span: Span },
    UnterminatedString { span: Span },
    UnterminatedRawString { span: Span },
    UnterminatedChar { span: Span },
    UnterminatedComment { span: Span },
    UnclosedCommentTag { span: Span },
    UnclosedTag { span: Span },
    UnclosedRaw { span: Span },
    InvalidNumber { text: String, span: Span },
    UnbalancedDelimiter { expected: char, found: char, span: Span },
    UnexpectedDelimiter { found: char, span: Span },
    IncompleteOperator { expected: &'static str, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::UnterminatedRawString { span } => *span,
            LexError::UnterminatedChar { span } => *span,
            LexError::UnterminatedComment { span } => *span,
            LexError::UnclosedCommentTag { span } => *span,
            LexError::UnclosedTag { span } => *span,
            LexError::UnclosedRaw { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
            LexError::UnbalancedDelimiter { span, .. } => *span,
            LexError::UnexpectedDelimiter { span, .. } => *span,
            LexError::IncompleteOperator { span, .. } => *span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, .. } => {
                write!(f, "unrecognized character in tag: {:?}", ch)
            }
            LexError::UnterminatedString { .. } => write!(f, "unterminated quoted string"),
            LexError::UnterminatedRawString { .. } => write!(f, "unterminated raw quoted string"),
            LexError::UnterminatedChar { .. } => write!(f, "unterminated character constant"),
            LexError::UnterminatedComment { .. } => write!(f, "unclosed comment"),
            LexError::UnclosedCommentTag { .. } => write!(f, "unclosed comment tag"),
            LexError::UnclosedTag { .. } => write!(f, "unclosed tag"),
            LexError::UnclosedRaw { .. } => write!(f, "unclosed raw section"),
            LexError::InvalidNumber { text, .. } => write!(f, "bad number syntax: {:?}", text),
            LexError::UnbalancedDelimiter { expected, found, .. } => {
                write!(f, "unbalanced delimiters: expected {:?}, got {:?}", expected, found)
            }
            LexError::UnexpectedDelimiter { found, .. } => write!(f, "unexpected {:?}", found),
            LexError::IncompleteOperator { expected, .. } => write!(f, "expected {}", expected),
        }
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    Lex(LexError),
    UnexpectedToken { expected: String, found: String },
    UnexpectedEof { context: String },
    UnexpectedTopLevel { found: String },
    UndefinedVariable(String),
    UndefinedFunction(String),
    IllegalDeclaration(String),
    TooManyDeclarations(String),
    MissingValue(String),
    EmptyCommand,
    InvalidNumber(String),
    InvalidString(String),
    InvalidFill(String),
    DuplicateTemplate(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Lex(e) => write!(f, "{}", e),
            ParseErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {}; found {}", expected, found)
            }
            ParseErrorKind::UnexpectedEof { context } => write!(f, "unexpected EOF in {}", context),
            ParseErrorKind::UnexpectedTopLevel { found } => {
                write!(f, "unexpected {} at top level; only define clauses are allowed", found)
            }
            ParseErrorKind::UndefinedVariable(name) => write!(f, "undefined variable {:?}", name),
            ParseErrorKind::UndefinedFunction(name) => write!(f, "function {:?} not defined", name),
            ParseErrorKind::IllegalDeclaration(name) => {
                write!(f, "illegal variable in declaration: {}", name)
            }
            ParseErrorKind::TooManyDeclarations(context) => {
                write!(f, "too many declarations in {}", context)
            }
            ParseErrorKind::MissingValue(context) => write!(f, "missing value for {}", context),
            ParseErrorKind::EmptyCommand => write!(f, "empty command"),
            ParseErrorKind::InvalidNumber(text) => write!(f, "illegal number syntax: {:?}", text),
            ParseErrorKind::InvalidString(text) => write!(f, "malformed string literal: {}", text),
            ParseErrorKind::InvalidFill(node) => write!(f, "invalid action inside fill: {}", node),
            ParseErrorKind::DuplicateTemplate(name) => {
                write!(f, "duplicated template name {:?}", name)
            }
        }
    }
}

/// A parse failure, tagged with the name of the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub name: String,
    pub span: Option<Span>,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(name: impl Into<String>, span: Span, kind: ParseErrorKind) -> Self {
        Self { name: name.into(), span: Some(span), kind }
    }

    pub fn duplicate(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            name: template.clone(),
            span: None,
            kind: ParseErrorKind::DuplicateTemplate(template),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match &self.kind {
            ParseErrorKind::Lex(e) => Some(e.span()),
            _ => self.span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span() {
            Some(span) => write!(f, "template: {}:{}: {}", self.name, span.line, self.kind),
            None => write!(f, "template: {}", self.kind),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrorKind::Lex(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    NotFound { name: String },
    Recursion { chain: Vec<String> },
    Unresolved { template: String, node: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::NotFound { name } => write!(f, "template not found: {:?}", name),
            CompileError::Recursion { chain } => {
                write!(f, "impossible recursion: [{}]", chain.join(" "))
            }
            CompileError::Unresolved { template, node } => {
                write!(f, "unresolved node in template {:?} can't be replaced by itself: {}", template, node)
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_includes_name_and_line() {
        let err = ParseError::new(
            "page.html",
            Span::new(3, 5, 20, 21),
            ParseErrorKind::UndefinedVariable("$x".to_string()),
        );
        assert_eq!(err.to_string(), "template: page.html:3: undefined variable \"$x\"");
    }

    #[test]
    fn duplicate_has_no_line() {
        let err = ParseError::duplicate("base");
        assert_eq!(err.to_string(), "template: duplicated template name \"base\"");
        assert!(err.span().is_none());
    }

    #[test]
    fn lex_error_span_wins() {
        let lex = LexError::UnclosedTag { span: Span::single(7, 2, 40) };
        let err = ParseError::new("t", Span::single(1, 1, 0), ParseErrorKind::Lex(lex));
        assert_eq!(err.span().map(|s| s.line), Some(7));
        assert_eq!(err.to_string(), "template: t:7: unclosed tag");
    }

    #[test]
    fn recursion_lists_chain() {
        let err = CompileError::Recursion {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "impossible recursion: [a b a]");
    }
}
