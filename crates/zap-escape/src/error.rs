use std::fmt;

/// Category of an escaping failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An action sits where a URL could be in the query or not.
    AmbigContext,
    /// Malformed HTML: quotes in attribute names, `=` in unquoted values.
    BadHtml,
    /// Branches of a conditional end in different contexts.
    BranchEnd,
    /// A template entry point does not end in text.
    EndContext,
    /// One template called from call sites in different contexts.
    InvokedContexts,
    NoSuchTemplate,
    /// A recursive template has no fixed-point output context.
    OutputContext,
    /// A regexp charset `[...]` is open at the end of a text run.
    PartialCharset,
    /// A backslash escape is cut by an action.
    PartialEscape,
    /// The tree still contains `fill` nodes.
    NotCompiled,
    /// `/` after an action that could start a regexp or divide.
    SlashAmbig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscapeError {
    pub code: ErrorCode,
    pub template: Option<String>,
    pub line: Option<usize>,
    pub description: String,
}

impl EscapeError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        EscapeError { code, template: None, line: None, description: description.into() }
    }

    /// Attaches a location unless one is already set.
    pub fn at(mut self, template: &str, line: usize) -> Self {
        if self.template.is_none() {
            self.template = Some(template.to_string());
        }
        if self.line.is_none() && line > 0 {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.template, self.line) {
            (Some(name), Some(line)) => write!(f, "escape: {}:{}: {}", name, line, self.description),
            (Some(name), None) => write!(f, "escape: {}: {}", name, self.description),
            _ => write!(f, "escape: {}", self.description),
        }
    }
}

impl std::error::Error for EscapeError {}
