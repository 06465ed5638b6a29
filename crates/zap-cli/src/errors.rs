use colored::*;
use std::fmt;
use zap::{Error, Span, zap_escape::ErrorCode};

/// A diagnostic with an optional source snippet, suggestion and help line.
pub struct EnhancedError {
    pub message: String,
    pub line: Option<usize>,
    pub span: Option<Span>,
    pub file: Option<String>,
    pub source: Option<String>,
    pub suggestion: Option<String>,
    pub help: Option<String>,
}

impl EnhancedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            span: None,
            file: None,
            source: None,
            suggestion: None,
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.line = Some(span.line);
        self.span = Some(span);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.message.bold());

        if let Some(file) = &self.file {
            match (self.line, &self.span) {
                (_, Some(span)) => eprintln!("  {} {}:{}:{}", "-->".blue().bold(), file, span.line, span.col),
                (Some(line), None) => eprintln!("  {} {}:{}", "-->".blue().bold(), file, line),
                (None, None) => eprintln!("  {} {}", "-->".blue().bold(), file),
            }
        }

        if let (Some(source), Some(line)) = (&self.source, self.line) {
            eprintln!();
            self.display_source(source, line);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!();
            eprintln!("{} {}", "suggestion:".green().bold(), suggestion);
        }

        if let Some(help) = &self.help {
            eprintln!();
            eprintln!("{} {}", "help:".cyan().bold(), help);
        }
    }

    fn display_source(&self, source: &str, line: usize) {
        for row in snippet(source, line, self.span.as_ref()) {
            match row {
                Row::Context(num, text) => {
                    eprintln!("{:>4} {} {}", num.to_string().dimmed(), "|".blue().bold(), text)
                }
                Row::Error(num, text) => {
                    eprintln!("{:>4} {} {}", num.to_string().blue().bold(), "|".blue().bold(), text)
                }
                Row::Caret(pad, len) => {
                    eprintln!("{:>4} {} {}{}", "", "|".blue().bold(), " ".repeat(pad), "^".repeat(len).red().bold())
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Row<'a> {
    Context(usize, &'a str),
    Error(usize, &'a str),
    /// Leading spaces and caret count under the error line.
    Caret(usize, usize),
}

/// Two lines of context around `line`, with a caret row when the column is known.
fn snippet<'a>(source: &'a str, line: usize, span: Option<&Span>) -> Vec<Row<'a>> {
    let lines: Vec<&str> = source.lines().collect();
    let idx = line.saturating_sub(1);
    if idx >= lines.len() {
        return Vec::new();
    }

    let mut rows = Vec::new();
    for i in idx.saturating_sub(2)..(idx + 3).min(lines.len()) {
        if i != idx {
            rows.push(Row::Context(i + 1, lines[i]));
            continue;
        }
        rows.push(Row::Error(i + 1, lines[i]));
        if let Some(span) = span.filter(|span| span.col > 0) {
            let len = span.end.saturating_sub(span.start).max(1);
            rows.push(Row::Caret(span.col - 1, len));
        }
    }
    rows
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnhancedError: {}", self.message)
    }
}

impl std::error::Error for EnhancedError {}

/// Builds a diagnostic for a library error, with a hint for common mistakes.
pub fn enhance_error(err: &Error, file: Option<String>, source: Option<String>) -> EnhancedError {
    let mut enhanced = EnhancedError::new(err.to_string());
    if let Some(file) = file {
        enhanced = enhanced.with_file(file);
    }
    if let Some(source) = source {
        enhanced = enhanced.with_source(source);
    }
    match (err.span(), err.line()) {
        (Some(span), _) => enhanced = enhanced.with_span(span),
        (None, Some(line)) => enhanced = enhanced.with_line(line),
        (None, None) => {}
    }

    match err {
        Error::Parse(_) => {
            let message = err.to_string();
            if message.contains("not defined") {
                enhanced = enhanced
                    .with_suggestion("Register the function with --func NAME or `funcs` in .zaprc");
            } else if message.contains("only define clauses") {
                enhanced = enhanced.with_help("Wrap template content in {{define \"name\"}} ... {{end}}");
            } else if message.contains("unclosed") {
                enhanced = enhanced.with_help("Tags must close on the line they open");
            }
        }
        Error::Compile(_) => {
            enhanced = enhanced.with_help("Check parent names in {{define}} and targets of {{fill}}");
        }
        Error::Escape(e) => match e.code {
            ErrorCode::EndContext => {
                enhanced = enhanced.with_suggestion("Close every tag, attribute and comment the template opens");
            }
            ErrorCode::BranchEnd => {
                enhanced = enhanced.with_suggestion("Open and close markup inside the same branch");
            }
            ErrorCode::InvokedContexts => {
                enhanced = enhanced.with_help("A template must be called from one HTML context only");
            }
            ErrorCode::AmbigContext => {
                enhanced = enhanced.with_suggestion("Move the action out of the conditional URL part");
            }
            _ => {}
        },
    }

    enhanced
}
