use crate::error::{LexError, Span};
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::fmt;

pub const DEFAULT_LEFT_DELIM: &str = "{{";
pub const DEFAULT_RIGHT_DELIM: &str = "}}";

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut m = HashMap::with_capacity(16);
    m.insert("define", TokenKind::Define);
    m.insert("block", TokenKind::Block);
    m.insert("fill", TokenKind::Fill);
    m.insert("if", TokenKind::If);
    m.insert("else", TokenKind::Else);
    m.insert("end", TokenKind::End);
    m.insert("range", TokenKind::Range);
    m.insert("with", TokenKind::With);
    m.insert("template", TokenKind::Template);
    m.insert("nil", TokenKind::Nil);
    m.insert("true", TokenKind::Bool);
    m.insert("false", TokenKind::Bool);
    m
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Error,
    Text,
    LeftDelim,
    RightDelim,
    Bool,
    Int,
    Float,
    CharConstant,
    String,
    RawString,
    Nil,
    Identifier,
    Field,
    Variable,
    Dot,
    Define,
    Block,
    Fill,
    If,
    Else,
    End,
    Range,
    With,
    Template,
    Pipe,
    Comma,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Question,
    Not,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Assign,
    ColonAssign,
    Colon,
    MulAssign,
    DivAssign,
    ModAssign,
    AddAssign,
    SubAssign,
    EqEq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    And,
    Or,
    Char,
}

impl TokenKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            TokenKind::Eof => "EOF",
            TokenKind::Error => "error",
            TokenKind::Text => "text",
            TokenKind::LeftDelim => "left delimiter",
            TokenKind::RightDelim => "right delimiter",
            TokenKind::Bool => "boolean",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::CharConstant => "character constant",
            TokenKind::String => "quoted string",
            TokenKind::RawString => "raw string",
            TokenKind::Nil => "nil",
            TokenKind::Identifier => "identifier",
            TokenKind::Field => "field",
            TokenKind::Variable => "variable",
            TokenKind::Dot => "'.'",
            TokenKind::Define => "keyword 'define'",
            TokenKind::Block => "keyword 'block'",
            TokenKind::Fill => "keyword 'fill'",
            TokenKind::If => "keyword 'if'",
            TokenKind::Else => "keyword 'else'",
            TokenKind::End => "keyword 'end'",
            TokenKind::Range => "keyword 'range'",
            TokenKind::With => "keyword 'with'",
            TokenKind::Template => "keyword 'template'",
            TokenKind::Pipe => "'|'",
            TokenKind::Comma => "','",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::Question => "'?'",
            TokenKind::Not => "'!'",
            TokenKind::Mul => "'*'",
            TokenKind::Div => "'/'",
            TokenKind::Mod => "'%'",
            TokenKind::Add => "'+'",
            TokenKind::Sub => "'-'",
            TokenKind::Assign => "'='",
            TokenKind::ColonAssign => "':='",
            TokenKind::Colon => "':'",
            TokenKind::MulAssign => "'*='",
            TokenKind::DivAssign => "'/='",
            TokenKind::ModAssign => "'%='",
            TokenKind::AddAssign => "'+='",
            TokenKind::SubAssign => "'-='",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Gt => "'>'",
            TokenKind::Lt => "'<'",
            TokenKind::GtEq => "'>='",
            TokenKind::LtEq => "'<='",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Char => "character",
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Define
                | TokenKind::Block
                | TokenKind::Fill
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::End
                | TokenKind::Range
                | TokenKind::With
                | TokenKind::Template
        )
    }
}

/// A lexed token. `value` is the exact source slice the token covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Error => write!(f, "{}", self.value),
            TokenKind::Text if self.value.chars().count() > 10 => {
                let head: String = self.value.chars().take(10).collect();
                write!(f, "{:?}...", head)
            }
            TokenKind::Text => write!(f, "{:?}", self.value),
            k if k.is_keyword() => write!(f, "<{}>", self.value),
            _ => write!(f, "{:?}", self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    File,
    Comment,
    TagStart,
    TagComment,
    Raw,
    TagContent,
    TagEnd,
    Identifier,
    Field,
    Variable,
    Number,
    Quote,
    RawQuote,
    CharConstant,
    Eof,
    Error,
}

/// Pull-based template lexer.
///
/// Each call to [`Lexer::next_token`] runs the state machine until at least one
/// token is queued. Once the lexer has produced an `Eof` it keeps producing
/// `Eof`; once it has produced an `Error` it only produces that error again.
/// Tokens handed back with [`Lexer::push_back`] are returned before anything
/// else, most recent first.
pub struct Lexer {
    input: String,
    left: String,
    right: String,
    comment_close: String,
    raw_close: String,
    state: State,
    pin: usize,
    pos: usize,
    width: usize,
    line: usize,
    line_start: usize,
    tracked: usize,
    braces: Vec<char>,
    queue: VecDeque<Token>,
    stack: SmallVec<[Token; 2]>,
    error: Option<LexError>,
    finished: bool,
}

impl Lexer {
    pub fn new(input: &str, left: &str, right: &str) -> Self {
        let left = if left.is_empty() { DEFAULT_LEFT_DELIM } else { left };
        let right = if right.is_empty() { DEFAULT_RIGHT_DELIM } else { right };
        Self {
            input: input.replace("\r\n", "\n"),
            left: left.to_string(),
            right: right.to_string(),
            comment_close: format!("#{}", right),
            raw_close: format!("{}end{}", left, right),
            state: State::File,
            pin: 0,
            pos: 0,
            width: 0,
            line: 1,
            line_start: 0,
            tracked: 0,
            braces: Vec::new(),
            queue: VecDeque::with_capacity(10),
            stack: SmallVec::new(),
            error: None,
            finished: false,
        }
    }

    pub fn left_delim(&self) -> &str {
        &self.left
    }

    pub fn right_delim(&self) -> &str {
        &self.right
    }

    /// The error that put the lexer into its terminal error state, if any.
    pub fn error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.stack.pop() {
            return token;
        }
        loop {
            if let Some(token) = self.queue.pop_front() {
                return token;
            }
            self.state = self.step();
        }
    }

    pub fn peek(&mut self) -> &Token {
        if self.stack.is_empty() {
            let token = self.next_token();
            self.stack.push(token);
        }
        &self.stack[self.stack.len() - 1]
    }

    pub fn push_back(&mut self, token: Token) {
        self.stack.push(token);
    }

    fn step(&mut self) -> State {
        match self.state {
            State::File => self.lex_file(),
            State::Comment => self.lex_comment(),
            State::TagStart => self.lex_tag_start(),
            State::TagComment => self.lex_tag_comment(),
            State::Raw => self.lex_raw(),
            State::TagContent => self.lex_tag_content(),
            State::TagEnd => self.lex_tag_end(),
            State::Identifier => self.lex_identifier(),
            State::Field => self.lex_chain(TokenKind::Field),
            State::Variable => self.lex_chain(TokenKind::Variable),
            State::Number => self.lex_number(),
            State::Quote => self.lex_quote(),
            State::RawQuote => self.lex_raw_quote(),
            State::CharConstant => self.lex_char_constant(),
            State::Eof => {
                self.pin = self.input.len();
                self.pos = self.input.len();
                self.emit(TokenKind::Eof);
                State::Eof
            }
            State::Error => {
                let (value, span) = match &self.error {
                    Some(err) => (err.to_string(), err.span()),
                    None => (String::new(), Span::default()),
                };
                self.queue.push_back(Token { kind: TokenKind::Error, value, span });
                State::Error
            }
        }
    }

    fn lex_file(&mut self) -> State {
        loop {
            let found = {
                let first = self.left.chars().next();
                self.input[self.pos..].find(|c: char| c == '/' || Some(c) == first)
            };
            let Some(offset) = found else {
                self.pos = self.input.len();
                self.emit_text();
                return State::Eof;
            };
            self.pos += offset;

            let rest = &self.input[self.pos..];
            if rest.starts_with(self.left.as_str()) {
                self.emit_text();
                return State::TagStart;
            }
            if rest.starts_with("/*") || (rest.starts_with("//") && self.after_space()) {
                self.emit_text();
                return State::Comment;
            }
            self.pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    fn lex_comment(&mut self) -> State {
        let rest = &self.input[self.pos..];
        if rest.starts_with("//") {
            self.pos = match rest.find('\n') {
                Some(i) => self.pos + i,
                None => self.input.len(),
            };
            self.ignore();
            return State::File;
        }
        match rest[2..].find("*/") {
            Some(i) => {
                self.pos += i + 4;
                self.ignore();
                State::File
            }
            None => self.fail(|span| LexError::UnterminatedComment { span }),
        }
    }

    fn lex_tag_start(&mut self) -> State {
        self.pos += self.left.len();
        if self.input[self.pos..].starts_with('#') {
            return State::TagComment;
        }
        if let Some(len) = self.raw_open_len() {
            self.pos += len;
            self.ignore();
            return State::Raw;
        }
        self.braces.clear();
        self.emit(TokenKind::LeftDelim);
        State::TagContent
    }

    fn raw_open_len(&self) -> Option<usize> {
        let rest = &self.input[self.pos..];
        let after = rest.trim_start_matches([' ', '\t']).strip_prefix("raw")?;
        let after = after.trim_start_matches([' ', '\t']);
        after
            .starts_with(self.right.as_str())
            .then(|| rest.len() - after.len() + self.right.len())
    }

    fn lex_tag_comment(&mut self) -> State {
        match self.input[self.pos + 1..].find(self.comment_close.as_str()) {
            Some(i) => {
                self.pos += 1 + i + self.comment_close.len();
                self.ignore();
                State::File
            }
            None => self.fail(|span| LexError::UnclosedCommentTag { span }),
        }
    }

    fn lex_raw(&mut self) -> State {
        match self.input[self.pos..].find(self.raw_close.as_str()) {
            Some(i) => {
                self.pos += i;
                self.emit_text();
                self.pos += self.raw_close.len();
                self.ignore();
                State::File
            }
            None => self.fail(|span| LexError::UnclosedRaw { span }),
        }
    }

    fn lex_tag_content(&mut self) -> State {
        if self.braces.is_empty() && self.input[self.pos..].starts_with(self.right.as_str()) {
            return State::TagEnd;
        }
        let Some(c) = self.next_char() else {
            return self.fail(|span| LexError::UnclosedTag { span });
        };
        match c {
            '\n' => self.fail(|span| LexError::UnclosedTag { span }),
            ' ' | '\t' | '\r' => {
                self.ignore();
                State::TagContent
            }
            '"' => State::Quote,
            '`' => State::RawQuote,
            '\'' => State::CharConstant,
            '$' => State::Variable,
            '.' | '+' | '-' if self.peek_char().is_some_and(|n| n.is_ascii_digit()) => {
                self.backup();
                State::Number
            }
            '.' => {
                if self.peek_char().is_some_and(is_alphanumeric) {
                    State::Field
                } else {
                    self.emit(TokenKind::Dot);
                    State::TagContent
                }
            }
            '(' | '[' | '{' => {
                let (closer, kind) = match c {
                    '(' => (')', TokenKind::LeftParen),
                    '[' => (']', TokenKind::LeftBracket),
                    _ => ('}', TokenKind::LeftBrace),
                };
                self.braces.push(closer);
                self.emit(kind);
                State::TagContent
            }
            ')' | ']' | '}' => match self.braces.pop() {
                Some(expected) if expected == c => {
                    let kind = match c {
                        ')' => TokenKind::RightParen,
                        ']' => TokenKind::RightBracket,
                        _ => TokenKind::RightBrace,
                    };
                    self.emit(kind);
                    State::TagContent
                }
                Some(expected) => self.fail(|span| LexError::UnbalancedDelimiter {
                    expected,
                    found: c,
                    span,
                }),
                None => self.fail(|span| LexError::UnexpectedDelimiter { found: c, span }),
            },
            '|' => {
                let kind = if self.accept(|n| n == '|') { TokenKind::Or } else { TokenKind::Pipe };
                self.emit(kind);
                State::TagContent
            }
            '&' => {
                if self.accept(|n| n == '&') {
                    self.emit(TokenKind::And);
                    State::TagContent
                } else {
                    self.fail(|span| LexError::IncompleteOperator { expected: "&&", span })
                }
            }
            ',' => {
                self.emit(TokenKind::Comma);
                State::TagContent
            }
            '?' => {
                self.emit(TokenKind::Question);
                State::TagContent
            }
            '*' | '/' | '%' | '+' | '-' | '=' | ':' | '!' | '<' | '>' => {
                let compound = self.accept(|n| n == '=');
                self.emit(operator_kind(c, compound));
                State::TagContent
            }
            '0'..='9' => {
                self.backup();
                State::Number
            }
            c if is_alphanumeric(c) => {
                self.backup();
                State::Identifier
            }
            c if c.is_ascii_graphic() => {
                self.emit(TokenKind::Char);
                State::TagContent
            }
            c => self.fail(|span| LexError::UnexpectedChar { ch: c, span }),
        }
    }

    fn lex_tag_end(&mut self) -> State {
        self.pos += self.right.len();
        self.emit(TokenKind::RightDelim);
        State::File
    }

    fn lex_identifier(&mut self) -> State {
        self.accept_run(is_alphanumeric);
        let word = &self.input[self.pin..self.pos];
        let kind = KEYWORDS.get(word).copied().unwrap_or(TokenKind::Identifier);
        self.emit(kind);
        State::TagContent
    }

    /// Fields (`.a.b`) and variables (`$x.a`): the leading sigil is already consumed.
    fn lex_chain(&mut self, kind: TokenKind) -> State {
        self.accept_run(is_alphanumeric);
        loop {
            let mut rest = self.input[self.pos..].chars();
            if rest.next() != Some('.') || !rest.next().is_some_and(is_alphanumeric) {
                break;
            }
            self.pos += 1;
            self.accept_run(is_alphanumeric);
        }
        self.emit(kind);
        State::TagContent
    }

    /// Numbers may carry a sign or start with `.`: `-5` and `.5` are single
    /// literals, while `a - 5` lexes as an operator between operands.
    fn lex_number(&mut self) -> State {
        self.accept(|c| c == '+' || c == '-');
        let start = self.pos;
        if self.input[self.pos..].starts_with("0x") {
            self.pos += 2;
            let digits = self.accept_run(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
            if digits == 0 || self.peek_char().is_some_and(|c| is_alphanumeric(c) || c == '.') {
                return self.bad_number();
            }
            self.emit(TokenKind::Int);
            return State::TagContent;
        }

        let int_digits = self.accept_run(|c| c.is_ascii_digit());
        let mut float = false;
        if self.peek_char() == Some('.') {
            self.pos += 1;
            if self.accept_run(|c| c.is_ascii_digit()) == 0 {
                return self.bad_number();
            }
            float = true;
        }
        if self.peek_char() == Some('e') {
            self.pos += 1;
            self.accept(|c| c == '+' || c == '-');
            if self.accept_run(|c| c.is_ascii_digit()) == 0 {
                return self.bad_number();
            }
            float = true;
        }
        if !float && int_digits > 1 && self.input[start..].starts_with('0') {
            return self.bad_number();
        }
        if self.peek_char().is_some_and(|c| is_alphanumeric(c) || c == '.') {
            return self.bad_number();
        }
        self.emit(if float { TokenKind::Float } else { TokenKind::Int });
        State::TagContent
    }

    fn bad_number(&mut self) -> State {
        self.accept_run(|c| is_alphanumeric(c) || c == '.');
        let text = self.input[self.pin..self.pos].to_string();
        self.fail(|span| LexError::InvalidNumber { text, span })
    }

    fn lex_quote(&mut self) -> State {
        loop {
            match self.next_char() {
                Some('\\') => {
                    if matches!(self.next_char(), None | Some('\n')) {
                        return self.fail(|span| LexError::UnterminatedString { span });
                    }
                }
                Some('"') => break,
                None | Some('\n') => return self.fail(|span| LexError::UnterminatedString { span }),
                Some(_) => {}
            }
        }
        self.emit(TokenKind::String);
        State::TagContent
    }

    fn lex_raw_quote(&mut self) -> State {
        match self.input[self.pos..].find('`') {
            Some(i) => {
                self.pos += i + 1;
                self.emit(TokenKind::RawString);
                State::TagContent
            }
            None => self.fail(|span| LexError::UnterminatedRawString { span }),
        }
    }

    fn lex_char_constant(&mut self) -> State {
        loop {
            match self.next_char() {
                Some('\\') => {
                    if matches!(self.next_char(), None | Some('\n')) {
                        return self.fail(|span| LexError::UnterminatedChar { span });
                    }
                }
                Some('\'') => break,
                None | Some('\n') => return self.fail(|span| LexError::UnterminatedChar { span }),
                Some(_) => {}
            }
        }
        self.emit(TokenKind::CharConstant);
        State::TagContent
    }

    fn next_char(&mut self) -> Option<char> {
        match self.input[self.pos..].chars().next() {
            Some(c) => {
                self.width = c.len_utf8();
                self.pos += self.width;
                Some(c)
            }
            None => {
                self.width = 0;
                None
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn backup(&mut self) {
        self.pos -= self.width;
        self.width = 0;
    }

    fn accept(&mut self, pred: impl Fn(char) -> bool) -> bool {
        match self.peek_char() {
            Some(c) if pred(c) => {
                self.pos += c.len_utf8();
                true
            }
            _ => false,
        }
    }

    fn accept_run(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let mut count = 0;
        while self.accept(&pred) {
            count += 1;
        }
        count
    }

    fn after_space(&self) -> bool {
        self.pos == 0 || self.input[..self.pos].chars().next_back().is_some_and(char::is_whitespace)
    }

    fn locate(&mut self, offset: usize) -> (usize, usize) {
        if offset < self.tracked {
            self.tracked = 0;
            self.line = 1;
            self.line_start = 0;
        }
        for (i, b) in self.input.as_bytes()[self.tracked..offset].iter().enumerate() {
            if *b == b'\n' {
                self.line += 1;
                self.line_start = self.tracked + i + 1;
            }
        }
        self.tracked = offset;
        let col = self.input[self.line_start..offset].chars().count() + 1;
        (self.line, col)
    }

    fn emit(&mut self, kind: TokenKind) {
        let (line, col) = self.locate(self.pin);
        let value = self.input[self.pin..self.pos].to_string();
        self.queue.push_back(Token {
            kind,
            value,
            span: Span::new(line, col, self.pin, self.pos),
        });
        self.pin = self.pos;
    }

    fn emit_text(&mut self) {
        if self.pos > self.pin {
            self.emit(TokenKind::Text);
        }
    }

    fn ignore(&mut self) {
        self.pin = self.pos;
    }

    fn fail(&mut self, make: impl FnOnce(Span) -> LexError) -> State {
        let (line, col) = self.locate(self.pin);
        let end = self.pos.max(self.pin + 1).min(self.input.len().max(self.pin));
        let err = make(Span::new(line, col, self.pin, end));
        tracing::trace!(error = %err, line, col, "lexer entered error state");
        self.queue.push_back(Token {
            kind: TokenKind::Error,
            value: err.to_string(),
            span: err.span(),
        });
        self.error = Some(err);
        State::Error
    }
}

impl Iterator for Lexer {
    type Item = Token;

    /// Yields tokens up to and including the first `Eof` or `Error`.
    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if matches!(token.kind, TokenKind::Eof | TokenKind::Error) {
            self.finished = true;
        }
        Some(token)
    }
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn operator_kind(c: char, compound: bool) -> TokenKind {
    match (c, compound) {
        ('*', false) => TokenKind::Mul,
        ('*', true) => TokenKind::MulAssign,
        ('/', false) => TokenKind::Div,
        ('/', true) => TokenKind::DivAssign,
        ('%', false) => TokenKind::Mod,
        ('%', true) => TokenKind::ModAssign,
        ('+', false) => TokenKind::Add,
        ('+', true) => TokenKind::AddAssign,
        ('-', false) => TokenKind::Sub,
        ('-', true) => TokenKind::SubAssign,
        ('=', false) => TokenKind::Assign,
        ('=', true) => TokenKind::EqEq,
        (':', false) => TokenKind::Colon,
        (':', true) => TokenKind::ColonAssign,
        ('!', false) => TokenKind::Not,
        ('!', true) => TokenKind::NotEq,
        ('<', false) => TokenKind::Lt,
        ('<', true) => TokenKind::LtEq,
        ('>', false) => TokenKind::Gt,
        _ => TokenKind::GtEq,
    }
}

/// Lexes `source` with the default delimiters, stopping at the first error.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source, DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM);
    let mut tokens = Vec::with_capacity(source.len() / 8);
    loop {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::Eof => {
                tokens.push(token);
                return Ok(tokens);
            }
            TokenKind::Error => {
                return Err(lexer
                    .error()
                    .cloned()
                    .unwrap_or(LexError::UnclosedTag { span: token.span }));
            }
            _ => tokens.push(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, "", "").map(|t| t.kind).collect()
    }

    #[test]
    fn text_and_action() {
        assert_eq!(
            kinds("hello {{.Name}}!"),
            vec![
                TokenKind::Text,
                TokenKind::LeftDelim,
                TokenKind::Field,
                TokenKind::RightDelim,
                TokenKind::Text,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn eof_repeats() {
        let mut lexer = Lexer::new("x", "", "");
        assert_eq!(lexer.next_token().kind, TokenKind::Text);
        for _ in 0..3 {
            assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn error_is_terminal() {
        let mut lexer = Lexer::new("{{ \"abc }} tail {{ .X }}", "", "");
        assert_eq!(lexer.next_token().kind, TokenKind::LeftDelim);
        let first = lexer.next_token();
        assert_eq!(first.kind, TokenKind::Error);
        assert_eq!(first.value, "unterminated quoted string");
        for _ in 0..3 {
            assert_eq!(lexer.next_token(), first);
        }
        assert!(matches!(lexer.error(), Some(LexError::UnterminatedString { .. })));
    }

    #[test]
    fn push_back_is_lifo() {
        let mut lexer = Lexer::new("{{.A .B}}", "", "");
        let open = lexer.next_token();
        let a = lexer.next_token();
        lexer.push_back(a.clone());
        lexer.push_back(open.clone());
        assert_eq!(lexer.next_token(), open);
        assert_eq!(lexer.next_token(), a);
        assert_eq!(lexer.peek().value, ".B");
        assert_eq!(lexer.next_token().value, ".B");
    }

    #[test]
    fn queue_grows_past_initial_capacity() {
        let source: String = (0..40).map(|i| format!("t{i}{{{{.F{i}}}}}")).collect();
        let tokens: Vec<Token> = Lexer::new(&source, "", "").collect();
        assert_eq!(tokens.len(), 40 * 4 + 1);
        assert_eq!(tokens[2].value, ".F0");
        assert_eq!(tokens[158].value, ".F39");
    }

    #[test]
    fn compound_operators() {
        let tokens = tokenize("{{* *= / /= % %= + += - -= = == : := ! != < <= > >= && ||}}").unwrap();
        let got: Vec<TokenKind> = tokens[1..tokens.len() - 2].iter().map(|t| t.kind).collect();
        assert_eq!(
            got,
            vec![
                TokenKind::Mul,
                TokenKind::MulAssign,
                TokenKind::Div,
                TokenKind::DivAssign,
                TokenKind::Mod,
                TokenKind::ModAssign,
                TokenKind::Add,
                TokenKind::AddAssign,
                TokenKind::Sub,
                TokenKind::SubAssign,
                TokenKind::Assign,
                TokenKind::EqEq,
                TokenKind::Colon,
                TokenKind::ColonAssign,
                TokenKind::Not,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::And,
                TokenKind::Or,
            ]
        );
    }

    #[test]
    fn single_ampersand_is_error() {
        assert!(matches!(
            tokenize("{{ a & b }}"),
            Err(LexError::IncompleteOperator { expected: "&&", .. })
        ));
    }

    #[test]
    fn positions_track_lines() {
        let tokens = tokenize("a\nbc {{.X}}\n{{.Y}}").unwrap();
        let x = tokens.iter().find(|t| t.value == ".X").unwrap();
        assert_eq!((x.span.line, x.span.col), (2, 6));
        let y = tokens.iter().find(|t| t.value == ".Y").unwrap();
        assert_eq!((y.span.line, y.span.col), (3, 3));
    }
}
