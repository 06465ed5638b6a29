mod actions;
mod pipeline;

use crate::ast::*;
use crate::error::{LexError, ParseError, ParseErrorKind, Span};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::tree::Tree;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Functions every template may call without a supplied table.
pub static BUILTINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "call", "html", "index", "js", "len", "not", "or", "print", "printf", "println",
        "urlquery",
    ]
    .into_iter()
    .collect()
});

/// A table of function names the parser accepts as identifiers.
pub trait FuncNames {
    fn has_func(&self, name: &str) -> bool;
}

impl FuncNames for HashSet<String> {
    fn has_func(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl FuncNames for HashSet<&'static str> {
    fn has_func(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl FuncNames for BTreeSet<String> {
    fn has_func(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl<V> FuncNames for HashMap<String, V> {
    fn has_func(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl FuncNames for Vec<&str> {
    fn has_func(&self, name: &str) -> bool {
        self.iter().any(|f| *f == name)
    }
}

impl<const N: usize> FuncNames for [&str; N] {
    fn has_func(&self, name: &str) -> bool {
        self.iter().any(|f| *f == name)
    }
}

type PResult<T> = Result<T, ParseError>;

/// What ended an item list.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Terminator {
    End,
    Else(Span),
}

/// Recursive-descent parser over a [`Lexer`].
///
/// Use the free function [`parse()`] for a convenient entry point.
pub struct Parser<'a> {
    name: String,
    lexer: Lexer,
    funcs: &'a [&'a dyn FuncNames],
    vars: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(
        name: &str,
        text: &str,
        left: &str,
        right: &str,
        funcs: &'a [&'a dyn FuncNames],
    ) -> Self {
        Self {
            name: name.to_string(),
            lexer: Lexer::new(text, left, right),
            funcs,
            vars: vec!["$".to_string()],
        }
    }

    /// Parses every `{{define}}` in the input into a fresh tree.
    pub fn parse(mut self) -> PResult<Tree> {
        let mut tree = Tree::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Text if token.value.trim().is_empty() => {}
                TokenKind::LeftDelim => {
                    let keyword = self.next()?;
                    if keyword.kind != TokenKind::Define {
                        return Err(self.error(
                            keyword.span,
                            ParseErrorKind::UnexpectedTopLevel { found: keyword.to_string() },
                        ));
                    }
                    let define = self.definition(token.span)?;
                    tree.add(define)?;
                }
                _ => {
                    return Err(self.error(
                        token.span,
                        ParseErrorKind::UnexpectedTopLevel { found: token.to_string() },
                    ));
                }
            }
        }
        tracing::debug!(name = %self.name, templates = tree.len(), "parsed");
        Ok(tree)
    }

    fn definition(&mut self, open: Span) -> PResult<DefineNode> {
        const CONTEXT: &str = "define clause";
        let token = self.next()?;
        let name = self.string_value(&token, CONTEXT)?;

        let mut token = self.next()?;
        let mut parent = None;
        if matches!(token.kind, TokenKind::String | TokenKind::RawString) {
            parent = Some(self.string_value(&token, CONTEXT)?);
            token = self.next()?;
        }
        if token.kind != TokenKind::RightDelim {
            return Err(self.unexpected(&token, CONTEXT));
        }

        self.vars.truncate(1);
        let (list, end) = self.item_list(CONTEXT)?;
        if let Terminator::Else(span) = end {
            return Err(self.error(
                span,
                ParseErrorKind::UnexpectedToken {
                    expected: format!("<end> in {}", CONTEXT),
                    found: "<else>".to_string(),
                },
            ));
        }
        let span = open.merge(&list.span);
        Ok(DefineNode { span, name, parent, list })
    }

    /// `(text | action)*` up to `{{end}}` or `{{else}}`.
    fn item_list(&mut self, context: &str) -> PResult<(ListNode, Terminator)> {
        let mut list = ListNode::new(self.peek_span()?);
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Text => {
                    list.span = list.span.merge(&token.span);
                    list.push(Node::Text(TextNode { span: token.span, text: token.value }));
                }
                TokenKind::LeftDelim => match self.action(token.span)? {
                    actions::Item::Node(node) => {
                        list.span = list.span.merge(&node.span());
                        list.push(node);
                    }
                    actions::Item::End => return Ok((list, Terminator::End)),
                    actions::Item::Else(span) => return Ok((list, Terminator::Else(span))),
                },
                TokenKind::Eof => {
                    return Err(self.error(
                        token.span,
                        ParseErrorKind::UnexpectedEof { context: context.to_string() },
                    ));
                }
                _ => return Err(self.unexpected(&token, "input")),
            }
        }
    }

    fn next(&mut self) -> PResult<Token> {
        let token = self.lexer.next_token();
        if token.kind == TokenKind::Error {
            return Err(self.lex_error(token.span));
        }
        Ok(token)
    }

    fn peek_kind(&mut self) -> PResult<TokenKind> {
        let token = self.lexer.peek();
        if token.kind == TokenKind::Error {
            let span = token.span;
            return Err(self.lex_error(span));
        }
        Ok(token.kind)
    }

    fn peek_span(&mut self) -> PResult<Span> {
        let token = self.lexer.peek();
        if token.kind == TokenKind::Error {
            let span = token.span;
            return Err(self.lex_error(span));
        }
        Ok(token.span)
    }

    fn backup(&mut self, token: Token) {
        self.lexer.push_back(token);
    }

    /// Returns two tokens to the stream, `first` being read again first.
    fn backup2(&mut self, first: Token, second: Token) {
        self.lexer.push_back(second);
        self.lexer.push_back(first);
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> PResult<Token> {
        let token = self.next()?;
        if token.kind != kind {
            return Err(self.error(
                token.span,
                ParseErrorKind::UnexpectedToken {
                    expected: format!("{} in {}", kind.display_name(), context),
                    found: token.to_string(),
                },
            ));
        }
        Ok(token)
    }

    fn string_value(&self, token: &Token, context: &str) -> PResult<String> {
        match token.kind {
            TokenKind::String | TokenKind::RawString => unquote(&token.value).ok_or_else(|| {
                self.error(token.span, ParseErrorKind::InvalidString(token.value.clone()))
            }),
            _ => Err(self.error(
                token.span,
                ParseErrorKind::UnexpectedToken {
                    expected: format!("quoted name in {}", context),
                    found: token.to_string(),
                },
            )),
        }
    }

    fn has_function(&self, name: &str) -> bool {
        BUILTINS.contains(name) || self.funcs.iter().any(|table| table.has_func(name))
    }

    fn error(&self, span: Span, kind: ParseErrorKind) -> ParseError {
        ParseError::new(&self.name, span, kind)
    }

    fn unexpected(&self, token: &Token, context: &str) -> ParseError {
        if token.kind == TokenKind::Eof {
            return self.error(
                token.span,
                ParseErrorKind::UnexpectedEof { context: context.to_string() },
            );
        }
        self.error(
            token.span,
            ParseErrorKind::UnexpectedToken {
                expected: format!("valid token in {}", context),
                found: token.to_string(),
            },
        )
    }

    fn lex_error(&self, span: Span) -> ParseError {
        let err = self
            .lexer
            .error()
            .cloned()
            .unwrap_or(LexError::UnclosedTag { span });
        self.error(span, ParseErrorKind::Lex(err))
    }
}

/// Parses `text` into a tree of named templates.
///
/// `name` only labels error messages. Identifiers must name a builtin or a
/// function found in one of `funcs`.
pub fn parse(
    text: &str,
    name: &str,
    left: &str,
    right: &str,
    funcs: &[&dyn FuncNames],
) -> Result<Tree, ParseError> {
    Parser::new(name, text, left, right, funcs).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Result<Tree, ParseError> {
        parse(src, "t", "", "", &[])
    }

    #[test]
    fn parses_define_with_parent() {
        let tree = parse_one(r#"{{define "child" "base"}}hi{{end}}"#).unwrap();
        let define = tree.get("child").unwrap();
        assert_eq!(define.parent.as_deref(), Some("base"));
        assert_eq!(define.list.to_string(), "hi");
    }

    #[test]
    fn whitespace_between_defines_is_ignored() {
        let tree = parse_one("\n{{define \"a\"}}A{{end}}\n\n{{define \"b\"}}B{{end}}\n").unwrap();
        assert_eq!(tree.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn text_outside_define_is_rejected() {
        let err = parse_one("stray {{define \"a\"}}{{end}}").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedTopLevel { .. }));
    }

    #[test]
    fn supplied_function_table_is_consulted() {
        let funcs: HashSet<String> = ["upper".to_string()].into_iter().collect();
        let src = r#"{{define "a"}}{{.Name | upper}}{{end}}"#;
        assert!(parse(src, "t", "", "", &[&funcs]).is_ok());

        let err = parse_one(src).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UndefinedFunction("upper".to_string()));
    }

    #[test]
    fn lex_error_surfaces_with_line() {
        let err = parse_one("{{define \"a\"}}\n{{\"open}}{{end}}").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Lex(LexError::UnterminatedString { .. })));
        assert_eq!(err.span().map(|s| s.line), Some(2));
    }

    #[test]
    fn custom_delimiters() {
        let tree = parse("<%define \"a\"%>x<%.Y%><%end%>", "t", "<%", "%>", &[]).unwrap();
        assert_eq!(tree.get("a").unwrap().list.to_string(), "x{{.Y}}");
    }
}
