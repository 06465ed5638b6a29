//! Parse tree for zap templates.
//!
//! Nodes print back to template source with the default delimiters; parsing
//! the printed form yields an equal tree. `Clone` is a deep copy.

use crate::error::Span;
use std::fmt;

const RAW_END: &str = "{{end}}";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    If(BranchNode),
    Range(BranchNode),
    With(BranchNode),
    Template(TemplateNode),
    Block(BlockNode),
    Fill(BlockNode),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) => n.span,
            Node::Action(n) => n.span,
            Node::If(n) | Node::Range(n) | Node::With(n) => n.span,
            Node::Template(n) => n.span,
            Node::Block(n) | Node::Fill(n) => n.span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Text(_) => "text",
            Node::Action(_) => "action",
            Node::If(_) => "if",
            Node::Range(_) => "range",
            Node::With(_) => "with",
            Node::Template(_) => "template",
            Node::Block(_) => "block",
            Node::Fill(_) => "fill",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(n) => write!(f, "{}", n),
            Node::Action(n) => write!(f, "{}", n),
            Node::If(n) => n.write(f, "if"),
            Node::Range(n) => n.write(f, "range"),
            Node::With(n) => n.write(f, "with"),
            Node::Template(n) => write!(f, "{}", n),
            Node::Block(n) => n.write(f, "block"),
            Node::Fill(n) => n.write(f, "fill"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub span: Span,
    pub nodes: Vec<Node>,
}

impl ListNode {
    pub fn new(span: Span) -> Self {
        Self { span, nodes: Vec::new() }
    }

    /// Appends a node, merging adjacent text.
    pub fn push(&mut self, node: Node) {
        if let Node::Text(text) = &node
            && let Some(Node::Text(last)) = self.nodes.last_mut()
        {
            last.text.push_str(&text.text);
            return;
        }
        self.nodes.push(node);
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.push(node);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

impl TextNode {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Text that would lex as something else when printed next to an action:
    /// delimiters, comment openers, or a brace at either edge.
    fn needs_raw(&self) -> bool {
        let text = &self.text;
        if text.contains("{{") || text.contains("/*") || text.ends_with('{') || text.starts_with('}') {
            return true;
        }
        text.match_indices("//").any(|(i, _)| {
            i == 0 || text[..i].chars().next_back().is_some_and(char::is_whitespace)
        })
    }
}

impl fmt::Display for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.needs_raw() {
            return f.write_str(&self.text);
        }
        // A raw section ends at the first `{{end}}`, so literal ones are cut
        // after their `{{` into separate sections.
        let mut rest = self.text.as_str();
        while let Some(i) = rest.find(RAW_END) {
            let (head, tail) = rest.split_at(i + 2);
            write!(f, "{{{{raw}}}}{}{{{{end}}}}", head)?;
            rest = tail;
        }
        write!(f, "{{{{raw}}}}{}{{{{end}}}}", rest)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub span: Span,
    pub pipe: PipeNode,
}

impl fmt::Display for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{}}}}}", self.pipe)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipeNode {
    pub span: Span,
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

impl PipeNode {
    /// True for a pipeline that is exactly `.`.
    pub fn is_dot(&self) -> bool {
        self.decl.is_empty()
            && self.cmds.len() == 1
            && matches!(self.cmds[0].args.as_slice(), [Arg::Dot(_)])
    }
}

impl fmt::Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            for (i, var) in self.decl.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", var)?;
            }
            f.write_str(" := ")?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", cmd)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub span: Span,
    pub args: Vec<Arg>,
}

impl CommandNode {
    /// The function name when the command starts with an identifier.
    pub fn ident(&self) -> Option<&str> {
        match self.args.first() {
            Some(Arg::Identifier(id)) => Some(&id.ident),
            _ => None,
        }
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

/// Operands of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Identifier(IdentifierNode),
    Variable(VariableNode),
    Field(FieldNode),
    Dot(Span),
    Nil(Span),
    Bool(BoolNode),
    Number(NumberNode),
    String(StringNode),
}

impl Arg {
    pub fn span(&self) -> Span {
        match self {
            Arg::Identifier(n) => n.span,
            Arg::Variable(n) => n.span,
            Arg::Field(n) => n.span,
            Arg::Dot(span) | Arg::Nil(span) => *span,
            Arg::Bool(n) => n.span,
            Arg::Number(n) => n.span,
            Arg::String(n) => n.span,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Identifier(n) => f.write_str(&n.ident),
            Arg::Variable(n) => write!(f, "{}", n),
            Arg::Field(n) => write!(f, "{}", n),
            Arg::Dot(_) => f.write_str("."),
            Arg::Nil(_) => f.write_str("nil"),
            Arg::Bool(n) => write!(f, "{}", n.value),
            Arg::Number(n) => f.write_str(&n.text),
            Arg::String(n) => f.write_str(&n.quoted),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierNode {
    pub span: Span,
    pub ident: String,
}

impl IdentifierNode {
    pub fn new(ident: impl Into<String>, span: Span) -> Self {
        Self { span, ident: ident.into() }
    }
}

/// `$x.a.b`; `ident[0]` is the variable name including `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub span: Span,
    pub ident: Vec<String>,
}

impl VariableNode {
    pub fn new(text: &str, span: Span) -> Self {
        Self { span, ident: text.split('.').map(str::to_string).collect() }
    }

    pub fn name(&self) -> &str {
        self.ident.first().map(String::as_str).unwrap_or("$")
    }
}

impl fmt::Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident.join("."))
    }
}

/// `.a.b`, stored without the leading dot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub span: Span,
    pub ident: Vec<String>,
}

impl FieldNode {
    pub fn new(text: &str, span: Span) -> Self {
        let text = text.strip_prefix('.').unwrap_or(text);
        Self { span, ident: text.split('.').map(str::to_string).collect() }
    }
}

impl fmt::Display for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.ident {
            write!(f, ".{}", part)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolNode {
    pub span: Span,
    pub value: bool,
}

/// A numeric constant with every representation that holds its value exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub span: Span,
    pub is_int: bool,
    pub is_uint: bool,
    pub is_float: bool,
    pub int: i64,
    pub uint: u64,
    pub float: f64,
    pub text: String,
}

impl NumberNode {
    /// Builds a number from an integer or float literal.
    pub fn parse(text: &str, span: Span) -> Option<Self> {
        let mut n = NumberNode {
            span,
            is_int: false,
            is_uint: false,
            is_float: false,
            int: 0,
            uint: 0,
            float: 0.0,
            text: text.to_string(),
        };

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let magnitude = match digits.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => digits.parse::<u64>().ok(),
        };
        match magnitude {
            Some(u) if !negative => {
                n.is_uint = true;
                n.uint = u;
                if let Ok(i) = i64::try_from(u) {
                    n.is_int = true;
                    n.int = i;
                }
            }
            Some(u) => {
                if let Some(i) = 0i64.checked_sub_unsigned(u) {
                    n.is_int = true;
                    n.int = i;
                }
            }
            None => {}
        }

        if n.is_int {
            n.is_float = true;
            n.float = n.int as f64;
        } else if n.is_uint {
            n.is_float = true;
            n.float = n.uint as f64;
        } else {
            let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
            n.is_float = true;
            n.float = f;
            if f.fract() == 0.0 {
                if f.abs() < 9.223_372_036_854_775_807e18 {
                    n.is_int = true;
                    n.int = f as i64;
                }
                if (0.0..1.844_674_407_370_955_2e19).contains(&f) {
                    n.is_uint = true;
                    n.uint = f as u64;
                }
            }
        }
        Some(n)
    }

    /// Builds a number from a character constant; all three representations hold.
    pub fn from_char(c: char, text: &str, span: Span) -> Self {
        let value = c as u32;
        NumberNode {
            span,
            is_int: true,
            is_uint: true,
            is_float: true,
            int: i64::from(value),
            uint: u64::from(value),
            float: f64::from(value),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub span: Span,
    /// The literal as written, quotes included.
    pub quoted: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub span: Span,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

impl BranchNode {
    fn write(&self, f: &mut fmt::Formatter<'_>, keyword: &str) -> fmt::Result {
        write!(f, "{{{{{} {}}}}}{}", keyword, self.pipe, self.list)?;
        if let Some(else_list) = &self.else_list {
            write!(f, "{{{{else}}}}{}", else_list)?;
        }
        f.write_str("{{end}}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub span: Span,
    pub name: String,
    pub pipe: Option<PipeNode>,
}

impl fmt::Display for TemplateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{template {}", quote(&self.name))?;
        if let Some(pipe) = &self.pipe {
            write!(f, " {}", pipe)?;
        }
        f.write_str("}}")
    }
}

/// Shared shape of `block` and `fill`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub span: Span,
    pub name: String,
    pub pipe: Option<PipeNode>,
    pub list: ListNode,
}

impl BlockNode {
    fn write(&self, f: &mut fmt::Formatter<'_>, keyword: &str) -> fmt::Result {
        write!(f, "{{{{{} {}", keyword, quote(&self.name))?;
        if let Some(pipe) = &self.pipe {
            write!(f, " {}", pipe)?;
        }
        write!(f, "}}}}{}{{{{end}}}}", self.list)
    }
}

/// Root of a named template.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineNode {
    pub span: Span,
    pub name: String,
    pub parent: Option<String>,
    pub list: ListNode,
}

impl fmt::Display for DefineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{define {}", quote(&self.name))?;
        if let Some(parent) = &self.parent {
            write!(f, " {}", quote(parent))?;
        }
        write!(f, "}}}}{}{{{{end}}}}", self.list)
    }
}

/// Quotes a string so that [`unquote`] gives it back.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Interprets a double-quoted, single-quoted or back-quoted literal.
pub fn unquote(literal: &str) -> Option<String> {
    if let Some(raw) = literal.strip_prefix('`') {
        return raw.strip_suffix('`').map(str::to_string);
    }
    let quote = literal.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let body = literal.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{b}',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            'U' => hex_escape(&mut chars, 8)?,
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                char::from_u32(value)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value.checked_mul(16)? + chars.next()?.to_digit(16)?;
    }
    char::from_u32(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_ideal_constant() {
        let n = NumberNode::parse("42", Span::default()).unwrap();
        assert!(n.is_int && n.is_uint && n.is_float);
        assert_eq!((n.int, n.uint, n.float), (42, 42, 42.0));

        let n = NumberNode::parse("0x1A2B", Span::default()).unwrap();
        assert_eq!(n.int, 0x1A2B);

        let n = NumberNode::parse("1e3", Span::default()).unwrap();
        assert!(n.is_int && n.is_float);
        assert_eq!(n.int, 1000);

        let n = NumberNode::parse("0.5", Span::default()).unwrap();
        assert!(n.is_float && !n.is_int && !n.is_uint);
    }

    #[test]
    fn number_signed() {
        let n = NumberNode::parse("-5", Span::default()).unwrap();
        assert!(n.is_int && n.is_float && !n.is_uint);
        assert_eq!((n.int, n.float), (-5, -5.0));

        let n = NumberNode::parse("-9223372036854775808", Span::default()).unwrap();
        assert_eq!(n.int, i64::MIN);

        let n = NumberNode::parse("-0x10", Span::default()).unwrap();
        assert_eq!(n.int, -16);

        let n = NumberNode::parse("+7", Span::default()).unwrap();
        assert!(n.is_uint);
        assert_eq!(n.uint, 7);

        let n = NumberNode::parse(".5", Span::default()).unwrap();
        assert_eq!(n.float, 0.5);
    }

    #[test]
    fn char_constant_sets_all() {
        let n = NumberNode::from_char('a', "'a'", Span::default());
        assert!(n.is_int && n.is_uint && n.is_float);
        assert_eq!(n.int, 97);
    }

    #[test]
    fn quote_roundtrip() {
        for s in ["plain", "with \"quotes\"", "tab\tnew\nline", "back\\slash", "\u{1}ctl", "ünï"] {
            assert_eq!(unquote(&quote(s)).as_deref(), Some(s));
        }
        assert_eq!(unquote("`raw\\n`").as_deref(), Some("raw\\n"));
        assert_eq!(unquote("'\\n'").as_deref(), Some("\n"));
        assert_eq!(unquote("\"\\u00e9\"").as_deref(), Some("é"));
    }

    #[test]
    fn text_with_delims_prints_as_raw() {
        let text = TextNode { span: Span::default(), text: "a {{b}} c".to_string() };
        assert_eq!(text.to_string(), "{{raw}}a {{b}} c{{end}}");
        let url = TextNode { span: Span::default(), text: "see http://x".to_string() };
        assert_eq!(url.to_string(), "see http://x");
    }

    #[test]
    fn text_with_end_splits_raw_sections() {
        let text = TextNode { span: Span::default(), text: "Go: {{if .X}}y{{end}}!".to_string() };
        assert_eq!(text.to_string(), "{{raw}}Go: {{if .X}}y{{{{end}}{{raw}}end}}!{{end}}");
    }

    #[test]
    fn text_with_brace_edges_prints_as_raw() {
        let open = TextNode { span: Span::default(), text: "function f(){".to_string() };
        assert_eq!(open.to_string(), "{{raw}}function f(){{{end}}");
        let close = TextNode { span: Span::default(), text: "}\n".to_string() };
        assert_eq!(close.to_string(), "{{raw}}}\n{{end}}");
        let inner = TextNode { span: Span::default(), text: "a { b } c".to_string() };
        assert_eq!(inner.to_string(), "a { b } c");
    }

    #[test]
    fn list_push_merges_text() {
        let mut list = ListNode::default();
        list.push(Node::Text(TextNode { span: Span::default(), text: "a".into() }));
        list.push(Node::Text(TextNode { span: Span::default(), text: "b".into() }));
        assert_eq!(list.nodes.len(), 1);
        assert_eq!(list.to_string(), "ab");
    }
}
