use super::{PResult, Parser, Terminator};
use crate::ast::*;
use crate::error::{ParseErrorKind, Span};
use crate::lexer::TokenKind;

/// Result of parsing one `{{...}}`.
pub(super) enum Item {
    Node(Node),
    End,
    Else(Span),
}

impl Parser<'_> {
    /// Action:
    ///     control
    ///     command ("|" command)*
    ///
    /// The left delimiter is already consumed.
    pub(super) fn action(&mut self, open: Span) -> PResult<Item> {
        let token = self.next()?;
        match token.kind {
            TokenKind::End => {
                self.expect(TokenKind::RightDelim, "end")?;
                Ok(Item::End)
            }
            TokenKind::Else => {
                self.expect(TokenKind::RightDelim, "else")?;
                Ok(Item::Else(token.span))
            }
            TokenKind::If | TokenKind::Range | TokenKind::With => {
                self.control(token.kind, open).map(Item::Node)
            }
            TokenKind::Template => self.template_call(open).map(Item::Node),
            TokenKind::Block => self.block_or_fill(open, false).map(Item::Node),
            TokenKind::Fill => self.block_or_fill(open, true).map(Item::Node),
            TokenKind::Define => Err(self.unexpected(&token, "command")),
            _ => {
                self.backup(token);
                // Declared variables stay in scope until the enclosing end.
                let pipe = self.pipeline("command")?;
                Ok(Item::Node(Node::Action(ActionNode { span: open.merge(&pipe.span), pipe })))
            }
        }
    }

    /// If, Range and With:
    ///     {{kw pipeline}} itemList {{end}}
    ///     {{kw pipeline}} itemList {{else}} itemList {{end}}
    fn control(&mut self, kind: TokenKind, open: Span) -> PResult<Node> {
        let context = match kind {
            TokenKind::If => "if",
            TokenKind::Range => "range",
            _ => "with",
        };
        let depth = self.vars.len();
        let pipe = self.pipeline(context)?;
        let (list, end) = self.item_list(context)?;
        let else_list = match end {
            Terminator::End => None,
            Terminator::Else(_) => {
                let (else_list, end) = self.item_list(context)?;
                if let Terminator::Else(span) = end {
                    return Err(self.error(
                        span,
                        ParseErrorKind::UnexpectedToken {
                            expected: "end".to_string(),
                            found: "<else>".to_string(),
                        },
                    ));
                }
                Some(else_list)
            }
        };
        self.vars.truncate(depth);

        let span = open.merge(else_list.as_ref().map_or(&list.span, |l| &l.span));
        let branch = BranchNode { span, pipe, list, else_list };
        Ok(match kind {
            TokenKind::If => Node::If(branch),
            TokenKind::Range => Node::Range(branch),
            _ => Node::With(branch),
        })
    }

    /// Template:
    ///     {{template "name" pipeline?}}
    fn template_call(&mut self, open: Span) -> PResult<Node> {
        const CONTEXT: &str = "template clause";
        let token = self.next()?;
        let name = self.string_value(&token, CONTEXT)?;
        let pipe = self.optional_pipeline(CONTEXT)?;
        let span = pipe.as_ref().map_or(open.merge(&token.span), |p| open.merge(&p.span));
        Ok(Node::Template(TemplateNode { span, name, pipe }))
    }

    /// Block and Fill:
    ///     {{block "name" pipeline?}} itemList {{end}}
    ///     {{fill "name" pipeline?}} itemList {{end}}
    fn block_or_fill(&mut self, open: Span, fill: bool) -> PResult<Node> {
        let context = if fill { "fill" } else { "block" };
        let token = self.next()?;
        let name = self.string_value(&token, context)?;
        let depth = self.vars.len();
        let pipe = self.optional_pipeline(context)?;
        let (list, end) = self.item_list(context)?;
        if let Terminator::Else(span) = end {
            return Err(self.error(
                span,
                ParseErrorKind::UnexpectedToken {
                    expected: format!("<end> in {}", context),
                    found: "<else>".to_string(),
                },
            ));
        }
        self.vars.truncate(depth);

        let node = BlockNode { span: open.merge(&list.span), name, pipe, list };
        if !fill {
            return Ok(Node::Block(node));
        }
        self.validate_fill(&node.list)?;
        Ok(Node::Fill(node))
    }

    fn optional_pipeline(&mut self, context: &str) -> PResult<Option<PipeNode>> {
        let token = self.next()?;
        if token.kind == TokenKind::RightDelim {
            return Ok(None);
        }
        self.backup(token);
        self.pipeline(context).map(Some)
    }

    /// A fill body only supplies block overrides: blocks, control nodes
    /// holding blocks, and blank text.
    fn validate_fill(&self, list: &ListNode) -> PResult<()> {
        for node in &list.nodes {
            match node {
                Node::Block(_) => {}
                Node::Text(text) if text.is_blank() => {}
                Node::If(branch) | Node::Range(branch) | Node::With(branch) => {
                    self.validate_fill(&branch.list)?;
                    if let Some(else_list) = &branch.else_list {
                        self.validate_fill(else_list)?;
                    }
                }
                other => {
                    return Err(self.error(
                        other.span(),
                        ParseErrorKind::InvalidFill(other.to_string()),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::Node;
    use crate::error::ParseErrorKind;
    use crate::parser::parse;

    fn first_node(src: &str) -> Node {
        let tree = parse(src, "t", "", "", &[]).unwrap();
        tree.get("t").unwrap().list.nodes[0].clone()
    }

    #[test]
    fn control_nodes_keep_else() {
        let Node::If(branch) = first_node(r#"{{define "t"}}{{if .A}}a{{else}}b{{end}}{{end}}"#) else {
            panic!("expected if");
        };
        assert_eq!(branch.list.to_string(), "a");
        assert_eq!(branch.else_list.map(|l| l.to_string()).as_deref(), Some("b"));
    }

    #[test]
    fn template_call_with_and_without_pipe() {
        let Node::Template(call) = first_node(r#"{{define "t"}}{{template "x"}}{{end}}"#) else {
            panic!("expected template");
        };
        assert_eq!(call.name, "x");
        assert!(call.pipe.is_none());

        let Node::Template(call) = first_node(r#"{{define "t"}}{{template "x" .Y}}{{end}}"#) else {
            panic!("expected template");
        };
        assert_eq!(call.pipe.map(|p| p.to_string()).as_deref(), Some(".Y"));
    }

    #[test]
    fn fill_rejects_bare_action() {
        let err = parse(r#"{{define "t"}}{{fill "base"}}{{.Field}}{{end}}{{end}}"#, "t", "", "", &[])
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFill("{{.Field}}".to_string()));
    }

    #[test]
    fn fill_accepts_blocks_under_control() {
        let src = r#"{{define "t"}}{{fill "base"}}
            {{if .C}}{{block "title"}}x{{end}}{{else}}{{block "title"}}y{{end}}{{end}}
        {{end}}{{end}}"#;
        assert!(matches!(first_node(src), Node::Fill(_)));

        let src = r#"{{define "t"}}{{fill "base"}}{{with .C}}text{{end}}{{end}}{{end}}"#;
        let err = parse(src, "t", "", "", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFill("text".to_string()));
    }

    #[test]
    fn else_in_block_is_rejected() {
        let err = parse(r#"{{define "t"}}{{block "b"}}x{{else}}y{{end}}{{end}}"#, "t", "", "", &[])
            .unwrap_err();
        assert!(err.to_string().contains("expected <end> in block"));
    }

    #[test]
    fn define_inside_body_is_rejected() {
        assert!(parse(r#"{{define "t"}}{{define "u"}}{{end}}{{end}}"#, "t", "", "", &[]).is_err());
    }

    #[test]
    fn missing_end_reports_eof() {
        let err = parse(r#"{{define "t"}}{{if .A}}x"#, "t", "", "", &[]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof { context: "if".to_string() });
    }
}
